//! Networkinterface adapter over the NICs of OpenNebula VMs
//!
//! A NIC has no identity of its own in OpenNebula; it lives inside a VM
//! template. Identifiers therefore carry both keys: `compute_42_nic_1`.

use crate::backend::{BACKEND_NAME, Shared};
use crate::links::{hotplug, link_end};
use crate::record::{VmRecord, text};
use async_trait::async_trait;
use infragate_core::catalog::{attrs, availability_zone_id, kinds, mixins, region_id};
use infragate_core::transfer::non_empty;
use infragate_core::{
    AttachPolicy, BackendError, Entity, EntityAdapter, Identifier, IdentifierCodec, Kind,
    LinkEnds, MixinFilter, MixinTag, RequestContext, Result, TransferTable,
};
use serde_json::{Value, json};
use std::collections::HashSet;

/// One NIC together with the VM facts the entity needs
#[derive(Debug, Clone)]
pub struct NicRecord {
    pub id: Identifier,
    pub vm_id: String,
    pub cluster: Option<String>,
    pub nic: Value,
    /// Whether the attached network is an IP reservation
    pub reservation: bool,
}

impl NicRecord {
    fn field(&self, key: &str) -> Option<&str> {
        text(&self.nic, key).filter(|v| !v.is_empty())
    }
}

fn nic_transfer() -> TransferTable<NicRecord> {
    TransferTable::new()
        .attr(attrs::ID, |r: &NicRecord| Some(json!(r.id.as_str())))
        .attr(attrs::TITLE, |r: &NicRecord| non_empty(r.nic.get("NETWORK")))
        .attr(attrs::NI_INTERFACE, |r: &NicRecord| {
            r.field("NIC_ID").map(|id| json!(format!("eth{}", id)))
        })
        .attr(attrs::NI_MAC, |r: &NicRecord| non_empty(r.nic.get("MAC")))
        .attr(attrs::NI_STATE, |_: &NicRecord| Some(json!("active")))
        .attr(attrs::NI_ADDRESS, |r: &NicRecord| non_empty(r.nic.get("IP")))
        .attr(attrs::NI_GATEWAY, |r: &NicRecord| non_empty(r.nic.get("GATEWAY")))
        .attr(attrs::NI_ALLOCATION, |r: &NicRecord| r.field("IP").map(|_| json!("dynamic")))
}

fn nic_mixins(region: &str) -> AttachPolicy<NicRecord> {
    AttachPolicy::new()
        .when("ipnetworkinterface", mixins::IPNETWORKINTERFACE, |r: &NicRecord| {
            r.field("IP").is_some()
        })
        .always("region", region_id(region))
        .rule("availability_zone", |r: &NicRecord| {
            r.cluster
                .as_deref()
                .map(|cid| vec![MixinTag::optional(availability_zone_id(cid))])
                .unwrap_or_default()
        })
}

pub struct NetworkinterfaceAdapter {
    kind: Kind,
    shared: Shared,
    codec: IdentifierCodec,
    transfer: TransferTable<NicRecord>,
    mixins: AttachPolicy<NicRecord>,
    compute_prefix: String,
    network_prefix: String,
    reservation_prefix: String,
}

impl NetworkinterfaceAdapter {
    pub fn new(shared: Shared) -> Result<Self> {
        let compute = shared.kind(kinds::COMPUTE)?;
        let network = shared.kind(kinds::NETWORK)?;
        let reservation = shared.kind(kinds::IPRESERVATION)?;

        Ok(Self {
            kind: shared.kind(kinds::NETWORKINTERFACE)?,
            codec: IdentifierCodec::compound(&compute.term, &["nic"])?,
            transfer: nic_transfer(),
            mixins: nic_mixins(&shared.settings.region),
            compute_prefix: compute.location_prefix(),
            network_prefix: network.location_prefix(),
            reservation_prefix: reservation.location_prefix(),
            shared,
        })
    }

    fn records(&self, vm: &VmRecord, reservations: &HashSet<String>) -> Result<Vec<NicRecord>> {
        vm.nics()
            .into_iter()
            .filter_map(|nic| text(nic, "NIC_ID").map(|nic_id| (nic_id, nic)))
            .map(|(nic_id, nic)| {
                let network_id = text(nic, "NETWORK_ID").unwrap_or_default();
                Ok(NicRecord {
                    id: self.codec.encode(vm.id(), &[nic_id])?,
                    vm_id: vm.id().to_string(),
                    cluster: vm.cluster_id().map(str::to_string),
                    nic: nic.clone(),
                    reservation: reservations.contains(network_id),
                })
            })
            .collect()
    }

    /// Builds the entity; the target points at an IP reservation when the
    /// attached network is one
    fn to_entity(&self, record: &NicRecord) -> Result<Entity> {
        let network_id = record.field("NETWORK_ID").unwrap_or_default();
        let (prefix, target_kind) = if record.reservation {
            (&self.reservation_prefix, kinds::IPRESERVATION)
        } else {
            (&self.network_prefix, kinds::NETWORK)
        };

        let mut link = LinkEnds::new(
            format!("{}{}", self.compute_prefix, record.vm_id),
            format!("{}{}", prefix, network_id),
        );
        link.target_kind = Some(target_kind.to_string());

        let mut entity = Entity::new(self.kind.type_identifier())
            .with_id(record.id.clone())
            .with_link(link);
        self.transfer.apply(record, &mut entity);
        self.mixins.attach(&self.shared.catalog, record, &mut entity)?;
        Ok(entity)
    }

    async fn reservations(&self) -> Result<HashSet<String>> {
        let vnets = self
            .shared
            .api
            .vnet_list()
            .await
            .map_err(|e| e.classify(BackendError::EntityRetrieval))?;
        Ok(vnets
            .iter()
            .filter(|v| v.is_ip_reservation())
            .map(|v| v.id().to_string())
            .collect())
    }

    /// Resolves a NIC identifier to its VM, failing when the NIC is gone
    async fn locate(&self, id: &Identifier) -> Result<(VmRecord, String)> {
        let decoded = self.codec.decode(id.as_str())?;
        let nic_id = decoded.sub(0).unwrap_or_default().to_string();
        let vm = self.shared.refresh_vm(&decoded.key).await?;
        if vm.nic(&nic_id).is_none() {
            return Err(BackendError::EntityNotFound(format!(
                "VM {} has no NIC {}",
                decoded.key, nic_id
            )));
        }
        Ok((vm, nic_id))
    }
}

#[async_trait]
impl EntityAdapter for NetworkinterfaceAdapter {
    fn kind(&self) -> &Kind {
        &self.kind
    }

    fn backend(&self) -> &str {
        BACKEND_NAME
    }

    async fn identifiers(
        &self,
        filter: &MixinFilter,
        cx: &RequestContext,
    ) -> Result<Vec<Identifier>> {
        Ok(self
            .list(filter, cx)
            .await?
            .into_iter()
            .filter_map(|e| e.id)
            .collect())
    }

    async fn list(&self, filter: &MixinFilter, _cx: &RequestContext) -> Result<Vec<Entity>> {
        let vms = self
            .shared
            .api
            .vm_list()
            .await
            .map_err(|e| e.classify(BackendError::EntityRetrieval))?;
        let reservations = self.reservations().await?;

        let mut entities = Vec::new();
        for vm in vms.iter().filter(|vm| vm.state() != "DONE") {
            for record in self.records(vm, &reservations)? {
                let entity = self.to_entity(&record)?;
                if entity.matches(filter) {
                    entities.push(entity);
                }
            }
        }
        Ok(entities)
    }

    async fn instance(&self, id: &Identifier, _cx: &RequestContext) -> Result<Entity> {
        let (vm, nic_id) = self.locate(id).await?;
        let reservations = self.reservations().await?;

        self.records(&vm, &reservations)?
            .into_iter()
            .find(|r| r.field("NIC_ID") == Some(nic_id.as_str()))
            .ok_or_else(|| BackendError::EntityNotFound(format!("NIC {} is gone", id)))
            .and_then(|record| self.to_entity(&record))
    }

    async fn create(&self, entity: &Entity, cx: &RequestContext) -> Result<Identifier> {
        let link = entity.link.as_ref().ok_or_else(|| {
            BackendError::ResourceNotValid(
                "networkinterface requires a source and a target".to_string(),
            )
        })?;
        let vm_id = link_end(&link.source, &["compute"])?;
        let network_id = link_end(&link.target, &["network", "ipreservation"])?;

        let vm = self.shared.refresh_vm(&vm_id).await?;
        let before = vm.nics().len();

        let api = self.shared.api.clone();
        let attach = async {
            api.nic_attach(&vm_id, &network_id)
                .await
                .map_err(|e| e.classify(BackendError::EntityCreate))
        };
        let attached = hotplug(
            &self.shared,
            &vm_id,
            attach,
            |vm| vm.nics().len() > before,
            "Could not attach network to compute",
            cx,
        )
        .await?;

        let nic_id = attached
            .nics()
            .last()
            .and_then(|nic| text(nic, "NIC_ID"))
            .ok_or_else(|| BackendError::Remote(format!("VM {} reports no NIC ID", vm_id)))?;

        let id = self.codec.encode(&vm_id, &[nic_id])?;
        tracing::info!("Attached network {} to VM {} as {}", network_id, vm_id, id);
        Ok(id)
    }

    async fn delete(&self, id: &Identifier, cx: &RequestContext) -> Result<()> {
        let (vm, nic_id) = self.locate(id).await?;
        let vm_id = vm.id().to_string();

        let api = self.shared.api.clone();
        let detach = async {
            api.nic_detach(&vm_id, &nic_id)
                .await
                .map_err(|e| e.classify(BackendError::EntityAction))
        };
        hotplug(
            &self.shared,
            &vm_id,
            detach,
            |vm| vm.nic(&nic_id).is_none(),
            "Could not detach network from compute",
            cx,
        )
        .await?;

        tracing::info!("Detached NIC {} from VM {}", nic_id, vm_id);
        Ok(())
    }
}
