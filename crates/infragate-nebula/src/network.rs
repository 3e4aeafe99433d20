//! Network adapter over OpenNebula virtual networks

use crate::backend::{BACKEND_NAME, Shared, native_id};
use crate::record::VnetRecord;
use crate::template::{Ipv4Cidr, VnetSpec, mask_to_prefix};
use async_trait::async_trait;
use infragate_core::catalog::{attrs, kinds, mixins, region_id};
use infragate_core::transfer::{non_empty, number};
use infragate_core::{
    AttachPolicy, BackendError, Entity, EntityAdapter, Identifier, Kind, MixinFilter,
    RequestContext, Result, TransferTable,
};
use serde_json::json;

const DEFAULT_BRIDGE: &str = "br0";

fn network_transfer() -> TransferTable<VnetRecord> {
    TransferTable::new()
        .attr(attrs::ID, |vnet: &VnetRecord| non_empty(vnet.0.get("ID")))
        .attr(attrs::TITLE, |vnet: &VnetRecord| non_empty(vnet.0.get("NAME")))
        .attr(attrs::NETWORK_VLAN, |vnet: &VnetRecord| number(vnet.0.get("VLAN_ID")))
        .attr(attrs::NETWORK_LABEL, |vnet: &VnetRecord| non_empty(vnet.0.get("BRIDGE")))
        .attr(attrs::NETWORK_STATE, |_: &VnetRecord| Some(json!("active")))
        .attr(attrs::NETWORK_ADDRESS, |vnet: &VnetRecord| {
            let address = vnet.template_field("NETWORK_ADDRESS").filter(|a| !a.is_empty())?;
            match vnet.template_field("NETWORK_MASK").and_then(mask_to_prefix) {
                Some(prefix) => Some(json!(format!("{}/{}", address, prefix))),
                None => Some(json!(address)),
            }
        })
        .attr(attrs::NETWORK_GATEWAY, |vnet: &VnetRecord| {
            vnet.template_field("GATEWAY")
                .filter(|g| !g.is_empty())
                .map(|g| json!(g))
        })
        .attr(attrs::NETWORK_ALLOCATION, |vnet: &VnetRecord| {
            vnet.template_field("NETWORK_ADDRESS")
                .map(|_| json!("static"))
        })
}

fn network_mixins(region: &str) -> AttachPolicy<VnetRecord> {
    AttachPolicy::new()
        .when("ipnetwork", mixins::IPNETWORK, |vnet: &VnetRecord| {
            vnet.template_field("NETWORK_ADDRESS")
                .is_some_and(|a| !a.is_empty())
        })
        .always("region", region_id(region))
}

pub struct NetworkAdapter {
    kind: Kind,
    shared: Shared,
    transfer: TransferTable<VnetRecord>,
    mixins: AttachPolicy<VnetRecord>,
}

impl NetworkAdapter {
    pub fn new(shared: Shared) -> Result<Self> {
        Ok(Self {
            kind: shared.kind(kinds::NETWORK)?,
            mixins: network_mixins(&shared.settings.region),
            shared,
            transfer: network_transfer(),
        })
    }

    fn to_entity(&self, vnet: &VnetRecord) -> Result<Entity> {
        let mut entity =
            Entity::new(self.kind.type_identifier()).with_id(Identifier::new(vnet.id()));
        self.transfer.apply(vnet, &mut entity);
        self.mixins.attach(&self.shared.catalog, vnet, &mut entity)?;
        Ok(entity)
    }

    fn spec_for(entity: &Entity) -> Result<VnetSpec> {
        let address = entity
            .attribute_str(attrs::NETWORK_ADDRESS)
            .map(Ipv4Cidr::parse)
            .transpose()?;

        Ok(VnetSpec {
            name: entity
                .attribute_str(attrs::TITLE)
                .unwrap_or("infragate-network")
                .to_string(),
            bridge: entity
                .attribute_str(attrs::NETWORK_LABEL)
                .unwrap_or(DEFAULT_BRIDGE)
                .to_string(),
            vlan_id: entity.attribute_i64(attrs::NETWORK_VLAN),
            address,
            gateway: entity.attribute_str(attrs::NETWORK_GATEWAY).map(str::to_string),
        })
    }
}

#[async_trait]
impl EntityAdapter for NetworkAdapter {
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
        let vnets = self
            .shared
            .api
            .vnet_list()
            .await
            .map_err(|e| e.classify(BackendError::EntityRetrieval))?;

        let mut entities = Vec::new();
        for vnet in &vnets {
            let entity = self.to_entity(vnet)?;
            if entity.matches(filter) {
                entities.push(entity);
            }
        }
        Ok(entities)
    }

    async fn instance(&self, id: &Identifier, _cx: &RequestContext) -> Result<Entity> {
        let vnet = self
            .shared
            .api
            .vnet_show(native_id(id)?)
            .await
            .map_err(|e| e.classify(BackendError::EntityRetrieval))?;
        self.to_entity(&vnet)
    }

    async fn create(&self, entity: &Entity, _cx: &RequestContext) -> Result<Identifier> {
        let spec = Self::spec_for(entity)?;
        let template = spec
            .render()
            .map_err(|e| e.classify(BackendError::EntityCreate))?;
        let id = self
            .shared
            .api
            .vnet_create(&template)
            .await
            .map_err(|e| e.classify(BackendError::EntityCreate))?;

        tracing::info!("Created virtual network {} ({})", id, spec.name);
        Ok(Identifier::new(id))
    }

    async fn delete(&self, id: &Identifier, _cx: &RequestContext) -> Result<()> {
        let vnet_id = native_id(id)?;
        self.shared
            .api
            .vnet_delete(vnet_id)
            .await
            .map_err(|e| e.classify(BackendError::EntityAction))?;
        tracing::info!("Deleted virtual network {}", vnet_id);
        Ok(())
    }
}
