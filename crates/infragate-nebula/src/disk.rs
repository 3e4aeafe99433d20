//! Storagelink adapter over the disks of OpenNebula VMs

use crate::backend::{BACKEND_NAME, Shared};
use crate::links::{hotplug, link_end};
use crate::record::{VmRecord, text};
use async_trait::async_trait;
use infragate_core::catalog::{attrs, kinds, region_id};
use infragate_core::{
    AttachPolicy, BackendError, Entity, EntityAdapter, Identifier, IdentifierCodec, Kind,
    LinkEnds, MixinFilter, RequestContext, Result, TransferTable,
};
use serde_json::{Value, json};

/// One image-backed disk of a VM
#[derive(Debug, Clone)]
pub struct DiskRecord {
    pub id: Identifier,
    pub vm_id: String,
    pub disk: Value,
}

fn disk_transfer() -> TransferTable<DiskRecord> {
    TransferTable::new()
        .attr(attrs::ID, |r: &DiskRecord| Some(json!(r.id.as_str())))
        .attr(attrs::SL_DEVICEID, |r: &DiskRecord| {
            text(&r.disk, "TARGET")
                .filter(|t| !t.is_empty())
                .map(|t| json!(format!("/dev/{}", t)))
        })
        .attr(attrs::SL_STATE, |_: &DiskRecord| Some(json!("active")))
}

pub struct StoragelinkAdapter {
    kind: Kind,
    shared: Shared,
    codec: IdentifierCodec,
    transfer: TransferTable<DiskRecord>,
    mixins: AttachPolicy<DiskRecord>,
    compute_prefix: String,
    storage_prefix: String,
}

impl StoragelinkAdapter {
    pub fn new(shared: Shared) -> Result<Self> {
        let compute = shared.kind(kinds::COMPUTE)?;
        let storage = shared.kind(kinds::STORAGE)?;

        Ok(Self {
            kind: shared.kind(kinds::STORAGELINK)?,
            codec: IdentifierCodec::compound(&compute.term, &["disk"])?,
            transfer: disk_transfer(),
            mixins: AttachPolicy::new().always("region", region_id(&shared.settings.region)),
            compute_prefix: compute.location_prefix(),
            storage_prefix: storage.location_prefix(),
            shared,
        })
    }

    /// Volatile disks carry no IMAGE_ID and are not storagelinks
    fn records(&self, vm: &VmRecord) -> Result<Vec<DiskRecord>> {
        vm.disks()
            .into_iter()
            .filter(|disk| text(disk, "IMAGE_ID").is_some())
            .filter_map(|disk| text(disk, "DISK_ID").map(|disk_id| (disk_id, disk)))
            .map(|(disk_id, disk)| {
                Ok(DiskRecord {
                    id: self.codec.encode(vm.id(), &[disk_id])?,
                    vm_id: vm.id().to_string(),
                    disk: disk.clone(),
                })
            })
            .collect()
    }

    fn to_entity(&self, record: &DiskRecord) -> Result<Entity> {
        let image_id = text(&record.disk, "IMAGE_ID").unwrap_or_default();
        let mut link = LinkEnds::new(
            format!("{}{}", self.compute_prefix, record.vm_id),
            format!("{}{}", self.storage_prefix, image_id),
        );
        link.target_kind = Some(kinds::STORAGE.to_string());

        let mut entity = Entity::new(self.kind.type_identifier())
            .with_id(record.id.clone())
            .with_link(link);
        self.transfer.apply(record, &mut entity);
        self.mixins.attach(&self.shared.catalog, record, &mut entity)?;
        Ok(entity)
    }

    async fn locate(&self, id: &Identifier) -> Result<(VmRecord, String)> {
        let decoded = self.codec.decode(id.as_str())?;
        let disk_id = decoded.sub(0).unwrap_or_default().to_string();
        let vm = self.shared.refresh_vm(&decoded.key).await?;
        if vm.disk(&disk_id).is_none() {
            return Err(BackendError::EntityNotFound(format!(
                "VM {} has no disk {}",
                decoded.key, disk_id
            )));
        }
        Ok((vm, disk_id))
    }
}

#[async_trait]
impl EntityAdapter for StoragelinkAdapter {
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

        let mut entities = Vec::new();
        for vm in vms.iter().filter(|vm| vm.state() != "DONE") {
            for record in self.records(vm)? {
                let entity = self.to_entity(&record)?;
                if entity.matches(filter) {
                    entities.push(entity);
                }
            }
        }
        Ok(entities)
    }

    async fn instance(&self, id: &Identifier, _cx: &RequestContext) -> Result<Entity> {
        let (vm, disk_id) = self.locate(id).await?;
        self.records(&vm)?
            .into_iter()
            .find(|r| text(&r.disk, "DISK_ID") == Some(disk_id.as_str()))
            .ok_or_else(|| {
                BackendError::EntityNotFound(format!("disk {} is not image backed", id))
            })
            .and_then(|record| self.to_entity(&record))
    }

    async fn create(&self, entity: &Entity, cx: &RequestContext) -> Result<Identifier> {
        let link = entity.link.as_ref().ok_or_else(|| {
            BackendError::ResourceNotValid("storagelink requires a source and a target".to_string())
        })?;
        let vm_id = link_end(&link.source, &["compute"])?;
        let image_id = link_end(&link.target, &["storage"])?;

        let vm = self.shared.refresh_vm(&vm_id).await?;
        let before = vm.disks().len();

        let api = self.shared.api.clone();
        let attach = async {
            api.disk_attach(&vm_id, &image_id)
                .await
                .map_err(|e| e.classify(BackendError::EntityCreate))
        };
        let attached = hotplug(
            &self.shared,
            &vm_id,
            attach,
            |vm| vm.disks().len() > before,
            "Could not attach storage to compute",
            cx,
        )
        .await?;

        let disk_id = attached
            .disks()
            .last()
            .and_then(|disk| text(disk, "DISK_ID"))
            .ok_or_else(|| BackendError::Remote(format!("VM {} reports no DISK ID", vm_id)))?;

        let id = self.codec.encode(&vm_id, &[disk_id])?;
        tracing::info!("Attached image {} to VM {} as {}", image_id, vm_id, id);
        Ok(id)
    }

    async fn delete(&self, id: &Identifier, cx: &RequestContext) -> Result<()> {
        let (vm, disk_id) = self.locate(id).await?;
        let vm_id = vm.id().to_string();

        let api = self.shared.api.clone();
        let detach = async {
            api.disk_detach(&vm_id, &disk_id)
                .await
                .map_err(|e| e.classify(BackendError::EntityAction))
        };
        hotplug(
            &self.shared,
            &vm_id,
            detach,
            |vm| vm.disk(&disk_id).is_none(),
            "Could not detach storage from compute",
            cx,
        )
        .await?;

        tracing::info!("Detached disk {} from VM {}", disk_id, vm_id);
        Ok(())
    }
}
