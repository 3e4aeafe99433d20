//! Storage adapter over EBS volumes

use crate::backend::{BACKEND_NAME, Shared};
use crate::record::{VolumeRecord, VolumeRequest};
use async_trait::async_trait;
use infragate_core::catalog::{attrs, availability_zone_id, kinds, mixins, region_id};
use infragate_core::{
    AttachPolicy, BackendError, Entity, EntityAdapter, Identifier, Kind, MixinFilter, MixinTag,
    RequestContext, Result, TransferTable,
};
use serde_json::json;

fn storage_transfer() -> TransferTable<VolumeRecord> {
    TransferTable::new()
        .attr(attrs::ID, |v: &VolumeRecord| Some(json!(v.id)))
        .attr(attrs::TITLE, |v: &VolumeRecord| v.name.as_ref().map(|n| json!(n)))
        .attr(attrs::STORAGE_SIZE, |v: &VolumeRecord| {
            v.size_gb.map(|gb| json!(f64::from(gb)))
        })
        .attr(attrs::STORAGE_STATE, |v: &VolumeRecord| Some(json!(v.occi_state())))
}

fn storage_mixins(region: &str) -> AttachPolicy<VolumeRecord> {
    AttachPolicy::new()
        .always("region", region_id(region))
        .rule("availability_zone", |v: &VolumeRecord| {
            v.availability_zone
                .as_deref()
                .map(|zone| vec![MixinTag::optional(availability_zone_id(zone))])
                .unwrap_or_default()
        })
}

pub struct StorageAdapter {
    kind: Kind,
    shared: Shared,
    transfer: TransferTable<VolumeRecord>,
    mixins: AttachPolicy<VolumeRecord>,
}

impl StorageAdapter {
    pub fn new(shared: Shared) -> Result<Self> {
        Ok(Self {
            kind: shared.kind(kinds::STORAGE)?,
            mixins: storage_mixins(&shared.settings.region),
            shared,
            transfer: storage_transfer(),
        })
    }

    fn to_entity(&self, volume: &VolumeRecord) -> Result<Entity> {
        let mut entity =
            Entity::new(self.kind.type_identifier()).with_id(Identifier::new(&volume.id));
        self.transfer.apply(volume, &mut entity);
        self.mixins.attach(&self.shared.catalog, volume, &mut entity)?;
        Ok(entity)
    }

    fn request_for(&self, entity: &Entity) -> Result<VolumeRequest> {
        let size = entity
            .attribute_f64(attrs::STORAGE_SIZE)
            .filter(|size| *size > 0.0)
            .ok_or_else(|| {
                BackendError::ResourceNotValid(format!(
                    "{} must be a positive size in GB",
                    attrs::STORAGE_SIZE
                ))
            })?;
        let size_gb = i32::try_from(size.ceil() as i64).map_err(|_| {
            BackendError::ResourceNotValid(format!("volume size {} GB is too large", size))
        })?;

        let availability_zone = entity
            .mixins
            .related_to(mixins::AVAILABILITY_ZONE)
            .find(|m| m.type_identifier() != mixins::AVAILABILITY_ZONE)
            .map(|m| m.term.clone())
            .or_else(|| self.shared.settings.availability_zone.clone())
            .ok_or_else(|| {
                BackendError::ResourceNotValid(
                    "volumes need an availability_zone mixin or a configured zone".to_string(),
                )
            })?;

        Ok(VolumeRequest {
            size_gb,
            availability_zone,
            name: entity.attribute_str(attrs::TITLE).map(str::to_string),
        })
    }
}

#[async_trait]
impl EntityAdapter for StorageAdapter {
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
        let volumes = self
            .shared
            .api
            .describe_volumes(&[])
            .await
            .map_err(|e| e.classify(BackendError::EntityRetrieval))?;

        let mut entities = Vec::new();
        for volume in &volumes {
            let entity = self.to_entity(volume)?;
            if entity.matches(filter) {
                entities.push(entity);
            }
        }
        Ok(entities)
    }

    async fn instance(&self, id: &Identifier, _cx: &RequestContext) -> Result<Entity> {
        let volumes = self
            .shared
            .api
            .describe_volumes(&[id.to_string()])
            .await
            .map_err(|e| e.classify_lookup(BackendError::EntityRetrieval))?;
        let volume = volumes
            .iter()
            .find(|v| v.id == id.as_str())
            .ok_or_else(|| BackendError::EntityNotFound(format!("volume {} does not exist", id)))?;
        self.to_entity(volume)
    }

    async fn create(&self, entity: &Entity, _cx: &RequestContext) -> Result<Identifier> {
        let request = self.request_for(entity)?;
        let id = self
            .shared
            .api
            .create_volume(&request)
            .await
            .map_err(|e| e.classify(BackendError::EntityCreate))?;

        tracing::info!(
            "Created volume {} ({} GB in {})",
            id,
            request.size_gb,
            request.availability_zone
        );
        Ok(Identifier::new(id))
    }

    async fn delete(&self, id: &Identifier, _cx: &RequestContext) -> Result<()> {
        self.shared
            .api
            .delete_volume(id.as_str())
            .await
            .map_err(|e| e.classify_lookup(BackendError::EntityAction))?;
        tracing::info!("Deleted volume {}", id);
        Ok(())
    }
}
