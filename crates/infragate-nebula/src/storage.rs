//! Storage adapter over OpenNebula images

use crate::backend::{BACKEND_NAME, Shared, native_id};
use crate::cli::ImageRequest;
use crate::record::ImageRecord;
use async_trait::async_trait;
use infragate_core::catalog::{attrs, kinds, region_id};
use infragate_core::transfer::{non_empty, number};
use infragate_core::{
    AttachPolicy, BackendError, Entity, EntityAdapter, Identifier, Kind, MixinFilter,
    RequestContext, Result, TransferTable,
};
use serde_json::json;

fn storage_transfer() -> TransferTable<ImageRecord> {
    TransferTable::new()
        .attr(attrs::ID, |image: &ImageRecord| non_empty(image.0.get("ID")))
        .attr(attrs::TITLE, |image: &ImageRecord| non_empty(image.0.get("NAME")))
        .attr(attrs::SUMMARY, |image: &ImageRecord| {
            non_empty(image.0.get("TEMPLATE")?.get("DESCRIPTION"))
        })
        .attr(attrs::STORAGE_SIZE, |image: &ImageRecord| {
            number(image.0.get("SIZE"))
                .and_then(|mb| mb.as_f64())
                .map(|mb| json!(mb / 1024.0))
        })
        .attr(attrs::STORAGE_STATE, |image: &ImageRecord| Some(json!(image.occi_state())))
}

pub struct StorageAdapter {
    kind: Kind,
    shared: Shared,
    transfer: TransferTable<ImageRecord>,
    mixins: AttachPolicy<ImageRecord>,
}

impl StorageAdapter {
    pub fn new(shared: Shared) -> Result<Self> {
        Ok(Self {
            kind: shared.kind(kinds::STORAGE)?,
            mixins: AttachPolicy::new().always("region", region_id(&shared.settings.region)),
            shared,
            transfer: storage_transfer(),
        })
    }

    fn to_entity(&self, image: &ImageRecord) -> Result<Entity> {
        let mut entity =
            Entity::new(self.kind.type_identifier()).with_id(Identifier::new(image.id()));
        self.transfer.apply(image, &mut entity);
        self.mixins.attach(&self.shared.catalog, image, &mut entity)?;
        Ok(entity)
    }

    fn request_for(&self, entity: &Entity) -> Result<ImageRequest> {
        let size_gb = entity
            .attribute_f64(attrs::STORAGE_SIZE)
            .filter(|size| *size > 0.0)
            .ok_or_else(|| {
                BackendError::ResourceNotValid(format!(
                    "{} must be a positive size in GB",
                    attrs::STORAGE_SIZE
                ))
            })?;

        Ok(ImageRequest {
            name: entity
                .attribute_str(attrs::TITLE)
                .unwrap_or("infragate-storage")
                .to_string(),
            size_mb: (size_gb * 1024.0).ceil() as u64,
            datastore: self.shared.settings.datastore.clone(),
            description: entity.attribute_str(attrs::SUMMARY).map(str::to_string),
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
        let images = self
            .shared
            .api
            .image_list()
            .await
            .map_err(|e| e.classify(BackendError::EntityRetrieval))?;

        let mut entities = Vec::new();
        for image in &images {
            let entity = self.to_entity(image)?;
            if entity.matches(filter) {
                entities.push(entity);
            }
        }
        Ok(entities)
    }

    async fn instance(&self, id: &Identifier, _cx: &RequestContext) -> Result<Entity> {
        let image = self
            .shared
            .api
            .image_show(native_id(id)?)
            .await
            .map_err(|e| e.classify(BackendError::EntityRetrieval))?;
        self.to_entity(&image)
    }

    async fn create(&self, entity: &Entity, _cx: &RequestContext) -> Result<Identifier> {
        let request = self.request_for(entity)?;
        let id = self
            .shared
            .api
            .image_create(&request)
            .await
            .map_err(|e| e.classify(BackendError::EntityCreate))?;

        tracing::info!(
            "Created image {} ({} MB) in datastore {}",
            id,
            request.size_mb,
            request.datastore
        );
        Ok(Identifier::new(id))
    }

    async fn delete(&self, id: &Identifier, _cx: &RequestContext) -> Result<()> {
        let image_id = native_id(id)?;
        self.shared
            .api
            .image_delete(image_id)
            .await
            .map_err(|e| e.classify(BackendError::EntityAction))?;
        tracing::info!("Deleted image {}", image_id);
        Ok(())
    }
}
