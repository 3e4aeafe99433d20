//! Entity adapters over the fixture store

use crate::store::{Collection, DummyStore};
use async_trait::async_trait;
use infragate_core::catalog::{actions, attrs, mixins};
use infragate_core::{
    ActionDispatch, ActionInstance, BackendError, Catalog, Entity, EntityAdapter, Identifier,
    IdentifierCodec, Kind, Mixin, MixinFilter, RequestContext, Result,
};
use serde_json::json;
use std::sync::Arc;

pub const BACKEND_NAME: &str = "dummy";

/// Attribute change performed by an action
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub struct StateChange {
    pub attribute: &'static str,
    pub state: &'static str,
}

const fn change(attribute: &'static str, state: &'static str) -> StateChange {
    StateChange { attribute, state }
}

fn dispatch_for(collection: Collection) -> ActionDispatch<StateChange> {
    match collection {
        Collection::Compute => ActionDispatch::new()
            .on(actions::COMPUTE_START, change(attrs::COMPUTE_STATE, "active"))
            .on(actions::COMPUTE_STOP, change(attrs::COMPUTE_STATE, "inactive"))
            .on(actions::COMPUTE_RESTART, change(attrs::COMPUTE_STATE, "active"))
            .on(actions::COMPUTE_SUSPEND, change(attrs::COMPUTE_STATE, "suspended")),
        Collection::Network => ActionDispatch::new()
            .on(actions::NETWORK_UP, change(attrs::NETWORK_STATE, "active"))
            .on(actions::NETWORK_DOWN, change(attrs::NETWORK_STATE, "inactive")),
        Collection::Storage => ActionDispatch::new()
            .on(actions::STORAGE_ONLINE, change(attrs::STORAGE_STATE, "online"))
            .on(actions::STORAGE_OFFLINE, change(attrs::STORAGE_STATE, "offline")),
    }
}

/// State a freshly created entity starts in
fn initial_state(collection: Collection) -> StateChange {
    match collection {
        Collection::Compute => change(attrs::COMPUTE_STATE, "active"),
        Collection::Network => change(attrs::NETWORK_STATE, "active"),
        Collection::Storage => change(attrs::STORAGE_STATE, "online"),
    }
}

/// One adapter per resource collection, all sharing the same store
pub struct DummyAdapter {
    kind: Kind,
    collection: Collection,
    store: DummyStore,
    catalog: Arc<Catalog>,
    codec: IdentifierCodec,
    dispatch: ActionDispatch<StateChange>,
}

impl DummyAdapter {
    pub fn new(collection: Collection, store: DummyStore, catalog: Arc<Catalog>) -> Result<Self> {
        let kind = catalog
            .kind(collection.kind())
            .cloned()
            .ok_or_else(|| {
                BackendError::Configuration(format!("catalog lacks kind {}", collection.kind()))
            })?;

        Ok(Self {
            kind,
            collection,
            store,
            catalog,
            codec: IdentifierCodec::simple(),
            dispatch: dispatch_for(collection),
        })
    }

    fn not_found(&self, id: &Identifier) -> BackendError {
        BackendError::EntityNotFound(format!("{} {} does not exist", self.kind.term, id))
    }

    /// Every attached mixin must be known; compute needs an OS template
    fn check_mixins(&self, entity: &Entity) -> Result<()> {
        if let Some(unknown) = entity
            .mixins
            .type_identifiers()
            .find(|id| self.catalog.mixin(id).is_none())
        {
            return Err(BackendError::ResourceNotValid(format!(
                "mixin {} is not offered by the dummy backend",
                unknown
            )));
        }

        if self.collection == Collection::Compute
            && !entity
                .mixins
                .related_to(mixins::OS_TPL)
                .any(|m| m.type_identifier() != mixins::OS_TPL)
        {
            return Err(BackendError::ResourceNotValid(
                "given instance does not contain an os_tpl mixin necessary to create a virtual machine"
                    .to_string(),
            ));
        }
        Ok(())
    }
}

#[async_trait]
impl EntityAdapter for DummyAdapter {
    fn kind(&self) -> &Kind {
        &self.kind
    }

    fn backend(&self) -> &str {
        BACKEND_NAME
    }

    async fn identifiers(
        &self,
        filter: &MixinFilter,
        _cx: &RequestContext,
    ) -> Result<Vec<Identifier>> {
        let fixtures = self.store.read().await;
        Ok(fixtures
            .collection(self.collection)
            .iter()
            .filter(|e| e.matches(filter))
            .filter_map(|e| e.id.clone())
            .collect())
    }

    async fn list(&self, filter: &MixinFilter, _cx: &RequestContext) -> Result<Vec<Entity>> {
        let fixtures = self.store.read().await;
        Ok(fixtures
            .collection(self.collection)
            .iter()
            .filter(|e| e.matches(filter))
            .cloned()
            .collect())
    }

    async fn instance(&self, id: &Identifier, _cx: &RequestContext) -> Result<Entity> {
        let fixtures = self.store.read().await;
        fixtures
            .find(self.collection, id)
            .cloned()
            .ok_or_else(|| self.not_found(id))
    }

    async fn create(&self, entity: &Entity, _cx: &RequestContext) -> Result<Identifier> {
        self.check_mixins(entity)?;

        let mut fixtures = self.store.write().await;

        // keep a usable client-suggested id, otherwise generate one
        let suggested = entity
            .id
            .as_ref()
            .filter(|id| self.codec.decode(id.as_str()).is_ok())
            .filter(|id| fixtures.find(self.collection, id).is_none());
        let id = match suggested {
            Some(id) => id.clone(),
            None => Identifier::new(uuid::Uuid::new_v4().to_string()),
        };

        let mut created = entity.clone().with_id(id.clone());
        created.set_attribute(attrs::ID, json!(id.as_str()));
        let initial = initial_state(self.collection);
        if created.attribute(initial.attribute).is_none() {
            created.set_attribute(initial.attribute, json!(initial.state));
        }

        fixtures.collection_mut(self.collection).push(created);
        tracing::info!("Created {} {}", self.kind.term, id);
        Ok(id)
    }

    async fn delete(&self, id: &Identifier, _cx: &RequestContext) -> Result<()> {
        let mut fixtures = self.store.write().await;
        let entities = fixtures.collection_mut(self.collection);
        let before = entities.len();
        entities.retain(|e| e.id.as_ref() != Some(id));

        if entities.len() == before {
            return Err(self.not_found(id));
        }
        tracing::info!("Deleted {} {}", self.kind.term, id);
        Ok(())
    }

    async fn delete_all(&self, filter: &MixinFilter, _cx: &RequestContext) -> Result<()> {
        let mut fixtures = self.store.write().await;
        let entities = fixtures.collection_mut(self.collection);
        let before = entities.len();
        entities.retain(|e| !e.matches(filter));
        tracing::info!("Deleted {} {} instance(s)", before - entities.len(), self.kind.term);
        Ok(())
    }

    async fn partial_update(
        &self,
        id: &Identifier,
        mixins: &[Mixin],
        _cx: &RequestContext,
    ) -> Result<Entity> {
        for mixin in mixins {
            if self.catalog.mixin(&mixin.type_identifier()).is_none() {
                return Err(BackendError::ResourceNotValid(format!(
                    "mixin {} is not offered by the dummy backend",
                    mixin.type_identifier()
                )));
            }
        }

        let mut fixtures = self.store.write().await;
        let entity = fixtures
            .find_mut(self.collection, id)
            .ok_or_else(|| self.not_found(id))?;
        for mixin in mixins {
            entity.attach(mixin.clone());
        }
        Ok(entity.clone())
    }

    fn supported_actions(&self) -> Vec<String> {
        self.dispatch.actions()
    }

    async fn trigger(
        &self,
        id: &Identifier,
        action: &ActionInstance,
        _cx: &RequestContext,
    ) -> Result<()> {
        let change = self.dispatch.resolve(action)?;

        let mut fixtures = self.store.write().await;
        let entity = fixtures
            .find_mut(self.collection, id)
            .ok_or_else(|| self.not_found(id))?;
        entity.set_attribute(change.attribute, json!(change.state));

        tracing::info!("{} {} is now {}", self.kind.term, id, change.state);
        Ok(())
    }
}
