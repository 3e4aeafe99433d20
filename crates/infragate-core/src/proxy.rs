//! Backend proxy: the single entry point for the transport layer
//!
//! Resolves a kind name to the adapter serving it and forwards the call.
//! The only logic here is request validation that must happen before any
//! backend is contacted.

use crate::adapter::EntityAdapter;
use crate::catalog::Catalog;
use crate::context::RequestContext;
use crate::error::{BackendError, Result};
use crate::ident::Identifier;
use crate::model::{ActionInstance, Entity, Kind, Mixin, MixinFilter};
use crate::registry::KindRegistry;
use std::collections::HashMap;
use std::sync::Arc;

/// Collects one adapter per kind before the proxy is frozen
pub struct BackendProxyBuilder {
    registry: KindRegistry,
    backend: String,
    adapters: HashMap<String, Arc<dyn EntityAdapter>>,
}

impl BackendProxyBuilder {
    /// Registers an adapter for the kind it reports.
    ///
    /// Fails when the kind is unknown or already served.
    pub fn register(mut self, adapter: Arc<dyn EntityAdapter>) -> Result<Self> {
        let type_id = adapter.kind().type_identifier();
        if self.registry.catalog().kind(&type_id).is_none() {
            return Err(BackendError::Configuration(format!(
                "adapter for unknown kind {}",
                type_id
            )));
        }
        if self.adapters.contains_key(&type_id) {
            return Err(BackendError::Configuration(format!(
                "kind {} is already served",
                type_id
            )));
        }

        tracing::debug!("Registered {} adapter for {}", adapter.backend(), type_id);
        self.adapters.insert(type_id, adapter);
        Ok(self)
    }

    pub fn build(self) -> BackendProxy {
        BackendProxy {
            registry: self.registry,
            backend: self.backend,
            adapters: self.adapters,
        }
    }
}

/// Forwards requests to the adapter responsible for each kind
pub struct BackendProxy {
    registry: KindRegistry,
    backend: String,
    adapters: HashMap<String, Arc<dyn EntityAdapter>>,
}

impl BackendProxy {
    pub fn builder(backend: impl Into<String>, catalog: Arc<Catalog>) -> BackendProxyBuilder {
        BackendProxyBuilder {
            registry: KindRegistry::new(catalog),
            backend: backend.into(),
            adapters: HashMap::new(),
        }
    }

    pub fn backend(&self) -> &str {
        &self.backend
    }

    pub fn registry(&self) -> &KindRegistry {
        &self.registry
    }

    pub fn catalog(&self) -> &Catalog {
        self.registry.catalog()
    }

    /// Kinds with a registered adapter
    pub fn served_kinds(&self) -> Vec<&Kind> {
        self.registry
            .catalog()
            .kinds()
            .filter(|k| self.adapters.contains_key(&k.type_identifier()))
            .collect()
    }

    pub fn serves(&self, kind: &str) -> bool {
        self.adapter_for(kind).is_ok()
    }

    /// Resolves the adapter for a kind term or type identifier
    pub fn adapter_for(&self, kind: &str) -> Result<&Arc<dyn EntityAdapter>> {
        let kind = self.registry.resolve(kind)?;
        let type_id = kind.type_identifier();
        self.adapters.get(&type_id).ok_or_else(|| {
            BackendError::MethodNotImplemented(format!(
                "kind {} is not served by the {} backend",
                kind.term, self.backend
            ))
        })
    }

    pub async fn identifiers(
        &self,
        kind: &str,
        filter: &MixinFilter,
        cx: &RequestContext,
    ) -> Result<Vec<Identifier>> {
        tracing::debug!("[{}] identifiers of {}", cx.label, kind);
        self.adapter_for(kind)?.identifiers(filter, cx).await
    }

    pub async fn list(
        &self,
        kind: &str,
        filter: &MixinFilter,
        cx: &RequestContext,
    ) -> Result<Vec<Entity>> {
        tracing::debug!("[{}] list {}", cx.label, kind);
        self.adapter_for(kind)?.list(filter, cx).await
    }

    pub async fn instance(
        &self,
        kind: &str,
        id: &Identifier,
        cx: &RequestContext,
    ) -> Result<Entity> {
        tracing::debug!("[{}] instance {}/{}", cx.label, kind, id);
        self.adapter_for(kind)?.instance(id, cx).await
    }

    pub async fn exists(&self, kind: &str, id: &Identifier, cx: &RequestContext) -> Result<bool> {
        self.adapter_for(kind)?.exists(id, cx).await
    }

    pub async fn create(
        &self,
        kind: &str,
        entity: &Entity,
        cx: &RequestContext,
    ) -> Result<Identifier> {
        let adapter = self.adapter_for(kind)?;
        let served = adapter.kind();
        if entity.kind != served.type_identifier() {
            return Err(BackendError::ResourceNotValid(format!(
                "entity of kind {} is not supported in the {} collection",
                entity.kind, served.term
            )));
        }
        if served.is_link() && entity.link.is_none() {
            return Err(BackendError::ResourceNotValid(format!(
                "{} requires a source and a target",
                served.term
            )));
        }

        tracing::info!("[{}] create {}", cx.label, served.term);
        adapter.create(entity, cx).await
    }

    pub async fn delete(&self, kind: &str, id: &Identifier, cx: &RequestContext) -> Result<()> {
        tracing::info!("[{}] delete {}/{}", cx.label, kind, id);
        self.adapter_for(kind)?.delete(id, cx).await
    }

    pub async fn delete_all(
        &self,
        kind: &str,
        filter: &MixinFilter,
        cx: &RequestContext,
    ) -> Result<()> {
        tracing::info!("[{}] delete all {}", cx.label, kind);
        self.adapter_for(kind)?.delete_all(filter, cx).await
    }

    pub async fn update(&self, kind: &str, entity: &Entity, cx: &RequestContext) -> Result<Entity> {
        self.adapter_for(kind)?.update(entity, cx).await
    }

    pub async fn partial_update(
        &self,
        kind: &str,
        id: &Identifier,
        mixins: &[Mixin],
        cx: &RequestContext,
    ) -> Result<Entity> {
        let adapter = self.adapter_for(kind)?;
        if mixins.is_empty() {
            return Err(BackendError::ResourceNotValid(
                "no mixins given for updating the instance".to_string(),
            ));
        }
        tracing::info!("[{}] partial update {}/{}", cx.label, kind, id);
        adapter.partial_update(id, mixins, cx).await
    }

    pub async fn trigger(
        &self,
        kind: &str,
        id: &Identifier,
        action: &ActionInstance,
        cx: &RequestContext,
    ) -> Result<()> {
        tracing::info!("[{}] trigger {} on {}/{}", cx.label, action.term(), kind, id);
        self.adapter_for(kind)?.trigger(id, action, cx).await
    }

    pub async fn trigger_all(
        &self,
        kind: &str,
        filter: &MixinFilter,
        action: &ActionInstance,
        cx: &RequestContext,
    ) -> Result<()> {
        tracing::info!("[{}] trigger {} on all {}", cx.label, action.term(), kind);
        self.adapter_for(kind)?.trigger_all(filter, action, cx).await
    }
}
