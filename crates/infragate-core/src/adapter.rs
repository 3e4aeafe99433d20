//! Backend adapter contract
//!
//! Every backend (virtualization manager, public cloud, test double)
//! implements `EntityAdapter` once per kind it serves. The proxy holds the
//! adapters as trait objects and forwards requests to them.

use crate::context::RequestContext;
use crate::error::{BackendError, Result};
use crate::ident::Identifier;
use crate::model::{ActionInstance, Entity, Kind, Mixin, MixinFilter};
use async_trait::async_trait;
use std::collections::BTreeMap;

/// Uniform CRUD + action contract for one kind on one backend
#[async_trait]
pub trait EntityAdapter: Send + Sync {
    /// The kind served by this adapter
    fn kind(&self) -> &Kind;

    /// Returns the backend name (e.g., "dummy", "opennebula", "ec2")
    fn backend(&self) -> &str;

    /// Lists identifiers without materializing entities
    async fn identifiers(&self, filter: &MixinFilter, cx: &RequestContext)
    -> Result<Vec<Identifier>>;

    /// Materializes every matching entity
    async fn list(&self, filter: &MixinFilter, cx: &RequestContext) -> Result<Vec<Entity>>;

    /// Fails with `EntityNotFound` when the identifier does not resolve
    async fn instance(&self, id: &Identifier, cx: &RequestContext) -> Result<Entity>;

    async fn exists(&self, id: &Identifier, cx: &RequestContext) -> Result<bool> {
        match self.instance(id, cx).await {
            Ok(_) => Ok(true),
            Err(BackendError::EntityNotFound(_)) | Err(BackendError::IdentifierNotValid(_)) => {
                Ok(false)
            }
            Err(e) => Err(e),
        }
    }

    /// Creates the backend object and returns its final identifier
    async fn create(&self, entity: &Entity, cx: &RequestContext) -> Result<Identifier>;

    async fn delete(&self, id: &Identifier, cx: &RequestContext) -> Result<()>;

    /// Deletes every matching entity
    async fn delete_all(&self, filter: &MixinFilter, cx: &RequestContext) -> Result<()> {
        for id in self.identifiers(filter, cx).await? {
            self.delete(&id, cx).await?;
        }
        Ok(())
    }

    /// Full replacement update
    async fn update(&self, entity: &Entity, _cx: &RequestContext) -> Result<Entity> {
        Err(BackendError::MethodNotImplemented(format!(
            "{} does not support full updates of {}",
            self.backend(),
            entity.kind
        )))
    }

    /// Attaches capability mixins to an existing entity
    async fn partial_update(
        &self,
        id: &Identifier,
        _mixins: &[Mixin],
        _cx: &RequestContext,
    ) -> Result<Entity> {
        Err(BackendError::MethodNotImplemented(format!(
            "{} does not support partial updates of {}",
            self.backend(),
            id
        )))
    }

    /// Type identifiers of the actions this adapter can dispatch
    fn supported_actions(&self) -> Vec<String> {
        Vec::new()
    }

    async fn trigger(
        &self,
        id: &Identifier,
        action: &ActionInstance,
        _cx: &RequestContext,
    ) -> Result<()> {
        Err(BackendError::ActionNotImplemented(format!(
            "action {} is not implemented for {}",
            action.action, id
        )))
    }

    /// Triggers the action on every matching entity
    async fn trigger_all(
        &self,
        filter: &MixinFilter,
        action: &ActionInstance,
        cx: &RequestContext,
    ) -> Result<()> {
        for id in self.identifiers(filter, cx).await? {
            self.trigger(&id, action, cx).await?;
        }
        Ok(())
    }
}

/// Closed mapping from action type identifier to a handler variant.
///
/// Lookups of identifiers outside the table fail with `ActionNotImplemented`.
#[derive(Debug, Clone)]
pub struct ActionDispatch<A> {
    handlers: BTreeMap<String, A>,
}

impl<A: Copy> ActionDispatch<A> {
    pub fn new() -> Self {
        Self {
            handlers: BTreeMap::new(),
        }
    }

    pub fn on(mut self, action: &str, handler: A) -> Self {
        self.handlers.insert(action.to_string(), handler);
        self
    }

    pub fn resolve(&self, action: &ActionInstance) -> Result<A> {
        self.handlers.get(&action.action).copied().ok_or_else(|| {
            BackendError::ActionNotImplemented(format!(
                "action {:?} is not implemented",
                action.action
            ))
        })
    }

    pub fn actions(&self) -> Vec<String> {
        self.handlers.keys().cloned().collect()
    }
}

impl<A: Copy> Default for ActionDispatch<A> {
    fn default() -> Self {
        Self::new()
    }
}
