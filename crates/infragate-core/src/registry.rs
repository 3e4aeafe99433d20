//! Kind classification
//!
//! Requested type names are checked here before any backend is touched.
//! A name is either a kind term (`compute`) or a full type identifier.

use crate::catalog::Catalog;
use crate::error::{BackendError, Result};
use crate::model::{Kind, Location};
use std::sync::Arc;

#[derive(Debug, Clone)]
pub struct KindRegistry {
    catalog: Arc<Catalog>,
}

impl KindRegistry {
    pub fn new(catalog: Arc<Catalog>) -> Self {
        Self { catalog }
    }

    pub fn catalog(&self) -> &Catalog {
        &self.catalog
    }

    /// Looks a kind up by type identifier or by term
    pub fn find(&self, name: &str) -> Option<&Kind> {
        self.catalog
            .kind(name)
            .or_else(|| self.catalog.kind_by_term(name))
    }

    pub fn resolve(&self, name: &str) -> Result<&Kind> {
        self.find(name)
            .ok_or_else(|| BackendError::KindNotFound(format!("{:?} is not a known kind", name)))
    }

    pub fn is_entity_kind(&self, name: &str) -> bool {
        self.find(name).is_some()
    }

    pub fn is_resource_kind(&self, name: &str) -> bool {
        self.find(name)
            .is_some_and(|k| k.location == Location::Resource)
    }

    pub fn is_link_kind(&self, name: &str) -> bool {
        self.find(name).is_some_and(|k| k.location == Location::Link)
    }
}
