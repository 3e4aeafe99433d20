//! Test double backend for infragate
//!
//! Serves compute, network and storage from an in-memory fixture store,
//! optionally seeded from JSON files. OS and resource templates found in the
//! fixtures are registered in the catalog at startup.
//!
//! # Example
//!
//! ```ignore
//! use infragate_dummy::DummyBackend;
//!
//! let backend = DummyBackend::load(Some("fixtures".as_ref())).await?;
//! let proxy = backend.proxy().await?;
//! let ids = proxy.identifiers("compute", &MixinFilter::new(), &cx).await?;
//! ```

pub mod adapter;
pub mod store;

pub use adapter::{BACKEND_NAME, DummyAdapter, StateChange};
pub use store::{Collection, DummyStore, FIXTURES, Fixtures};

use infragate_core::{BackendProxy, BackendProxyBuilder, Catalog, Result};
use std::path::Path;
use std::sync::Arc;

/// Entry point wiring the fixture store into a proxy
#[derive(Debug, Clone, Default)]
pub struct DummyBackend {
    store: DummyStore,
}

impl DummyBackend {
    pub fn new(store: DummyStore) -> Self {
        Self { store }
    }

    /// Loads fixtures from `dir`; no directory means an empty store
    pub async fn load(dir: Option<&Path>) -> Result<Self> {
        let store = match dir {
            Some(dir) => DummyStore::load(dir).await?,
            None => DummyStore::empty(),
        };
        Ok(Self::new(store))
    }

    pub fn store(&self) -> &DummyStore {
        &self.store
    }

    /// Adds the fixture templates to the catalog
    pub async fn extend_catalog(&self, catalog: &mut Catalog) -> Result<()> {
        let fixtures = self.store.read().await;
        for template in fixtures.templates() {
            catalog.add_mixin(template.clone())?;
        }
        Ok(())
    }

    /// Installs one adapter per served kind
    pub fn register(
        &self,
        builder: BackendProxyBuilder,
        catalog: &Arc<Catalog>,
    ) -> Result<BackendProxyBuilder> {
        let mut builder = builder;
        for collection in [Collection::Compute, Collection::Network, Collection::Storage] {
            let adapter = DummyAdapter::new(collection, self.store.clone(), catalog.clone())?;
            builder = builder.register(Arc::new(adapter))?;
        }
        Ok(builder)
    }

    /// Builds a proxy over the standard catalog extended with the fixture templates
    pub async fn proxy(&self) -> Result<BackendProxy> {
        let mut catalog = Catalog::infrastructure();
        self.extend_catalog(&mut catalog).await?;
        let catalog = Arc::new(catalog);

        let builder = BackendProxy::builder(BACKEND_NAME, catalog.clone());
        Ok(self.register(builder, &catalog)?.build())
    }
}
