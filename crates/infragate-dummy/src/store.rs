//! Fixture store for the test double
//!
//! Fixtures are read once from `<fixtures_dir>/{compute,network,storage,
//! os_tpl,resource_tpl}.json`. A missing file yields an empty collection.
//! Every adapter of the backend shares one `DummyStore` handle.

use infragate_core::catalog::{kinds, mixins};
use infragate_core::{BackendError, Entity, Identifier, Mixin, Result};
use serde::Deserialize;
use serde::de::DeserializeOwned;
use std::path::{Path, PathBuf};
use std::sync::Arc;
use tokio::fs;
use tokio::sync::{RwLock, RwLockReadGuard, RwLockWriteGuard};

/// Fixture file names, without the `.json` suffix
pub const FIXTURES: [&str; 5] = ["compute", "network", "storage", "os_tpl", "resource_tpl"];

/// Resource collections served by the test double
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum Collection {
    Compute,
    Network,
    Storage,
}

impl Collection {
    pub fn kind(&self) -> &'static str {
        match self {
            Collection::Compute => kinds::COMPUTE,
            Collection::Network => kinds::NETWORK,
            Collection::Storage => kinds::STORAGE,
        }
    }

    pub fn file_name(&self) -> &'static str {
        match self {
            Collection::Compute => "compute",
            Collection::Network => "network",
            Collection::Storage => "storage",
        }
    }
}

/// Everything the test double knows about
#[derive(Debug, Clone, Default)]
pub struct Fixtures {
    pub compute: Vec<Entity>,
    pub network: Vec<Entity>,
    pub storage: Vec<Entity>,
    pub os_tpl: Vec<Mixin>,
    pub resource_tpl: Vec<Mixin>,
}

impl Fixtures {
    pub fn collection(&self, collection: Collection) -> &Vec<Entity> {
        match collection {
            Collection::Compute => &self.compute,
            Collection::Network => &self.network,
            Collection::Storage => &self.storage,
        }
    }

    pub fn collection_mut(&mut self, collection: Collection) -> &mut Vec<Entity> {
        match collection {
            Collection::Compute => &mut self.compute,
            Collection::Network => &mut self.network,
            Collection::Storage => &mut self.storage,
        }
    }

    pub fn find(&self, collection: Collection, id: &Identifier) -> Option<&Entity> {
        self.collection(collection)
            .iter()
            .find(|e| e.id.as_ref() == Some(id))
    }

    pub fn find_mut(&mut self, collection: Collection, id: &Identifier) -> Option<&mut Entity> {
        self.collection_mut(collection)
            .iter_mut()
            .find(|e| e.id.as_ref() == Some(id))
    }

    /// Template mixins, OS templates first
    pub fn templates(&self) -> impl Iterator<Item = &Mixin> {
        self.os_tpl.iter().chain(self.resource_tpl.iter())
    }
}

/// A fixture file is either a bare list or a `{"resources": [...]}` /
/// `{"mixins": [...]}` collection document
#[derive(Deserialize)]
#[serde(untagged)]
enum FixtureFile<T> {
    List(Vec<T>),
    Resources { resources: Vec<T> },
    Mixins { mixins: Vec<T> },
}

impl<T> FixtureFile<T> {
    fn into_items(self) -> Vec<T> {
        match self {
            FixtureFile::List(items)
            | FixtureFile::Resources { resources: items }
            | FixtureFile::Mixins { mixins: items } => items,
        }
    }
}

/// Shared, lock-guarded handle to the fixtures
#[derive(Debug, Clone, Default)]
pub struct DummyStore {
    fixtures: Arc<RwLock<Fixtures>>,
}

impl DummyStore {
    pub fn empty() -> Self {
        Self::default()
    }

    pub fn with_fixtures(fixtures: Fixtures) -> Self {
        Self {
            fixtures: Arc::new(RwLock::new(fixtures)),
        }
    }

    /// Loads every fixture file found in `dir`
    pub async fn load(dir: impl AsRef<Path>) -> Result<Self> {
        let dir = dir.as_ref();
        tracing::debug!("Reading fixtures from {}", dir.display());

        let mut fixtures = Fixtures {
            compute: read_fixture(dir, "compute").await?,
            network: read_fixture(dir, "network").await?,
            storage: read_fixture(dir, "storage").await?,
            os_tpl: read_fixture(dir, "os_tpl").await?,
            resource_tpl: read_fixture(dir, "resource_tpl").await?,
        };

        for collection in [Collection::Compute, Collection::Network, Collection::Storage] {
            normalize(collection, fixtures.collection_mut(collection))?;
        }
        check_templates(&fixtures.os_tpl, mixins::OS_TPL)?;
        check_templates(&fixtures.resource_tpl, mixins::RESOURCE_TPL)?;

        tracing::info!(
            "Loaded fixtures: {} compute, {} network, {} storage, {} os_tpl, {} resource_tpl",
            fixtures.compute.len(),
            fixtures.network.len(),
            fixtures.storage.len(),
            fixtures.os_tpl.len(),
            fixtures.resource_tpl.len()
        );
        Ok(Self::with_fixtures(fixtures))
    }

    pub async fn read(&self) -> RwLockReadGuard<'_, Fixtures> {
        self.fixtures.read().await
    }

    pub async fn write(&self) -> RwLockWriteGuard<'_, Fixtures> {
        self.fixtures.write().await
    }

    /// Drops every resource collection. Templates stay registered.
    pub async fn reset(&self) {
        let mut fixtures = self.fixtures.write().await;
        fixtures.compute.clear();
        fixtures.network.clear();
        fixtures.storage.clear();
        tracing::debug!("Dropped resource fixtures");
    }
}

fn fixture_path(dir: &Path, name: &str) -> PathBuf {
    dir.join(format!("{}.json", name))
}

async fn read_fixture<T: DeserializeOwned>(dir: &Path, name: &str) -> Result<Vec<T>> {
    let path = fixture_path(dir, name);
    if !path.exists() {
        tracing::debug!("No {} fixtures at {}", name, path.display());
        return Ok(Vec::new());
    }

    let content = fs::read_to_string(&path).await?;
    let file: FixtureFile<T> = serde_json::from_str(&content)?;
    Ok(file.into_items())
}

/// Checks kinds and fills in missing identifiers
fn normalize(collection: Collection, entities: &mut [Entity]) -> Result<()> {
    for entity in entities.iter_mut() {
        if entity.kind != collection.kind() {
            return Err(BackendError::Configuration(format!(
                "{}.json contains an entity of kind {}",
                collection.file_name(),
                entity.kind
            )));
        }
        if entity.id.is_none() {
            entity.id = Some(Identifier::new(uuid::Uuid::new_v4().to_string()));
        }
        let id = entity.id_str().to_string();
        entity.set_attribute(infragate_core::catalog::attrs::ID, serde_json::json!(id));
    }
    Ok(())
}

fn check_templates(templates: &[Mixin], base: &str) -> Result<()> {
    match templates.iter().find(|m| !m.depends.iter().any(|d| d == base)) {
        Some(orphan) => Err(BackendError::Configuration(format!(
            "template {} does not depend on {}",
            orphan.type_identifier(),
            base
        ))),
        None => Ok(()),
    }
}
