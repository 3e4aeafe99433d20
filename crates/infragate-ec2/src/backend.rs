//! Backend assembly and the state shared by all EC2 adapters

use crate::api::Ec2Api;
use crate::compute::ComputeAdapter;
use crate::network::NetworkAdapter;
use crate::storage::StorageAdapter;
use infragate_core::catalog::{
    attrs, availability_zone_mixin, os_tpl_mixin, region_mixin, resource_tpl_mixin,
};
use infragate_core::{
    BackendError, BackendProxy, BackendProxyBuilder, Catalog, EntityAdapter, Kind, Result,
    WaitConfig,
};
use serde_json::json;
use std::sync::Arc;

pub const BACKEND_NAME: &str = "ec2";

pub const DEFAULT_INSTANCE_TYPE: &str = "t2.micro";

/// Known instance type sizes: (type, cores, memory in GB)
pub const INSTANCE_SIZES: &[(&str, i64, f64)] = &[
    ("t2.nano", 1, 0.5),
    ("t2.micro", 1, 1.0),
    ("t2.small", 1, 2.0),
    ("t2.medium", 2, 4.0),
    ("t2.large", 2, 8.0),
    ("t3.micro", 2, 1.0),
    ("t3.small", 2, 2.0),
    ("t3.medium", 2, 4.0),
    ("m5.large", 2, 8.0),
    ("m5.xlarge", 4, 16.0),
    ("c5.large", 2, 4.0),
];

pub fn instance_size(instance_type: &str) -> Option<(i64, f64)> {
    INSTANCE_SIZES
        .iter()
        .find(|(name, _, _)| *name == instance_type)
        .map(|(_, cores, memory)| (*cores, *memory))
}

#[derive(Debug, Clone)]
pub struct Ec2Settings {
    pub region: String,

    /// Zone for new instances, subnets and volumes
    pub availability_zone: Option<String>,

    /// Creating VPCs is opt-in
    pub network_create_allowed: bool,

    /// AMI owners offered as OS templates
    pub image_owners: Vec<String>,

    /// Instance types offered as resource templates
    pub instance_types: Vec<String>,

    pub wait: WaitConfig,
}

impl Default for Ec2Settings {
    fn default() -> Self {
        Self {
            region: "us-east-1".to_string(),
            availability_zone: None,
            network_create_allowed: false,
            image_owners: vec!["self".to_string()],
            instance_types: ["t2.micro", "t2.small", "t2.medium", "m5.large"]
                .into_iter()
                .map(String::from)
                .collect(),
            wait: WaitConfig::default(),
        }
    }
}

/// Handles every adapter of this backend holds
#[derive(Clone)]
pub struct Shared {
    pub api: Arc<dyn Ec2Api>,
    pub catalog: Arc<Catalog>,
    pub settings: Ec2Settings,
}

impl Shared {
    pub fn kind(&self, type_id: &str) -> Result<Kind> {
        self.catalog
            .kind(type_id)
            .cloned()
            .ok_or_else(|| BackendError::Configuration(format!("catalog lacks kind {}", type_id)))
    }
}

/// Entry point wiring an EC2 client into a proxy
pub struct Ec2Backend {
    api: Arc<dyn Ec2Api>,
    settings: Ec2Settings,
}

impl Ec2Backend {
    pub fn new(api: Arc<dyn Ec2Api>, settings: Ec2Settings) -> Self {
        Self { api, settings }
    }

    /// Registers images, instance types, the region and the configured zone
    pub async fn extend_catalog(&self, catalog: &mut Catalog) -> Result<()> {
        let images = self
            .api
            .describe_images(&self.settings.image_owners)
            .await
            .map_err(|e| e.classify(BackendError::EntityRetrieval))?;
        for image in &images {
            let title = image.name.as_deref().unwrap_or(&image.id);
            catalog.add_mixin(os_tpl_mixin(&image.id, title))?;
        }

        for instance_type in &self.settings.instance_types {
            let mut mixin = resource_tpl_mixin(instance_type, instance_type);
            if let Some((cores, memory)) = instance_size(instance_type) {
                mixin = mixin
                    .with_default(attrs::COMPUTE_CORES, json!(cores))
                    .with_default(attrs::COMPUTE_MEMORY, json!(memory));
            }
            catalog.add_mixin(mixin)?;
        }

        catalog.add_mixin(region_mixin(&self.settings.region))?;
        if let Some(zone) = &self.settings.availability_zone {
            catalog.add_mixin(availability_zone_mixin(zone))?;
        }

        tracing::info!(
            "Registered {} images and {} instance types",
            images.len(),
            self.settings.instance_types.len()
        );
        Ok(())
    }

    pub fn register(
        &self,
        builder: BackendProxyBuilder,
        catalog: &Arc<Catalog>,
    ) -> Result<BackendProxyBuilder> {
        let shared = Shared {
            api: self.api.clone(),
            catalog: catalog.clone(),
            settings: self.settings.clone(),
        };

        let adapters: Vec<Arc<dyn EntityAdapter>> = vec![
            Arc::new(ComputeAdapter::new(shared.clone())?),
            Arc::new(NetworkAdapter::new(shared.clone())?),
            Arc::new(StorageAdapter::new(shared)?),
        ];

        let mut builder = builder;
        for adapter in adapters {
            builder = builder.register(adapter)?;
        }
        Ok(builder)
    }

    pub async fn proxy(&self) -> Result<BackendProxy> {
        let mut catalog = Catalog::infrastructure();
        self.extend_catalog(&mut catalog).await?;
        let catalog = Arc::new(catalog);

        let builder = BackendProxy::builder(BACKEND_NAME, catalog.clone());
        Ok(self.register(builder, &catalog)?.build())
    }
}
