//! Backend assembly and the state shared by all OpenNebula adapters

use crate::cli::NebulaApi;
use crate::compute::ComputeAdapter;
use crate::disk::StoragelinkAdapter;
use crate::network::NetworkAdapter;
use crate::nic::NetworkinterfaceAdapter;
use crate::record::VmRecord;
use crate::storage::StorageAdapter;
use infragate_core::catalog::{
    attrs, availability_zone_mixin, os_tpl_mixin, region_mixin, resource_tpl_mixin,
};
use infragate_core::{
    BackendError, BackendProxy, BackendProxyBuilder, Catalog, EntityAdapter, Identifier, Kind,
    RequestContext, Result, TerminalState, WaitConfig, Waiter,
};
use serde_json::json;
use std::sync::Arc;

pub const BACKEND_NAME: &str = "opennebula";

/// Prefix of OS template terms; the rest is the ONe template ID
pub const TEMPLATE_TERM_PREFIX: &str = "template-";

/// Fixed resource templates: (term, title, cores, memory in GB)
pub const RESOURCE_TEMPLATES: [(&str, &str, i64, f64); 3] = [
    ("small", "Small instance", 1, 1.0),
    ("medium", "Medium instance", 2, 4.0),
    ("large", "Large instance", 4, 8.0),
];

pub fn template_term(template_id: &str) -> String {
    format!("{}{}", TEMPLATE_TERM_PREFIX, template_id)
}

/// Settings taken from the gateway configuration
#[derive(Debug, Clone)]
pub struct NebulaSettings {
    /// Region reported on every entity
    pub region: String,

    /// Datastore for new images
    pub datastore: String,

    pub wait: WaitConfig,
}

impl Default for NebulaSettings {
    fn default() -> Self {
        Self {
            region: "default".to_string(),
            datastore: "default".to_string(),
            wait: WaitConfig::default(),
        }
    }
}

/// Handles every adapter of this backend holds
#[derive(Clone)]
pub struct Shared {
    pub api: Arc<dyn NebulaApi>,
    pub catalog: Arc<Catalog>,
    pub settings: NebulaSettings,
}

impl Shared {
    pub fn kind(&self, type_id: &str) -> Result<Kind> {
        self.catalog
            .kind(type_id)
            .cloned()
            .ok_or_else(|| BackendError::Configuration(format!("catalog lacks kind {}", type_id)))
    }

    pub async fn refresh_vm(&self, vm_id: &str) -> Result<VmRecord> {
        let vm = self
            .api
            .vm_show(vm_id)
            .await
            .map_err(|e| e.classify(BackendError::EntityRetrieval))?;
        // terminated VMs linger in the pool as DONE
        if vm.state() == "DONE" {
            return Err(BackendError::EntityNotFound(format!("VM {} is gone", vm_id)));
        }
        Ok(vm)
    }

    /// Polls the VM until it reaches one of `targets`, then runs `validate`
    pub async fn wait_for_vm<V>(
        &self,
        vm_id: &str,
        targets: &[TerminalState<VmRecord>],
        validate: V,
        cx: &RequestContext,
    ) -> Result<VmRecord>
    where
        V: FnOnce(&VmRecord) -> Result<()>,
    {
        let waiter = Waiter::new(
            format!("VM {}", vm_id),
            self.settings.wait.clone(),
            cx.cancel.clone(),
        );
        waiter
            .wait_until(|| self.refresh_vm(vm_id), targets, validate)
            .await
    }
}

/// Terminal state predicate over a VM
pub fn vm_in(state: &'static str, lcm_state: Option<&'static str>) -> TerminalState<VmRecord> {
    Box::new(move |vm: &VmRecord| vm.is_in(state, lcm_state))
}

/// States a VM settles in after a hotplug operation
pub fn settled() -> Vec<TerminalState<VmRecord>> {
    vec![vm_in("ACTIVE", Some("RUNNING")), vm_in("POWEROFF", None)]
}

/// ONe object IDs are plain integers
pub fn native_id(id: &Identifier) -> Result<&str> {
    let raw = id.as_str();
    if raw.is_empty() || !raw.bytes().all(|b| b.is_ascii_digit()) {
        return Err(BackendError::IdentifierNotValid(format!(
            "{:?} is not an OpenNebula ID",
            raw
        )));
    }
    Ok(raw)
}

/// Entry point wiring the OpenNebula CLI into a proxy
pub struct NebulaBackend {
    api: Arc<dyn NebulaApi>,
    settings: NebulaSettings,
}

impl NebulaBackend {
    pub fn new(api: Arc<dyn NebulaApi>, settings: NebulaSettings) -> Self {
        Self { api, settings }
    }

    /// Registers VM templates, resource templates, the region and clusters
    pub async fn extend_catalog(&self, catalog: &mut Catalog) -> Result<()> {
        let templates = self
            .api
            .template_list()
            .await
            .map_err(|e| e.classify(BackendError::EntityRetrieval))?;
        for template in &templates {
            catalog.add_mixin(os_tpl_mixin(&template_term(template.id()), template.name()))?;
        }

        for (term, title, cores, memory) in RESOURCE_TEMPLATES {
            catalog.add_mixin(
                resource_tpl_mixin(term, title)
                    .with_default(attrs::COMPUTE_CORES, json!(cores))
                    .with_default(attrs::COMPUTE_MEMORY, json!(memory)),
            )?;
        }

        catalog.add_mixin(region_mixin(&self.settings.region))?;

        let clusters = self
            .api
            .cluster_list()
            .await
            .map_err(|e| e.classify(BackendError::EntityRetrieval))?;
        for cluster in &clusters {
            catalog.add_mixin(availability_zone_mixin(cluster.id()))?;
        }

        tracing::info!(
            "Registered {} OS templates and {} availability zones",
            templates.len(),
            clusters.len()
        );
        Ok(())
    }

    /// Installs one adapter per served kind
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
            Arc::new(StorageAdapter::new(shared.clone())?),
            Arc::new(NetworkinterfaceAdapter::new(shared.clone())?),
            Arc::new(StoragelinkAdapter::new(shared)?),
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

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_native_id() {
        assert_eq!(native_id(&Identifier::new("42")).unwrap(), "42");
        assert!(native_id(&Identifier::new("")).is_err());
        assert!(matches!(
            native_id(&Identifier::new("compute_42_nic_0")),
            Err(BackendError::IdentifierNotValid(_))
        ));
    }

    #[test]
    fn test_template_term() {
        assert_eq!(template_term("7"), "template-7");
    }
}
