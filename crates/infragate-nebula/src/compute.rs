//! Compute adapter over OpenNebula virtual machines

use crate::backend::{BACKEND_NAME, Shared, TEMPLATE_TERM_PREFIX, native_id, template_term, vm_in};
use crate::cli::{InstantiateRequest, PowerAction};
use crate::record::VmRecord;
use async_trait::async_trait;
use infragate_core::catalog::{
    actions, attrs, availability_zone_id, kinds, mixins, os_tpl_id, region_id,
};
use infragate_core::transfer::{non_empty, number};
use infragate_core::{
    ActionDispatch, ActionInstance, AttachPolicy, BackendError, Entity, EntityAdapter, Identifier,
    Kind, Mixin, MixinFilter, MixinTag, RequestContext, Result, TerminalState, TransferTable,
};
use serde_json::{Value, json};

fn template_value<'a>(vm: &'a VmRecord, key: &str) -> Option<&'a Value> {
    vm.template().and_then(|t| t.get(key))
}

fn compute_transfer() -> TransferTable<VmRecord> {
    TransferTable::new()
        .attr(attrs::ID, |vm: &VmRecord| non_empty(vm.0.get("ID")))
        .attr(attrs::TITLE, |vm: &VmRecord| non_empty(vm.0.get("NAME")))
        .attr(attrs::COMPUTE_CORES, |vm: &VmRecord| {
            number(template_value(vm, "VCPU")).or_else(|| number(template_value(vm, "CPU")))
        })
        .attr(attrs::COMPUTE_SPEED, |vm: &VmRecord| number(template_value(vm, "CPU")))
        // ONe reports MB, the canonical model uses GB
        .attr(attrs::COMPUTE_MEMORY, |vm: &VmRecord| {
            number(template_value(vm, "MEMORY"))
                .and_then(|mb| mb.as_f64())
                .map(|mb| json!(mb / 1024.0))
        })
        .attr(attrs::COMPUTE_ARCHITECTURE, |vm: &VmRecord| {
            let arch = template_value(vm, "OS")?.get("ARCH")?.as_str()?;
            Some(json!(if arch == "x86_64" { "x64" } else { "x86" }))
        })
        .attr(attrs::COMPUTE_HOSTNAME, |vm: &VmRecord| {
            non_empty(template_value(vm, "CONTEXT")?.get("SET_HOSTNAME"))
        })
        .attr(attrs::COMPUTE_STATE, |vm: &VmRecord| Some(json!(vm.occi_state())))
}

fn compute_mixins(region: &str) -> AttachPolicy<VmRecord> {
    AttachPolicy::new()
        .rule("os_tpl", |vm: &VmRecord| {
            vm.template_id()
                .map(|id| vec![MixinTag::optional(os_tpl_id(&template_term(id)))])
                .unwrap_or_default()
        })
        .always("region", region_id(region))
        .rule("availability_zone", |vm: &VmRecord| {
            vm.cluster_id()
                .map(|cid| {
                    vec![
                        MixinTag::optional(availability_zone_id(cid))
                            .with_attribute(attrs::AVAILABILITY_ZONE_NAME, json!(cid)),
                    ]
                })
                .unwrap_or_default()
        })
}

fn power_dispatch() -> ActionDispatch<PowerAction> {
    ActionDispatch::new()
        .on(actions::COMPUTE_START, PowerAction::Resume)
        .on(actions::COMPUTE_STOP, PowerAction::Poweroff)
        .on(actions::COMPUTE_RESTART, PowerAction::Reboot)
        .on(actions::COMPUTE_SUSPEND, PowerAction::Suspend)
}

/// State a VM settles in once the power operation completes
fn power_target(action: PowerAction) -> TerminalState<VmRecord> {
    match action {
        PowerAction::Resume | PowerAction::Reboot => vm_in("ACTIVE", Some("RUNNING")),
        PowerAction::Poweroff => vm_in("POWEROFF", None),
        PowerAction::Suspend => vm_in("SUSPENDED", None),
    }
}

/// `stop` with method=poweroff and `restart` with method=cold are forced
fn is_hard(action: PowerAction, instance: &ActionInstance) -> bool {
    let method = instance.get_attribute::<String>("method");
    matches!(
        (action, method.as_deref()),
        (PowerAction::Poweroff, Some("poweroff")) | (PowerAction::Reboot, Some("cold"))
    )
}

pub struct ComputeAdapter {
    kind: Kind,
    shared: Shared,
    transfer: TransferTable<VmRecord>,
    mixins: AttachPolicy<VmRecord>,
    dispatch: ActionDispatch<PowerAction>,
}

impl ComputeAdapter {
    pub fn new(shared: Shared) -> Result<Self> {
        Ok(Self {
            kind: shared.kind(kinds::COMPUTE)?,
            mixins: compute_mixins(&shared.settings.region),
            shared,
            transfer: compute_transfer(),
            dispatch: power_dispatch(),
        })
    }

    fn to_entity(&self, vm: &VmRecord) -> Result<Entity> {
        let mut entity = Entity::new(self.kind.type_identifier()).with_id(Identifier::new(vm.id()));
        self.transfer.apply(vm, &mut entity);
        self.mixins.attach(&self.shared.catalog, vm, &mut entity)?;
        Ok(entity)
    }

    /// Live VMs; terminated ones still show up in the pool
    async fn vms(&self) -> Result<Vec<VmRecord>> {
        let vms = self
            .shared
            .api
            .vm_list()
            .await
            .map_err(|e| e.classify(BackendError::EntityRetrieval))?;
        Ok(vms.into_iter().filter(|vm| vm.state() != "DONE").collect())
    }

    /// The concrete OS template and its ONe template ID
    fn os_template<'a>(&self, entity: &'a Entity) -> Result<(&'a Mixin, String)> {
        let mixin = entity
            .mixins
            .related_to(mixins::OS_TPL)
            .find(|m| m.type_identifier() != mixins::OS_TPL)
            .ok_or_else(|| {
                BackendError::ResourceNotValid(
                    "given instance does not contain an os_tpl mixin necessary to create a virtual machine"
                        .to_string(),
                )
            })?;

        let template_id = mixin
            .term
            .strip_prefix(TEMPLATE_TERM_PREFIX)
            .filter(|id| !id.is_empty() && id.bytes().all(|b| b.is_ascii_digit()))
            .ok_or_else(|| {
                BackendError::ResourceNotValid(format!(
                    "os_tpl {} is not an OpenNebula template",
                    mixin.type_identifier()
                ))
            })?;
        Ok((mixin, template_id.to_string()))
    }

    /// Explicit attributes win over resource template defaults
    fn sizing(entity: &Entity) -> (Option<i64>, Option<f64>) {
        let template = entity
            .mixins
            .related_to(mixins::RESOURCE_TPL)
            .find(|m| m.type_identifier() != mixins::RESOURCE_TPL);
        let from_template = |key: &str| template.and_then(|m| m.attributes.get(key));

        let cores = entity
            .attribute_i64(attrs::COMPUTE_CORES)
            .or_else(|| from_template(attrs::COMPUTE_CORES).and_then(|v| v.as_i64()));
        let memory = entity
            .attribute_f64(attrs::COMPUTE_MEMORY)
            .or_else(|| from_template(attrs::COMPUTE_MEMORY).and_then(|v| v.as_f64()));
        (cores, memory)
    }
}

#[async_trait]
impl EntityAdapter for ComputeAdapter {
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
        if filter.is_empty() {
            return Ok(self
                .vms()
                .await?
                .iter()
                .map(|vm| Identifier::new(vm.id()))
                .collect());
        }
        Ok(self
            .list(filter, cx)
            .await?
            .into_iter()
            .filter_map(|e| e.id)
            .collect())
    }

    async fn list(&self, filter: &MixinFilter, _cx: &RequestContext) -> Result<Vec<Entity>> {
        let mut entities = Vec::new();
        for vm in self.vms().await? {
            let entity = self.to_entity(&vm)?;
            if entity.matches(filter) {
                entities.push(entity);
            }
        }
        Ok(entities)
    }

    async fn instance(&self, id: &Identifier, _cx: &RequestContext) -> Result<Entity> {
        let vm = self.shared.refresh_vm(native_id(id)?).await?;
        self.to_entity(&vm)
    }

    async fn create(&self, entity: &Entity, _cx: &RequestContext) -> Result<Identifier> {
        let (os_tpl, template_id) = self.os_template(entity)?;
        let (cores, memory) = Self::sizing(entity);

        let request = InstantiateRequest {
            template_id,
            name: entity.attribute_str(attrs::TITLE).map(str::to_string),
            cpu: entity.attribute_f64(attrs::COMPUTE_SPEED),
            vcpu: cores.and_then(|c| u32::try_from(c).ok()),
            memory_mb: memory.map(|gb| (gb * 1024.0).round() as u64),
        };

        let id = self
            .shared
            .api
            .vm_instantiate(&request)
            .await
            .map_err(|e| e.classify(BackendError::EntityCreate))?;

        tracing::info!("Instantiated VM {} from {}", id, os_tpl.term);
        Ok(Identifier::new(id))
    }

    async fn delete(&self, id: &Identifier, _cx: &RequestContext) -> Result<()> {
        let vm_id = native_id(id)?;
        // a DONE VM is already gone
        self.shared.refresh_vm(vm_id).await?;
        self.shared
            .api
            .vm_terminate(vm_id)
            .await
            .map_err(|e| e.classify(BackendError::EntityAction))?;
        tracing::info!("Terminated VM {}", vm_id);
        Ok(())
    }

    fn supported_actions(&self) -> Vec<String> {
        self.dispatch.actions()
    }

    async fn trigger(
        &self,
        id: &Identifier,
        action: &ActionInstance,
        cx: &RequestContext,
    ) -> Result<()> {
        let power = self.dispatch.resolve(action)?;
        let vm_id = native_id(id)?;
        let hard = is_hard(power, action);

        self.shared
            .api
            .vm_power(vm_id, power, hard)
            .await
            .map_err(|e| e.classify(BackendError::EntityAction))?;

        let vm = self
            .shared
            .wait_for_vm(vm_id, &[power_target(power)], |_| Ok(()), cx)
            .await?;
        tracing::info!("VM {} is {} after {}", vm_id, vm.occi_state(), power.verb());
        Ok(())
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    fn vm(value: Value) -> VmRecord {
        VmRecord(value)
    }

    #[test]
    fn test_transfer_converts_units() {
        let record = vm(json!({
            "ID": "7",
            "NAME": "web",
            "STATE": "3",
            "LCM_STATE": "3",
            "TEMPLATE": {
                "CPU": "0.5",
                "VCPU": "2",
                "MEMORY": "2048",
                "OS": {"ARCH": "x86_64"},
                "CONTEXT": {"SET_HOSTNAME": ""}
            }
        }));
        let mut entity = Entity::new("compute");
        compute_transfer().apply(&record, &mut entity);

        assert_eq!(entity.attribute_str(attrs::ID), Some("7"));
        assert_eq!(entity.attribute_i64(attrs::COMPUTE_CORES), Some(2));
        assert_eq!(entity.attribute_f64(attrs::COMPUTE_SPEED), Some(0.5));
        assert_eq!(entity.attribute_f64(attrs::COMPUTE_MEMORY), Some(2.0));
        assert_eq!(entity.attribute_str(attrs::COMPUTE_ARCHITECTURE), Some("x64"));
        assert_eq!(entity.attribute_str(attrs::COMPUTE_STATE), Some("active"));
        assert!(entity.attribute(attrs::COMPUTE_HOSTNAME).is_none());
    }

    #[test]
    fn test_hard_power_methods() {
        let plain = ActionInstance::new(actions::COMPUTE_STOP);
        let forced =
            ActionInstance::new(actions::COMPUTE_STOP).with_attribute("method", json!("poweroff"));
        let cold =
            ActionInstance::new(actions::COMPUTE_RESTART).with_attribute("method", json!("cold"));

        assert!(!is_hard(PowerAction::Poweroff, &plain));
        assert!(is_hard(PowerAction::Poweroff, &forced));
        assert!(is_hard(PowerAction::Reboot, &cold));
        assert!(!is_hard(PowerAction::Resume, &cold));
    }

    #[test]
    fn test_dispatch_covers_compute_actions() {
        let supported = power_dispatch().actions();
        assert_eq!(supported.len(), 4);
        assert!(supported.iter().any(|a| a == actions::COMPUTE_SUSPEND));
    }
}
