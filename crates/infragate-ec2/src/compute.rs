//! Compute adapter over EC2 instances

use crate::backend::{BACKEND_NAME, DEFAULT_INSTANCE_TYPE, Shared, instance_size};
use crate::record::{InstanceRecord, InstanceState, RunRequest};
use async_trait::async_trait;
use infragate_core::catalog::{
    actions, attrs, availability_zone_id, kinds, mixins, os_tpl_id, region_id, resource_tpl_id,
};
use infragate_core::{
    ActionDispatch, ActionInstance, AttachPolicy, BackendError, Entity, EntityAdapter, Identifier,
    Kind, MixinFilter, MixinTag, RequestContext, Result, TerminalState, TransferTable, Waiter,
};
use regex::Regex;
use serde_json::json;
use std::sync::LazyLock;

static INSTANCE_ID_RE: LazyLock<Regex> =
    LazyLock::new(|| Regex::new(r"^i-(?:[0-9a-f]{8}|[0-9a-f]{17})$").unwrap());

#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum PowerAction {
    Start,
    Stop,
    Reboot,
}

fn power_dispatch() -> ActionDispatch<PowerAction> {
    ActionDispatch::new()
        .on(actions::COMPUTE_START, PowerAction::Start)
        .on(actions::COMPUTE_STOP, PowerAction::Stop)
        .on(actions::COMPUTE_RESTART, PowerAction::Reboot)
}

fn power_target(action: PowerAction) -> TerminalState<InstanceRecord> {
    match action {
        PowerAction::Start | PowerAction::Reboot => {
            Box::new(|i: &InstanceRecord| i.state == InstanceState::Running)
        }
        PowerAction::Stop => Box::new(|i: &InstanceRecord| i.state == InstanceState::Stopped),
    }
}

fn compute_transfer() -> TransferTable<InstanceRecord> {
    let size = |i: &InstanceRecord| i.instance_type.as_deref().and_then(instance_size);

    TransferTable::new()
        .attr(attrs::ID, |i: &InstanceRecord| Some(json!(i.id)))
        .attr(attrs::TITLE, |i: &InstanceRecord| i.name.as_ref().map(|n| json!(n)))
        .attr(attrs::COMPUTE_CORES, move |i: &InstanceRecord| {
            i.core_count
                .map(i64::from)
                .or_else(|| size(i).map(|(cores, _)| cores))
                .map(|cores| json!(cores))
        })
        .attr(attrs::COMPUTE_MEMORY, move |i: &InstanceRecord| {
            size(i).map(|(_, memory)| json!(memory))
        })
        .attr(attrs::COMPUTE_ARCHITECTURE, |i: &InstanceRecord| {
            match i.architecture.as_deref()? {
                "x86_64" => Some(json!("x64")),
                "i386" => Some(json!("x86")),
                _ => None,
            }
        })
        .attr(attrs::COMPUTE_HOSTNAME, |i: &InstanceRecord| {
            i.private_dns.as_ref().map(|h| json!(h))
        })
        .attr(attrs::COMPUTE_STATE, |i: &InstanceRecord| Some(json!(i.state.occi_state())))
}

fn compute_mixins(region: &str) -> AttachPolicy<InstanceRecord> {
    AttachPolicy::new()
        .rule("os_tpl", |i: &InstanceRecord| {
            i.image_id
                .as_deref()
                .map(|image| vec![MixinTag::optional(os_tpl_id(image))])
                .unwrap_or_default()
        })
        .rule("resource_tpl", |i: &InstanceRecord| {
            i.instance_type
                .as_deref()
                .map(|t| vec![MixinTag::optional(resource_tpl_id(t))])
                .unwrap_or_default()
        })
        .always("region", region_id(region))
        .rule("availability_zone", |i: &InstanceRecord| {
            i.availability_zone
                .as_deref()
                .map(|zone| {
                    vec![
                        MixinTag::optional(availability_zone_id(zone))
                            .with_attribute(attrs::AVAILABILITY_ZONE_NAME, json!(zone)),
                    ]
                })
                .unwrap_or_default()
        })
}

/// Term of the first attached mixin depending on `base`
fn chosen_term<'a>(entity: &'a Entity, base: &'a str) -> Option<&'a str> {
    entity
        .mixins
        .related_to(base)
        .find(|m| m.type_identifier() != base)
        .map(|m| m.term.as_str())
}

pub struct ComputeAdapter {
    kind: Kind,
    shared: Shared,
    transfer: TransferTable<InstanceRecord>,
    mixins: AttachPolicy<InstanceRecord>,
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

    fn instance_id<'a>(&self, id: &'a Identifier) -> Result<&'a str> {
        if !INSTANCE_ID_RE.is_match(id.as_str()) {
            return Err(BackendError::IdentifierNotValid(format!(
                "{:?} is not an EC2 instance ID",
                id.as_str()
            )));
        }
        Ok(id.as_str())
    }

    fn to_entity(&self, instance: &InstanceRecord) -> Result<Entity> {
        let mut entity =
            Entity::new(self.kind.type_identifier()).with_id(Identifier::new(&instance.id));
        self.transfer.apply(instance, &mut entity);
        self.mixins.attach(&self.shared.catalog, instance, &mut entity)?;
        Ok(entity)
    }

    async fn describe(&self, id: &str) -> Result<InstanceRecord> {
        let found = self
            .shared
            .api
            .describe_instances(&[id.to_string()])
            .await
            .map_err(|e| e.classify(BackendError::EntityRetrieval))?;
        found
            .into_iter()
            .find(|i| i.id == id && i.state != InstanceState::Terminated)
            .ok_or_else(|| BackendError::EntityNotFound(format!("instance {} does not exist", id)))
    }

    fn run_request(&self, entity: &Entity) -> Result<RunRequest> {
        let image_id = chosen_term(entity, mixins::OS_TPL).ok_or_else(|| {
            BackendError::ResourceNotValid(
                "given instance does not contain an os_tpl mixin necessary to create a virtual machine"
                    .to_string(),
            )
        })?;
        let instance_type =
            chosen_term(entity, mixins::RESOURCE_TPL).unwrap_or(DEFAULT_INSTANCE_TYPE);
        let availability_zone = chosen_term(entity, mixins::AVAILABILITY_ZONE)
            .map(str::to_string)
            .or_else(|| self.shared.settings.availability_zone.clone());

        Ok(RunRequest {
            image_id: image_id.to_string(),
            instance_type: instance_type.to_string(),
            name: entity.attribute_str(attrs::TITLE).map(str::to_string),
            availability_zone,
        })
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
        Ok(self
            .list(filter, cx)
            .await?
            .into_iter()
            .filter_map(|e| e.id)
            .collect())
    }

    async fn list(&self, filter: &MixinFilter, _cx: &RequestContext) -> Result<Vec<Entity>> {
        let instances = self
            .shared
            .api
            .describe_instances(&[])
            .await
            .map_err(|e| e.classify(BackendError::EntityRetrieval))?;

        let mut entities = Vec::new();
        for instance in instances.iter().filter(|i| i.state != InstanceState::Terminated) {
            let entity = self.to_entity(instance)?;
            if entity.matches(filter) {
                entities.push(entity);
            }
        }
        Ok(entities)
    }

    async fn instance(&self, id: &Identifier, _cx: &RequestContext) -> Result<Entity> {
        let instance = self.describe(self.instance_id(id)?).await?;
        self.to_entity(&instance)
    }

    async fn create(&self, entity: &Entity, _cx: &RequestContext) -> Result<Identifier> {
        let request = self.run_request(entity)?;
        let id = self
            .shared
            .api
            .run_instance(&request)
            .await
            .map_err(|e| e.classify(BackendError::EntityCreate))?;

        tracing::info!(
            "Launched instance {} ({} from {})",
            id,
            request.instance_type,
            request.image_id
        );
        Ok(Identifier::new(id))
    }

    async fn delete(&self, id: &Identifier, _cx: &RequestContext) -> Result<()> {
        let instance_id = self.instance_id(id)?;
        self.describe(instance_id).await?;
        self.shared
            .api
            .terminate_instance(instance_id)
            .await
            .map_err(|e| e.classify(BackendError::EntityAction))?;
        tracing::info!("Terminated instance {}", instance_id);
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
        let instance_id = self.instance_id(id)?;
        let api = &self.shared.api;

        let requested = match power {
            PowerAction::Start => api.start_instance(instance_id).await,
            PowerAction::Stop => {
                let force = action.get_attribute::<String>("method").as_deref() == Some("poweroff");
                api.stop_instance(instance_id, force).await
            }
            PowerAction::Reboot => api.reboot_instance(instance_id).await,
        };
        requested.map_err(|e| e.classify(BackendError::EntityAction))?;

        let waiter = Waiter::new(
            format!("instance {}", instance_id),
            self.shared.settings.wait.clone(),
            cx.cancel.clone(),
        );
        let settled = waiter
            .wait_until(|| self.describe(instance_id), &[power_target(power)], |_| Ok(()))
            .await?;

        tracing::info!("Instance {} is {}", instance_id, settled.state.as_str());
        Ok(())
    }
}
