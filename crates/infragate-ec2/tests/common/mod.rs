//! In-memory EC2 used by the adapter tests

#![allow(dead_code)]

use async_trait::async_trait;
use infragate_core::{BackendProxy, RequestContext, WaitConfig};
use infragate_ec2::{
    Ec2Api, Ec2Backend, Ec2Error, Ec2Settings, ImageRecord, InstanceRecord, InstanceState, Result,
    RunRequest, VolumeRecord, VolumeRequest, VpcRecord,
};
use std::collections::BTreeMap;
use std::sync::{Arc, Mutex};

pub const WEB: &str = "i-0abc1234";
pub const VPC: &str = "vpc-0aa11bb2";
pub const VOLUME: &str = "vol-0cc33dd4";

/// State reached once an instance's transient state has been seen enough times
struct Pending {
    polls_left: u32,
    settle: InstanceState,
}

#[derive(Default)]
struct FakeState {
    instances: BTreeMap<String, InstanceRecord>,
    vpcs: BTreeMap<String, VpcRecord>,
    volumes: BTreeMap<String, VolumeRecord>,
    /// subnet id to VPC id
    subnets: BTreeMap<String, String>,
    /// gateway id to the VPC it is attached to
    gateways: BTreeMap<String, Option<String>>,
    pending: BTreeMap<String, Pending>,
    next_id: u32,
    calls: Vec<String>,
    failing_operation: Option<String>,
}

impl FakeState {
    fn next_id(&mut self, prefix: &str) -> String {
        self.next_id += 1;
        format!("{}-{:08x}", prefix, 0x0f00_0000 + self.next_id)
    }

    /// Logs the call; fails it when `operation` was scripted to fail
    fn step(&mut self, operation: &str, call: String) -> Result<()> {
        self.calls.push(call);
        if self.failing_operation.as_deref() == Some(operation) {
            return Err(Ec2Error::Api {
                operation: operation.to_string(),
                code: "InternalError".to_string(),
                message: "An internal error has occurred".to_string(),
            });
        }
        Ok(())
    }
}

/// Scripted EC2: power operations pass through pending or stopping for
/// `settle_polls` describes before they take effect
pub struct FakeEc2 {
    state: Mutex<FakeState>,
    pub settle_polls: u32,
}

fn not_found(what: &str, id: &str) -> Ec2Error {
    Ec2Error::NotFound(format!("The {} ID '{}' does not exist", what, id))
}

fn check_shape(prefix: &str, id: &str) -> Result<()> {
    let hex = id
        .strip_prefix(prefix)
        .and_then(|rest| rest.strip_prefix('-'))
        .unwrap_or("");
    if hex.is_empty() || !hex.chars().all(|c| c.is_ascii_hexdigit()) {
        return Err(Ec2Error::Malformed(format!("Invalid id: \"{}\"", id)));
    }
    Ok(())
}

impl FakeEc2 {
    pub fn new() -> Self {
        Self {
            state: Mutex::new(FakeState::default()),
            settle_polls: 2,
        }
    }

    pub fn with_instance(self, id: &str, name: &str, state: InstanceState) -> Self {
        let mut instance = InstanceRecord::new(id, state);
        instance.name = Some(name.to_string());
        instance.image_id = Some("ami-0123abcd".to_string());
        instance.instance_type = Some("t2.small".to_string());
        instance.availability_zone = Some("us-east-1a".to_string());
        instance.architecture = Some("x86_64".to_string());
        instance.private_dns = Some(format!("ip-10-0-0-{}.ec2.internal", id.len()));
        self.state.lock().unwrap().instances.insert(id.to_string(), instance);
        self
    }

    pub fn with_vpc(self, id: &str, cidr: &str) -> Self {
        let vpc = VpcRecord {
            id: id.to_string(),
            name: Some("main".to_string()),
            cidr: Some(cidr.to_string()),
            available: true,
        };
        self.state.lock().unwrap().vpcs.insert(id.to_string(), vpc);
        self
    }

    pub fn with_volume(self, id: &str, size_gb: i32) -> Self {
        let volume = VolumeRecord {
            id: id.to_string(),
            name: None,
            size_gb: Some(size_gb),
            state: "available".to_string(),
            availability_zone: Some("us-east-1a".to_string()),
        };
        self.state.lock().unwrap().volumes.insert(id.to_string(), volume);
        self
    }

    /// Makes every call of `operation` (e.g. `create_subnet`) fail
    pub fn failing_on(self, operation: &str) -> Self {
        self.state.lock().unwrap().failing_operation = Some(operation.to_string());
        self
    }

    pub fn vpc_ids(&self) -> Vec<String> {
        self.state.lock().unwrap().vpcs.keys().cloned().collect()
    }

    pub fn subnet_count(&self) -> usize {
        self.state.lock().unwrap().subnets.len()
    }

    pub fn gateway_count(&self) -> usize {
        self.state.lock().unwrap().gateways.len()
    }

    pub fn settle_after(mut self, polls: u32) -> Self {
        self.settle_polls = polls;
        self
    }

    pub fn calls(&self) -> Vec<String> {
        self.state.lock().unwrap().calls.clone()
    }

    pub fn instance(&self, id: &str) -> Option<InstanceRecord> {
        self.state.lock().unwrap().instances.get(id).cloned()
    }

    fn transition(
        &self,
        id: &str,
        call: String,
        transient: InstanceState,
        settle: InstanceState,
    ) -> Result<()> {
        check_shape("i", id)?;
        let mut guard = self.state.lock().unwrap();
        let state = &mut *guard;
        state.calls.push(call);
        let instance = state
            .instances
            .get_mut(id)
            .filter(|i| i.state != InstanceState::Terminated)
            .ok_or_else(|| not_found("instance", id))?;
        instance.state = transient;
        state.pending.insert(
            id.to_string(),
            Pending {
                polls_left: self.settle_polls,
                settle,
            },
        );
        Ok(())
    }
}

#[async_trait]
impl Ec2Api for FakeEc2 {
    async fn describe_instances(&self, ids: &[String]) -> Result<Vec<InstanceRecord>> {
        for id in ids {
            check_shape("i", id)?;
        }
        let mut guard = self.state.lock().unwrap();
        let state = &mut *guard;

        for id in ids {
            if let Some(pending) = state.pending.get_mut(id) {
                if pending.polls_left == 0 {
                    if let Some(instance) = state.instances.get_mut(id) {
                        instance.state = pending.settle;
                    }
                    state.pending.remove(id);
                } else {
                    pending.polls_left -= 1;
                }
            }
        }

        if ids.is_empty() {
            return Ok(state.instances.values().cloned().collect());
        }
        ids.iter()
            .map(|id| {
                state
                    .instances
                    .get(id)
                    .cloned()
                    .ok_or_else(|| not_found("instance", id))
            })
            .collect()
    }

    async fn run_instance(&self, request: &RunRequest) -> Result<String> {
        let mut state = self.state.lock().unwrap();
        let id = state.next_id("i");
        state.calls.push(format!(
            "run_instance {} {} {}",
            request.image_id,
            request.instance_type,
            request.availability_zone.as_deref().unwrap_or("-")
        ));

        let mut instance = InstanceRecord::new(&id, InstanceState::Pending);
        instance.name = request.name.clone();
        instance.image_id = Some(request.image_id.clone());
        instance.instance_type = Some(request.instance_type.clone());
        instance.availability_zone = request.availability_zone.clone();
        state.instances.insert(id.clone(), instance);
        Ok(id)
    }

    async fn terminate_instance(&self, id: &str) -> Result<()> {
        check_shape("i", id)?;
        let mut state = self.state.lock().unwrap();
        state.calls.push(format!("terminate_instance {}", id));
        let instance = state
            .instances
            .get_mut(id)
            .ok_or_else(|| not_found("instance", id))?;
        instance.state = InstanceState::Terminated;
        Ok(())
    }

    async fn start_instance(&self, id: &str) -> Result<()> {
        self.transition(
            id,
            format!("start_instance {}", id),
            InstanceState::Pending,
            InstanceState::Running,
        )
    }

    async fn stop_instance(&self, id: &str, force: bool) -> Result<()> {
        self.transition(
            id,
            format!("stop_instance {} {}", id, force),
            InstanceState::Stopping,
            InstanceState::Stopped,
        )
    }

    async fn reboot_instance(&self, id: &str) -> Result<()> {
        self.transition(
            id,
            format!("reboot_instance {}", id),
            InstanceState::Running,
            InstanceState::Running,
        )
    }

    async fn describe_vpcs(&self, ids: &[String]) -> Result<Vec<VpcRecord>> {
        for id in ids {
            check_shape("vpc", id)?;
        }
        let state = self.state.lock().unwrap();
        if ids.is_empty() {
            return Ok(state.vpcs.values().cloned().collect());
        }
        ids.iter()
            .map(|id| state.vpcs.get(id).cloned().ok_or_else(|| not_found("vpc", id)))
            .collect()
    }

    async fn create_vpc(&self, cidr: &str) -> Result<String> {
        let mut state = self.state.lock().unwrap();
        state.step("create_vpc", format!("create_vpc {}", cidr))?;
        let id = state.next_id("vpc");
        let vpc = VpcRecord {
            id: id.clone(),
            name: None,
            cidr: Some(cidr.to_string()),
            available: true,
        };
        state.vpcs.insert(id.clone(), vpc);
        Ok(id)
    }

    async fn delete_vpc(&self, vpc_id: &str) -> Result<()> {
        check_shape("vpc", vpc_id)?;
        let mut state = self.state.lock().unwrap();
        state.step("delete_vpc", format!("delete_vpc {}", vpc_id))?;
        if state.subnets.values().any(|vpc| vpc == vpc_id) {
            return Err(Ec2Error::Api {
                operation: "DeleteVpc".to_string(),
                code: "DependencyViolation".to_string(),
                message: format!("The vpc '{}' has dependencies and cannot be deleted.", vpc_id),
            });
        }
        state
            .vpcs
            .remove(vpc_id)
            .map(|_| ())
            .ok_or_else(|| not_found("vpc", vpc_id))
    }

    async fn create_subnet(
        &self,
        vpc_id: &str,
        cidr: &str,
        availability_zone: Option<&str>,
    ) -> Result<String> {
        let mut state = self.state.lock().unwrap();
        state.step(
            "create_subnet",
            format!("create_subnet {} {} {}", vpc_id, cidr, availability_zone.unwrap_or("-")),
        )?;
        if !state.vpcs.contains_key(vpc_id) {
            return Err(not_found("vpc", vpc_id));
        }
        let id = state.next_id("subnet");
        state.subnets.insert(id.clone(), vpc_id.to_string());
        Ok(id)
    }

    async fn delete_subnet(&self, subnet_id: &str) -> Result<()> {
        let mut state = self.state.lock().unwrap();
        state.step("delete_subnet", format!("delete_subnet {}", subnet_id))?;
        state
            .subnets
            .remove(subnet_id)
            .map(|_| ())
            .ok_or_else(|| not_found("subnet", subnet_id))
    }

    async fn create_internet_gateway(&self) -> Result<String> {
        let mut state = self.state.lock().unwrap();
        state.step("create_internet_gateway", "create_internet_gateway".to_string())?;
        let id = state.next_id("igw");
        state.gateways.insert(id.clone(), None);
        Ok(id)
    }

    async fn attach_internet_gateway(&self, gateway_id: &str, vpc_id: &str) -> Result<()> {
        let mut state = self.state.lock().unwrap();
        state.step(
            "attach_internet_gateway",
            format!("attach_internet_gateway {} {}", gateway_id, vpc_id),
        )?;
        let attachment = state
            .gateways
            .get_mut(gateway_id)
            .ok_or_else(|| not_found("internet gateway", gateway_id))?;
        *attachment = Some(vpc_id.to_string());
        Ok(())
    }

    async fn detach_internet_gateway(&self, gateway_id: &str, vpc_id: &str) -> Result<()> {
        let mut state = self.state.lock().unwrap();
        state.step(
            "detach_internet_gateway",
            format!("detach_internet_gateway {} {}", gateway_id, vpc_id),
        )?;
        let attachment = state
            .gateways
            .get_mut(gateway_id)
            .ok_or_else(|| not_found("internet gateway", gateway_id))?;
        *attachment = None;
        Ok(())
    }

    async fn delete_internet_gateway(&self, gateway_id: &str) -> Result<()> {
        let mut state = self.state.lock().unwrap();
        state.step(
            "delete_internet_gateway",
            format!("delete_internet_gateway {}", gateway_id),
        )?;
        state
            .gateways
            .remove(gateway_id)
            .map(|_| ())
            .ok_or_else(|| not_found("internet gateway", gateway_id))
    }

    async fn tag_name(&self, resource_id: &str, name: &str) -> Result<()> {
        let mut state = self.state.lock().unwrap();
        state.step("tag_name", format!("tag_name {} {}", resource_id, name))?;
        if let Some(vpc) = state.vpcs.get_mut(resource_id) {
            vpc.name = Some(name.to_string());
        }
        Ok(())
    }

    async fn delete_network(&self, vpc_id: &str) -> Result<()> {
        check_shape("vpc", vpc_id)?;
        let mut state = self.state.lock().unwrap();
        state.calls.push(format!("delete_network {}", vpc_id));
        state.vpcs.remove(vpc_id).ok_or_else(|| not_found("vpc", vpc_id))?;
        state.subnets.retain(|_, vpc| vpc.as_str() != vpc_id);
        state
            .gateways
            .retain(|_, attached| attached.as_deref() != Some(vpc_id));
        Ok(())
    }

    async fn describe_volumes(&self, ids: &[String]) -> Result<Vec<VolumeRecord>> {
        for id in ids {
            check_shape("vol", id)?;
        }
        let state = self.state.lock().unwrap();
        if ids.is_empty() {
            return Ok(state.volumes.values().cloned().collect());
        }
        ids.iter()
            .map(|id| state.volumes.get(id).cloned().ok_or_else(|| not_found("volume", id)))
            .collect()
    }

    async fn create_volume(&self, request: &VolumeRequest) -> Result<String> {
        let mut state = self.state.lock().unwrap();
        let id = state.next_id("vol");
        state.calls.push(format!(
            "create_volume {} {}",
            request.size_gb, request.availability_zone
        ));
        let volume = VolumeRecord {
            id: id.clone(),
            name: request.name.clone(),
            size_gb: Some(request.size_gb),
            state: "creating".to_string(),
            availability_zone: Some(request.availability_zone.clone()),
        };
        state.volumes.insert(id.clone(), volume);
        Ok(id)
    }

    async fn delete_volume(&self, id: &str) -> Result<()> {
        check_shape("vol", id)?;
        let mut state = self.state.lock().unwrap();
        state.calls.push(format!("delete_volume {}", id));
        state
            .volumes
            .remove(id)
            .map(|_| ())
            .ok_or_else(|| not_found("volume", id))
    }

    async fn describe_images(&self, _owners: &[String]) -> Result<Vec<ImageRecord>> {
        Ok(vec![
            ImageRecord {
                id: "ami-0123abcd".to_string(),
                name: Some("ubuntu-24.04".to_string()),
            },
            ImageRecord {
                id: "ami-0456cdef".to_string(),
                name: None,
            },
        ])
    }
}

pub fn fast_wait() -> WaitConfig {
    WaitConfig {
        max_polls: 10,
        interval_ms: 100,
        max_interval_ms: 100,
        multiplier: 1.0,
        timeout_secs: 60,
    }
}

/// Running instance `WEB`, one VPC and one volume
pub fn standard() -> FakeEc2 {
    FakeEc2::new()
        .with_instance(WEB, "web", InstanceState::Running)
        .with_vpc(VPC, "10.0.0.0/16")
        .with_volume(VOLUME, 8)
}

pub fn settings() -> Ec2Settings {
    Ec2Settings {
        availability_zone: Some("us-east-1a".to_string()),
        wait: fast_wait(),
        ..Ec2Settings::default()
    }
}

pub async fn proxy_with(fake: Arc<FakeEc2>, settings: Ec2Settings) -> BackendProxy {
    Ec2Backend::new(fake, settings).proxy().await.unwrap()
}

pub async fn proxy_over(fake: Arc<FakeEc2>) -> BackendProxy {
    proxy_with(fake, settings()).await
}

pub fn cx() -> RequestContext {
    RequestContext::new("test")
}
