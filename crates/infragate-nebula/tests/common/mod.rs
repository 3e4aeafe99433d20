//! In-memory OpenNebula used by the adapter tests

#![allow(dead_code)]

use async_trait::async_trait;
use infragate_core::{BackendProxy, RequestContext, WaitConfig};
use infragate_nebula::{
    ClusterRecord, ImageRecord, ImageRequest, InstantiateRequest, NebulaApi, NebulaBackend,
    NebulaError, NebulaSettings, PowerAction, Result, TemplateRecord, VmRecord, VnetRecord,
};
use serde_json::{Value, json};
use std::collections::BTreeMap;
use std::sync::{Arc, Mutex};

pub const ACTIVE: &str = "3";
pub const SUSPENDED: &str = "5";
pub const DONE: &str = "6";
pub const POWEROFF: &str = "8";
pub const RUNNING: &str = "3";
pub const HOTPLUG: &str = "17";
pub const HOTPLUG_NIC: &str = "25";

/// Change applied once a VM's transient state has been observed enough times
struct Pending {
    polls_left: u32,
    finish: Box<dyn FnOnce(&mut Value) + Send>,
}

#[derive(Default)]
struct FakeState {
    vms: BTreeMap<String, Value>,
    vnets: BTreeMap<String, Value>,
    images: BTreeMap<String, Value>,
    next_id: u32,
    pending: BTreeMap<String, Pending>,
    calls: Vec<String>,
}

impl FakeState {
    fn next_id(&mut self) -> String {
        self.next_id += 1;
        (100 + self.next_id).to_string()
    }
}

/// Scripted OpenNebula: hotplug and power operations pass through a
/// transient state for `settle_polls` refreshes before they take effect
pub struct FakeNebula {
    state: Mutex<FakeState>,
    pub settle_polls: u32,
    /// When set, attach operations settle without adding anything
    pub reject_hotplug: bool,
}

fn set_state(vm: &mut Value, state: &str, lcm: &str) {
    vm["STATE"] = json!(state);
    vm["LCM_STATE"] = json!(lcm);
}

fn push_item(vm: &mut Value, key: &str, item: Value) {
    let template = &mut vm["TEMPLATE"];
    let mut items = match template.get(key).cloned() {
        Some(Value::Array(items)) => items,
        Some(Value::Null) | None => Vec::new(),
        Some(single) => vec![single],
    };
    items.push(item);
    template[key] = Value::Array(items);
}

fn remove_item(vm: &mut Value, key: &str, id_field: &str, id: &str) {
    if let Some(Value::Array(items)) = vm["TEMPLATE"].get_mut(key) {
        items.retain(|item| item.get(id_field).and_then(Value::as_str) != Some(id));
    }
}

fn next_index(vm: &Value, key: &str, id_field: &str) -> u32 {
    match vm["TEMPLATE"].get(key) {
        Some(Value::Array(items)) => items
            .iter()
            .filter_map(|i| i.get(id_field)?.as_str()?.parse::<u32>().ok())
            .max()
            .map_or(0, |max| max + 1),
        _ => 0,
    }
}

impl FakeNebula {
    pub fn new() -> Self {
        Self {
            state: Mutex::new(FakeState::default()),
            settle_polls: 2,
            reject_hotplug: false,
        }
    }

    /// A running VM in cluster 100 with one NIC on network 0
    pub fn with_vm(self, id: &str, name: &str) -> Self {
        let vm = json!({
            "ID": id,
            "NAME": name,
            "STATE": ACTIVE,
            "LCM_STATE": RUNNING,
            "TEMPLATE": {
                "TEMPLATE_ID": "0",
                "CPU": "1",
                "VCPU": "2",
                "MEMORY": "2048",
                "NIC": [{
                    "NIC_ID": "0",
                    "NETWORK_ID": "0",
                    "NETWORK": "public",
                    "IP": "192.0.2.10",
                    "MAC": "02:00:c0:00:02:0a"
                }],
                "DISK": [{ "DISK_ID": "0", "IMAGE_ID": "0", "TARGET": "vda" }]
            },
            "HISTORY_RECORDS": { "HISTORY": { "CID": "100" } }
        });
        self.state.lock().unwrap().vms.insert(id.to_string(), vm);
        self
    }

    pub fn with_vnet(self, id: &str, name: &str, reservation: bool) -> Self {
        let mut template = json!({ "NETWORK_ADDRESS": "192.0.2.0", "NETWORK_MASK": "255.255.255.0" });
        if reservation {
            template["IP_RESERVATION"] = json!("YES");
        }
        let vnet = json!({ "ID": id, "NAME": name, "BRIDGE": "br0", "TEMPLATE": template });
        self.state.lock().unwrap().vnets.insert(id.to_string(), vnet);
        self
    }

    pub fn with_image(self, id: &str, name: &str) -> Self {
        let image = json!({ "ID": id, "NAME": name, "STATE": "1", "SIZE": "10240", "TEMPLATE": {} });
        self.state.lock().unwrap().images.insert(id.to_string(), image);
        self
    }

    pub fn settle_after(mut self, polls: u32) -> Self {
        self.settle_polls = polls;
        self
    }

    pub fn rejecting_hotplug(mut self) -> Self {
        self.reject_hotplug = true;
        self
    }

    /// Mutating calls made so far, e.g. `nic_attach 42 1`
    pub fn calls(&self) -> Vec<String> {
        self.state.lock().unwrap().calls.clone()
    }

    pub fn vm(&self, id: &str) -> Option<VmRecord> {
        self.state.lock().unwrap().vms.get(id).cloned().map(VmRecord)
    }

    fn record(&self, call: String) {
        self.state.lock().unwrap().calls.push(call);
    }

    /// Puts the VM into a transient state and schedules `finish`
    fn schedule(
        &self,
        vm_id: &str,
        transient: (&str, &str),
        finish: impl FnOnce(&mut Value) + Send + 'static,
    ) -> Result<()> {
        let mut guard = self.state.lock().unwrap();
        let state = &mut *guard;
        let vm = state
            .vms
            .get_mut(vm_id)
            .ok_or_else(|| NebulaError::NotFound(format!("VM {}", vm_id)))?;
        set_state(vm, transient.0, transient.1);
        state.pending.insert(
            vm_id.to_string(),
            Pending {
                polls_left: self.settle_polls,
                finish: Box::new(finish),
            },
        );
        Ok(())
    }
}

#[async_trait]
impl NebulaApi for FakeNebula {
    async fn vm_list(&self) -> Result<Vec<VmRecord>> {
        let state = self.state.lock().unwrap();
        Ok(state.vms.values().cloned().map(VmRecord).collect())
    }

    async fn vm_show(&self, id: &str) -> Result<VmRecord> {
        let mut guard = self.state.lock().unwrap();
        let state = &mut *guard;
        let settled = match state.pending.get_mut(id) {
            Some(pending) if pending.polls_left == 0 => true,
            Some(pending) => {
                pending.polls_left -= 1;
                false
            }
            None => false,
        };
        if settled {
            if let (Some(pending), Some(vm)) = (state.pending.remove(id), state.vms.get_mut(id)) {
                (pending.finish)(vm);
            }
        }
        state
            .vms
            .get(id)
            .cloned()
            .map(VmRecord)
            .ok_or_else(|| {
                NebulaError::NotFound(format!("[VirtualMachineInfo] Error getting VM [{}].", id))
            })
    }

    async fn vm_instantiate(&self, request: &InstantiateRequest) -> Result<String> {
        let mut state = self.state.lock().unwrap();
        let id = state.next_id();
        let vm = json!({
            "ID": id,
            "NAME": request.name.clone().unwrap_or_else(|| format!("one-{}", id)),
            "STATE": ACTIVE,
            "LCM_STATE": RUNNING,
            "TEMPLATE": {
                "TEMPLATE_ID": request.template_id,
                "CPU": request.cpu.unwrap_or(1.0).to_string(),
                "VCPU": request.vcpu.unwrap_or(1).to_string(),
                "MEMORY": request.memory_mb.unwrap_or(512).to_string()
            }
        });
        state.vms.insert(id.clone(), vm);
        state.calls.push(format!("vm_instantiate {}", request.template_id));
        Ok(id)
    }

    async fn vm_terminate(&self, id: &str) -> Result<()> {
        self.record(format!("vm_terminate {}", id));
        let mut state = self.state.lock().unwrap();
        let vm = state
            .vms
            .get_mut(id)
            .ok_or_else(|| NebulaError::NotFound(format!("VM {}", id)))?;
        set_state(vm, DONE, "0");
        Ok(())
    }

    async fn vm_power(&self, id: &str, action: PowerAction, hard: bool) -> Result<()> {
        self.record(format!("vm_power {} {} {}", id, action.verb(), hard));
        let (state, lcm) = match action {
            PowerAction::Resume | PowerAction::Reboot => (ACTIVE, RUNNING),
            PowerAction::Poweroff => (POWEROFF, "0"),
            PowerAction::Suspend => (SUSPENDED, "0"),
        };
        // SHUTDOWN_POWEROFF / BOOT_POWEROFF style intermediate state
        self.schedule(id, (ACTIVE, "18"), move |vm| set_state(vm, state, lcm))
    }

    async fn nic_attach(&self, vm_id: &str, network_id: &str) -> Result<()> {
        self.record(format!("nic_attach {} {}", vm_id, network_id));
        let reject = self.reject_hotplug;
        let network_id = network_id.to_string();
        self.schedule(vm_id, (ACTIVE, HOTPLUG_NIC), move |vm| {
            set_state(vm, ACTIVE, RUNNING);
            if reject {
                vm["USER_TEMPLATE"] = json!({ "ERROR": "no free leases" });
                return;
            }
            let nic_id = next_index(vm, "NIC", "NIC_ID").to_string();
            push_item(
                vm,
                "NIC",
                json!({
                    "NIC_ID": nic_id,
                    "NETWORK_ID": network_id,
                    "IP": "192.0.2.50",
                    "MAC": "02:00:c0:00:02:32"
                }),
            );
        })
    }

    async fn nic_detach(&self, vm_id: &str, nic_id: &str) -> Result<()> {
        self.record(format!("nic_detach {} {}", vm_id, nic_id));
        let nic_id = nic_id.to_string();
        self.schedule(vm_id, (ACTIVE, HOTPLUG_NIC), move |vm| {
            set_state(vm, ACTIVE, RUNNING);
            remove_item(vm, "NIC", "NIC_ID", &nic_id);
        })
    }

    async fn disk_attach(&self, vm_id: &str, image_id: &str) -> Result<()> {
        self.record(format!("disk_attach {} {}", vm_id, image_id));
        let reject = self.reject_hotplug;
        let image_id = image_id.to_string();
        self.schedule(vm_id, (ACTIVE, HOTPLUG), move |vm| {
            set_state(vm, ACTIVE, RUNNING);
            if reject {
                return;
            }
            let disk_id = next_index(vm, "DISK", "DISK_ID").to_string();
            push_item(
                vm,
                "DISK",
                json!({ "DISK_ID": disk_id, "IMAGE_ID": image_id, "TARGET": "vdb" }),
            );
        })
    }

    async fn disk_detach(&self, vm_id: &str, disk_id: &str) -> Result<()> {
        self.record(format!("disk_detach {} {}", vm_id, disk_id));
        let disk_id = disk_id.to_string();
        self.schedule(vm_id, (ACTIVE, HOTPLUG), move |vm| {
            set_state(vm, ACTIVE, RUNNING);
            remove_item(vm, "DISK", "DISK_ID", &disk_id);
        })
    }

    async fn vnet_list(&self) -> Result<Vec<VnetRecord>> {
        let state = self.state.lock().unwrap();
        Ok(state.vnets.values().cloned().map(VnetRecord).collect())
    }

    async fn vnet_show(&self, id: &str) -> Result<VnetRecord> {
        let state = self.state.lock().unwrap();
        state
            .vnets
            .get(id)
            .cloned()
            .map(VnetRecord)
            .ok_or_else(|| NebulaError::NotFound(format!("VNET {}", id)))
    }

    async fn vnet_create(&self, template: &str) -> Result<String> {
        let mut state = self.state.lock().unwrap();
        let id = state.next_id();
        let vnet = json!({ "ID": id, "NAME": "created", "TEMPLATE": { "RAW": template } });
        state.vnets.insert(id.clone(), vnet);
        state.calls.push(format!("vnet_create {}", template.lines().count()));
        Ok(id)
    }

    async fn vnet_delete(&self, id: &str) -> Result<()> {
        self.record(format!("vnet_delete {}", id));
        let mut state = self.state.lock().unwrap();
        state
            .vnets
            .remove(id)
            .map(|_| ())
            .ok_or_else(|| NebulaError::NotFound(format!("VNET {}", id)))
    }

    async fn image_list(&self) -> Result<Vec<ImageRecord>> {
        let state = self.state.lock().unwrap();
        Ok(state.images.values().cloned().map(ImageRecord).collect())
    }

    async fn image_show(&self, id: &str) -> Result<ImageRecord> {
        let state = self.state.lock().unwrap();
        state
            .images
            .get(id)
            .cloned()
            .map(ImageRecord)
            .ok_or_else(|| NebulaError::NotFound(format!("IMAGE {}", id)))
    }

    async fn image_create(&self, request: &ImageRequest) -> Result<String> {
        let mut state = self.state.lock().unwrap();
        let id = state.next_id();
        let image = json!({
            "ID": id,
            "NAME": request.name,
            "STATE": "4",
            "SIZE": request.size_mb.to_string(),
            "DATASTORE": request.datastore
        });
        state.images.insert(id.clone(), image);
        state.calls.push(format!("image_create {} {}", request.size_mb, request.datastore));
        Ok(id)
    }

    async fn image_delete(&self, id: &str) -> Result<()> {
        self.record(format!("image_delete {}", id));
        let mut state = self.state.lock().unwrap();
        state
            .images
            .remove(id)
            .map(|_| ())
            .ok_or_else(|| NebulaError::NotFound(format!("IMAGE {}", id)))
    }

    async fn template_list(&self) -> Result<Vec<TemplateRecord>> {
        Ok(vec![
            TemplateRecord(json!({ "ID": "0", "NAME": "ubuntu-24.04" })),
            TemplateRecord(json!({ "ID": "3", "NAME": "debian-12" })),
        ])
    }

    async fn cluster_list(&self) -> Result<Vec<ClusterRecord>> {
        Ok(vec![ClusterRecord(json!({ "ID": "100" }))])
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

/// VM 42 on network 0 with image 0, plus network 1 and reservation 2
pub fn standard() -> FakeNebula {
    FakeNebula::new()
        .with_vm("42", "web")
        .with_vnet("0", "public", false)
        .with_vnet("1", "private", false)
        .with_vnet("2", "reserved", true)
        .with_image("0", "ubuntu-disk")
        .with_image("1", "data")
}

pub async fn proxy_over(fake: Arc<FakeNebula>) -> BackendProxy {
    let settings = NebulaSettings {
        region: "lab".to_string(),
        datastore: "1".to_string(),
        wait: fast_wait(),
    };
    NebulaBackend::new(fake, settings).proxy().await.unwrap()
}

pub fn cx() -> RequestContext {
    RequestContext::new("test")
}
