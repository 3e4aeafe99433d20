//! OpenNebula JSON records
//!
//! The `one*` tools print XML documents converted to JSON: numbers are
//! strings, and an element that may repeat is a single object when it
//! occurs once and an array otherwise. The wrappers here hide both quirks.

use infragate_core::Watched;
use serde_json::Value;

/// VM states, indexed by `STATE`
const VM_STATES: [&str; 12] = [
    "INIT",
    "PENDING",
    "HOLD",
    "ACTIVE",
    "STOPPED",
    "SUSPENDED",
    "DONE",
    "FAILED",
    "POWEROFF",
    "UNDEPLOYED",
    "CLONING",
    "CLONING_FAILURE",
];

/// LCM states, indexed by `LCM_STATE`
const LCM_STATES: [&str; 51] = [
    "LCM_INIT",
    "PROLOG",
    "BOOT",
    "RUNNING",
    "MIGRATE",
    "SAVE_STOP",
    "SAVE_SUSPEND",
    "SAVE_MIGRATE",
    "PROLOG_MIGRATE",
    "PROLOG_RESUME",
    "EPILOG_STOP",
    "EPILOG",
    "SHUTDOWN",
    "CANCEL",
    "FAILURE",
    "CLEANUP_RESUBMIT",
    "UNKNOWN",
    "HOTPLUG",
    "SHUTDOWN_POWEROFF",
    "BOOT_UNKNOWN",
    "BOOT_POWEROFF",
    "BOOT_SUSPENDED",
    "BOOT_STOPPED",
    "CLEANUP_DELETE",
    "HOTPLUG_SNAPSHOT",
    "HOTPLUG_NIC",
    "HOTPLUG_SAVEAS",
    "HOTPLUG_SAVEAS_POWEROFF",
    "HOTPLUG_SAVEAS_SUSPENDED",
    "SHUTDOWN_UNDEPLOY",
    "EPILOG_UNDEPLOY",
    "PROLOG_UNDEPLOY",
    "BOOT_UNDEPLOY",
    "HOTPLUG_PROLOG_POWEROFF",
    "HOTPLUG_EPILOG_POWEROFF",
    "BOOT_MIGRATE",
    "BOOT_FAILURE",
    "BOOT_MIGRATE_FAILURE",
    "PROLOG_MIGRATE_FAILURE",
    "PROLOG_FAILURE",
    "EPILOG_FAILURE",
    "EPILOG_STOP_FAILURE",
    "EPILOG_UNDEPLOY_FAILURE",
    "PROLOG_MIGRATE_POWEROFF",
    "PROLOG_MIGRATE_POWEROFF_FAILURE",
    "PROLOG_MIGRATE_SUSPEND",
    "PROLOG_MIGRATE_SUSPEND_FAILURE",
    "BOOT_UNDEPLOY_FAILURE",
    "BOOT_STOPPED_FAILURE",
    "PROLOG_RESUME_FAILURE",
    "PROLOG_UNDEPLOY_FAILURE",
];

/// Element that may be a single object or an array
pub fn as_list(value: Option<&Value>) -> Vec<&Value> {
    match value {
        Some(Value::Array(items)) => items.iter().collect(),
        Some(Value::Null) | None => Vec::new(),
        Some(single) => vec![single],
    }
}

/// Non-empty string field
pub fn text<'a>(value: &'a Value, key: &str) -> Option<&'a str> {
    match value.get(key)? {
        Value::String(s) if !s.is_empty() => Some(s.as_str()),
        _ => None,
    }
}

fn state_name(table: &[&'static str], raw: Option<&str>) -> String {
    let Some(raw) = raw else {
        return "UNKNOWN".to_string();
    };
    raw.parse::<usize>()
        .ok()
        .and_then(|i| table.get(i))
        .map(|s| s.to_string())
        .unwrap_or_else(|| format!("STATE_{}", raw))
}

/// Unwraps `{"<KEY>": {...}}` and `{"<POOL>": {"<KEY>": [...]}}` documents
fn unwrap_pool(document: &Value, pool: &str, key: &str) -> Vec<Value> {
    as_list(document.get(pool).and_then(|p| p.get(key)))
        .into_iter()
        .cloned()
        .collect()
}

/// One virtual machine (`onevm show -j`)
#[derive(Debug, Clone, PartialEq)]
pub struct VmRecord(pub Value);

impl VmRecord {
    pub fn from_document(document: Value) -> Self {
        match document {
            Value::Object(mut map) if map.contains_key("VM") => {
                Self(map.remove("VM").unwrap_or(Value::Null))
            }
            other => Self(other),
        }
    }

    pub fn pool(document: &Value) -> Vec<Self> {
        unwrap_pool(document, "VM_POOL", "VM")
            .into_iter()
            .map(Self)
            .collect()
    }

    pub fn id(&self) -> &str {
        text(&self.0, "ID").unwrap_or("")
    }

    pub fn name(&self) -> Option<&str> {
        text(&self.0, "NAME")
    }

    pub fn template(&self) -> Option<&Value> {
        self.0.get("TEMPLATE")
    }

    pub fn state(&self) -> String {
        state_name(&VM_STATES, text(&self.0, "STATE"))
    }

    pub fn lcm_state(&self) -> String {
        state_name(&LCM_STATES, text(&self.0, "LCM_STATE"))
    }

    pub fn is_in(&self, state: &str, lcm_state: Option<&str>) -> bool {
        self.state() == state && lcm_state.is_none_or(|lcm| self.lcm_state() == lcm)
    }

    pub fn nics(&self) -> Vec<&Value> {
        as_list(self.template().and_then(|t| t.get("NIC")))
    }

    pub fn disks(&self) -> Vec<&Value> {
        as_list(self.template().and_then(|t| t.get("DISK")))
    }

    pub fn nic(&self, nic_id: &str) -> Option<&Value> {
        self.nics()
            .into_iter()
            .find(|nic| text(nic, "NIC_ID") == Some(nic_id))
    }

    pub fn disk(&self, disk_id: &str) -> Option<&Value> {
        self.disks()
            .into_iter()
            .find(|disk| text(disk, "DISK_ID") == Some(disk_id))
    }

    /// Cluster of the most recent placement
    pub fn cluster_id(&self) -> Option<&str> {
        let history = self.0.get("HISTORY_RECORDS")?.get("HISTORY");
        as_list(history).last().and_then(|h| text(h, "CID"))
    }

    /// Template the VM was instantiated from
    pub fn template_id(&self) -> Option<&str> {
        self.template().and_then(|t| text(t, "TEMPLATE_ID"))
    }

    pub fn user_error(&self) -> Option<&str> {
        self.0.get("USER_TEMPLATE").and_then(|t| text(t, "ERROR"))
    }

    /// Canonical compute state
    pub fn occi_state(&self) -> &'static str {
        if self.failure().is_some() {
            return "error";
        }
        match self.state().as_str() {
            "ACTIVE" if self.lcm_state() == "RUNNING" => "active",
            "POWEROFF" | "STOPPED" | "UNDEPLOYED" => "inactive",
            "SUSPENDED" => "suspended",
            _ => "waiting",
        }
    }
}

impl Watched for VmRecord {
    fn failure(&self) -> Option<String> {
        let state = self.state();
        let failed = state == "FAILED"
            || state == "CLONING_FAILURE"
            || (state == "ACTIVE" && self.lcm_state().contains("FAILURE"));
        failed.then(|| {
            self.user_error()
                .unwrap_or("no error detail reported")
                .to_string()
        })
    }

    fn state_label(&self) -> String {
        if self.state() == "ACTIVE" {
            format!("ACTIVE/{}", self.lcm_state())
        } else {
            self.state()
        }
    }
}

/// One virtual network (`onevnet show -j`)
#[derive(Debug, Clone, PartialEq)]
pub struct VnetRecord(pub Value);

impl VnetRecord {
    pub fn from_document(document: Value) -> Self {
        match document {
            Value::Object(mut map) if map.contains_key("VNET") => {
                Self(map.remove("VNET").unwrap_or(Value::Null))
            }
            other => Self(other),
        }
    }

    pub fn pool(document: &Value) -> Vec<Self> {
        unwrap_pool(document, "VNET_POOL", "VNET")
            .into_iter()
            .map(Self)
            .collect()
    }

    pub fn id(&self) -> &str {
        text(&self.0, "ID").unwrap_or("")
    }

    pub fn template_field(&self, key: &str) -> Option<&str> {
        self.0.get("TEMPLATE").and_then(|t| text(t, key))
    }

    /// Reservations are networks flagged with `IP_RESERVATION` in their template
    pub fn is_ip_reservation(&self) -> bool {
        self.template_field("IP_RESERVATION").is_some()
    }
}

/// One image (`oneimage show -j`)
#[derive(Debug, Clone, PartialEq)]
pub struct ImageRecord(pub Value);

impl ImageRecord {
    pub fn from_document(document: Value) -> Self {
        match document {
            Value::Object(mut map) if map.contains_key("IMAGE") => {
                Self(map.remove("IMAGE").unwrap_or(Value::Null))
            }
            other => Self(other),
        }
    }

    pub fn pool(document: &Value) -> Vec<Self> {
        unwrap_pool(document, "IMAGE_POOL", "IMAGE")
            .into_iter()
            .map(Self)
            .collect()
    }

    pub fn id(&self) -> &str {
        text(&self.0, "ID").unwrap_or("")
    }

    /// Canonical storage state
    pub fn occi_state(&self) -> &'static str {
        // READY, USED, USED_PERS
        match text(&self.0, "STATE") {
            Some("1") | Some("2") | Some("8") => "online",
            Some("5") => "error",
            _ => "offline",
        }
    }
}

/// One VM template (`onetemplate list -j`), offered as an OS template
#[derive(Debug, Clone, PartialEq)]
pub struct TemplateRecord(pub Value);

impl TemplateRecord {
    pub fn pool(document: &Value) -> Vec<Self> {
        unwrap_pool(document, "VMTEMPLATE_POOL", "VMTEMPLATE")
            .into_iter()
            .map(Self)
            .collect()
    }

    pub fn id(&self) -> &str {
        text(&self.0, "ID").unwrap_or("")
    }

    pub fn name(&self) -> &str {
        text(&self.0, "NAME").unwrap_or("")
    }
}

/// One cluster (`onecluster list -j`), offered as an availability zone
#[derive(Debug, Clone, PartialEq)]
pub struct ClusterRecord(pub Value);

impl ClusterRecord {
    pub fn pool(document: &Value) -> Vec<Self> {
        unwrap_pool(document, "CLUSTER_POOL", "CLUSTER")
            .into_iter()
            .map(Self)
            .collect()
    }

    pub fn id(&self) -> &str {
        text(&self.0, "ID").unwrap_or("")
    }
}
