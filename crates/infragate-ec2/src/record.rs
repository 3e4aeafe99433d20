//! Plain records of the EC2 objects the adapters work with
//!
//! The SDK types are flattened into these so that the adapters (and their
//! tests) never touch `aws-sdk-ec2` directly.

use infragate_core::Watched;

/// EC2 instance lifecycle states
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum InstanceState {
    Pending,
    Running,
    Stopping,
    Stopped,
    ShuttingDown,
    Terminated,
    Unknown,
}

impl InstanceState {
    pub fn parse(name: &str) -> Self {
        match name {
            "pending" => InstanceState::Pending,
            "running" => InstanceState::Running,
            "stopping" => InstanceState::Stopping,
            "stopped" => InstanceState::Stopped,
            "shutting-down" => InstanceState::ShuttingDown,
            "terminated" => InstanceState::Terminated,
            _ => InstanceState::Unknown,
        }
    }

    pub fn as_str(&self) -> &'static str {
        match self {
            InstanceState::Pending => "pending",
            InstanceState::Running => "running",
            InstanceState::Stopping => "stopping",
            InstanceState::Stopped => "stopped",
            InstanceState::ShuttingDown => "shutting-down",
            InstanceState::Terminated => "terminated",
            InstanceState::Unknown => "unknown",
        }
    }

    /// Canonical compute state
    pub fn occi_state(&self) -> &'static str {
        match self {
            InstanceState::Running => "active",
            InstanceState::Stopped => "inactive",
            InstanceState::ShuttingDown | InstanceState::Terminated | InstanceState::Unknown => {
                "error"
            }
            InstanceState::Pending | InstanceState::Stopping => "waiting",
        }
    }

    pub fn is_gone(&self) -> bool {
        matches!(self, InstanceState::ShuttingDown | InstanceState::Terminated)
    }
}

#[derive(Debug, Clone, PartialEq)]
pub struct InstanceRecord {
    pub id: String,
    pub name: Option<String>,
    pub state: InstanceState,
    pub image_id: Option<String>,
    pub instance_type: Option<String>,
    pub availability_zone: Option<String>,
    pub architecture: Option<String>,
    pub core_count: Option<i32>,
    pub private_dns: Option<String>,
}

impl InstanceRecord {
    pub fn new(id: impl Into<String>, state: InstanceState) -> Self {
        Self {
            id: id.into(),
            name: None,
            state,
            image_id: None,
            instance_type: None,
            availability_zone: None,
            architecture: None,
            core_count: None,
            private_dns: None,
        }
    }
}

impl Watched for InstanceRecord {
    fn failure(&self) -> Option<String> {
        self.state
            .is_gone()
            .then(|| format!("instance {} is {}", self.id, self.state.as_str()))
    }

    fn state_label(&self) -> String {
        self.state.as_str().to_string()
    }
}

/// A VPC, offered as a network
#[derive(Debug, Clone, PartialEq)]
pub struct VpcRecord {
    pub id: String,
    pub name: Option<String>,
    pub cidr: Option<String>,
    pub available: bool,
}

/// An EBS volume, offered as storage
#[derive(Debug, Clone, PartialEq)]
pub struct VolumeRecord {
    pub id: String,
    pub name: Option<String>,
    pub size_gb: Option<i32>,
    pub state: String,
    pub availability_zone: Option<String>,
}

impl VolumeRecord {
    /// Canonical storage state
    pub fn occi_state(&self) -> &'static str {
        match self.state.as_str() {
            "available" | "in-use" => "online",
            "error" => "error",
            _ => "offline",
        }
    }
}

/// An AMI, offered as an OS template
#[derive(Debug, Clone, PartialEq)]
pub struct ImageRecord {
    pub id: String,
    pub name: Option<String>,
}

/// Parameters of `RunInstances`
#[derive(Debug, Clone, PartialEq)]
pub struct RunRequest {
    pub image_id: String,
    pub instance_type: String,
    pub name: Option<String>,
    pub availability_zone: Option<String>,
}

/// Parameters of a new VPC with one subnet spanning it
#[derive(Debug, Clone, PartialEq)]
pub struct NetworkRequest {
    pub cidr: String,
    pub name: Option<String>,
    pub availability_zone: Option<String>,
}

/// Parameters of `CreateVolume`
#[derive(Debug, Clone, PartialEq)]
pub struct VolumeRequest {
    pub size_gb: i32,
    pub availability_zone: String,
    pub name: Option<String>,
}
