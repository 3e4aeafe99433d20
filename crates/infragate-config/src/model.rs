//! Gateway configuration model

use crate::error::{ConfigError, Result};
use infragate_core::WaitConfig;
use serde::{Deserialize, Serialize};
use std::fmt;
use std::path::{Path, PathBuf};
use std::str::FromStr;

/// Backend platform served by the gateway
#[derive(Debug, Clone, Copy, Default, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "lowercase")]
pub enum BackendKind {
    #[default]
    Dummy,
    Nebula,
    Ec2,
}

impl fmt::Display for BackendKind {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        let name = match self {
            BackendKind::Dummy => "dummy",
            BackendKind::Nebula => "nebula",
            BackendKind::Ec2 => "ec2",
        };
        f.write_str(name)
    }
}

impl FromStr for BackendKind {
    type Err = ConfigError;

    fn from_str(s: &str) -> Result<Self> {
        match s.to_ascii_lowercase().as_str() {
            "dummy" => Ok(BackendKind::Dummy),
            "nebula" | "opennebula" => Ok(BackendKind::Nebula),
            "ec2" | "aws" => Ok(BackendKind::Ec2),
            other => Err(ConfigError::UnknownBackend(other.to_string())),
        }
    }
}

/// Test double settings
#[derive(Debug, Clone, Default, PartialEq, Serialize, Deserialize)]
#[serde(default)]
pub struct DummyConfig {
    /// Directory holding compute.json, network.json, storage.json,
    /// os_tpl.json and resource_tpl.json. Empty store when unset.
    pub fixtures_dir: Option<PathBuf>,
}

/// OpenNebula CLI settings
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(default)]
pub struct NebulaConfig {
    /// XML-RPC endpoint passed as `--endpoint`
    pub endpoint: Option<String>,
    pub user: Option<String>,
    pub password: Option<String>,

    /// Datastore for new images
    pub datastore: Option<String>,

    /// Region reported on every link entity
    pub region: String,

    /// Directory of the `one*` binaries; `PATH` lookup when unset
    pub bin_dir: Option<PathBuf>,
}

impl Default for NebulaConfig {
    fn default() -> Self {
        Self {
            endpoint: None,
            user: None,
            password: None,
            datastore: None,
            region: "default".to_string(),
            bin_dir: None,
        }
    }
}

/// Amazon EC2 settings
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(default)]
pub struct Ec2Config {
    /// Falls back to the SDK's default provider chain when unset
    pub region: Option<String>,

    /// Creating VPCs is refused unless enabled
    pub network_create_allowed: bool,

    /// Availability zone for new subnets and volumes
    pub availability_zone: Option<String>,

    /// Image owners whose AMIs are offered as OS templates
    pub image_owners: Vec<String>,

    /// Instance types offered as resource templates
    pub instance_types: Vec<String>,
}

impl Default for Ec2Config {
    fn default() -> Self {
        Self {
            region: None,
            network_create_allowed: false,
            availability_zone: None,
            image_owners: vec!["self".to_string()],
            instance_types: ["t2.micro", "t2.small", "t2.medium", "m5.large"]
                .iter()
                .map(|s| s.to_string())
                .collect(),
        }
    }
}

/// Root of `infragate.yaml`
#[derive(Debug, Clone, Default, PartialEq, Serialize, Deserialize)]
#[serde(default)]
pub struct GatewayConfig {
    pub backend: BackendKind,
    pub wait: WaitConfig,
    pub dummy: DummyConfig,
    pub nebula: NebulaConfig,
    pub ec2: Ec2Config,
}

impl GatewayConfig {
    pub fn from_yaml(content: &str, path: &Path) -> Result<Self> {
        serde_yaml::from_str(content).map_err(|source| ConfigError::Parse {
            path: path.to_path_buf(),
            source,
        })
    }

    /// Rejects settings the backends cannot work with
    pub fn validate(&self) -> Result<()> {
        if self.wait.max_polls == 0 {
            return Err(ConfigError::Invalid("wait.max_polls must be at least 1".into()));
        }
        if self.wait.multiplier < 1.0 {
            return Err(ConfigError::Invalid("wait.multiplier must be >= 1.0".into()));
        }
        if self.wait.max_interval_ms < self.wait.interval_ms {
            return Err(ConfigError::Invalid(
                "wait.max_interval_ms must not be below wait.interval_ms".into(),
            ));
        }
        if self.nebula.region.is_empty() {
            return Err(ConfigError::Invalid("nebula.region must not be empty".into()));
        }
        Ok(())
    }

    /// Makes relative paths relative to the directory of the config file
    pub fn resolve_paths(&mut self, base: &Path) {
        if let Some(dir) = &self.dummy.fixtures_dir
            && dir.is_relative()
        {
            self.dummy.fixtures_dir = Some(base.join(dir));
        }
        if let Some(dir) = &self.nebula.bin_dir
            && dir.is_relative()
        {
            self.nebula.bin_dir = Some(base.join(dir));
        }
    }
}
