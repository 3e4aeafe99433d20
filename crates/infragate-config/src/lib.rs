pub mod error;
pub mod model;

pub use error::*;
pub use model::*;

use std::path::{Path, PathBuf};

const CANDIDATES: [&str; 4] = [
    "infragate.local.yaml",
    ".infragate.local.yaml",
    "infragate.yaml",
    ".infragate.yaml",
];

/// Global configuration directory (`~/.config/infragate`)
pub fn get_config_dir() -> Option<PathBuf> {
    dirs::config_dir().map(|dir| dir.join("infragate"))
}

/// Finds the gateway configuration file
///
/// Search order:
/// 1. `INFRAGATE_CONFIG_PATH` environment variable
/// 2. current directory: infragate.local.yaml, .infragate.local.yaml, infragate.yaml, .infragate.yaml
/// 3. the same names inside `./.infragate/`
/// 4. `~/.config/infragate/infragate.yaml`
pub fn find_config_file() -> Result<PathBuf> {
    if let Ok(config_path) = std::env::var("INFRAGATE_CONFIG_PATH") {
        let path = PathBuf::from(config_path);
        if path.exists() {
            return Ok(path);
        }
        tracing::warn!(
            "INFRAGATE_CONFIG_PATH points to {} which does not exist",
            path.display()
        );
    }

    let current_dir = std::env::current_dir()?;

    for filename in &CANDIDATES {
        let path = current_dir.join(filename);
        if path.exists() {
            return Ok(path);
        }
    }

    let project_dir = current_dir.join(".infragate");
    if project_dir.is_dir() {
        for filename in &CANDIDATES {
            let path = project_dir.join(filename);
            if path.exists() {
                return Ok(path);
            }
        }
    }

    if let Some(config_dir) = get_config_dir() {
        let global_config = config_dir.join("infragate.yaml");
        if global_config.exists() {
            return Ok(global_config);
        }
    }

    Err(ConfigError::ConfigFileNotFound)
}

/// Reads and validates one configuration file
pub fn load_config(path: &Path) -> Result<GatewayConfig> {
    if !path.exists() {
        return Err(ConfigError::MissingFile(path.to_path_buf()));
    }
    let content = std::fs::read_to_string(path)?;
    let mut config = GatewayConfig::from_yaml(&content, path)?;
    if let Some(base) = path.parent() {
        config.resolve_paths(base);
    }
    config.validate()?;
    Ok(config)
}

/// Loads the explicit file, or the discovered one, or falls back to defaults.
///
/// Returns the path that was used, if any.
pub fn load_or_default(explicit: Option<&Path>) -> Result<(GatewayConfig, Option<PathBuf>)> {
    let path = match explicit {
        Some(path) => path.to_path_buf(),
        None => match find_config_file() {
            Ok(path) => path,
            Err(ConfigError::ConfigFileNotFound) => {
                tracing::debug!("No configuration file found, using defaults");
                return Ok((GatewayConfig::default(), None));
            }
            Err(e) => return Err(e),
        },
    };

    tracing::debug!("Loading configuration from {}", path.display());
    let config = load_config(&path)?;
    Ok((config, Some(path)))
}
