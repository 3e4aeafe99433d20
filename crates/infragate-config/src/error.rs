use std::path::PathBuf;
use thiserror::Error;

#[derive(Error, Debug)]
pub enum ConfigError {
    #[error(
        "Configuration file not found. Looked in:\n\
        - current directory: infragate.local.yaml, .infragate.local.yaml, infragate.yaml, .infragate.yaml\n\
        - ./.infragate/ directory\n\
        - ~/.config/infragate/infragate.yaml\n\
        A path can also be given with the INFRAGATE_CONFIG_PATH environment variable"
    )]
    ConfigFileNotFound,

    #[error("Configuration file does not exist: {0}")]
    MissingFile(PathBuf),

    #[error("Failed to parse {path}: {source}")]
    Parse {
        path: PathBuf,
        #[source]
        source: serde_yaml::Error,
    },

    #[error("Invalid configuration: {0}")]
    Invalid(String),

    #[error("Unknown backend: {0} (expected dummy, nebula or ec2)")]
    UnknownBackend(String),

    #[error("IO error: {0}")]
    Io(#[from] std::io::Error),
}

pub type Result<T> = std::result::Result<T, ConfigError>;
