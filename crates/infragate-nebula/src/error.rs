//! OpenNebula backend error types

use infragate_core::BackendError;
use thiserror::Error;

#[derive(Error, Debug)]
pub enum NebulaError {
    #[error("{0} not found. Install the OpenNebula CLI tools or set nebula.bin_dir")]
    CliNotFound(String),

    #[error("{command} failed: {stderr}")]
    CommandFailed { command: String, stderr: String },

    #[error("Object not found: {0}")]
    NotFound(String),

    #[error("Unexpected CLI output: {0}")]
    UnexpectedOutput(String),

    #[error("Template render error: {0}")]
    Template(String),

    #[error("JSON parse error: {0}")]
    JsonError(#[from] serde_json::Error),

    #[error("IO error: {0}")]
    IoError(#[from] std::io::Error),
}

impl NebulaError {
    /// Maps onto the backend error space.
    ///
    /// `wrap` builds the variant for failures of the calling operation
    /// (create, action or retrieval); a missing object is always
    /// `EntityNotFound`.
    pub fn classify(self, wrap: fn(String) -> BackendError) -> BackendError {
        match self {
            NebulaError::NotFound(msg) => BackendError::EntityNotFound(msg),
            NebulaError::CliNotFound(_) => BackendError::Configuration(self.to_string()),
            other => wrap(other.to_string()),
        }
    }
}

pub type Result<T> = std::result::Result<T, NebulaError>;
