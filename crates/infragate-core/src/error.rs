//! Backend error types
//!
//! Every failure crossing the adapter boundary is one of these variants.
//! They stay distinguishable all the way to the caller so the transport layer
//! can pick the matching response.

use thiserror::Error;

/// Errors raised by the proxy, the framework helpers and the adapters
#[derive(Error, Debug)]
pub enum BackendError {
    #[error("Kind not found: {0}")]
    KindNotFound(String),

    #[error("Identifier not valid: {0}")]
    IdentifierNotValid(String),

    #[error("Resource not valid: {0}")]
    ResourceNotValid(String),

    #[error("Entity not found: {0}")]
    EntityNotFound(String),

    #[error("Entity creation failed: {0}")]
    EntityCreate(String),

    #[error("Entity action failed: {0}")]
    EntityAction(String),

    #[error("Entity retrieval failed: {0}")]
    EntityRetrieval(String),

    #[error("Remote error: {0}")]
    Remote(String),

    #[error("Method not implemented: {0}")]
    MethodNotImplemented(String),

    #[error("Action not implemented: {0}")]
    ActionNotImplemented(String),

    #[error("User not authorized: {0}")]
    UserNotAuthorized(String),

    #[error("Configuration error: {0}")]
    Configuration(String),

    #[error("Operation cancelled: {0}")]
    Cancelled(String),

    #[error("IO error: {0}")]
    Io(#[from] std::io::Error),

    #[error("JSON error: {0}")]
    Json(#[from] serde_json::Error),
}

/// Coarse classification used by the boundary layer to select a response
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum ErrorClass {
    /// Malformed request, detected before any backend call
    Validation,
    /// Unknown kind or identifier
    NotFound,
    /// Synchronous backend rejection of a create/action/retrieval call
    Failure,
    /// Backend failed outright, wait timed out or observed an error state
    Remote,
    /// Deliberately unsupported here, will never succeed
    NotImplemented,
    Unauthorized,
    Internal,
}

impl BackendError {
    pub fn class(&self) -> ErrorClass {
        match self {
            BackendError::IdentifierNotValid(_) | BackendError::ResourceNotValid(_) => {
                ErrorClass::Validation
            }
            BackendError::KindNotFound(_) | BackendError::EntityNotFound(_) => {
                ErrorClass::NotFound
            }
            BackendError::EntityCreate(_)
            | BackendError::EntityAction(_)
            | BackendError::EntityRetrieval(_) => ErrorClass::Failure,
            BackendError::Remote(_) | BackendError::Cancelled(_) => ErrorClass::Remote,
            BackendError::MethodNotImplemented(_) | BackendError::ActionNotImplemented(_) => {
                ErrorClass::NotImplemented
            }
            BackendError::UserNotAuthorized(_) => ErrorClass::Unauthorized,
            BackendError::Configuration(_) | BackendError::Io(_) | BackendError::Json(_) => {
                ErrorClass::Internal
            }
        }
    }

    pub fn is_not_found(&self) -> bool {
        matches!(self, BackendError::EntityNotFound(_))
    }
}

pub type Result<T> = std::result::Result<T, BackendError>;

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_classes_stay_distinct() {
        assert_eq!(
            BackendError::KindNotFound("bogus".into()).class(),
            ErrorClass::NotFound
        );
        assert_eq!(
            BackendError::ResourceNotValid("no os_tpl".into()).class(),
            ErrorClass::Validation
        );
        assert_eq!(
            BackendError::ActionNotImplemented("x".into()).class(),
            ErrorClass::NotImplemented
        );
        assert_eq!(
            BackendError::Remote("timeout".into()).class(),
            ErrorClass::Remote
        );
        assert_eq!(
            BackendError::EntityCreate("rejected".into()).class(),
            ErrorClass::Failure
        );
    }

    #[test]
    fn test_detail_is_preserved() {
        let err = BackendError::EntityAction("VM 42 is locked".into());
        assert_eq!(err.to_string(), "Entity action failed: VM 42 is locked");
    }
}
