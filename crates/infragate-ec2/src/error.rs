//! EC2 backend error types

use infragate_core::BackendError;
use thiserror::Error;

#[derive(Error, Debug)]
pub enum Ec2Error {
    /// `*.NotFound` error codes
    #[error("{0}")]
    NotFound(String),

    /// `*.Malformed` error codes and identifiers rejected before any call
    #[error("{0}")]
    Malformed(String),

    #[error("{operation} failed ({code}): {message}")]
    Api {
        operation: String,
        code: String,
        message: String,
    },

    #[error("{operation} returned no {field}")]
    MissingField {
        operation: &'static str,
        field: &'static str,
    },
}

impl Ec2Error {
    /// Maps onto the backend error space.
    ///
    /// `wrap` builds the variant for failures of the calling operation.
    pub fn classify(self, wrap: fn(String) -> BackendError) -> BackendError {
        match self {
            Ec2Error::NotFound(msg) => BackendError::EntityNotFound(msg),
            Ec2Error::Malformed(msg) => BackendError::IdentifierNotValid(msg),
            other => wrap(other.to_string()),
        }
    }

    /// Like `classify`, but a malformed identifier also counts as missing
    pub fn classify_lookup(self, wrap: fn(String) -> BackendError) -> BackendError {
        match self {
            Ec2Error::Malformed(msg) => BackendError::EntityNotFound(msg),
            other => other.classify(wrap),
        }
    }

    /// Classifies an AWS error code such as `InvalidInstanceID.NotFound`
    pub fn from_code(operation: &str, code: &str, message: String) -> Self {
        if code.ends_with(".NotFound") {
            Ec2Error::NotFound(message)
        } else if code.ends_with(".Malformed") {
            Ec2Error::Malformed(message)
        } else {
            Ec2Error::Api {
                operation: operation.to_string(),
                code: code.to_string(),
                message,
            }
        }
    }
}

pub type Result<T> = std::result::Result<T, Ec2Error>;

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_from_code() {
        let err = Ec2Error::from_code("TerminateInstances", "InvalidInstanceID.NotFound", "gone".into());
        assert!(matches!(err, Ec2Error::NotFound(_)));

        let err = Ec2Error::from_code("DeleteVpc", "InvalidVpcID.Malformed", "bad".into());
        assert!(matches!(err, Ec2Error::Malformed(_)));

        let err = Ec2Error::from_code("RunInstances", "InstanceLimitExceeded", "quota".into());
        assert_eq!(err.to_string(), "RunInstances failed (InstanceLimitExceeded): quota");
    }

    #[test]
    fn test_classify() {
        let malformed = || Ec2Error::Malformed("vpc-zz".into());
        assert!(matches!(
            malformed().classify(BackendError::EntityAction),
            BackendError::IdentifierNotValid(_)
        ));
        assert!(matches!(
            malformed().classify_lookup(BackendError::EntityAction),
            BackendError::EntityNotFound(_)
        ));

        let api = Ec2Error::Api {
            operation: "StopInstances".into(),
            code: "IncorrectInstanceState".into(),
            message: "not running".into(),
        };
        assert!(matches!(
            api.classify(BackendError::EntityAction),
            BackendError::EntityAction(msg) if msg.contains("IncorrectInstanceState")
        ));
    }
}
