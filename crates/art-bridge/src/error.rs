//! Error types for the bridged SDK

use art_core::{ApiError, BackendKind, CommandErrorKind};
use std::time::Duration;
use thiserror::Error;

/// Errors raised while driving objects in the managed runtime
#[derive(Debug, Error)]
pub enum BridgeError {
    /// The interpreter or the managed runtime itself failed
    #[error("runtime error: {0}")]
    Runtime(String),

    /// Attaching the current thread to the runtime failed
    #[error("cannot attach thread: {0}")]
    Attach(String),

    #[error("{class} has no method '{method}'")]
    NoSuchMethod { class: String, method: String },

    /// A value could not be converted to what a method expects
    #[error("cannot convert '{attribute}': {reason}")]
    Conversion { attribute: String, reason: String },

    /// The SDK raised a server error
    #[error("engine rejected {method}: status {status}, {reason} {detail}")]
    Engine {
        method: String,
        status: u16,
        reason: String,
        detail: String,
    },

    #[error("{method} timed out after {elapsed:?}")]
    Timeout { method: String, elapsed: Duration },
}

pub type BridgeResult<T> = Result<T, BridgeError>;

impl BridgeError {
    pub fn conversion(attribute: impl Into<String>, reason: impl Into<String>) -> Self {
        BridgeError::Conversion {
            attribute: attribute.into(),
            reason: reason.into(),
        }
    }

    pub fn no_such_method(class: impl Into<String>, method: impl Into<String>) -> Self {
        BridgeError::NoSuchMethod {
            class: class.into(),
            method: method.into(),
        }
    }

    /// Map an error raised while connecting
    pub fn at_login(self) -> ApiError {
        match self {
            BridgeError::Timeout { method, elapsed } => ApiError::timeout(method, elapsed),
            other => ApiError::login(BackendKind::Bridged, other.to_string()),
        }
    }
}

impl From<BridgeError> for ApiError {
    fn from(err: BridgeError) -> Self {
        match err {
            BridgeError::Engine { status, .. } => ApiError::Command {
                kind: CommandErrorKind::Server(Some(status)),
                message: err.to_string(),
            },
            BridgeError::Timeout { method, elapsed } => ApiError::timeout(method, elapsed),
            BridgeError::NoSuchMethod { .. } => ApiError::Command {
                kind: CommandErrorKind::Syntax,
                message: err.to_string(),
            },
            BridgeError::Conversion { .. } => ApiError::Command {
                kind: CommandErrorKind::Parameter,
                message: err.to_string(),
            },
            BridgeError::Runtime(message) | BridgeError::Attach(message) => {
                ApiError::transport(BackendKind::Bridged, message)
            }
        }
    }
}

#[cfg(feature = "py_bridge")]
impl From<pyo3::PyErr> for BridgeError {
    fn from(err: pyo3::PyErr) -> Self {
        BridgeError::Runtime(err.to_string())
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_engine_errors_fold() {
        let err: ApiError = BridgeError::Engine {
            method: "add".into(),
            status: 400,
            reason: "Bad Request".into(),
            detail: "name in use".into(),
        }
        .into();
        assert!(!err.is_fatal());

        let err: ApiError = BridgeError::no_such_method("VM", "fly").into();
        assert!(!err.is_fatal());

        let err: ApiError = BridgeError::Timeout {
            method: "start".into(),
            elapsed: Duration::from_secs(1),
        }
        .into();
        assert!(err.is_fatal());
    }
}
