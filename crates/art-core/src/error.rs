//! Error taxonomy shared by every backend adapter

use crate::backend::BackendKind;
use std::fmt;
use std::time::Duration;
use thiserror::Error;

/// Result type for API layer operations
pub type ApiResult<T> = Result<T, ApiError>;

/// What kind of definite failure a CLI command reported
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum CommandErrorKind {
    /// Unknown or malformed option/parameter
    Parameter,
    /// The shell did not understand the command at all
    Syntax,
    /// The engine rejected the request (error block with a status code)
    Server(Option<u16>),
}

impl fmt::Display for CommandErrorKind {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match self {
            CommandErrorKind::Parameter => write!(f, "parameter error"),
            CommandErrorKind::Syntax => write!(f, "syntax error"),
            CommandErrorKind::Server(Some(status)) => write!(f, "server error {}", status),
            CommandErrorKind::Server(None) => write!(f, "server error"),
        }
    }
}

/// Errors that can occur while talking to the engine
#[derive(Debug, Error)]
pub enum ApiError {
    /// A poll, wait, request or command exceeded its deadline
    #[error("timed out after {elapsed:?}: {message}")]
    Timeout { message: String, elapsed: Duration },

    /// Zero matches, or an expected relation/attribute is absent
    #[error("entity not found: {0}")]
    EntityNotFound(String),

    /// More than one result where exactly one was required
    #[error("ambiguous match for {query}: {count} results")]
    AmbiguousMatch { query: String, count: usize },

    /// The backend reported a definite error
    #[error("{backend} request failed: {message}")]
    Transport { backend: BackendKind, message: String },

    /// The CLI shell rejected a command
    #[error("command failed ({kind}): {message}")]
    Command {
        kind: CommandErrorKind,
        message: String,
    },

    /// The remote shell process itself faulted
    #[error("remote process crashed:\n{0}")]
    ProtocolCrash(String),

    /// The requested feature is not implemented for this backend
    #[error("{feature} is not supported by the {backend} engine")]
    UnsupportedEngine {
        backend: BackendKind,
        feature: String,
    },

    /// Session establishment failed
    #[error("login to {backend} failed: {reason}")]
    LoginFailed { backend: BackendKind, reason: String },

    /// The element/collection pair is unknown to the schema
    #[error("unknown entity type '{element}' in collection '{collection}'")]
    UnknownEntityType { element: String, collection: String },

    /// Malformed XML
    #[error("XML error: {0}")]
    Xml(String),

    /// The schema itself could not be loaded or resolved
    #[error("schema error: {0}")]
    Schema(String),

    /// Session cache misuse
    #[error("session error: {0}")]
    Session(String),
}

impl ApiError {
    /// Create a timeout error
    pub fn timeout(message: impl Into<String>, elapsed: Duration) -> Self {
        ApiError::Timeout {
            message: message.into(),
            elapsed,
        }
    }

    /// Create a transport error for the given backend
    pub fn transport(backend: BackendKind, message: impl Into<String>) -> Self {
        ApiError::Transport {
            backend,
            message: message.into(),
        }
    }

    /// Create a login failure for the given backend
    pub fn login(backend: BackendKind, reason: impl Into<String>) -> Self {
        ApiError::LoginFailed {
            backend,
            reason: reason.into(),
        }
    }

    /// Create an unsupported-engine error
    pub fn unsupported(backend: BackendKind, feature: impl Into<String>) -> Self {
        ApiError::UnsupportedEngine {
            backend,
            feature: feature.into(),
        }
    }

    /// Errors no adapter can recover from locally.
    ///
    /// These propagate past the adapter boundary; everything else is folded
    /// into the boolean success contract.
    pub fn is_fatal(&self) -> bool {
        matches!(
            self,
            ApiError::Timeout { .. }
                | ApiError::ProtocolCrash(_)
                | ApiError::LoginFailed { .. }
                | ApiError::UnsupportedEngine { .. }
        )
    }

    pub fn is_timeout(&self) -> bool {
        matches!(self, ApiError::Timeout { .. })
    }
}
