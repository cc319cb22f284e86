//! Errors raised by SDK clients

use art_core::{ApiError, BackendKind, CommandErrorKind};
use std::time::Duration;
use thiserror::Error;

pub type SdkResult<T> = Result<T, SdkError>;

#[derive(Debug, Error)]
pub enum SdkError {
    /// The engine answered with an error status
    #[error("request failed with status {status}: {reason} {detail}")]
    Request {
        status: u16,
        reason: String,
        detail: String,
    },

    #[error("not authorized: {0}")]
    Unauthorized(String),

    #[error("connection failed: {0}")]
    Connection(String),

    #[error("{operation} timed out after {elapsed:?}")]
    Timeout { operation: String, elapsed: Duration },

    #[error("cannot decode response: {0}")]
    Decode(String),

    #[error("no such object: {0}")]
    NotFound(String),
}

impl SdkError {
    /// Map an error raised while logging in
    pub fn at_login(self) -> ApiError {
        match self {
            SdkError::Timeout { operation, elapsed } => ApiError::timeout(operation, elapsed),
            other => ApiError::login(BackendKind::Sdk, other.to_string()),
        }
    }
}

impl From<SdkError> for ApiError {
    fn from(err: SdkError) -> Self {
        match err {
            SdkError::Request { status, .. } => ApiError::Command {
                kind: CommandErrorKind::Server(Some(status)),
                message: err.to_string(),
            },
            SdkError::Unauthorized(reason) => ApiError::login(BackendKind::Sdk, reason),
            SdkError::Timeout { operation, elapsed } => ApiError::timeout(operation, elapsed),
            SdkError::NotFound(what) => ApiError::EntityNotFound(what),
            SdkError::Connection(message) | SdkError::Decode(message) => {
                ApiError::transport(BackendKind::Sdk, message)
            }
        }
    }
}

impl From<ApiError> for SdkError {
    fn from(err: ApiError) -> Self {
        match err {
            ApiError::Timeout { message, elapsed } => SdkError::Timeout {
                operation: message,
                elapsed,
            },
            ApiError::LoginFailed { reason, .. } => SdkError::Unauthorized(reason),
            ApiError::EntityNotFound(what) => SdkError::NotFound(what),
            ApiError::Xml(message) => SdkError::Decode(message),
            other => SdkError::Connection(other.to_string()),
        }
    }
}
