//! Error types for loading run options

use std::path::PathBuf;
use thiserror::Error;

/// Result type for configuration operations
pub type ConfigResult<T> = Result<T, ConfigError>;

/// Errors that can occur while loading or reading run options
#[derive(Debug, Error)]
pub enum ConfigError {
    #[error("failed to read file {path}: {source}")]
    ReadFile {
        path: PathBuf,
        #[source]
        source: std::io::Error,
    },

    #[error("failed to parse YAML in {path}: {source}")]
    ParseYaml {
        path: PathBuf,
        #[source]
        source: serde_yaml::Error,
    },

    /// The YAML parsed but does not describe valid run options
    #[error("invalid run options: {0}")]
    Deserialize(#[source] serde_yaml::Error),

    #[error("secret '{key}' not found in {path}")]
    SecretNotFound { key: String, path: PathBuf },

    #[error("invalid include path '{path}': {reason}")]
    InvalidIncludePath { path: String, reason: String },

    #[error("circular include detected: {path}")]
    CircularInclude { path: PathBuf },

    #[error("environment variable '{var}' not set")]
    EnvVarNotFound { var: String },

    #[error("invalid value for '{key}': {reason}")]
    InvalidValue { key: String, reason: String },

    #[error("run options validation failed: {message}")]
    ValidationFailed { message: String },

    /// `init` was called twice in one process
    #[error("run options are already initialized")]
    AlreadyInitialized,

    /// `options` was called before `init`
    #[error("run options have not been initialized")]
    NotInitialized,
}
