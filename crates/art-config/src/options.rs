//! Process-wide run options
//!
//! Loaded once at start-up from a YAML file and read-only afterwards.
//!
//! ```yaml
//! engine: rest
//! api:
//!   host: engine.example.com
//!   user: admin
//!   password: !secret engine_password
//!   ca_file: /etc/pki/engine/ca.pem
//! validation:
//!   validate_responses: true
//! cli:
//!   dialect: ovirt
//! ```

use crate::error::{ConfigError, ConfigResult};
use crate::loader::YamlLoader;
use art_core::BackendKind;
use serde::{Deserialize, Serialize};
use std::path::{Path, PathBuf};
use std::sync::{Arc, OnceLock};
use std::time::Duration;
use tracing::info;

static OPTIONS: OnceLock<Arc<RunOptions>> = OnceLock::new();

/// Everything an adapter needs to reach and talk to the engine
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct RunOptions {
    #[serde(default = "default_engine")]
    pub engine: BackendKind,

    pub api: ApiOptions,

    #[serde(default)]
    pub validation: ValidationOptions,

    #[serde(default)]
    pub cli: CliOptions,

    #[serde(default)]
    pub bridge: BridgeOptions,

    /// Default delay between status polls
    #[serde(default = "default_poll_interval")]
    pub poll_interval_secs: u64,
}

/// Engine coordinates and session behaviour
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct ApiOptions {
    #[serde(default = "default_scheme")]
    pub scheme: String,

    pub host: String,

    #[serde(default)]
    pub port: Option<u16>,

    #[serde(default = "default_entry_point")]
    pub entry_point: String,

    pub user: String,

    #[serde(default = "default_domain")]
    pub domain: String,

    #[serde(default)]
    pub password: String,

    /// CA bundle used to verify the engine certificate
    #[serde(default)]
    pub ca_file: Option<PathBuf>,

    /// Skip certificate verification
    #[serde(default)]
    pub insecure: bool,

    #[serde(default = "default_true")]
    pub persistent_auth: bool,

    #[serde(default = "default_session_ttl")]
    pub session_ttl_minutes: u32,

    /// Run as a filtered (non-admin) user
    #[serde(default)]
    pub filter: bool,

    #[serde(default = "default_request_timeout")]
    pub request_timeout_secs: u64,
}

#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct ValidationOptions {
    /// XSD to load instead of the bundled one
    #[serde(default)]
    pub schema_path: Option<PathBuf>,

    #[serde(default = "default_true")]
    pub validate_responses: bool,

    /// Compare sent and returned entities after create/update
    #[serde(default = "default_true")]
    pub compare: bool,

    /// Probe CLI help to drop unknown flags before sending a command
    #[serde(default)]
    pub cli_validate_commands: bool,
}

#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct CliOptions {
    #[serde(default = "default_cli_tool")]
    pub tool: String,

    /// Shell dialect: `ovirt` or `rhevm`
    #[serde(default = "default_dialect")]
    pub dialect: String,

    #[serde(default = "default_command_timeout")]
    pub command_timeout_secs: u64,

    /// File each command's output is redirected to
    #[serde(default = "default_output_file")]
    pub output_file: PathBuf,

    /// How long to wait for the output file to stop growing
    #[serde(default = "default_settle_timeout")]
    pub output_settle_timeout_secs: u64,

    #[serde(default)]
    pub log_file: Option<PathBuf>,
}

#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct BridgeOptions {
    #[serde(default)]
    pub classpath: Vec<String>,

    #[serde(default = "default_api_class")]
    pub api_class: String,

    #[serde(default = "default_entities_package")]
    pub entities_package: String,

    /// Explicit JVM library; JPype's default lookup otherwise
    #[serde(default)]
    pub jvm_path: Option<PathBuf>,
}

fn default_engine() -> BackendKind {
    BackendKind::Rest
}

fn default_poll_interval() -> u64 {
    10
}

fn default_scheme() -> String {
    "https".to_string()
}

fn default_entry_point() -> String {
    "api".to_string()
}

fn default_domain() -> String {
    "internal".to_string()
}

fn default_true() -> bool {
    true
}

fn default_session_ttl() -> u32 {
    30
}

fn default_request_timeout() -> u64 {
    180
}

fn default_cli_tool() -> String {
    "ovirt-shell".to_string()
}

fn default_dialect() -> String {
    "ovirt".to_string()
}

fn default_command_timeout() -> u64 {
    300
}

fn default_output_file() -> PathBuf {
    std::env::temp_dir().join("art_cli_output")
}

fn default_settle_timeout() -> u64 {
    10
}

fn default_api_class() -> String {
    "org.ovirt.engine.sdk.Api".to_string()
}

fn default_entities_package() -> String {
    "org.ovirt.engine.sdk.entities".to_string()
}

impl Default for ValidationOptions {
    fn default() -> Self {
        Self {
            schema_path: None,
            validate_responses: true,
            compare: true,
            cli_validate_commands: false,
        }
    }
}

impl Default for CliOptions {
    fn default() -> Self {
        Self {
            tool: default_cli_tool(),
            dialect: default_dialect(),
            command_timeout_secs: default_command_timeout(),
            output_file: default_output_file(),
            output_settle_timeout_secs: default_settle_timeout(),
            log_file: None,
        }
    }
}

impl Default for BridgeOptions {
    fn default() -> Self {
        Self {
            classpath: Vec::new(),
            api_class: default_api_class(),
            entities_package: default_entities_package(),
            jvm_path: None,
        }
    }
}

impl ApiOptions {
    /// Options for `user@domain` on `host` with every other field defaulted
    pub fn new(host: impl Into<String>, user: impl Into<String>) -> Self {
        Self {
            scheme: default_scheme(),
            host: host.into(),
            port: None,
            entry_point: default_entry_point(),
            user: user.into(),
            domain: default_domain(),
            password: String::new(),
            ca_file: None,
            insecure: false,
            persistent_auth: true,
            session_ttl_minutes: default_session_ttl(),
            filter: false,
            request_timeout_secs: default_request_timeout(),
        }
    }

    pub fn port(&self) -> u16 {
        self.port
            .unwrap_or(if self.scheme == "http" { 80 } else { 443 })
    }

    /// `scheme://host:port`
    pub fn origin(&self) -> String {
        format!("{}://{}:{}", self.scheme, self.host, self.port())
    }

    /// Root URL of the API, e.g. `https://engine:443/api`
    pub fn base_url(&self) -> String {
        format!("{}/{}", self.origin(), self.entry_point.trim_matches('/'))
    }

    /// Login name as the engine expects it
    pub fn login_name(&self) -> String {
        if self.domain.is_empty() {
            self.user.clone()
        } else {
            format!("{}@{}", self.user, self.domain)
        }
    }

    pub fn request_timeout(&self) -> Duration {
        Duration::from_secs(self.request_timeout_secs)
    }
}

impl CliOptions {
    pub fn command_timeout(&self) -> Duration {
        Duration::from_secs(self.command_timeout_secs)
    }

    pub fn output_settle_timeout(&self) -> Duration {
        Duration::from_secs(self.output_settle_timeout_secs)
    }
}

impl RunOptions {
    /// Defaults for everything except the engine coordinates
    pub fn new(engine: BackendKind, api: ApiOptions) -> Self {
        Self {
            engine,
            api,
            validation: ValidationOptions::default(),
            cli: CliOptions::default(),
            bridge: BridgeOptions::default(),
            poll_interval_secs: default_poll_interval(),
        }
    }

    /// Load options from a YAML file; `secrets.yaml` is looked up beside it
    pub fn load(path: &Path) -> ConfigResult<Self> {
        let config_dir = path
            .parent()
            .filter(|p| !p.as_os_str().is_empty())
            .unwrap_or_else(|| Path::new("."));
        let mut loader = YamlLoader::new(config_dir)?;
        let value = loader.load_file(path.file_name().map(Path::new).unwrap_or(path))?;
        Self::from_value(value)
    }

    /// Build options from already loaded YAML
    pub fn from_value(value: serde_yaml::Value) -> ConfigResult<Self> {
        let options: RunOptions =
            serde_yaml::from_value(value).map_err(ConfigError::Deserialize)?;
        options.validate()?;
        Ok(options)
    }

    pub fn validate(&self) -> ConfigResult<()> {
        let mut problems = Vec::new();
        if self.api.host.trim().is_empty() {
            problems.push("api.host is empty");
        }
        if self.api.user.trim().is_empty() {
            problems.push("api.user is empty");
        }
        if !matches!(self.api.scheme.as_str(), "http" | "https") {
            problems.push("api.scheme must be http or https");
        }
        if self.api.request_timeout_secs == 0 {
            problems.push("api.request_timeout_secs must be positive");
        }
        if self.cli.command_timeout_secs == 0 {
            problems.push("cli.command_timeout_secs must be positive");
        }
        if !matches!(self.cli.dialect.as_str(), "ovirt" | "rhevm") {
            problems.push("cli.dialect must be ovirt or rhevm");
        }
        if self.poll_interval_secs == 0 {
            problems.push("poll_interval_secs must be positive");
        }

        if problems.is_empty() {
            Ok(())
        } else {
            Err(ConfigError::ValidationFailed {
                message: problems.join("; "),
            })
        }
    }

    pub fn poll_interval(&self) -> Duration {
        Duration::from_secs(self.poll_interval_secs)
    }
}

/// Install the process-wide options. Fails if they were already installed.
pub fn init(options: RunOptions) -> ConfigResult<Arc<RunOptions>> {
    let options = Arc::new(options);
    OPTIONS
        .set(options.clone())
        .map_err(|_| ConfigError::AlreadyInitialized)?;
    info!(
        engine = %options.engine,
        url = %options.api.base_url(),
        user = %options.api.login_name(),
        "Run options initialized"
    );
    Ok(options)
}

/// The process-wide options
pub fn options() -> ConfigResult<Arc<RunOptions>> {
    OPTIONS.get().cloned().ok_or(ConfigError::NotInitialized)
}

pub fn is_initialized() -> bool {
    OPTIONS.get().is_some()
}

#[cfg(test)]
mod tests {
    use super::*;
    use std::fs;
    use tempfile::TempDir;

    #[test]
    fn test_load_with_defaults() {
        let dir = TempDir::new().unwrap();
        fs::write(dir.path().join("secrets.yaml"), "engine_password: pw\n").unwrap();
        fs::write(
            dir.path().join("run.yaml"),
            "engine: cli\napi:\n  host: engine.lab\n  user: admin\n  password: !secret engine_password\n",
        )
        .unwrap();

        let options = RunOptions::load(&dir.path().join("run.yaml")).unwrap();
        assert_eq!(options.engine, BackendKind::Cli);
        assert_eq!(options.api.password, "pw");
        assert_eq!(options.api.base_url(), "https://engine.lab:443/api");
        assert_eq!(options.api.login_name(), "admin@internal");
        assert!(options.api.persistent_auth);
        assert!(options.validation.validate_responses);
        assert!(!options.validation.cli_validate_commands);
        assert_eq!(options.cli.dialect, "ovirt");
        assert_eq!(options.poll_interval(), Duration::from_secs(10));
    }

    #[test]
    fn test_java_engine_name() {
        let value: serde_yaml::Value =
            serde_yaml::from_str("engine: java\napi: {host: h, user: u}\n").unwrap();
        let options = RunOptions::from_value(value).unwrap();
        assert_eq!(options.engine, BackendKind::Bridged);
    }

    #[test]
    fn test_validation_collects_problems() {
        let value: serde_yaml::Value = serde_yaml::from_str(
            "api: {host: '', user: u, scheme: ftp}\ncli: {dialect: bash}\n",
        )
        .unwrap();
        match RunOptions::from_value(value) {
            Err(ConfigError::ValidationFailed { message }) => {
                assert!(message.contains("api.host"));
                assert!(message.contains("api.scheme"));
                assert!(message.contains("cli.dialect"));
            }
            other => panic!("expected validation failure, got {:?}", other),
        }
    }

    #[test]
    fn test_unknown_engine_rejected() {
        let value: serde_yaml::Value =
            serde_yaml::from_str("engine: soap\napi: {host: h, user: u}\n").unwrap();
        assert!(matches!(
            RunOptions::from_value(value),
            Err(ConfigError::Deserialize(_))
        ));
    }

    #[test]
    fn test_plain_http_port() {
        let mut api = ApiOptions::new("localhost", "admin");
        api.scheme = "http".to_string();
        api.entry_point = "/ovirt-engine/api/".to_string();
        assert_eq!(api.base_url(), "http://localhost:80/ovirt-engine/api");
    }

    #[test]
    fn test_global_init_once() {
        let run = RunOptions::new(BackendKind::Rest, ApiOptions::new("h", "u"));
        init(run.clone()).unwrap();
        assert!(is_initialized());
        assert_eq!(options().unwrap().api.host, "h");
        assert!(matches!(init(run), Err(ConfigError::AlreadyInitialized)));
    }
}
