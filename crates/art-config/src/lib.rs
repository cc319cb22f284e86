//! Run options for the engine API layer
//!
//! Options are YAML with three custom tags:
//!
//! - `!include path` - Include another YAML file
//! - `!secret key` - Substitute from secrets.yaml
//! - `!env_var VAR [default]` - Environment variable substitution
//!
//! # Example
//!
//! ```ignore
//! use art_config::{init, RunOptions};
//!
//! let options = RunOptions::load(Path::new("/etc/art/run.yaml"))?;
//! init(options)?;
//! ```

mod error;
mod loader;
pub mod options;
mod secrets;

pub use error::{ConfigError, ConfigResult};
pub use loader::{load_yaml, load_yaml_string, YamlLoader};
pub use options::{
    init, is_initialized, options, ApiOptions, BridgeOptions, CliOptions, RunOptions,
    ValidationOptions,
};
pub use secrets::Secrets;
