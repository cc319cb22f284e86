//! Credentials kept out of the main options file
//!
//! `secrets.yaml` sits next to the options file and maps names to values,
//! which `!secret name` tags pull in.

use crate::error::{ConfigError, ConfigResult};
use std::collections::HashMap;
use std::fs;
use std::path::{Path, PathBuf};
use tracing::debug;

pub const SECRETS_FILE: &str = "secrets.yaml";

/// Secrets store loaded from `secrets.yaml`
#[derive(Debug, Clone)]
pub struct Secrets {
    values: HashMap<String, String>,
    path: PathBuf,
}

impl Secrets {
    /// Load `secrets.yaml` from `config_dir`; a missing file is an empty store
    pub fn load(config_dir: &Path) -> ConfigResult<Self> {
        let path = config_dir.join(SECRETS_FILE);
        if !path.exists() {
            debug!(path = %path.display(), "No secrets file, using empty secrets");
            return Ok(Self {
                values: HashMap::new(),
                path,
            });
        }

        let content = fs::read_to_string(&path).map_err(|e| ConfigError::ReadFile {
            path: path.clone(),
            source: e,
        })?;
        let mut secrets = Self::parse(&content, &path)?;
        secrets.path = path;
        debug!(count = secrets.len(), path = %secrets.path.display(), "Loaded secrets");
        Ok(secrets)
    }

    fn parse(content: &str, path: &Path) -> ConfigResult<Self> {
        let raw: Option<HashMap<String, serde_yaml::Value>> =
            serde_yaml::from_str(content).map_err(|e| ConfigError::ParseYaml {
                path: path.to_path_buf(),
                source: e,
            })?;

        let mut values = HashMap::new();
        for (key, value) in raw.unwrap_or_default() {
            let text = match value {
                serde_yaml::Value::String(s) => s,
                serde_yaml::Value::Number(n) => n.to_string(),
                serde_yaml::Value::Bool(b) => b.to_string(),
                serde_yaml::Value::Null => String::new(),
                _ => {
                    return Err(ConfigError::InvalidValue {
                        key,
                        reason: "secrets must be scalars".to_string(),
                    })
                }
            };
            values.insert(key, text);
        }

        Ok(Self {
            values,
            path: path.to_path_buf(),
        })
    }

    /// Store built from in-memory pairs
    pub fn from_pairs<I, K, V>(pairs: I) -> Self
    where
        I: IntoIterator<Item = (K, V)>,
        K: Into<String>,
        V: Into<String>,
    {
        Self {
            values: pairs
                .into_iter()
                .map(|(k, v)| (k.into(), v.into()))
                .collect(),
            path: PathBuf::from(SECRETS_FILE),
        }
    }

    pub fn get(&self, key: &str) -> ConfigResult<&str> {
        self.values
            .get(key)
            .map(String::as_str)
            .ok_or_else(|| ConfigError::SecretNotFound {
                key: key.to_string(),
                path: self.path.clone(),
            })
    }

    pub fn contains(&self, key: &str) -> bool {
        self.values.contains_key(key)
    }

    pub fn path(&self) -> &Path {
        &self.path
    }

    pub fn len(&self) -> usize {
        self.values.len()
    }

    pub fn is_empty(&self) -> bool {
        self.values.is_empty()
    }
}

impl Default for Secrets {
    fn default() -> Self {
        Self::from_pairs(std::iter::empty::<(String, String)>())
    }
}
