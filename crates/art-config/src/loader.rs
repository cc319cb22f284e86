//! YAML loading with the option-file tags
//!
//! - `!include path`: splice in another YAML file, relative to the including file
//! - `!secret key`: substitute a value from `secrets.yaml`
//! - `!env_var NAME [default]`: substitute an environment variable

use crate::error::{ConfigError, ConfigResult};
use crate::secrets::Secrets;
use serde_yaml::value::TaggedValue;
use serde_yaml::{Mapping, Value};
use std::fs;
use std::path::{Path, PathBuf};
use tracing::{debug, trace};

/// YAML loader resolving tags against one configuration directory
pub struct YamlLoader {
    config_dir: PathBuf,
    secrets: Secrets,
    /// Files currently being loaded, outermost first
    include_chain: Vec<PathBuf>,
}

impl YamlLoader {
    pub fn new(config_dir: impl Into<PathBuf>) -> ConfigResult<Self> {
        let config_dir = config_dir.into();
        let secrets = Secrets::load(&config_dir)?;
        Ok(Self::with_secrets(config_dir, secrets))
    }

    pub fn with_secrets(config_dir: impl Into<PathBuf>, secrets: Secrets) -> Self {
        Self {
            config_dir: config_dir.into(),
            secrets,
            include_chain: Vec::new(),
        }
    }

    /// Load a file, resolving relative paths against the config directory
    pub fn load_file(&mut self, path: impl AsRef<Path>) -> ConfigResult<Value> {
        let path = match path.as_ref() {
            p if p.is_absolute() => p.to_path_buf(),
            p => self.config_dir.join(p),
        };
        if self.include_chain.contains(&path) {
            return Err(ConfigError::CircularInclude { path });
        }
        debug!(path = %path.display(), "Loading YAML");

        let content = fs::read_to_string(&path).map_err(|e| ConfigError::ReadFile {
            path: path.clone(),
            source: e,
        })?;

        self.include_chain.push(path.clone());
        let result = self.load_string(&content, &path);
        self.include_chain.pop();
        result
    }

    /// Parse `content` as if it were read from `source`
    pub fn load_string(&mut self, content: &str, source: &Path) -> ConfigResult<Value> {
        let value: Value = serde_yaml::from_str(content).map_err(|e| ConfigError::ParseYaml {
            path: source.to_path_buf(),
            source: e,
        })?;
        self.resolve(value, source)
    }

    fn resolve(&mut self, value: Value, source: &Path) -> ConfigResult<Value> {
        match value {
            Value::Tagged(tagged) => self.resolve_tag(*tagged, source),
            Value::Mapping(map) => {
                let mut resolved = Mapping::with_capacity(map.len());
                for (key, value) in map {
                    resolved.insert(key, self.resolve(value, source)?);
                }
                Ok(Value::Mapping(resolved))
            }
            Value::Sequence(items) => items
                .into_iter()
                .map(|item| self.resolve(item, source))
                .collect::<ConfigResult<Vec<_>>>()
                .map(Value::Sequence),
            scalar => Ok(scalar),
        }
    }

    fn resolve_tag(&mut self, tagged: TaggedValue, source: &Path) -> ConfigResult<Value> {
        let tag = tagged.tag.to_string();
        trace!(%tag, value = ?tagged.value, "Resolving tag");

        match tag.as_str() {
            "!include" => {
                let target = tag_argument(&tag, &tagged.value)?;
                let base = source.parent().unwrap_or(&self.config_dir);
                let path = if Path::new(target).is_absolute() {
                    PathBuf::from(target)
                } else {
                    base.join(target)
                };
                self.load_file(path)
            }
            "!secret" => {
                let key = tag_argument(&tag, &tagged.value)?;
                let value = self.secrets.get(key)?;
                debug!(key, "Substituted secret");
                Ok(Value::String(value.to_string()))
            }
            "!env_var" => {
                let argument = tag_argument(&tag, &tagged.value)?;
                let (name, default) = match argument.split_once(char::is_whitespace) {
                    Some((name, default)) => (name, Some(default.trim())),
                    None => (argument, None),
                };
                match (std::env::var(name), default) {
                    (Ok(value), _) => Ok(Value::String(value)),
                    (Err(_), Some(default)) => Ok(Value::String(default.to_string())),
                    (Err(_), None) => Err(ConfigError::EnvVarNotFound {
                        var: name.to_string(),
                    }),
                }
            }
            _ => {
                let value = self.resolve(tagged.value, source)?;
                Ok(Value::Tagged(Box::new(TaggedValue {
                    tag: tagged.tag,
                    value,
                })))
            }
        }
    }

    pub fn secrets(&self) -> &Secrets {
        &self.secrets
    }

    pub fn config_dir(&self) -> &Path {
        &self.config_dir
    }
}

fn tag_argument<'a>(tag: &str, value: &'a Value) -> ConfigResult<&'a str> {
    match value {
        Value::String(s) => Ok(s.as_str()),
        other => Err(ConfigError::InvalidIncludePath {
            path: format!("{:?}", other),
            reason: format!("{} expects a string argument", tag),
        }),
    }
}

/// Load `file` from `config_dir` with tag processing
pub fn load_yaml(config_dir: impl Into<PathBuf>, file: impl AsRef<Path>) -> ConfigResult<Value> {
    YamlLoader::new(config_dir)?.load_file(file)
}

/// Load a YAML string with tag processing
pub fn load_yaml_string(
    config_dir: impl Into<PathBuf>,
    content: &str,
    source_name: &str,
) -> ConfigResult<Value> {
    let config_dir = config_dir.into();
    let source = config_dir.join(source_name);
    YamlLoader::new(config_dir)?.load_string(content, &source)
}
