//! Shell command templating
//!
//! `<verb> <type> [identifier] [action] [--flag value]...`. Nested entity
//! attributes flatten into `parent-child` flags.

use art_core::{Entity, Value};
use std::time::Duration;
use tracing::debug;

#[derive(Debug, Clone, PartialEq)]
pub struct CliCommand {
    verb: String,
    type_name: String,
    identifier: Option<String>,
    action: Option<String>,
    /// `None` renders a bare switch
    flags: Vec<(String, Option<String>)>,
    /// Overrides the session's command timeout
    deadline: Option<Duration>,
}

impl CliCommand {
    pub fn new(verb: impl Into<String>, type_name: impl Into<String>) -> Self {
        Self {
            verb: verb.into(),
            type_name: type_name.into(),
            identifier: None,
            action: None,
            flags: Vec::new(),
            deadline: None,
        }
    }

    pub fn identifier(mut self, identifier: impl Into<String>) -> Self {
        self.identifier = Some(identifier.into());
        self
    }

    pub fn action(mut self, action: impl Into<String>) -> Self {
        self.action = Some(action.into());
        self
    }

    pub fn deadline(mut self, timeout: Option<Duration>) -> Self {
        self.deadline = timeout;
        self
    }

    /// Add `--name value`; a flag given twice keeps the last value
    pub fn flag(mut self, name: impl Into<String>, value: impl Into<String>) -> Self {
        self.set_flag(name.into(), Some(value.into()));
        self
    }

    /// Add a bare `--name`
    pub fn switch(mut self, name: impl Into<String>) -> Self {
        self.set_flag(name.into(), None);
        self
    }

    fn set_flag(&mut self, name: String, value: Option<String>) {
        match self.flags.iter_mut().find(|(n, _)| *n == name) {
            Some(slot) => slot.1 = value,
            None => self.flags.push((name, value)),
        }
    }

    /// Add one flag per scalar attribute of `entity`
    pub fn entity_flags(mut self, entity: &Entity) -> Self {
        let mut flags = Vec::new();
        flatten(entity, "", &mut flags);
        for (name, value) in flags {
            self = self.flag(name, value);
        }
        self
    }

    pub fn params(mut self, params: &[(String, String)]) -> Self {
        for (name, value) in params {
            self = self.flag(name.as_str(), value.as_str());
        }
        self
    }

    pub fn verb(&self) -> &str {
        &self.verb
    }

    pub fn type_name(&self) -> &str {
        &self.type_name
    }

    pub fn timeout(&self) -> Option<Duration> {
        self.deadline
    }

    /// Whether the command changes engine state
    pub fn is_mutating(&self) -> bool {
        matches!(self.verb.as_str(), "add" | "update" | "remove" | "action")
    }

    pub fn flags(&self) -> &[(String, Option<String>)] {
        &self.flags
    }

    /// Drop flags `keep` rejects, returning their names
    pub fn retain_flags(&mut self, mut keep: impl FnMut(&str) -> bool) -> Vec<String> {
        let mut dropped = Vec::new();
        self.flags.retain(|(name, _)| {
            let kept = keep(name);
            if !kept {
                dropped.push(name.clone());
            }
            kept
        });
        dropped
    }

    pub fn render(&self) -> String {
        let mut line = format!("{} {}", self.verb, self.type_name);
        if let Some(identifier) = &self.identifier {
            line.push(' ');
            line.push_str(&quote(identifier));
        }
        if let Some(action) = &self.action {
            line.push(' ');
            line.push_str(action);
        }
        for (name, value) in &self.flags {
            match value {
                Some(value) => line.push_str(&format!(" --{} {}", name, quote(value))),
                None => line.push_str(&format!(" --{}", name)),
            }
        }
        line
    }
}

impl std::fmt::Display for CliCommand {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.write_str(&self.render())
    }
}

fn flatten(entity: &Entity, prefix: &str, out: &mut Vec<(String, String)>) {
    if !prefix.is_empty() {
        if let Some(id) = entity.id() {
            out.push((format!("{}id", prefix), id.to_string()));
        }
    }
    for (name, value) in entity.attributes() {
        let flag = format!("{}{}", prefix, name);
        match value {
            Value::Entity(nested) => flatten(nested, &format!("{}-", flag), out),
            Value::List(items) if items.iter().all(Value::is_scalar) => {
                let joined = items
                    .iter()
                    .filter_map(Value::scalar_string)
                    .collect::<Vec<_>>()
                    .join(",");
                out.push((flag, joined));
            }
            Value::List(_) => debug!(attribute = %flag, "Skipping list of entities"),
            scalar => {
                if let Some(text) = scalar.scalar_string() {
                    out.push((flag, text));
                }
            }
        }
    }
}

/// Quote a value for the shell's argument parser when needed
pub fn quote(value: &str) -> String {
    let plain = !value.is_empty()
        && value
            .chars()
            .all(|c| c.is_ascii_alphanumeric() || "-_.,:/@=+".contains(c));
    if plain {
        value.to_string()
    } else {
        format!("\"{}\"", value.replace('\\', "\\\\").replace('"', "\\\""))
    }
}
