//! Command pre-validation against the shell's own help text

use crate::command::CliCommand;
use art_core::ApiResult;
use dashmap::DashMap;
use regex::Regex;
use std::collections::HashSet;
use std::sync::Arc;
use tracing::{debug, warn};

/// Known `--flag` names per verb and type, filled from `help <verb> <type>`
#[derive(Debug)]
pub struct CommandValidator {
    flag_pattern: Regex,
    known: DashMap<(String, String), Arc<HashSet<String>>>,
}

impl CommandValidator {
    pub fn new(flag_pattern: Regex) -> Self {
        Self {
            flag_pattern,
            known: DashMap::new(),
        }
    }

    pub fn help_command(command: &CliCommand) -> String {
        format!("help {} {}", command.verb(), command.type_name())
    }

    pub fn parse_help(&self, help: &str) -> HashSet<String> {
        self.flag_pattern
            .captures_iter(help)
            .filter_map(|c| c.get(1).map(|m| m.as_str().to_string()))
            .collect()
    }

    /// Drop flags the shell does not know, probing help through `run` once per verb/type
    pub fn validate(
        &self,
        command: &mut CliCommand,
        run: impl FnOnce(&str) -> ApiResult<String>,
    ) -> ApiResult<Vec<String>> {
        let key = (command.verb().to_string(), command.type_name().to_string());
        let known = match self.known.get(&key) {
            Some(known) => known.clone(),
            None => {
                let help = run(&Self::help_command(command))?;
                let flags = Arc::new(self.parse_help(&help));
                debug!(verb = %key.0, type_name = %key.1, flags = flags.len(), "Learned command flags");
                self.known.insert(key, flags.clone());
                flags
            }
        };

        if known.is_empty() {
            return Ok(Vec::new());
        }
        let dropped = command.retain_flags(|name| known.contains(name));
        if !dropped.is_empty() {
            warn!(command = %command, ?dropped, "Dropped flags unknown to the shell");
        }
        Ok(dropped)
    }
}
