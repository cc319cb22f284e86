//! Table-driven conversation with the shell
//!
//! Each step waits for the first of a set of patterns and reacts to it.
//! Output read before each match is collected so the caller sees the screen
//! text of the whole exchange.

use crate::dialect::Dialect;
use crate::shell::ShellChannel;
use art_core::{ApiError, ApiResult, BackendKind};
use regex::Regex;
use std::time::Duration;
use tracing::{debug, error};

/// Upper bound on reactions per exchange, against prompt loops
const MAX_STEPS: usize = 64;
const MAX_RECONNECTS: usize = 3;

#[derive(Debug, Clone, PartialEq)]
pub enum Reaction {
    /// The exchange is complete
    Done,
    Send(String),
    /// Send the session password (never logged)
    SendPassword,
    /// Issue `connect` on a disconnected shell
    Reconnect,
    Fail(Failure),
}

#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum Failure {
    Login,
    Disconnected,
}

#[derive(Debug, Clone)]
pub struct Rule {
    pub pattern: Regex,
    pub reaction: Reaction,
}

impl Rule {
    pub fn new(pattern: Regex, reaction: Reaction) -> Self {
        Self { pattern, reaction }
    }
}

/// Rules for the login handshake
pub fn login_rules(dialect: &Dialect) -> ApiResult<Vec<Rule>> {
    let refused = Regex::new(r"(?i)(^|\n)\s*error:|unauthorized")
        .map_err(|e| ApiError::login(BackendKind::Cli, e.to_string()))?;
    Ok(vec![
        Rule::new(dialect.connected_prompt.clone(), Reaction::Done),
        Rule::new(dialect.password_prompt.clone(), Reaction::SendPassword),
        Rule::new(refused, Reaction::Fail(Failure::Login)),
        Rule::new(dialect.disconnected_prompt.clone(), Reaction::Reconnect),
    ])
}

/// Rules for an ordinary command, pager handling included
pub fn command_rules(dialect: &Dialect) -> Vec<Rule> {
    let mut rules = vec![
        Rule::new(dialect.connected_prompt.clone(), Reaction::Done),
        Rule::new(
            dialect.disconnected_prompt.clone(),
            Reaction::Fail(Failure::Disconnected),
        ),
    ];
    rules.extend(dialect.pager.iter().enumerate().map(|(index, pager)| {
        Rule::new(pager.clone(), Reaction::Send(dialect.pager_reply(index).to_string()))
    }));
    rules
}

/// Run the exchange to `Done`, returning the collected screen output
pub fn interact(
    shell: &mut dyn ShellChannel,
    rules: &[Rule],
    password: &str,
    timeout: Duration,
) -> ApiResult<String> {
    let patterns: Vec<Regex> = rules.iter().map(|r| r.pattern.clone()).collect();
    let mut screen = String::new();
    let mut reconnects = 0;

    for _ in 0..MAX_STEPS {
        let matched = shell.expect_any(&patterns, timeout)?;
        screen.push_str(&matched.before);
        let reaction = &rules[matched.index].reaction;
        debug!(matched = %matched.matched.trim(), ?reaction, "Shell step");

        match reaction {
            Reaction::Done => return Ok(screen),
            Reaction::Send(text) => {
                screen.push_str(&matched.matched);
                shell.send_line(text)?;
            }
            Reaction::SendPassword => shell.send_line(password)?,
            Reaction::Reconnect => {
                reconnects += 1;
                if reconnects > MAX_RECONNECTS {
                    return Err(ApiError::login(
                        BackendKind::Cli,
                        "shell stays disconnected after connect",
                    ));
                }
                shell.send_line("connect")?;
            }
            Reaction::Fail(Failure::Login) => {
                screen.push_str(&matched.matched);
                error!(output = %screen, "Shell refused the login");
                return Err(ApiError::login(BackendKind::Cli, screen.trim().to_string()));
            }
            Reaction::Fail(Failure::Disconnected) => {
                error!(output = %screen, "Shell lost its connection");
                return Err(ApiError::transport(
                    BackendKind::Cli,
                    "shell disconnected during command",
                ));
            }
        }
    }
    Err(ApiError::transport(
        BackendKind::Cli,
        format!("no prompt after {} shell steps", MAX_STEPS),
    ))
}
