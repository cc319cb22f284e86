//! Byte channel to the interactive shell
//!
//! [`ShellChannel`] is the seam between the adapter and the process: the
//! production [`PtyShell`] drives the real tool over a pseudo-terminal, tests
//! substitute scripted fakes.

use art_config::{ApiOptions, CliOptions};
use art_core::{ApiError, ApiResult, BackendKind};
use regex::Regex;
use rexpect::session::{spawn_command, PtySession};
use std::fs::{File, OpenOptions};
use std::io::Write;
use std::ops::Range;
use std::process::Command;
use std::thread;
use std::time::{Duration, Instant};
use tracing::{debug, trace, warn};

const READ_IDLE: Duration = Duration::from_millis(20);

/// Text read up to and including a pattern match
#[derive(Debug, Clone, PartialEq)]
pub struct Matched {
    /// Index of the pattern that matched
    pub index: usize,
    /// Everything read before the match
    pub before: String,
    pub matched: String,
}

pub trait ShellChannel: Send {
    fn send_line(&mut self, line: &str) -> ApiResult<()>;

    /// Read until one of `patterns` matches; each call has its own deadline
    fn expect_any(&mut self, patterns: &[Regex], timeout: Duration) -> ApiResult<Matched>;

    /// Drop output read but not yet matched, returning how much was dropped
    fn discard_pending(&mut self) -> usize;

    fn close(&mut self) -> ApiResult<()>;
}

/// The earliest match of any pattern in `buffer`; ties go to the lower index
pub fn first_match(buffer: &str, patterns: &[Regex]) -> Option<(usize, Range<usize>)> {
    patterns
        .iter()
        .enumerate()
        .filter_map(|(index, pattern)| pattern.find(buffer).map(|m| (index, m.range())))
        .min_by_key(|(index, range)| (range.start, *index))
}

/// Split `buffer` at a match, keeping the unread tail in place
pub fn take_match(buffer: &mut String, index: usize, range: Range<usize>) -> Matched {
    let before = buffer[..range.start].to_string();
    let matched = buffer[range.clone()].to_string();
    buffer.drain(..range.end);
    Matched {
        index,
        before,
        matched,
    }
}

/// Arguments for the shell tool: `-c -l <uri> -u <user@domain> (-A ca | -I) --session-timeout n`
pub fn shell_args(api: &ApiOptions) -> Vec<String> {
    let mut args = vec![
        "-c".to_string(),
        "-l".to_string(),
        api.base_url(),
        "-u".to_string(),
        api.login_name(),
    ];
    match (&api.ca_file, api.insecure) {
        (Some(ca_file), false) => {
            args.push("-A".to_string());
            args.push(ca_file.display().to_string());
        }
        _ => args.push("-I".to_string()),
    }
    args.push("--session-timeout".to_string());
    args.push((u64::from(api.session_ttl_minutes) * 60).to_string());
    args
}

/// The shell tool running under a pseudo-terminal
pub struct PtyShell {
    session: PtySession,
    buffer: String,
    log: Option<File>,
}

impl PtyShell {
    pub fn spawn(api: &ApiOptions, cli: &CliOptions) -> ApiResult<Self> {
        let args = shell_args(api);
        debug!(tool = %cli.tool, ?args, "Spawning shell");

        let mut command = Command::new(&cli.tool);
        command.args(&args);
        let timeout_ms = u64::try_from(cli.command_timeout().as_millis()).unwrap_or(u64::MAX);
        let session = spawn_command(command, Some(timeout_ms))
            .map_err(|e| ApiError::login(BackendKind::Cli, format!("cannot start {}: {}", cli.tool, e)))?;

        let log = match &cli.log_file {
            Some(path) => match OpenOptions::new().create(true).append(true).open(path) {
                Ok(file) => Some(file),
                Err(e) => {
                    warn!(path = %path.display(), error = %e, "Cannot open shell log");
                    None
                }
            },
            None => None,
        };

        Ok(Self {
            session,
            buffer: String::new(),
            log,
        })
    }

    /// Append to the session log; the log is dropped after the first write error
    fn record(&mut self, text: &str) {
        if let Some(log) = &mut self.log {
            if let Err(e) = log.write_all(text.as_bytes()) {
                warn!(error = %e, "Cannot write shell log, disabling it");
                self.log = None;
            }
        }
    }

    /// Move everything the process has written so far into the buffer
    fn drain_available(&mut self) -> bool {
        let mut read = String::new();
        while let Some(c) = self.session.try_read() {
            read.push(c);
        }
        if read.is_empty() {
            return false;
        }
        trace!(bytes = read.len(), "Read from shell");
        self.record(&read);
        self.buffer.push_str(&read);
        true
    }
}

impl ShellChannel for PtyShell {
    fn send_line(&mut self, line: &str) -> ApiResult<()> {
        self.record(&format!("{}\n", line));
        self.session
            .send_line(line)
            .map(|_| ())
            .map_err(|e| ApiError::transport(BackendKind::Cli, e.to_string()))
    }

    fn expect_any(&mut self, patterns: &[Regex], timeout: Duration) -> ApiResult<Matched> {
        let started = Instant::now();
        loop {
            if let Some((index, range)) = first_match(&self.buffer, patterns) {
                return Ok(take_match(&mut self.buffer, index, range));
            }
            if started.elapsed() >= timeout {
                let tail: String = self.buffer.chars().rev().take(200).collect();
                let tail: String = tail.chars().rev().collect();
                return Err(ApiError::timeout(
                    format!("no shell prompt; last output: {:?}", tail),
                    started.elapsed(),
                ));
            }
            if !self.drain_available() {
                thread::sleep(READ_IDLE);
            }
        }
    }

    fn discard_pending(&mut self) -> usize {
        self.drain_available();
        let dropped = self.buffer.len();
        self.buffer.clear();
        dropped
    }

    fn close(&mut self) -> ApiResult<()> {
        if let Err(e) = self.session.send_line("exit") {
            warn!(error = %e, "Cannot send exit to the shell");
        }
        self.session
            .process
            .exit()
            .map(|status| debug!(?status, "Shell exited"))
            .map_err(|e| ApiError::transport(BackendKind::Cli, e.to_string()))
    }
}
