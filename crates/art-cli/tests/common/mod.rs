//! Scripted shell for CLI adapter tests
//!
//! [`ScriptedShell`] plays the terminal: it asks for a password, prints the
//! connected prompt, and hands every redirected command to a [`FakeEngine`]
//! whose answer is written to the redirect target, as the real shell would.

#![allow(dead_code)]

use art_cli::{first_match, take_match, CliBackend, CliSession, Matched, ShellChannel};
use art_config::{ApiOptions, RunOptions};
use art_core::{ApiError, ApiResult, BackendKind, Schema};
use regex::Regex;
use std::collections::BTreeMap;
use std::fs;
use std::path::Path;
use std::sync::atomic::{AtomicBool, Ordering};
use std::sync::{Arc, Mutex};
use std::thread::{self, ThreadId};
use std::time::Duration;
use tempfile::TempDir;

pub const PASSWORD: &str = "secret";
pub const CONNECTED: &str = "[oVirt shell (connected)]# ";

const HELP_ADD_VM: &str = "\
USAGE
  add vm [options]
OPTIONS
  --name: string
  --memory: long
  --cluster-name: string
  --correlation_id: string
";

const TRACEBACK: &str = "\
Traceback (most recent call last):
  File \"/usr/lib/python2.7/site-packages/ovirtcli/shell.py\", line 42, in onecmd
KeyError: 'state'
";

/// VMs known to the fake shell, in insertion order
#[derive(Debug, Default)]
pub struct FakeEngine {
    pub vms: Vec<BTreeMap<String, String>>,
    pub next_id: u32,
}

fn error_block(status: u16, reason: &str, detail: &str) -> String {
    format!(
        "==================== ERROR ====================\n\
         status: {}\nreason: {}\ndetail: {}\n\
         ===============================================\n",
        status, reason, detail
    )
}

fn render(vm: &BTreeMap<String, String>) -> String {
    let mut out = String::new();
    // `id` and `name` first, as the shell prints them
    for key in ["id", "name"] {
        if let Some(value) = vm.get(key) {
            out.push_str(&format!("{:<34}: {}\n", key, value));
        }
    }
    for (key, value) in vm.iter().filter(|(k, _)| k.as_str() != "id" && k.as_str() != "name") {
        out.push_str(&format!("{:<34}: {}\n", key, value));
    }
    out
}

/// Split a command line on spaces, honouring double quotes
pub fn tokenize(line: &str) -> Vec<String> {
    let mut tokens = Vec::new();
    let mut current = String::new();
    let mut quoted = false;
    let mut started = false;
    let mut chars = line.chars();
    while let Some(c) = chars.next() {
        match c {
            '\\' if quoted => {
                if let Some(next) = chars.next() {
                    current.push(next);
                }
            }
            '"' => {
                quoted = !quoted;
                started = true;
            }
            ' ' if !quoted => {
                if started {
                    tokens.push(std::mem::take(&mut current));
                    started = false;
                }
            }
            other => {
                current.push(other);
                started = true;
            }
        }
    }
    if started {
        tokens.push(current);
    }
    tokens
}

/// Positional words and `--flag [value]` pairs of a command
fn split_command(tokens: &[String]) -> (Vec<String>, BTreeMap<String, String>) {
    let mut words = Vec::new();
    let mut flags = BTreeMap::new();
    let mut iter = tokens.iter().peekable();
    while let Some(token) = iter.next() {
        match token.strip_prefix("--") {
            Some(name) => {
                let value = match iter.peek() {
                    Some(next) if !next.starts_with("--") => iter.next().cloned().unwrap_or_default(),
                    _ => String::new(),
                };
                flags.insert(name.to_string(), value);
            }
            None => words.push(token.clone()),
        }
    }
    (words, flags)
}

impl FakeEngine {
    pub fn new() -> Self {
        Self {
            vms: Vec::new(),
            next_id: 1,
        }
    }

    pub fn seed(&mut self, name: &str, cluster: &str) -> String {
        let id = self.next_id.to_string();
        self.next_id += 1;
        let mut vm = BTreeMap::new();
        vm.insert("id".to_string(), id.clone());
        vm.insert("name".to_string(), name.to_string());
        vm.insert("cluster-name".to_string(), cluster.to_string());
        vm.insert("status-state".to_string(), "down".to_string());
        self.vms.push(vm);
        id
    }

    fn position(&self, identifier: &str) -> Option<usize> {
        self.vms.iter().position(|vm| {
            vm.get("id").map(String::as_str) == Some(identifier)
                || vm.get("name").map(String::as_str) == Some(identifier)
        })
    }

    /// Text the shell writes for `line`
    pub fn answer(&mut self, line: &str) -> String {
        let (words, flags) = split_command(&tokenize(line));
        let words: Vec<&str> = words.iter().map(String::as_str).collect();
        match words.as_slice() {
            ["help", "add", "vm"] => HELP_ADD_VM.to_string(),
            ["add", "vm"] => self.add(flags),
            ["list", "vms"] => self.list(&flags),
            ["show", "vm", id] => match self.position(id) {
                Some(at) => render(&self.vms[at]),
                None => error_block(404, "Not Found", "Entity not found"),
            },
            ["update", "vm", id] => self.update(id, flags),
            ["remove", "vm", id] => match self.position(id) {
                Some(at) => {
                    self.vms.remove(at);
                    String::new()
                }
                None => error_block(404, "Not Found", "Entity not found"),
            },
            ["action", "vm", id, action] => self.action(id, action),
            _ => format!("*** Unknown syntax: {}\n", line),
        }
    }

    fn add(&mut self, flags: BTreeMap<String, String>) -> String {
        if flags.contains_key("colour") {
            return "error: no such option: --colour\n".to_string();
        }
        if flags.get("name").map(String::as_str) == Some("bad") {
            return error_block(400, "Bad Request", "Cannot add VM. The name is invalid.");
        }
        // a `quiet` VM is stored without the shell printing it back
        let quiet = flags.get("name").map(String::as_str) == Some("quiet");
        let id = self.next_id.to_string();
        self.next_id += 1;
        let mut vm: BTreeMap<String, String> = flags
            .into_iter()
            .filter(|(k, _)| k != "correlation_id" && k != "async")
            .collect();
        vm.insert("id".to_string(), id);
        vm.insert("status-state".to_string(), "down".to_string());
        let out = if quiet { String::new() } else { render(&vm) };
        self.vms.push(vm);
        out
    }

    fn list(&self, flags: &BTreeMap<String, String>) -> String {
        let wanted = flags
            .get("query")
            .and_then(|q| q.strip_prefix("name="))
            .map(str::to_string);
        let max = flags
            .get("max")
            .and_then(|m| m.parse::<usize>().ok())
            .unwrap_or(usize::MAX);
        self.vms
            .iter()
            .filter(|vm| match &wanted {
                Some(name) => vm.get("name") == Some(name),
                None => true,
            })
            .take(max)
            .map(render)
            .collect::<Vec<_>>()
            .join("\n")
    }

    fn update(&mut self, id: &str, flags: BTreeMap<String, String>) -> String {
        let Some(at) = self.position(id) else {
            return error_block(404, "Not Found", "Entity not found");
        };
        if flags.get("memory").is_some_and(|m| m.starts_with('-')) {
            return error_block(400, "Bad Request", "Memory must be positive");
        }
        for (key, value) in flags {
            if key != "correlation_id" && key != "async" {
                self.vms[at].insert(key, value);
            }
        }
        render(&self.vms[at])
    }

    fn action(&mut self, id: &str, action: &str) -> String {
        let Some(at) = self.position(id) else {
            return error_block(404, "Not Found", "Entity not found");
        };
        match action {
            "start" => {
                self.vms[at].insert("status-state".to_string(), "up".to_string());
                format!("{:<34}: {}\n", "status-state", "complete")
            }
            "stop" => {
                self.vms[at].insert("status-state".to_string(), "down".to_string());
                format!("{:<34}: {}\n", "status-state", "complete")
            }
            "hang" => format!("{:<34}: {}\n", "status-state", "failed"),
            "crash" => TRACEBACK.to_string(),
            _ => error_block(400, "Bad Request", "Unknown action"),
        }
    }
}

/// Lines sent to the shell, shared with the test
pub type SentLog = Arc<Mutex<Vec<String>>>;

/// Which thread sent a line or waited for output, in order
pub type CallLog = Arc<Mutex<Vec<(ThreadId, &'static str)>>>;

/// Knobs the test turns while the shell is in use
#[derive(Clone, Default)]
pub struct ShellControls {
    /// Output for the next command, printed only once the following line is sent
    pub late: Arc<Mutex<Option<String>>>,
    /// Once set, the shell prints nothing more
    pub silent: Arc<AtomicBool>,
    pub calls: CallLog,
}

pub struct ScriptedShell {
    buffer: String,
    logged_in: bool,
    engine: Arc<Mutex<FakeEngine>>,
    sent: SentLog,
    controls: ShellControls,
    held: Option<String>,
}

impl ScriptedShell {
    pub fn new(engine: Arc<Mutex<FakeEngine>>) -> (Self, SentLog) {
        let (shell, sent, _) = Self::controlled(engine);
        (shell, sent)
    }

    pub fn controlled(engine: Arc<Mutex<FakeEngine>>) -> (Self, SentLog, ShellControls) {
        let sent = SentLog::default();
        let controls = ShellControls::default();
        let shell = Self {
            buffer: "Password: ".to_string(),
            logged_in: false,
            engine,
            sent: sent.clone(),
            controls: controls.clone(),
            held: None,
        };
        (shell, sent, controls)
    }
}

impl ShellChannel for ScriptedShell {
    fn send_line(&mut self, line: &str) -> ApiResult<()> {
        self.controls.calls.lock().unwrap().push((thread::current().id(), "send"));
        thread::sleep(Duration::from_millis(1));
        self.sent.lock().unwrap().push(line.to_string());
        if !self.logged_in {
            if line == PASSWORD {
                self.logged_in = true;
                self.buffer.push_str(&format!("\n{}", CONNECTED));
            } else {
                self.buffer
                    .push_str("\nerror: [ERROR]::oVirt API connection failure, Unauthorized\n");
            }
            return Ok(());
        }
        if self.controls.silent.load(Ordering::SeqCst) {
            return Ok(());
        }

        // The previous command finishes as soon as anything else is typed
        if let Some(text) = self.held.take() {
            self.buffer.push_str(&text);
            self.buffer.push_str(CONNECTED);
        }
        if line.is_empty() {
            self.buffer.push('\n');
            self.buffer.push_str(CONNECTED);
            return Ok(());
        }

        // Echo, run, then prompt again
        self.buffer.push_str(line);
        self.buffer.push('\n');
        if let Some(text) = self.controls.late.lock().unwrap().take() {
            self.held = Some(text);
            return Ok(());
        }
        match line.rsplit_once(" > ") {
            Some((command, target)) => {
                let answer = self.engine.lock().unwrap().answer(command);
                fs::write(Path::new(target), answer)
                    .map_err(|e| ApiError::transport(BackendKind::Cli, e.to_string()))?;
            }
            None => {
                let answer = self.engine.lock().unwrap().answer(line);
                self.buffer.push_str(&answer);
            }
        }
        self.buffer.push_str(CONNECTED);
        Ok(())
    }

    fn expect_any(&mut self, patterns: &[Regex], timeout: Duration) -> ApiResult<Matched> {
        self.controls.calls.lock().unwrap().push((thread::current().id(), "expect"));
        match first_match(&self.buffer, patterns) {
            Some((index, range)) => Ok(take_match(&mut self.buffer, index, range)),
            None => Err(ApiError::timeout(
                format!("scripted shell has nothing more: {:?}", self.buffer),
                timeout,
            )),
        }
    }

    fn discard_pending(&mut self) -> usize {
        std::mem::take(&mut self.buffer).len()
    }

    fn close(&mut self) -> ApiResult<()> {
        self.sent.lock().unwrap().push("exit".to_string());
        Ok(())
    }
}

/// An error block as the shell prints it
pub fn shell_error(status: u16, reason: &str, detail: &str) -> String {
    error_block(status, reason, detail)
}

pub fn options(dir: &TempDir, validate_commands: bool) -> Arc<RunOptions> {
    let mut api = ApiOptions::new("engine.example", "admin");
    api.password = PASSWORD.to_string();
    let mut options = RunOptions::new(BackendKind::Cli, api);
    options.cli.output_file = dir.path().join("cli_output");
    options.cli.command_timeout_secs = 5;
    options.cli.output_settle_timeout_secs = 1;
    options.validation.cli_validate_commands = validate_commands;
    Arc::new(options)
}

pub struct Harness {
    pub dir: TempDir,
    pub engine: Arc<Mutex<FakeEngine>>,
    pub sent: SentLog,
    pub controls: ShellControls,
    pub session: Arc<CliSession>,
    pub backend: CliBackend,
}

impl Harness {
    pub fn start() -> Self {
        Self::start_with(FakeEngine::new(), false)
    }

    pub fn start_with(engine: FakeEngine, validate_commands: bool) -> Self {
        let dir = TempDir::new().unwrap();
        let options = options(&dir, validate_commands);
        let engine = Arc::new(Mutex::new(engine));
        let (shell, sent, controls) = ScriptedShell::controlled(engine.clone());
        let session = Arc::new(CliSession::with_shell(Box::new(shell), &options).unwrap());
        let schema = Schema::shared().unwrap();
        let kind = schema.entity_kind("vm", "vms").unwrap();
        let backend = CliBackend::with_session(kind, options, schema, session.clone());
        Self {
            dir,
            engine,
            sent,
            controls,
            session,
            backend,
        }
    }

    /// Commands sent after login, without the redirect suffix
    pub fn commands(&self) -> Vec<String> {
        self.sent
            .lock()
            .unwrap()
            .iter()
            .skip(1)
            .map(|line| match line.rsplit_once(" > ") {
                Some((command, _)) => command.to_string(),
                None => line.clone(),
            })
            .collect()
    }

    pub fn status_of(&self, id: &str) -> Option<String> {
        let engine = self.engine.lock().unwrap();
        engine
            .vms
            .iter()
            .find(|vm| vm.get("id").map(String::as_str) == Some(id))
            .and_then(|vm| vm.get("status-state").cloned())
    }
}
