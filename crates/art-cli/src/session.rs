//! A logged-in shell shared by every CLI adapter

use crate::capture;
use crate::command::CliCommand;
use crate::dialect::Dialect;
use crate::interaction::{command_rules, interact, login_rules, Rule};
use crate::output;
use crate::shell::{PtyShell, ShellChannel};
use crate::validator::CommandValidator;
use art_config::RunOptions;
use art_core::{ApiError, ApiResult, BackendKind};
use regex::Regex;
use std::path::PathBuf;
use std::sync::atomic::{AtomicBool, Ordering};
use std::sync::{Mutex, MutexGuard};
use std::time::Duration;
use tracing::{debug, error, info, warn};

/// Prompts drained after a resync before giving up on a quiet shell
const MAX_STALE_PROMPTS: usize = 16;

pub struct CliSession {
    /// Held for the whole of each command
    shell: Mutex<Box<dyn ShellChannel>>,
    dialect: Dialect,
    rules: Vec<Rule>,
    password: String,
    output_file: PathBuf,
    command_timeout: Duration,
    settle_timeout: Duration,
    validator: Option<CommandValidator>,
    /// Set when a timed-out command could not be followed by a clean prompt
    broken: AtomicBool,
}

impl CliSession {
    /// Spawn the shell tool and log in
    pub fn open(options: &RunOptions) -> ApiResult<Self> {
        let shell = PtyShell::spawn(&options.api, &options.cli)?;
        Self::with_shell(Box::new(shell), options)
    }

    /// Log in over an already running shell
    pub fn with_shell(mut shell: Box<dyn ShellChannel>, options: &RunOptions) -> ApiResult<Self> {
        let dialect = Dialect::named(&options.cli.dialect)?;
        let login = login_rules(&dialect)?;
        interact(
            shell.as_mut(),
            &login,
            &options.api.password,
            options.cli.command_timeout(),
        )
        .map_err(|e| match e {
            ApiError::LoginFailed { .. } => e,
            other => ApiError::login(BackendKind::Cli, other.to_string()),
        })?;
        info!(
            dialect = dialect.name,
            url = %options.api.base_url(),
            user = %options.api.login_name(),
            "Shell connected"
        );

        let validator = if options.validation.cli_validate_commands {
            let flag = Regex::new(r"--([A-Za-z0-9_-]+)")
                .map_err(|e| ApiError::login(BackendKind::Cli, e.to_string()))?;
            Some(CommandValidator::new(flag))
        } else {
            None
        };

        Ok(Self {
            shell: Mutex::new(shell),
            rules: command_rules(&dialect),
            dialect,
            password: options.api.password.clone(),
            output_file: options.cli.output_file.clone(),
            command_timeout: options.cli.command_timeout(),
            settle_timeout: options.cli.output_settle_timeout(),
            validator,
            broken: AtomicBool::new(false),
        })
    }

    /// Run a templated command, returning its cleaned output
    pub fn run(&self, command: CliCommand) -> ApiResult<String> {
        let mut shell = self.lock_shell()?;
        let timeout = command.timeout().unwrap_or(self.command_timeout);
        let mut command = command;
        if let Some(validator) = self.validator.as_ref().filter(|_| command.is_mutating()) {
            validator.validate(&mut command, |help| {
                self.execute(&mut **shell, help, self.command_timeout)
            })?;
        }
        self.execute(&mut **shell, &command.render(), timeout)
    }

    /// Run a raw command line
    pub fn run_line(&self, line: &str) -> ApiResult<String> {
        let mut shell = self.lock_shell()?;
        self.execute(&mut **shell, line, self.command_timeout)
    }

    /// Whether the shell lost prompt synchronization; such a session must be replaced
    pub fn is_broken(&self) -> bool {
        self.broken.load(Ordering::Acquire)
    }

    fn lock_shell(&self) -> ApiResult<MutexGuard<'_, Box<dyn ShellChannel>>> {
        let shell = self.shell.lock().unwrap_or_else(|poisoned| poisoned.into_inner());
        if self.is_broken() {
            return Err(ApiError::transport(
                BackendKind::Cli,
                "shell is out of sync after a timed-out command; log in again",
            ));
        }
        Ok(shell)
    }

    fn execute(
        &self,
        shell: &mut dyn ShellChannel,
        line: &str,
        timeout: Duration,
    ) -> ApiResult<String> {
        let result = self.exchange(shell, line, timeout);
        if let Err(ApiError::Timeout { .. }) = &result {
            if let Err(e) = self.resync(shell) {
                error!(command = line, error = %e, "Shell did not come back after a timeout");
                self.broken.store(true, Ordering::Release);
            }
        }
        result
    }

    fn exchange(
        &self,
        shell: &mut dyn ShellChannel,
        line: &str,
        timeout: Duration,
    ) -> ApiResult<String> {
        capture::reset(&self.output_file)?;
        let redirected = capture::redirect(line, &self.output_file);
        debug!(command = line, ?timeout, "Running shell command");

        shell.send_line(&redirected)?;
        let screen = interact(shell, &self.rules, &self.password, timeout)?;
        let screen = screen.replacen(&redirected, "", 1);
        let captured = capture::read_settled(&self.output_file, self.settle_timeout)?;

        let combined = if screen.trim().is_empty() {
            captured
        } else {
            format!("{}\n{}", screen.trim(), captured)
        };
        let result = output::classify(&combined, &self.dialect);
        match &result {
            Ok(text) => debug!(command = line, lines = text.lines().count(), "Command succeeded"),
            Err(e) => debug!(command = line, error = %e, "Command failed"),
        }
        result
    }

    /// Bring the shell back to a fresh prompt after a timed-out command.
    ///
    /// Whatever the late command still prints, prompt included, is read and
    /// thrown away so the next command only sees its own output.
    fn resync(&self, shell: &mut dyn ShellChannel) -> ApiResult<()> {
        let dropped = shell.discard_pending();
        warn!(dropped, "Resynchronizing shell after timeout");
        shell.send_line("")?;
        interact(shell, &self.rules, &self.password, self.command_timeout)?;

        let prompt = [self.dialect.connected_prompt.clone()];
        let mut stale = 0;
        while stale < MAX_STALE_PROMPTS && shell.expect_any(&prompt, self.settle_timeout).is_ok() {
            stale += 1;
        }
        let dropped = shell.discard_pending();
        capture::reset(&self.output_file)?;
        debug!(stale, dropped, "Shell back at its prompt");
        Ok(())
    }

    pub fn dialect(&self) -> &Dialect {
        &self.dialect
    }

    pub fn close(&self) -> ApiResult<()> {
        let mut shell = self.shell.lock().unwrap_or_else(|poisoned| poisoned.into_inner());
        shell.close()?;
        info!("Shell closed");
        Ok(())
    }
}
