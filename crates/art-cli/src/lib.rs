//! CLI engine adapter
//!
//! Drives the engine's interactive shell over a pseudo-terminal. Commands are
//! templated from entities, their output is redirected to a file, read back
//! once it settles, classified for errors and parsed as `key : value` blocks.

mod adapter;
pub mod capture;
pub mod command;
pub mod dialect;
pub mod interaction;
pub mod output;
pub mod parse;
pub mod session;
pub mod shell;
pub mod validator;

pub use adapter::{shell_type, CliBackend};
pub use command::CliCommand;
pub use dialect::Dialect;
pub use session::CliSession;
pub use shell::{first_match, take_match, Matched, PtyShell, ShellChannel};
