//! Classification of command output
//!
//! Debug noise is stripped first. Then, in order: a Python traceback means
//! the shell itself crashed, an error block is an engine rejection, and the
//! shell's own complaints are syntax or parameter errors.

use crate::dialect::Dialect;
use art_core::{ApiError, ApiResult, CommandErrorKind};
use tracing::{debug, error};

const TRACEBACK: &str = "Traceback (most recent call last):";
const NOISE_PREFIXES: &[&str] = &["DEBUG", "send:", "reply:", "header:"];

/// Drop debug lines the shell interleaves with real output
pub fn strip_noise(text: &str) -> String {
    text.lines()
        .filter(|line| {
            let trimmed = line.trim_start();
            !NOISE_PREFIXES.iter().any(|prefix| trimmed.starts_with(prefix))
        })
        .map(|line| line.trim_end_matches('\r'))
        .collect::<Vec<_>>()
        .join("\n")
}

/// Cleaned output, or the error it reports
pub fn classify(text: &str, dialect: &Dialect) -> ApiResult<String> {
    let cleaned = strip_noise(text);
    let p = &dialect.markers;

    if let Some(at) = cleaned.find(TRACEBACK) {
        let trace = cleaned[at..].trim().to_string();
        error!(traceback = %trace, "Shell process crashed");
        return Err(ApiError::ProtocolCrash(trace));
    }

    if let Some(block) = dialect.error_block.find(&cleaned) {
        let body = &cleaned[block.end()..];
        let status = p
            .status
            .captures(body)
            .and_then(|c| c.get(1))
            .and_then(|m| m.as_str().parse::<u16>().ok());
        let message = p
            .field
            .captures_iter(body)
            .map(|c| format!("{}: {}", &c[1], c[2].trim()))
            .collect::<Vec<_>>()
            .join("; ");
        debug!(?status, %message, "Engine error block");
        return Err(ApiError::Command {
            kind: CommandErrorKind::Server(status),
            message,
        });
    }

    if let Some(m) = p
        .unknown_syntax
        .find(&cleaned)
        .or_else(|| p.unknown_command.find(&cleaned))
    {
        return Err(ApiError::Command {
            kind: CommandErrorKind::Syntax,
            message: m.as_str().trim().to_string(),
        });
    }

    if let Some(m) = p.parameter.find(&cleaned) {
        return Err(ApiError::Command {
            kind: CommandErrorKind::Parameter,
            message: m.as_str().trim().to_string(),
        });
    }

    if let Some(c) = p.generic.captures(&cleaned) {
        return Err(ApiError::Command {
            kind: CommandErrorKind::Server(None),
            message: c[1].trim().to_string(),
        });
    }

    Ok(cleaned)
}
