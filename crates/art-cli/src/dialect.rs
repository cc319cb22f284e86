//! Prompt and marker vocabulary of the supported shells

use art_core::{ApiError, ApiResult, BackendKind};
use regex::Regex;

/// Everything that differs between shell flavours
#[derive(Debug, Clone)]
pub struct Dialect {
    pub name: &'static str,
    pub connected_prompt: Regex,
    pub disconnected_prompt: Regex,
    pub password_prompt: Regex,
    /// Start of an engine error block
    pub error_block: Regex,
    pub pager: Vec<Regex>,
    pub markers: ErrorMarkers,
}

/// Lines by which the shell reports its own errors
#[derive(Debug, Clone)]
pub struct ErrorMarkers {
    pub unknown_syntax: Regex,
    pub unknown_command: Regex,
    pub parameter: Regex,
    pub generic: Regex,
    /// `status: 409` inside an error block
    pub status: Regex,
    /// `reason:` / `detail:` inside an error block
    pub field: Regex,
}

impl ErrorMarkers {
    fn new() -> ApiResult<Self> {
        Ok(Self {
            unknown_syntax: pattern(r"\*\*\* Unknown syntax.*")?,
            unknown_command: pattern(r"(?im)^\s*error:.*unknown command.*$")?,
            parameter: pattern(
                r"(?im)^\s*error:.*\b(option|options|argument|arguments|parameter|parameters)\b.*$",
            )?,
            generic: pattern(r"(?im)^\s*error:\s*(.*)$")?,
            status: pattern(r"(?im)^\s*status:\s*(\d{3})")?,
            field: pattern(r"(?im)^\s*(reason|detail):\s*(.*)$")?,
        })
    }
}

fn pattern(source: &str) -> ApiResult<Regex> {
    Regex::new(source).map_err(|e| ApiError::unsupported(BackendKind::Cli, format!("prompt pattern: {}", e)))
}

impl Dialect {
    fn build(name: &'static str, banner: &str) -> ApiResult<Self> {
        let banner = regex::escape(banner);
        Ok(Self {
            name,
            connected_prompt: pattern(&format!(r"\[{} shell \(connected\)\]# ", banner))?,
            disconnected_prompt: pattern(&format!(r"\[{} shell \(disconnected\)\]# ", banner))?,
            password_prompt: pattern(r"(?i)password:\s*")?,
            error_block: pattern(r"=+\s*ERROR\s*=+")?,
            pager: vec![
                pattern(r"--More--")?,
                pattern(r"(?i)press any key")?,
                pattern(r"\(END\)")?,
            ],
            markers: ErrorMarkers::new()?,
        })
    }

    pub fn ovirt() -> ApiResult<Self> {
        Self::build("ovirt", "oVirt")
    }

    pub fn rhevm() -> ApiResult<Self> {
        Self::build("rhevm", "RHEVM")
    }

    pub fn named(name: &str) -> ApiResult<Self> {
        match name.to_ascii_lowercase().as_str() {
            "ovirt" => Self::ovirt(),
            "rhevm" => Self::rhevm(),
            other => Err(ApiError::unsupported(
                BackendKind::Cli,
                format!("shell dialect '{}'", other),
            )),
        }
    }

    /// The key that pages forward for the given pager marker
    pub fn pager_reply(&self, index: usize) -> &'static str {
        match index {
            0 => " ",
            2 => "q",
            _ => "",
        }
    }
}
