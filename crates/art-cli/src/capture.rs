//! Command output captured through a redirect file
//!
//! Every command is run as `<command> > <file>`. The shell may still be
//! writing when the prompt returns, so the file is read once its size stops
//! changing.

use art_core::{ApiError, ApiResult, BackendKind};
use std::fs;
use std::io::ErrorKind;
use std::path::Path;
use std::thread;
use std::time::{Duration, Instant};
use tracing::{debug, warn};

const SETTLE_POLL: Duration = Duration::from_millis(50);

/// `command > file`
pub fn redirect(command: &str, file: &Path) -> String {
    format!("{} > {}", command, file.display())
}

/// Remove output left over from the previous command
pub fn reset(file: &Path) -> ApiResult<()> {
    match fs::remove_file(file) {
        Ok(()) => Ok(()),
        Err(e) if e.kind() == ErrorKind::NotFound => Ok(()),
        Err(e) => Err(ApiError::transport(
            BackendKind::Cli,
            format!("cannot clear {}: {}", file.display(), e),
        )),
    }
}

fn size_of(file: &Path) -> Option<u64> {
    fs::metadata(file).ok().map(|m| m.len())
}

/// Read `file` once two consecutive size samples agree.
///
/// A file that never appears within `timeout` reads as empty; a file still
/// growing at the deadline is read as it is.
pub fn read_settled(file: &Path, timeout: Duration) -> ApiResult<String> {
    let started = Instant::now();
    let mut last = size_of(file);
    loop {
        thread::sleep(SETTLE_POLL);
        let current = size_of(file);
        match (last, current) {
            (Some(a), Some(b)) if a == b => break,
            _ if started.elapsed() >= timeout => {
                if current.is_some() {
                    warn!(file = %file.display(), ?timeout, "Output still changing at deadline");
                } else {
                    debug!(file = %file.display(), "Command wrote no output");
                    return Ok(String::new());
                }
                break;
            }
            _ => last = current,
        }
    }

    let bytes = fs::read(file).map_err(|e| {
        ApiError::transport(BackendKind::Cli, format!("cannot read {}: {}", file.display(), e))
    })?;
    Ok(String::from_utf8_lossy(&bytes).into_owned())
}
