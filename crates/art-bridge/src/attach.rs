//! Thread attachment around bridged calls
//!
//! Every call into the managed runtime must come from an attached thread.
//! [`AttachGuard`] holds the bridge lock for one whole operation, attaches
//! the thread if it is not attached yet, and on drop detaches it only if it
//! did the attaching.

use crate::error::BridgeResult;
use crate::value::BridgeRuntime;
use std::sync::{Mutex, MutexGuard};
use tracing::{trace, warn};

/// Serializes all operations going through the bridge
static BRIDGE_LOCK: Mutex<()> = Mutex::new(());

pub struct AttachGuard<'a> {
    runtime: &'a dyn BridgeRuntime,
    attached_here: bool,
    _lock: MutexGuard<'static, ()>,
}

impl<'a> AttachGuard<'a> {
    pub fn enter(runtime: &'a dyn BridgeRuntime) -> BridgeResult<Self> {
        let lock = BRIDGE_LOCK.lock().unwrap_or_else(|poisoned| poisoned.into_inner());
        let attached_here = if runtime.is_thread_attached() {
            false
        } else {
            runtime.attach_thread()?;
            trace!("Attached thread to the runtime");
            true
        };
        Ok(Self {
            runtime,
            attached_here,
            _lock: lock,
        })
    }

    /// Whether this guard attached the thread
    pub fn attached_here(&self) -> bool {
        self.attached_here
    }
}

impl Drop for AttachGuard<'_> {
    fn drop(&mut self) {
        if !self.attached_here {
            return;
        }
        match self.runtime.detach_thread() {
            Ok(()) => trace!("Detached thread from the runtime"),
            Err(e) => warn!(error = %e, "Failed to detach thread"),
        }
    }
}

/// Run `op` with the thread attached
pub fn attached<T>(
    runtime: &dyn BridgeRuntime,
    op: impl FnOnce() -> BridgeResult<T>,
) -> BridgeResult<T> {
    let _guard = AttachGuard::enter(runtime)?;
    op()
}
