//! Correlation id scope for mutating requests
//!
//! One slot per session, guarded by a mutex. A mutating call fills the slot
//! for its whole duration, so at most one id is in flight per session, and
//! the guard empties it again when dropped, error paths included.

use std::sync::{Mutex, MutexGuard};
use tracing::trace;

#[derive(Debug, Default)]
pub struct CorrelationSlot {
    current: Mutex<Option<String>>,
}

impl CorrelationSlot {
    pub fn new() -> Self {
        Self::default()
    }

    /// Hold the slot with `id` until the guard is dropped
    pub fn scope(&self, id: String) -> CorrelationGuard<'_> {
        let mut slot = self
            .current
            .lock()
            .unwrap_or_else(|poisoned| poisoned.into_inner());
        trace!(correlation_id = %id, "Correlation scope opened");
        *slot = Some(id);
        CorrelationGuard { slot }
    }

    /// The id in flight, if a scope is open. Blocks while another thread holds one.
    pub fn current(&self) -> Option<String> {
        self.current
            .lock()
            .unwrap_or_else(|poisoned| poisoned.into_inner())
            .clone()
    }
}

pub struct CorrelationGuard<'a> {
    slot: MutexGuard<'a, Option<String>>,
}

impl CorrelationGuard<'_> {
    pub fn id(&self) -> &str {
        self.slot.as_deref().unwrap_or_default()
    }
}

impl Drop for CorrelationGuard<'_> {
    fn drop(&mut self) {
        trace!(correlation_id = self.id(), "Correlation scope closed");
        *self.slot = None;
    }
}
