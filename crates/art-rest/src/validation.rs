//! Response validation against the schema
//!
//! Violations never fail the calling operation. They are logged and kept in
//! a process-wide defect list that a test run inspects at the end.

use art_core::{Schema, Violation};
use std::sync::Mutex;
use tracing::{error, warn};

static DEFECTS: Mutex<Vec<Defect>> = Mutex::new(Vec::new());

/// A response that did not match the schema
#[derive(Debug, Clone, PartialEq)]
pub struct Defect {
    /// Request that produced the response, e.g. `POST /api/vms`
    pub context: String,
    pub violations: Vec<Violation>,
}

/// Every defect recorded so far
pub fn defects() -> Vec<Defect> {
    DEFECTS
        .lock()
        .unwrap_or_else(|poisoned| poisoned.into_inner())
        .clone()
}

/// Drain the defect list
pub fn take_defects() -> Vec<Defect> {
    std::mem::take(&mut *DEFECTS.lock().unwrap_or_else(|poisoned| poisoned.into_inner()))
}

/// Check `body` against `schema`, recording any violations.
///
/// Returns the number of violations found.
pub fn validate_response(schema: &Schema, body: &str, context: &str) -> usize {
    if body.trim().is_empty() {
        return 0;
    }
    let violations = match schema.validate(body) {
        Ok(violations) => violations,
        Err(e) => {
            warn!(context, error = %e, "Response is not well-formed XML");
            vec![Violation {
                path: "/".to_string(),
                message: e.to_string(),
            }]
        }
    };
    if violations.is_empty() {
        return 0;
    }

    for violation in &violations {
        error!(context, path = %violation.path, message = %violation.message, "Schema violation");
    }
    let count = violations.len();
    DEFECTS
        .lock()
        .unwrap_or_else(|poisoned| poisoned.into_inner())
        .push(Defect {
            context: context.to_string(),
            violations,
        });
    count
}
