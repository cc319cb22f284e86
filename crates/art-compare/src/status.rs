//! Positive/negative response contract
//!
//! `positive = true` means the call must succeed; `positive = false` means it
//! must fail. Either way the caller gets `true` when the engine did what the
//! test expected.

use art_core::ApiResult;
use tracing::{debug, error};

pub const CREATE_OK: &[u16] = &[200, 201, 202];
pub const UPDATE_OK: &[u16] = &[200];
pub const DELETE_OK: &[u16] = &[200, 202, 204];
pub const ACTION_OK: &[u16] = &[200, 201, 202];
pub const GET_OK: &[u16] = &[200];

/// Check a status code against the polarity contract.
///
/// With an explicit `expected` list the code must be a member of it and
/// `positive` only selects the log wording. Otherwise the code must be in
/// `default_ok` for a positive call and outside it for a negative one.
pub fn validate_status(
    code: u16,
    positive: bool,
    default_ok: &[u16],
    expected: Option<&[u16]>,
) -> bool {
    let ok = match expected {
        Some(expected) => expected.contains(&code),
        None => default_ok.contains(&code) == positive,
    };
    if ok {
        debug!(code, positive, "Status matches expectation");
    } else {
        error!(
            code,
            positive,
            expected = ?expected.unwrap_or(default_ok),
            "Unexpected response status"
        );
    }
    ok
}

/// Fold whether an operation succeeded into the polarity contract
pub fn polarity(succeeded: bool, positive: bool, operation: &str) -> bool {
    let ok = succeeded == positive;
    if !ok {
        if positive {
            error!(operation, "Operation failed but was expected to succeed");
        } else {
            error!(operation, "Operation succeeded but was expected to fail");
        }
    }
    ok
}

/// Fold a non-fatal operation error into the polarity contract.
///
/// Fatal errors pass through. Anything else counts as the operation having
/// failed, and `failed` builds the result from the polarity verdict.
pub fn fold_error<T>(
    result: ApiResult<T>,
    positive: bool,
    operation: &str,
    failed: impl FnOnce(bool) -> T,
) -> ApiResult<T> {
    match result {
        Ok(value) => Ok(value),
        Err(e) if e.is_fatal() => Err(e),
        Err(e) => {
            if positive {
                error!(operation, error = %e, "Operation failed");
            } else {
                debug!(operation, error = %e, "Operation failed as expected");
            }
            Ok(failed(polarity(false, positive, operation)))
        }
    }
}
