//! Checks applied to what the engine returns
//!
//! - [`compare`]: recursive comparison of what was sent with what the engine
//!   persisted, reporting every mismatch in one pass
//! - [`status`]: positive/negative status-code contract

pub mod compare;
pub mod status;

pub use compare::{compare, compare_entities, CompareOptions, ComparisonResult, DiffCategory, Difference};
pub use status::{fold_error, polarity, validate_status};
