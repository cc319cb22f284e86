//! REST engine adapter
//!
//! Entities travel as XML over HTTP. One [`RestSession`] per process holds
//! the authenticated client and the relation map read from the API root;
//! [`RestBackend`] binds it to one entity type.

mod adapter;
pub mod correlation;
pub mod links;
pub mod session;
pub mod validation;

pub use adapter::RestBackend;
pub use session::{RestResponse, RestSession, CORRELATION_HEADER};
pub use validation::{defects, take_defects, Defect};
