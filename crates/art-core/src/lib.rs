//! Core of the engine API abstraction layer
//!
//! This crate holds everything the four engine adapters share:
//!
//! - the entity model ([`Entity`], [`Value`]) and its XML codec
//! - the XSD-subset [`Schema`] that types entities and validates payloads
//! - the error taxonomy ([`ApiError`])
//! - the [`TimeoutingSampler`] polling primitive
//! - correlation ids, the process-wide session cache and `find` filtering
//! - the [`Backend`] trait every adapter implements
//!
//! # Example
//!
//! ```ignore
//! use art_core::{Entity, OpOptions};
//!
//! let vm = Entity::new("vm").with("name", "vm1").with("memory", 1024i64);
//! let outcome = backend.create(&vm, true, &OpOptions::new())?;
//! ```

pub mod backend;
pub mod codec;
pub mod correlation;
mod entity;
mod error;
pub mod filter;
pub mod sampler;
pub mod schema;
pub mod session;
mod value;
mod xml;
pub mod xpath;

pub use backend::{
    polarity_outcome, Backend, BackendKind, Fetched, GetTarget, OpOptions, Outcome,
    DEFAULT_POLL_INTERVAL,
};
pub use correlation::correlation_id;
pub use entity::{Entity, Link};
pub use error::{ApiError, ApiResult, CommandErrorKind};
pub use sampler::{wait_for_func_status, TimeoutingSampler};
pub use schema::{AttrType, AttributeDescriptor, Cardinality, EntityKind, EntityType, Schema, Violation};
pub use value::{parse_bool, Value};
pub use xml::XmlNode;
