//! Native SDK engine adapter
//!
//! Entities are translated into the SDK's own object hierarchy before every
//! call and translated back from what the SDK returns. The bundled
//! [`RestSdkClient`] speaks XML over a REST session; tests and other SDK
//! flavours plug in through [`SdkClient`].

mod adapter;
pub mod client;
mod error;
pub mod object;
pub mod rest;
pub mod translate;

pub use adapter::{SdkBackend, SdkConnection};
pub use client::{Collection, SdkClient, SdkParams};
pub use error::{SdkError, SdkResult};
pub use object::{SdkField, SdkObject};
pub use rest::RestSdkClient;
