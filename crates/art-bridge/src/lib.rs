//! Bridged SDK engine adapter
//!
//! The bridged SDK lives in a managed runtime reached through an embedded
//! interpreter. Runtime objects are driven reflectively: [`EntityProxy`]
//! maps entity attributes onto their getters and setters, and every
//! operation runs under an [`AttachGuard`].
//!
//! The runtime itself sits behind [`BridgeRuntime`]. With the `py_bridge`
//! feature, [`JpypeRuntime`] hosts it through pyo3 and JPype.

mod adapter;
pub mod attach;
mod error;
#[cfg(feature = "py_bridge")]
pub mod jpype;
pub mod naming;
pub mod proxy;
pub mod value;

pub use adapter::{BridgeBackend, BridgeConnection};
pub use attach::AttachGuard;
pub use error::{BridgeError, BridgeResult};
#[cfg(feature = "py_bridge")]
pub use jpype::{JpypeRuntime, PyBridgeObject};
pub use proxy::EntityProxy;
pub use value::{BridgeKind, BridgeObject, BridgeRuntime, BridgeValue};
