//! Values crossing the bridge, and the object/runtime seams

use crate::error::BridgeResult;
use art_config::ApiOptions;
use chrono::{DateTime, FixedOffset};
use std::any::Any;
use std::fmt;
use std::sync::Arc;

/// A value as the managed runtime sees it
#[derive(Clone)]
pub enum BridgeValue {
    Null,
    Bool(bool),
    Int(i32),
    Long(i64),
    Double(f64),
    /// Arbitrary-precision decimal, in its canonical text form
    Decimal(String),
    Date(DateTime<FixedOffset>),
    String(String),
    List(Vec<BridgeValue>),
    Object(Arc<dyn BridgeObject>),
}

impl fmt::Debug for BridgeValue {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match self {
            BridgeValue::Null => f.write_str("Null"),
            BridgeValue::Bool(b) => write!(f, "Bool({})", b),
            BridgeValue::Int(n) => write!(f, "Int({})", n),
            BridgeValue::Long(n) => write!(f, "Long({})", n),
            BridgeValue::Double(d) => write!(f, "Double({})", d),
            BridgeValue::Decimal(d) => write!(f, "Decimal({})", d),
            BridgeValue::Date(d) => write!(f, "Date({})", d.to_rfc3339()),
            BridgeValue::String(s) => write!(f, "String({:?})", s),
            BridgeValue::List(items) => f.debug_list().entries(items).finish(),
            BridgeValue::Object(o) => write!(f, "Object({})", o.class_name()),
        }
    }
}

impl BridgeValue {
    pub fn is_null(&self) -> bool {
        matches!(self, BridgeValue::Null)
    }

    pub fn as_object(&self) -> Option<&Arc<dyn BridgeObject>> {
        match self {
            BridgeValue::Object(o) => Some(o),
            _ => None,
        }
    }

    pub fn as_list(&self) -> Option<&[BridgeValue]> {
        match self {
            BridgeValue::List(items) => Some(items),
            _ => None,
        }
    }

    pub fn as_string(&self) -> Option<&str> {
        match self {
            BridgeValue::String(s) => Some(s),
            _ => None,
        }
    }
}

/// Declared parameter type of a method, used to convert arguments
#[derive(Debug, Clone, PartialEq, Eq)]
pub enum BridgeKind {
    Bool,
    Int,
    Long,
    Double,
    Decimal,
    Date,
    String,
    List,
    /// An SDK class, by simple name
    Object(String),
}

/// An object living in the managed runtime
pub trait BridgeObject: Send + Sync {
    /// Simple class name ("VM")
    fn class_name(&self) -> String;

    /// Public method names
    fn methods(&self) -> Vec<String>;

    /// Parameter kinds of the widest overload of `method`, if the object has it
    fn parameter_kinds(&self, method: &str) -> Option<Vec<BridgeKind>>;

    fn invoke(&self, method: &str, args: Vec<BridgeValue>) -> BridgeResult<BridgeValue>;

    /// Concrete object, for runtimes that need their own handle back
    fn as_any(&self) -> Option<&dyn Any> {
        None
    }
}

/// The managed runtime hosting the SDK
pub trait BridgeRuntime: Send + Sync {
    fn is_thread_attached(&self) -> bool;

    fn attach_thread(&self) -> BridgeResult<()>;

    fn detach_thread(&self) -> BridgeResult<()>;

    /// Instantiate an SDK entity class by simple name
    fn new_object(&self, class_name: &str) -> BridgeResult<Arc<dyn BridgeObject>>;

    /// Connect the SDK's API object
    fn connect(&self, api: &ApiOptions) -> BridgeResult<Arc<dyn BridgeObject>>;
}
