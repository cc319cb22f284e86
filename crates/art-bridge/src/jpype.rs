//! Bridged runtime over an embedded Python interpreter hosting JPype
//!
//! The interpreter is initialized by pyo3 on first use. JPype starts the JVM
//! with the configured classpath; SDK objects then live as JPype proxies and
//! every call goes through the GIL.

use crate::error::{BridgeError, BridgeResult};
use crate::value::{BridgeKind, BridgeObject, BridgeRuntime, BridgeValue};
use art_config::{ApiOptions, RunOptions};
use chrono::DateTime;
use pyo3::prelude::*;
use pyo3::types::{PyBool, PyDict, PyFloat, PyList, PyLong, PyString, PyTuple};
use std::any::Any;
use std::sync::Arc;
use std::time::Duration;
use tracing::{debug, info};

fn jclass<'py>(py: Python<'py>, name: &str) -> PyResult<Bound<'py, PyAny>> {
    py.import_bound("jpype")?.call_method1("JClass", (name,))
}

fn python_type_name(py: Python<'_>, err: &PyErr) -> String {
    err.get_type_bound(py)
        .getattr("__name__")
        .and_then(|n| n.extract::<String>())
        .unwrap_or_default()
}

/// Map an exception raised by a bridged call
fn java_error(py: Python<'_>, method: &str, err: PyErr, timeout: Duration) -> BridgeError {
    let type_name = python_type_name(py, &err);
    let value = err.value_bound(py);
    if type_name.contains("ServerException") {
        let status = value
            .call_method0("getStatus")
            .and_then(|s| s.extract::<u16>())
            .unwrap_or(0);
        let text = |getter: &str| {
            value
                .call_method0(getter)
                .and_then(|v| v.str().map(|s| s.to_string()))
                .unwrap_or_default()
        };
        return BridgeError::Engine {
            method: method.to_string(),
            status,
            reason: text("getReason"),
            detail: text("getDetail"),
        };
    }
    if type_name.contains("Timeout") || err.to_string().contains("SocketTimeoutException") {
        return BridgeError::Timeout {
            method: method.to_string(),
            elapsed: timeout,
        };
    }
    if type_name == "AttributeError" {
        let class = value
            .getattr("obj")
            .and_then(|o| o.get_type().getattr("__name__"))
            .and_then(|n| n.extract::<String>())
            .unwrap_or_default();
        return BridgeError::no_such_method(class, method);
    }
    BridgeError::Runtime(format!("{}: {}", method, err))
}

/// Parameter kind for a Java class simple name
fn kind_of_class(simple_name: &str) -> BridgeKind {
    match simple_name {
        "boolean" | "Boolean" => BridgeKind::Bool,
        "int" | "Integer" | "short" | "Short" => BridgeKind::Int,
        "long" | "Long" => BridgeKind::Long,
        "double" | "Double" | "float" | "Float" => BridgeKind::Double,
        "BigDecimal" | "BigInteger" => BridgeKind::Decimal,
        "XMLGregorianCalendar" | "Date" => BridgeKind::Date,
        "String" => BridgeKind::String,
        "List" | "ArrayList" | "Collection" => BridgeKind::List,
        other => BridgeKind::Object(other.to_string()),
    }
}

fn to_py(py: Python<'_>, value: &BridgeValue) -> PyResult<PyObject> {
    let jpype = py.import_bound("jpype")?;
    let converted = match value {
        BridgeValue::Null => py.None(),
        BridgeValue::Bool(b) => b.to_object(py),
        BridgeValue::Int(n) => jpype.getattr("JInt")?.call1((*n,))?.unbind(),
        BridgeValue::Long(n) => jpype.getattr("JLong")?.call1((*n,))?.unbind(),
        BridgeValue::Double(d) => jpype.getattr("JDouble")?.call1((*d,))?.unbind(),
        BridgeValue::Decimal(d) => jclass(py, "java.math.BigDecimal")?.call1((d.as_str(),))?.unbind(),
        BridgeValue::Date(d) => jclass(py, "javax.xml.datatype.DatatypeFactory")?
            .call_method0("newInstance")?
            .call_method1("newXMLGregorianCalendar", (d.to_rfc3339(),))?
            .unbind(),
        BridgeValue::String(s) => s.to_object(py),
        BridgeValue::List(items) => {
            let list = jclass(py, "java.util.ArrayList")?.call0()?;
            for item in items {
                list.call_method1("add", (to_py(py, item)?,))?;
            }
            list.unbind()
        }
        BridgeValue::Object(object) => match object
            .as_any()
            .and_then(|any| any.downcast_ref::<PyBridgeObject>())
        {
            Some(bridged) => bridged.object.clone_ref(py),
            None => {
                return Err(pyo3::exceptions::PyTypeError::new_err(format!(
                    "{} is not a JPype object",
                    object.class_name()
                )))
            }
        },
    };
    Ok(converted)
}

fn from_py(value: &Bound<'_, PyAny>, timeout: Duration) -> PyResult<BridgeValue> {
    if value.is_none() {
        return Ok(BridgeValue::Null);
    }
    if value.is_instance_of::<PyBool>() {
        return Ok(BridgeValue::Bool(value.extract()?));
    }
    if value.is_instance_of::<PyString>() {
        return Ok(BridgeValue::String(value.extract()?));
    }
    if value.is_instance_of::<PyLong>() {
        return Ok(BridgeValue::Long(value.extract()?));
    }
    if value.is_instance_of::<PyFloat>() {
        return Ok(BridgeValue::Double(value.extract()?));
    }
    if !value.hasattr("getClass")? {
        return Ok(BridgeValue::String(value.str()?.to_string()));
    }

    let simple_name: String = value
        .call_method0("getClass")?
        .call_method0("getSimpleName")?
        .extract()?;
    let converted = match simple_name.as_str() {
        "Boolean" => BridgeValue::Bool(value.call_method0("booleanValue")?.extract()?),
        "Integer" | "Short" | "Byte" => BridgeValue::Int(value.call_method0("intValue")?.extract()?),
        "Long" => BridgeValue::Long(value.call_method0("longValue")?.extract()?),
        "Double" | "Float" => BridgeValue::Double(value.call_method0("doubleValue")?.extract()?),
        "BigDecimal" | "BigInteger" => BridgeValue::Decimal(value.call_method0("toString")?.extract()?),
        "String" => BridgeValue::String(value.call_method0("toString")?.extract()?),
        name if name.contains("XMLGregorianCalendar") => {
            let text: String = value.call_method0("toXMLFormat")?.extract()?;
            match DateTime::parse_from_rfc3339(&text) {
                Ok(date) => BridgeValue::Date(date),
                Err(_) => BridgeValue::String(text),
            }
        }
        _ if value.is_instance(&jclass(value.py(), "java.util.List")?)? => {
            let size: usize = value.call_method0("size")?.extract()?;
            let mut items = Vec::with_capacity(size);
            for i in 0..size {
                items.push(from_py(&value.call_method1("get", (i,))?, timeout)?);
            }
            BridgeValue::List(items)
        }
        _ => BridgeValue::Object(Arc::new(PyBridgeObject {
            object: value.clone().unbind(),
            timeout,
        })),
    };
    Ok(converted)
}

/// An SDK object held as a JPype proxy
pub struct PyBridgeObject {
    object: PyObject,
    timeout: Duration,
}

impl PyBridgeObject {
    /// Public methods of the object's class as reflected by the JVM
    fn reflected_methods<'py>(&self, py: Python<'py>) -> PyResult<Vec<Bound<'py, PyAny>>> {
        let methods = self
            .object
            .bind(py)
            .call_method0("getClass")?
            .call_method0("getMethods")?;
        methods.iter()?.collect()
    }
}

impl BridgeObject for PyBridgeObject {
    fn class_name(&self) -> String {
        Python::with_gil(|py| {
            self.object
                .bind(py)
                .call_method0("getClass")
                .and_then(|c| c.call_method0("getSimpleName"))
                .and_then(|n| n.extract::<String>())
                .unwrap_or_default()
        })
    }

    fn methods(&self) -> Vec<String> {
        Python::with_gil(|py| {
            let mut names: Vec<String> = self
                .reflected_methods(py)
                .unwrap_or_default()
                .iter()
                .filter_map(|m| m.call_method0("getName").and_then(|n| n.extract()).ok())
                .collect();
            names.sort();
            names.dedup();
            names
        })
    }

    fn parameter_kinds(&self, method: &str) -> Option<Vec<BridgeKind>> {
        Python::with_gil(|py| {
            let widest = self
                .reflected_methods(py)
                .ok()?
                .into_iter()
                .filter(|m| {
                    m.call_method0("getName")
                        .and_then(|n| n.extract::<String>())
                        .is_ok_and(|name| name == method)
                })
                .max_by_key(|m| {
                    m.call_method0("getParameterCount")
                        .and_then(|c| c.extract::<usize>())
                        .unwrap_or(0)
                })?;
            let types = widest.call_method0("getParameterTypes").ok()?;
            let kinds = types
                .iter()
                .ok()?
                .filter_map(|ty| {
                    let ty = ty.ok()?;
                    let name: String = ty.call_method0("getSimpleName").ok()?.extract().ok()?;
                    Some(kind_of_class(&name))
                })
                .collect();
            Some(kinds)
        })
    }

    fn invoke(&self, method: &str, args: Vec<BridgeValue>) -> BridgeResult<BridgeValue> {
        Python::with_gil(|py| -> BridgeResult<BridgeValue> {
            let args = args
                .iter()
                .map(|arg| to_py(py, arg))
                .collect::<PyResult<Vec<_>>>()
                .map_err(|e| BridgeError::conversion(method, e.to_string()))?;
            let result = self
                .object
                .bind(py)
                .call_method1(method, PyTuple::new_bound(py, args))
                .map_err(|e| java_error(py, method, e, self.timeout))?;
            from_py(&result, self.timeout).map_err(|e| BridgeError::conversion(method, e.to_string()))
        })
    }

    fn as_any(&self) -> Option<&dyn Any> {
        Some(self)
    }
}

/// JVM hosted by JPype inside the embedded interpreter
pub struct JpypeRuntime {
    api_class: String,
    entities_package: String,
    timeout: Duration,
}

impl JpypeRuntime {
    /// Start the JVM unless something in the process already did
    pub fn start(options: &RunOptions) -> BridgeResult<Self> {
        let bridge = &options.bridge;
        Python::with_gil(|py| -> PyResult<()> {
            let jpype = py.import_bound("jpype")?;
            if jpype.call_method0("isJVMStarted")?.extract::<bool>()? {
                debug!("JVM already running");
                return Ok(());
            }
            let jvm_path = match &bridge.jvm_path {
                Some(path) => path.display().to_string(),
                None => jpype.call_method0("getDefaultJVMPath")?.extract()?,
            };
            let kwargs = PyDict::new_bound(py);
            kwargs.set_item("classpath", PyList::new_bound(py, &bridge.classpath))?;
            kwargs.set_item("convertStrings", true)?;
            jpype.call_method("startJVM", (jvm_path.as_str(),), Some(&kwargs))?;
            info!(jvm = %jvm_path, classpath = ?bridge.classpath, "Started JVM");
            Ok(())
        })
        .map_err(|e| BridgeError::Runtime(format!("cannot start the JVM: {}", e)))?;

        Ok(Self {
            api_class: bridge.api_class.clone(),
            entities_package: bridge.entities_package.clone(),
            timeout: options.api.request_timeout(),
        })
    }

    fn thread_call(&self, method: &str) -> BridgeResult<bool> {
        Python::with_gil(|py| -> PyResult<bool> {
            let result = jclass(py, "java.lang.Thread")?.call_method0(method)?;
            if result.is_none() {
                return Ok(true);
            }
            result.extract::<bool>()
        })
        .map_err(|e| BridgeError::Attach(format!("{}: {}", method, e)))
    }
}

impl BridgeRuntime for JpypeRuntime {
    fn is_thread_attached(&self) -> bool {
        self.thread_call("isAttached").unwrap_or(false)
    }

    fn attach_thread(&self) -> BridgeResult<()> {
        self.thread_call("attach").map(|_| ())
    }

    fn detach_thread(&self) -> BridgeResult<()> {
        self.thread_call("detach").map(|_| ())
    }

    fn new_object(&self, class_name: &str) -> BridgeResult<Arc<dyn BridgeObject>> {
        let qualified = format!("{}.{}", self.entities_package, class_name);
        Python::with_gil(|py| -> BridgeResult<Arc<dyn BridgeObject>> {
            let object = jclass(py, &qualified)
                .and_then(|class| class.call0())
                .map_err(|e| BridgeError::Runtime(format!("cannot instantiate {}: {}", qualified, e)))?;
            Ok(Arc::new(PyBridgeObject {
                object: object.unbind(),
                timeout: self.timeout,
            }) as Arc<dyn BridgeObject>)
        })
    }

    fn connect(&self, api: &ApiOptions) -> BridgeResult<Arc<dyn BridgeObject>> {
        let url = api.base_url();
        info!(url = %url, user = %api.login_name(), "Connecting bridged SDK");
        Python::with_gil(|py| -> BridgeResult<Arc<dyn BridgeObject>> {
            let class = jclass(py, &self.api_class)
                .map_err(|e| BridgeError::Runtime(format!("cannot load {}: {}", self.api_class, e)))?;
            let handle = class
                .call1((url.as_str(), api.login_name(), api.password.as_str(), api.insecure))
                .map_err(|e| java_error(py, "connect", e, self.timeout))?;
            Ok(Arc::new(PyBridgeObject {
                object: handle.unbind(),
                timeout: self.timeout,
            }) as Arc<dyn BridgeObject>)
        })
    }
}
