//! Reflective proxy giving bridged objects the entity attribute surface
//!
//! A proxy introspects its object once, mapping every attribute name to the
//! getter and setter that carry it. Reads and writes then go through that
//! table, converting values between [`Value`] and [`BridgeValue`].

use crate::error::{BridgeError, BridgeResult};
use crate::naming;
use crate::value::{BridgeKind, BridgeObject, BridgeRuntime, BridgeValue};
use art_core::{Entity, Schema, Value};
use chrono::DateTime;
use std::collections::BTreeMap;
use std::sync::Arc;
use tracing::trace;

/// Accessors every managed object has that are not entity attributes
const IGNORED_ACCESSORS: &[&str] = &["getClass", "getActions"];

#[derive(Debug, Clone, Default)]
struct Accessors {
    getter: Option<String>,
    setter: Option<String>,
}

/// A bridged object seen through attribute names
///
/// Only zero-argument getters and one-argument setters count as accessors,
/// so lookups such as `getById(id)` stay out of the table.
pub struct EntityProxy {
    object: Arc<dyn BridgeObject>,
    table: BTreeMap<String, Accessors>,
}

impl EntityProxy {
    pub fn new(object: Arc<dyn BridgeObject>) -> Self {
        let mut table: BTreeMap<String, Accessors> = BTreeMap::new();
        for method in object.methods() {
            if IGNORED_ACCESSORS.contains(&method.as_str()) {
                continue;
            }
            let Some(attribute) = naming::accessor_attribute(&method) else {
                continue;
            };
            let is_setter = method.starts_with("set");
            let arity = object.parameter_kinds(&method).map(|kinds| kinds.len());
            if arity != Some(usize::from(is_setter)) {
                continue;
            }
            let slot = table.entry(attribute).or_default();
            if is_setter {
                slot.setter = Some(method);
            } else {
                slot.getter = Some(method);
            }
        }
        trace!(class = %object.class_name(), attributes = table.len(), "Built accessor table");
        Self { object, table }
    }

    pub fn object(&self) -> &Arc<dyn BridgeObject> {
        &self.object
    }

    pub fn class_name(&self) -> String {
        self.object.class_name()
    }

    /// Attribute names the object can read
    pub fn attributes(&self) -> impl Iterator<Item = &str> {
        self.table
            .iter()
            .filter(|(_, accessors)| accessors.getter.is_some())
            .map(|(name, _)| name.as_str())
    }

    pub fn has(&self, attribute: &str) -> bool {
        self.table.contains_key(attribute)
    }

    pub fn get(&self, attribute: &str) -> BridgeResult<BridgeValue> {
        let getter = self
            .table
            .get(attribute)
            .and_then(|a| a.getter.as_deref())
            .ok_or_else(|| BridgeError::no_such_method(self.class_name(), naming::getter(attribute)))?;
        self.object.invoke(getter, Vec::new())
    }

    pub fn set(&self, attribute: &str, value: BridgeValue) -> BridgeResult<()> {
        let setter = self
            .table
            .get(attribute)
            .and_then(|a| a.setter.as_deref())
            .ok_or_else(|| BridgeError::no_such_method(self.class_name(), naming::setter(attribute)))?;
        self.object.invoke(setter, vec![value])?;
        Ok(())
    }

    /// Declared type of the attribute's setter parameter
    pub fn kind_of(&self, attribute: &str) -> Option<BridgeKind> {
        let setter = self.table.get(attribute)?.setter.as_deref()?;
        self.object.parameter_kinds(setter)?.into_iter().next()
    }

    /// Read every attribute into an entity named `element`
    pub fn to_entity(&self, element: &str) -> BridgeResult<Entity> {
        let mut entity = Entity::new(element);
        for attribute in self.attributes() {
            let value = self.get(attribute)?;
            match (attribute, value) {
                (_, BridgeValue::Null) => {}
                ("id", value) => entity.set_id(value.as_string().map(str::to_string)),
                ("href", value) => entity.set_href(value.as_string().map(str::to_string)),
                ("links", BridgeValue::List(links)) => {
                    for link in links.iter().filter_map(BridgeValue::as_object) {
                        let link = EntityProxy::new(link.clone());
                        if let (Ok(BridgeValue::String(rel)), Ok(BridgeValue::String(href))) =
                            (link.get("rel"), link.get("href"))
                        {
                            entity.add_link(rel, href);
                        }
                    }
                }
                (attribute, value) => {
                    if let Some(value) = to_value(attribute, value)? {
                        entity.set(attribute, value);
                    }
                }
            }
        }
        Ok(entity)
    }

    /// Build a new bridged object carrying the entity's attributes
    pub fn from_entity(
        runtime: &dyn BridgeRuntime,
        entity: &Entity,
        schema: &Schema,
    ) -> BridgeResult<Self> {
        let class = schema
            .type_of_element(entity.element_name())
            .map(|t| t.type_name.clone())
            .unwrap_or_else(|| naming::to_camel(entity.element_name()));
        Self::from_entity_as(runtime, entity, &class, schema)
    }

    fn from_entity_as(
        runtime: &dyn BridgeRuntime,
        entity: &Entity,
        class: &str,
        schema: &Schema,
    ) -> BridgeResult<Self> {
        let proxy = EntityProxy::new(runtime.new_object(class)?);
        for (attribute, value) in [("id", entity.id()), ("href", entity.href())] {
            if let (Some(value), true) = (value, proxy.has(attribute)) {
                proxy.set(attribute, BridgeValue::String(value.to_string()))?;
            }
        }
        proxy.assign(runtime, entity, schema)?;
        Ok(proxy)
    }

    /// Write the entity's attributes onto the wrapped object
    pub fn assign(
        &self,
        runtime: &dyn BridgeRuntime,
        entity: &Entity,
        schema: &Schema,
    ) -> BridgeResult<()> {
        for (attribute, value) in entity.attributes() {
            let kind = self.kind_of(attribute).unwrap_or_else(|| guess_kind(attribute, value));
            let converted = to_bridge(runtime, attribute, value, &kind, schema)?;
            self.set(attribute, converted)?;
        }
        Ok(())
    }
}

/// Kind for a value whose setter does not declare one
fn guess_kind(attribute: &str, value: &Value) -> BridgeKind {
    match value {
        Value::Bool(_) => BridgeKind::Bool,
        Value::Int(_) => BridgeKind::Long,
        Value::Decimal(_) => BridgeKind::Double,
        Value::Text(_) => BridgeKind::String,
        Value::Entity(nested) => BridgeKind::Object(naming::to_camel(nested.element_name())),
        Value::List(_) => {
            trace!(attribute, "Untyped list attribute");
            BridgeKind::List
        }
    }
}

fn to_bridge(
    runtime: &dyn BridgeRuntime,
    attribute: &str,
    value: &Value,
    kind: &BridgeKind,
    schema: &Schema,
) -> BridgeResult<BridgeValue> {
    let text = || value.scalar_string().unwrap_or_default();
    let mismatch = |expected: &str| {
        BridgeError::conversion(attribute, format!("expected {}, got {:?}", expected, value))
    };
    let converted = match kind {
        BridgeKind::Bool => BridgeValue::Bool(value.as_bool().ok_or_else(|| mismatch("a boolean"))?),
        BridgeKind::Int => {
            let wide = value.as_i64().ok_or_else(|| mismatch("an integer"))?;
            BridgeValue::Int(i32::try_from(wide).map_err(|_| mismatch("a 32-bit integer"))?)
        }
        BridgeKind::Long => BridgeValue::Long(value.as_i64().ok_or_else(|| mismatch("an integer"))?),
        BridgeKind::Double => match value {
            Value::Decimal(d) => BridgeValue::Double(*d),
            Value::Int(n) => BridgeValue::Double(*n as f64),
            _ => BridgeValue::Double(text().trim().parse().map_err(|_| mismatch("a number"))?),
        },
        BridgeKind::Decimal => {
            let decimal = text();
            decimal.trim().parse::<f64>().map_err(|_| mismatch("a decimal"))?;
            BridgeValue::Decimal(decimal.trim().to_string())
        }
        BridgeKind::Date => BridgeValue::Date(
            DateTime::parse_from_rfc3339(text().trim()).map_err(|e| {
                BridgeError::conversion(attribute, format!("not an RFC 3339 date: {}", e))
            })?,
        ),
        BridgeKind::String => BridgeValue::String(text()),
        BridgeKind::List => match value {
            Value::List(items) => BridgeValue::List(
                items
                    .iter()
                    .map(|item| to_bridge(runtime, attribute, item, &guess_kind(attribute, item), schema))
                    .collect::<BridgeResult<_>>()?,
            ),
            single => BridgeValue::List(vec![to_bridge(
                runtime,
                attribute,
                single,
                &guess_kind(attribute, single),
                schema,
            )?]),
        },
        BridgeKind::Object(class) => match value {
            Value::Entity(nested) => {
                let proxy = EntityProxy::from_entity_as(runtime, nested, class, schema)?;
                BridgeValue::Object(proxy.object)
            }
            _ => return Err(mismatch(class.as_str())),
        },
    };
    Ok(converted)
}

fn to_value(attribute: &str, value: BridgeValue) -> BridgeResult<Option<Value>> {
    let converted = match value {
        BridgeValue::Null => return Ok(None),
        BridgeValue::Bool(b) => Value::Bool(b),
        BridgeValue::Int(n) => Value::Int(i64::from(n)),
        BridgeValue::Long(n) => Value::Int(n),
        BridgeValue::Double(d) => Value::Decimal(d),
        BridgeValue::Decimal(d) => match d.parse::<f64>() {
            Ok(parsed) => Value::Decimal(parsed),
            Err(_) => Value::Text(d),
        },
        BridgeValue::Date(d) => Value::Text(d.to_rfc3339()),
        BridgeValue::String(s) => Value::Text(s),
        BridgeValue::List(items) => {
            let mut values = Vec::with_capacity(items.len());
            for item in items {
                let element = match &item {
                    BridgeValue::Object(o) => naming::to_snake(&o.class_name()),
                    _ => attribute.to_string(),
                };
                if let Some(v) = to_value(&element, item)? {
                    values.push(v);
                }
            }
            Value::List(values)
        }
        BridgeValue::Object(object) => {
            let nested = EntityProxy::new(object).to_entity(attribute)?;
            if nested.attribute_count() == 0 && nested.id().is_none() && nested.href().is_none() {
                return Ok(None);
            }
            Value::from(nested)
        }
    };
    Ok(Some(converted))
}
