//! Field-by-field translation between entities and SDK objects
//!
//! Going into the SDK, scalars are coerced to the declared type of their
//! attribute, since the SDK's setters are typed. Coming back, every field is
//! copied as is.

use crate::object::{SdkField, SdkObject};
use art_core::{AttrType, Entity, EntityType, Schema, Value};
use tracing::trace;

/// Class name of `tag` under `ty`, or the tag itself when the schema does not know it
fn class_of(tag: &str, ty: Option<&EntityType>) -> String {
    ty.map(|t| t.type_name.clone())
        .unwrap_or_else(|| tag.to_string())
}

pub fn to_sdk(entity: &Entity, schema: &Schema) -> SdkObject {
    let ty = schema.type_of_element(entity.element_name());
    object_to_sdk(entity, ty, schema)
}

fn object_to_sdk(entity: &Entity, ty: Option<&EntityType>, schema: &Schema) -> SdkObject {
    let mut object = SdkObject::new(class_of(entity.element_name(), ty), entity.element_name());
    object.id = entity.id().map(str::to_string);
    object.href = entity.href().map(str::to_string);
    object.links = entity
        .links()
        .iter()
        .map(|l| (l.rel.clone(), l.href.clone()))
        .collect();

    for (name, value) in entity.attributes() {
        let declared = ty.and_then(|t| t.attribute(name)).map(|d| &d.ty);
        let child_ty = ty.and_then(|t| schema.child_type(t, name));
        object.set_field(name, value_to_field(value, declared, child_ty, schema));
    }
    object
}

fn value_to_field(
    value: &Value,
    declared: Option<&AttrType>,
    child_ty: Option<&EntityType>,
    schema: &Schema,
) -> SdkField {
    match value {
        Value::Entity(nested) => SdkField::Object(Box::new(object_to_sdk(nested, child_ty, schema))),
        Value::List(items) => SdkField::List(
            items
                .iter()
                .map(|item| value_to_field(item, declared, child_ty, schema))
                .collect(),
        ),
        scalar => coerce(scalar, declared),
    }
}

fn coerce(value: &Value, declared: Option<&AttrType>) -> SdkField {
    let text = value.scalar_string().unwrap_or_default();
    let coerced = match (declared, value) {
        (Some(AttrType::Integer), Value::Int(n)) => Some(SdkField::Long(*n)),
        (Some(AttrType::Integer), _) => text.trim().parse().ok().map(SdkField::Long),
        (Some(AttrType::Decimal), Value::Decimal(d)) => Some(SdkField::Double(*d)),
        (Some(AttrType::Decimal), _) => text.trim().parse().ok().map(SdkField::Double),
        (Some(AttrType::Boolean), Value::Bool(b)) => Some(SdkField::Bool(*b)),
        (Some(AttrType::Boolean), _) => art_core::parse_bool(text.trim()).map(SdkField::Bool),
        (Some(_), _) => Some(SdkField::Text(text.clone())),
        (None, _) => None,
    };
    coerced.unwrap_or_else(|| {
        trace!(value = %text, ?declared, "Keeping value untyped");
        match value {
            Value::Bool(b) => SdkField::Bool(*b),
            Value::Int(n) => SdkField::Long(*n),
            Value::Decimal(d) => SdkField::Double(*d),
            _ => SdkField::Text(text),
        }
    })
}

pub fn from_sdk(object: &SdkObject) -> Entity {
    let mut entity = Entity::new(object.tag.as_str());
    entity.set_id(object.id.clone());
    entity.set_href(object.href.clone());
    for (rel, href) in &object.links {
        entity.add_link(rel.as_str(), href.as_str());
    }
    for (name, field) in &object.fields {
        entity.set(name.as_str(), field_to_value(field));
    }
    entity
}

fn field_to_value(field: &SdkField) -> Value {
    match field {
        SdkField::Bool(b) => Value::Bool(*b),
        SdkField::Long(n) => Value::Int(*n),
        SdkField::Double(d) => Value::Decimal(*d),
        SdkField::Text(s) => Value::Text(s.clone()),
        SdkField::Object(o) => Value::from(from_sdk(o)),
        SdkField::List(items) => Value::List(items.iter().map(field_to_value).collect()),
    }
}
