//! Entity <-> XML mapping guided by the schema

use crate::entity::Entity;
use crate::error::{ApiError, ApiResult};
use crate::schema::{AttrType, Cardinality, EntityType, Schema};
use crate::value::{parse_bool, Value};
use crate::xml::XmlNode;
use tracing::trace;

/// Serialize an entity into an element tree
pub fn to_xml(entity: &Entity, schema: &Schema) -> XmlNode {
    let ty = schema.type_of_element(entity.element_name());
    write_entity(entity.element_name(), entity, ty, schema)
}

/// Serialize an entity into a complete XML document
pub fn to_document(entity: &Entity, schema: &Schema) -> String {
    to_xml(entity, schema).to_document()
}

/// Parse one entity from an element tree
pub fn from_xml(node: &XmlNode, schema: &Schema) -> Entity {
    let ty = schema.type_of_element(node.local_name());
    read_entity(node, ty, schema)
}

/// Parse the items of a collection element (`<vms><vm/>...</vms>`)
pub fn collection_from_xml(node: &XmlNode, schema: &Schema) -> Vec<Entity> {
    node.children
        .iter()
        .filter(|child| !matches!(child.local_name(), "link" | "actions"))
        .map(|child| from_xml(child, schema))
        .collect()
}

/// Parse a document holding a single entity
pub fn parse_entity(xml: &str, schema: &Schema) -> ApiResult<Entity> {
    let root = XmlNode::parse(xml)?;
    if schema.is_collection(root.local_name()) {
        return Err(ApiError::Xml(format!(
            "expected a single entity, found collection <{}>",
            root.name
        )));
    }
    Ok(from_xml(&root, schema))
}

/// Parse a document holding a collection
pub fn parse_collection(xml: &str, schema: &Schema) -> ApiResult<Vec<Entity>> {
    let root = XmlNode::parse(xml)?;
    Ok(collection_from_xml(&root, schema))
}

fn write_entity(tag: &str, entity: &Entity, ty: Option<&EntityType>, schema: &Schema) -> XmlNode {
    let mut node = XmlNode::new(tag);
    if let Some(id) = entity.id() {
        node.set_attr("id", id);
    }
    if let Some(href) = entity.href() {
        node.set_attr("href", href);
    }

    for (name, value) in entity.attributes() {
        let desc = ty.and_then(|t| t.attribute(name));
        if desc.map(|d| d.xml_attribute).unwrap_or(false) {
            if let Some(text) = value.scalar_string() {
                node.set_attr(name, text);
                continue;
            }
        }
        let child_ty = ty.and_then(|t| schema.child_type(t, name));
        write_value(&mut node, name, value, child_ty, schema);
    }

    for link in entity.links() {
        let mut child = XmlNode::new("link");
        child.set_attr("rel", link.rel.as_str());
        child.set_attr("href", link.href.as_str());
        node.push(child);
    }
    node
}

fn write_value(
    parent: &mut XmlNode,
    name: &str,
    value: &Value,
    ty: Option<&EntityType>,
    schema: &Schema,
) {
    match value {
        Value::List(items) => {
            for item in items {
                write_value(parent, name, item, ty, schema);
            }
        }
        Value::Entity(child) => {
            let ty = ty.or_else(|| schema.type_of_element(child.element_name()));
            parent.push(write_entity(name, child, ty, schema));
        }
        scalar => parent.push(XmlNode::leaf(name, scalar.scalar_string().unwrap_or_default())),
    }
}

fn read_entity(node: &XmlNode, ty: Option<&EntityType>, schema: &Schema) -> Entity {
    let mut entity = Entity::new(node.local_name());

    for (key, text) in &node.attributes {
        match key.as_str() {
            "id" => entity.set_id(Some(text.clone())),
            "href" => entity.set_href(Some(text.clone())),
            k if k.starts_with("xmlns") => {}
            k => {
                let attr_ty = ty
                    .and_then(|t| t.attribute(k))
                    .map(|d| &d.ty)
                    .unwrap_or(&AttrType::String);
                entity.set(k, typed_scalar(text, attr_ty));
            }
        }
    }

    for child in &node.children {
        let name = child.local_name();
        match name {
            "link" => {
                if let (Some(rel), Some(href)) = (child.attr("rel"), child.attr("href")) {
                    entity.add_link(rel, href);
                }
                continue;
            }
            "actions" => continue,
            _ => {}
        }

        let Some(desc) = ty.and_then(|t| t.attribute(name)) else {
            trace!(element = name, parent = node.local_name(), "Keeping undeclared element");
            let value = if child.is_leaf() && child.attributes.is_empty() {
                Value::Text(child.text.clone())
            } else {
                Value::from(read_entity(child, schema.type_of_element(name), schema))
            };
            entity.push(name, value);
            continue;
        };

        let value = match &desc.ty {
            AttrType::Complex(type_name) => {
                Value::from(read_entity(child, schema.entity_type(type_name), schema))
            }
            scalar => typed_scalar(&child.text, scalar),
        };

        match desc.cardinality {
            Cardinality::Many => match entity.get_mut(name) {
                Some(Value::List(items)) => items.push(value),
                _ => entity.set(name, Value::List(vec![value])),
            },
            Cardinality::One => entity.set(name, value),
        }
    }
    entity
}

/// Type a leaf's text per its declared type, keeping text when it does not parse
pub fn typed_scalar(text: &str, ty: &AttrType) -> Value {
    let trimmed = text.trim();
    match ty {
        AttrType::Integer => trimmed
            .parse::<i64>()
            .map(Value::Int)
            .unwrap_or_else(|_| Value::Text(text.to_string())),
        AttrType::Decimal => trimmed
            .parse::<f64>()
            .map(Value::Decimal)
            .unwrap_or_else(|_| Value::Text(text.to_string())),
        AttrType::Boolean => parse_bool(trimmed)
            .map(Value::Bool)
            .unwrap_or_else(|| Value::Text(text.to_string())),
        AttrType::String | AttrType::DateTime | AttrType::Complex(_) => {
            Value::Text(text.to_string())
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    fn schema() -> std::sync::Arc<Schema> {
        Schema::shared().unwrap()
    }

    #[test]
    fn test_parse_typed_entity() {
        let xml = r#"<vm id="42" href="/api/vms/42">
            <name>vm1</name>
            <memory>1073741824</memory>
            <stateless>false</stateless>
            <status><state>down</state></status>
            <cpu><topology sockets="2" cores="1"/></cpu>
            <cluster id="7" href="/api/clusters/7"/>
            <tag><name>a</name></tag>
            <link rel="nics" href="/api/vms/42/nics"/>
            <actions><link rel="start" href="/api/vms/42/start"/></actions>
            <unknown_thing>kept</unknown_thing>
        </vm>"#;
        let vm = parse_entity(xml, &schema()).unwrap();

        assert_eq!(vm.id(), Some("42"));
        assert_eq!(vm.href(), Some("/api/vms/42"));
        assert_eq!(vm.name(), Some("vm1"));
        assert_eq!(vm.get("memory"), Some(&Value::Int(1073741824)));
        assert_eq!(vm.get("stateless"), Some(&Value::Bool(false)));
        assert_eq!(vm.status_name().as_deref(), Some("down"));
        assert_eq!(vm.get_path("cpu.topology.sockets"), Some(&Value::Int(2)));
        assert_eq!(vm.get("cluster").and_then(Value::as_entity).and_then(Entity::id), Some("7"));
        assert_eq!(vm.get("tag").and_then(Value::as_list).map(|l| l.len()), Some(1));
        assert_eq!(vm.link("nics"), Some("/api/vms/42/nics"));
        assert_eq!(vm.link("start"), None);
        assert_eq!(vm.get("unknown_thing"), Some(&Value::Text("kept".into())));
    }

    #[test]
    fn test_write_then_parse_keeps_shape() {
        let schema = schema();
        let vm = Entity::new("vm")
            .with("name", "vm1")
            .with("memory", 512i64)
            .with(
                "cpu",
                Entity::new("cpu").with(
                    "topology",
                    Entity::new("topology").with("sockets", 4i64),
                ),
            )
            .with("cluster", Entity::new("cluster").with("name", "Default"));

        let node = to_xml(&vm, &schema);
        let topology = node.child("cpu").and_then(|c| c.child("topology")).unwrap();
        assert_eq!(topology.attr("sockets"), Some("4"));

        let back = from_xml(&node, &schema);
        assert_eq!(back.get_path("cluster.name"), Some(&Value::Text("Default".into())));
        assert_eq!(back.get_path("cpu.topology.sockets"), Some(&Value::Int(4)));
    }

    #[test]
    fn test_collection() {
        let xml = r#"<vms><vm id="1"><name>a</name></vm><vm id="2"><name>b</name></vm></vms>"#;
        let vms = parse_collection(xml, &schema()).unwrap();
        assert_eq!(vms.len(), 2);
        assert_eq!(vms[1].name(), Some("b"));
        assert!(parse_entity(xml, &schema()).is_err());
    }
}
