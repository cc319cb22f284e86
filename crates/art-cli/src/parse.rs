//! Parsing of `key : value` shell output into entities
//!
//! Entities are blocks of lines separated by blank lines. Keys are padded
//! with spaces before the colon; `parent-child` keys describe nested
//! entities.

use art_core::codec::typed_scalar;
use art_core::{Entity, EntityType, Schema, Value};
use tracing::trace;

/// Split output into blocks of `(key, value)` pairs
pub fn parse_blocks(text: &str) -> Vec<Vec<(String, String)>> {
    let mut blocks = Vec::new();
    let mut current: Vec<(String, String)> = Vec::new();

    for line in text.lines() {
        if line.trim().is_empty() {
            if !current.is_empty() {
                blocks.push(std::mem::take(&mut current));
            }
            continue;
        }
        match split_pair(line) {
            Some(pair) => current.push(pair),
            None => trace!(line, "Ignoring line outside key/value format"),
        }
    }
    if !current.is_empty() {
        blocks.push(current);
    }
    blocks
}

/// `name        : vm1` -> `("name", "vm1")`; the key has no inner spaces
fn split_pair(line: &str) -> Option<(String, String)> {
    let (key, value) = line.split_once(" :")?;
    let key = key.trim();
    if key.is_empty() || key.contains(char::is_whitespace) {
        return None;
    }
    let value = value.strip_prefix(' ').unwrap_or(value);
    Some((key.to_string(), value.trim_end().to_string()))
}

/// Build one entity of type `element` from a block
pub fn block_to_entity(element: &str, pairs: &[(String, String)], schema: &Schema) -> Entity {
    let ty = schema.type_of_element(element);
    let mut entity = Entity::new(element);
    for (key, raw) in pairs {
        let parts: Vec<&str> = key.split('-').collect();
        insert(&mut entity, ty, &parts, raw, schema);
    }
    entity
}

fn insert(entity: &mut Entity, ty: Option<&EntityType>, parts: &[&str], raw: &str, schema: &Schema) {
    match parts {
        [] => {}
        ["id"] => entity.set_id(Some(raw.to_string())),
        ["href"] => entity.set_href(Some(raw.to_string())),
        [name] => {
            let value = match ty.and_then(|t| t.attribute(name)) {
                Some(desc) if !desc.ty.is_complex() => typed_scalar(raw, &desc.ty),
                _ => Value::from(raw),
            };
            entity.set(*name, value);
        }
        [head, rest @ ..] => {
            let child_ty = ty.and_then(|t| schema.child_type(t, head));
            if let Some(Value::Entity(child)) = entity.get_mut(head) {
                insert(child, child_ty, rest, raw, schema);
                return;
            }
            let mut child = Entity::new(*head);
            insert(&mut child, child_ty, rest, raw, schema);
            entity.set(*head, child);
        }
    }
}

/// Every entity block in `text`
pub fn parse_entities(text: &str, element: &str, schema: &Schema) -> Vec<Entity> {
    parse_blocks(text)
        .iter()
        .map(|block| block_to_entity(element, block, schema))
        .collect()
}
