//! Entity type representing one managed object (VM, host, cluster, ...)

use crate::value::Value;
use indexmap::IndexMap;

/// A named relation from an entity to a sub-collection or related object
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct Link {
    pub rel: String,
    pub href: String,
}

/// One typed instance of a managed-platform object
///
/// `element_name` is the singular type tag ("vm"). `id` and `href` are kept
/// apart from the attribute map because they are server-owned and never
/// compared.
#[derive(Debug, Clone, PartialEq, Default)]
pub struct Entity {
    element_name: String,
    id: Option<String>,
    href: Option<String>,
    attributes: IndexMap<String, Value>,
    links: Vec<Link>,
}

impl Entity {
    /// Create an empty entity of the given element type
    pub fn new(element_name: impl Into<String>) -> Self {
        Self {
            element_name: element_name.into(),
            ..Default::default()
        }
    }

    /// Builder-style attribute setter
    pub fn with(mut self, name: impl Into<String>, value: impl Into<Value>) -> Self {
        self.set(name, value);
        self
    }

    /// Builder-style id setter
    pub fn with_id(mut self, id: impl Into<String>) -> Self {
        self.id = Some(id.into());
        self
    }

    /// Builder-style href setter
    pub fn with_href(mut self, href: impl Into<String>) -> Self {
        self.href = Some(href.into());
        self
    }

    pub fn element_name(&self) -> &str {
        &self.element_name
    }

    pub fn set_element_name(&mut self, element_name: impl Into<String>) {
        self.element_name = element_name.into();
    }

    pub fn id(&self) -> Option<&str> {
        self.id.as_deref()
    }

    pub fn set_id(&mut self, id: Option<String>) {
        self.id = id;
    }

    pub fn href(&self) -> Option<&str> {
        self.href.as_deref()
    }

    pub fn set_href(&mut self, href: Option<String>) {
        self.href = href;
    }

    pub fn get(&self, name: &str) -> Option<&Value> {
        self.attributes.get(name)
    }

    pub fn get_mut(&mut self, name: &str) -> Option<&mut Value> {
        self.attributes.get_mut(name)
    }

    pub fn set(&mut self, name: impl Into<String>, value: impl Into<Value>) {
        self.attributes.insert(name.into(), value.into());
    }

    pub fn remove(&mut self, name: &str) -> Option<Value> {
        self.attributes.shift_remove(name)
    }

    pub fn contains(&self, name: &str) -> bool {
        self.attributes.contains_key(name)
    }

    /// Attributes in insertion (or wire) order
    pub fn attributes(&self) -> impl Iterator<Item = (&str, &Value)> {
        self.attributes.iter().map(|(k, v)| (k.as_str(), v))
    }

    pub fn attribute_count(&self) -> usize {
        self.attributes.len()
    }

    /// Append a value to an attribute, promoting it to a list if needed
    pub fn push(&mut self, name: impl Into<String>, value: impl Into<Value>) {
        let value = value.into();
        match self.attributes.entry(name.into()) {
            indexmap::map::Entry::Occupied(mut slot) => match slot.get_mut() {
                Value::List(items) => items.push(value),
                existing => {
                    let first = std::mem::replace(existing, Value::List(Vec::new()));
                    *existing = Value::List(vec![first, value]);
                }
            },
            indexmap::map::Entry::Vacant(slot) => {
                slot.insert(value);
            }
        }
    }

    /// Resolve a dotted attribute path such as `host.name` or `status.state`
    pub fn get_path(&self, path: &str) -> Option<&Value> {
        let mut parts = path.split('.');
        let first = parts.next()?;
        let mut current = self.attributes.get(first)?;
        for part in parts {
            current = match current {
                Value::Entity(e) => e.get(part)?,
                _ => return None,
            };
        }
        Some(current)
    }

    /// String form of the value at a dotted path, including `id`/`href`
    pub fn get_path_string(&self, path: &str) -> Option<String> {
        match path {
            "id" => return self.id.clone(),
            "href" => return self.href.clone(),
            _ => {}
        }
        if let Some((head, tail)) = path.split_once('.') {
            if let Some(Value::Entity(child)) = self.attributes.get(head) {
                return child.get_path_string(tail);
            }
            return None;
        }
        self.attributes.get(path).and_then(Value::scalar_string)
    }

    /// The `name` attribute, when it is text
    pub fn name(&self) -> Option<&str> {
        self.get("name").and_then(Value::as_str)
    }

    /// Current status name, lowercased.
    ///
    /// Accepts both `<status>up</status>` and `<status><state>up</state></status>`.
    pub fn status_name(&self) -> Option<String> {
        match self.get("status")? {
            Value::Entity(status) => status
                .get("state")
                .and_then(Value::scalar_string)
                .map(|s| s.to_ascii_lowercase()),
            other => other.scalar_string().map(|s| s.to_ascii_lowercase()),
        }
    }

    pub fn links(&self) -> &[Link] {
        &self.links
    }

    pub fn add_link(&mut self, rel: impl Into<String>, href: impl Into<String>) {
        self.links.push(Link {
            rel: rel.into(),
            href: href.into(),
        });
    }

    pub fn link(&self, rel: &str) -> Option<&str> {
        self.links
            .iter()
            .find(|l| l.rel == rel)
            .map(|l| l.href.as_str())
    }

    /// Human-readable identifier for log lines
    pub fn describe(&self) -> String {
        match (self.name(), self.id()) {
            (Some(name), _) => format!("{} '{}'", self.element_name, name),
            (None, Some(id)) => format!("{} id={}", self.element_name, id),
            (None, None) => self.element_name.clone(),
        }
    }
}
