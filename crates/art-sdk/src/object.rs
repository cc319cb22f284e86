//! The SDK's own object hierarchy
//!
//! SDK objects are instances of generated classes (`VM`, `Cluster`, ...)
//! rather than generic entities. Each carries its class, the tag it is
//! serialized under, identity fields and typed fields in declaration order.

use indexmap::IndexMap;

#[derive(Debug, Clone, PartialEq)]
pub enum SdkField {
    Bool(bool),
    Long(i64),
    Double(f64),
    Text(String),
    Object(Box<SdkObject>),
    List(Vec<SdkField>),
}

impl SdkField {
    pub fn as_text(&self) -> Option<&str> {
        match self {
            SdkField::Text(s) => Some(s),
            _ => None,
        }
    }

    pub fn as_object(&self) -> Option<&SdkObject> {
        match self {
            SdkField::Object(o) => Some(o),
            _ => None,
        }
    }
}

#[derive(Debug, Clone, PartialEq)]
pub struct SdkObject {
    pub class_name: String,
    pub tag: String,
    pub id: Option<String>,
    pub href: Option<String>,
    pub links: Vec<(String, String)>,
    pub fields: IndexMap<String, SdkField>,
}

impl SdkObject {
    pub fn new(class_name: impl Into<String>, tag: impl Into<String>) -> Self {
        Self {
            class_name: class_name.into(),
            tag: tag.into(),
            id: None,
            href: None,
            links: Vec::new(),
            fields: IndexMap::new(),
        }
    }

    pub fn field(&self, name: &str) -> Option<&SdkField> {
        self.fields.get(name)
    }

    pub fn set_field(&mut self, name: impl Into<String>, value: SdkField) {
        self.fields.insert(name.into(), value);
    }

    pub fn name(&self) -> Option<&str> {
        self.field("name").and_then(SdkField::as_text)
    }

    pub fn link(&self, rel: &str) -> Option<&str> {
        self.links
            .iter()
            .find(|(r, _)| r == rel)
            .map(|(_, href)| href.as_str())
    }

    /// `status.state`, or a plain `status` text
    pub fn state(&self) -> Option<String> {
        match self.field("status")? {
            SdkField::Object(status) => status
                .field("state")
                .and_then(SdkField::as_text)
                .map(str::to_ascii_lowercase),
            SdkField::Text(state) => Some(state.to_ascii_lowercase()),
            _ => None,
        }
    }
}
