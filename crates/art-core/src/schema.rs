//! Schema-derived type descriptors for the entity model
//!
//! The engine publishes an XSD describing every entity. We read the subset of
//! XSD it uses:
//!
//! - top-level `xs:element name=".." type=".."` declarations
//! - named `xs:complexType` with `xs:sequence` / `xs:all` / `xs:choice`
//!   children (`xs:element name type` or `xs:element ref`), `maxOccurs`,
//!   `xs:attribute`, and `xs:complexContent/xs:extension base` inheritance
//! - named `xs:simpleType` restrictions, which alias a built-in type
//!
//! A collection is a top-level element whose type holds exactly one unbounded
//! reference to another top-level element ("vms" holding "vm").

use crate::error::{ApiError, ApiResult};
use crate::xml::XmlNode;
use indexmap::IndexMap;
use std::collections::HashMap;
use std::fmt;
use std::path::Path;
use std::sync::{Arc, OnceLock};
use tracing::{debug, info};

/// The XSD shipped with the crate
pub const BUNDLED_XSD: &str = include_str!("../schema/api.xsd");

/// Elements every resource may carry that are not entity attributes
const STRUCTURAL_ELEMENTS: &[&str] = &["link", "actions"];

/// Maximum `xs:extension` chain length before assuming a cycle
const MAX_INHERITANCE_DEPTH: usize = 16;

static SHARED_SCHEMA: OnceLock<Arc<Schema>> = OnceLock::new();

/// Declared type of one attribute
#[derive(Debug, Clone, PartialEq, Eq)]
pub enum AttrType {
    String,
    Integer,
    Decimal,
    Boolean,
    DateTime,
    /// Another complex type, by type name
    Complex(String),
}

impl AttrType {
    pub fn is_complex(&self) -> bool {
        matches!(self, AttrType::Complex(_))
    }

    fn from_builtin(name: &str) -> Option<Self> {
        let local = name.rsplit_once(':').map(|(_, l)| l).unwrap_or(name);
        let is_builtin = name.starts_with("xs:") || name.starts_with("xsd:");
        if !is_builtin {
            return None;
        }
        Some(match local {
            "int" | "long" | "integer" | "short" | "byte" | "unsignedShort" | "unsignedInt"
            | "unsignedLong" | "unsignedByte" | "nonNegativeInteger" | "positiveInteger" => {
                AttrType::Integer
            }
            "decimal" | "double" | "float" => AttrType::Decimal,
            "boolean" => AttrType::Boolean,
            "dateTime" | "date" | "time" => AttrType::DateTime,
            _ => AttrType::String,
        })
    }

    /// Check that a leaf's text parses as this type
    pub fn accepts(&self, text: &str) -> bool {
        let text = text.trim();
        match self {
            AttrType::String | AttrType::Complex(_) => true,
            AttrType::Integer => text.parse::<i64>().is_ok() || text.parse::<u64>().is_ok(),
            AttrType::Decimal => text.parse::<f64>().is_ok(),
            AttrType::Boolean => matches!(text, "true" | "false" | "1" | "0"),
            AttrType::DateTime => {
                chrono::DateTime::parse_from_rfc3339(text).is_ok()
                    || chrono::NaiveDate::parse_from_str(text, "%Y-%m-%d").is_ok()
                    || chrono::NaiveDateTime::parse_from_str(text, "%Y-%m-%dT%H:%M:%S%.f")
                        .is_ok()
            }
        }
    }
}

/// Scalar vs list attribute
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum Cardinality {
    One,
    Many,
}

/// Schema declaration of one attribute of an entity type
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct AttributeDescriptor {
    pub name: String,
    pub ty: AttrType,
    pub cardinality: Cardinality,
    /// Carried as an XML attribute rather than a child element
    pub xml_attribute: bool,
}

/// Schema declaration of a complex type
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct EntityType {
    pub type_name: String,
    attributes: IndexMap<String, AttributeDescriptor>,
}

impl EntityType {
    pub fn attribute(&self, name: &str) -> Option<&AttributeDescriptor> {
        self.attributes.get(name)
    }

    pub fn attributes(&self) -> impl Iterator<Item = &AttributeDescriptor> {
        self.attributes.values()
    }
}

/// A validated element/collection pair
#[derive(Debug, Clone, PartialEq, Eq, Hash)]
pub struct EntityKind {
    pub element_name: String,
    pub collection_name: String,
    pub type_name: String,
}

impl fmt::Display for EntityKind {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(f, "{}/{}", self.collection_name, self.element_name)
    }
}

/// One schema violation found in a payload
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct Violation {
    pub path: String,
    pub message: String,
}

impl fmt::Display for Violation {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(f, "{}: {}", self.path, self.message)
    }
}

/// Parsed schema: type descriptors plus element and collection tables
#[derive(Debug, Clone, Default)]
pub struct Schema {
    types: HashMap<String, EntityType>,
    /// top-level element name -> type name
    elements: HashMap<String, String>,
    /// collection element name -> item element name
    collections: HashMap<String, String>,
}

/// Raw attribute before `ref`s and simple types are resolved
#[derive(Debug, Clone)]
struct RawAttribute {
    name: String,
    ty: RawType,
    cardinality: Cardinality,
    xml_attribute: bool,
}

#[derive(Debug, Clone)]
enum RawType {
    Named(String),
    ElementRef(String),
}

#[derive(Debug, Default)]
struct RawComplexType {
    base: Option<String>,
    attributes: Vec<RawAttribute>,
}

impl Schema {
    /// The process-wide schema: the installed one, else the bundled XSD
    pub fn shared() -> ApiResult<Arc<Schema>> {
        if let Some(schema) = SHARED_SCHEMA.get() {
            return Ok(schema.clone());
        }
        let schema = Arc::new(Schema::parse_xsd(BUNDLED_XSD)?);
        Ok(SHARED_SCHEMA.get_or_init(|| schema).clone())
    }

    /// Install the process-wide schema. The first installation wins.
    pub fn install(schema: Schema) -> Arc<Schema> {
        let schema = Arc::new(schema);
        SHARED_SCHEMA.get_or_init(|| schema).clone()
    }

    /// Load and install the schema from a file, once per process
    pub fn install_from_file(path: &Path) -> ApiResult<Arc<Schema>> {
        if let Some(schema) = SHARED_SCHEMA.get() {
            return Ok(schema.clone());
        }
        let content = std::fs::read_to_string(path)
            .map_err(|e| ApiError::Schema(format!("cannot read {}: {}", path.display(), e)))?;
        let schema = Schema::parse_xsd(&content)?;
        info!(path = %path.display(), types = schema.types.len(), "Loaded API schema");
        Ok(Self::install(schema))
    }

    /// Parse an XSD document
    pub fn parse_xsd(xsd: &str) -> ApiResult<Schema> {
        let root = XmlNode::parse(xsd)?;
        if root.local_name() != "schema" {
            return Err(ApiError::Schema(format!(
                "expected <xs:schema> root, found <{}>",
                root.name
            )));
        }

        let mut elements = HashMap::new();
        let mut simple_types: HashMap<String, AttrType> = HashMap::new();
        let mut raw_types: HashMap<String, RawComplexType> = HashMap::new();

        for node in &root.children {
            match node.local_name() {
                "element" => {
                    let name = required_attr(node, "name")?;
                    let ty = node.attr("type").unwrap_or("xs:string");
                    elements.insert(name.to_string(), strip_prefix(ty).to_string());
                }
                "complexType" => {
                    let name = required_attr(node, "name")?;
                    raw_types.insert(name.to_string(), read_complex_type(node)?);
                }
                "simpleType" => {
                    let name = required_attr(node, "name")?;
                    let base = node
                        .child("restriction")
                        .and_then(|r| r.attr("base"))
                        .unwrap_or("xs:string");
                    let ty = AttrType::from_builtin(base).unwrap_or(AttrType::String);
                    simple_types.insert(name.to_string(), ty);
                }
                _ => {}
            }
        }

        let mut types = HashMap::new();
        for type_name in raw_types.keys() {
            let mut attributes = IndexMap::new();
            collect_attributes(type_name, &raw_types, 0, &mut |raw: &RawAttribute| {
                let ty = resolve_type(&raw.ty, &elements, &simple_types, &raw_types)?;
                attributes.insert(
                    raw.name.clone(),
                    AttributeDescriptor {
                        name: raw.name.clone(),
                        ty,
                        cardinality: raw.cardinality,
                        xml_attribute: raw.xml_attribute,
                    },
                );
                Ok(())
            })?;
            types.insert(
                type_name.clone(),
                EntityType {
                    type_name: type_name.clone(),
                    attributes,
                },
            );
        }

        let mut collections = HashMap::new();
        for (element, type_name) in &elements {
            let Some(raw) = raw_types.get(type_name) else {
                continue;
            };
            if raw.base.is_none() {
                if let [only] = raw.attributes.as_slice() {
                    if let (RawType::ElementRef(item), Cardinality::Many) = (&only.ty, only.cardinality) {
                        collections.insert(element.clone(), item.clone());
                    }
                }
            }
        }

        debug!(
            types = types.len(),
            elements = elements.len(),
            collections = collections.len(),
            "Parsed XSD"
        );

        Ok(Schema {
            types,
            elements,
            collections,
        })
    }

    /// Type descriptor by type name ("VM")
    pub fn entity_type(&self, type_name: &str) -> Option<&EntityType> {
        self.types.get(type_name)
    }

    /// Type descriptor for a top-level element ("vm")
    pub fn type_of_element(&self, element: &str) -> Option<&EntityType> {
        self.elements.get(element).and_then(|t| self.types.get(t))
    }

    /// Type descriptor of an attribute of a parent type, when complex
    pub fn child_type(&self, parent: &EntityType, attribute: &str) -> Option<&EntityType> {
        match &parent.attribute(attribute)?.ty {
            AttrType::Complex(type_name) => self.types.get(type_name),
            _ => None,
        }
    }

    /// Item element name of a collection ("vms" -> "vm")
    pub fn collection_item(&self, collection: &str) -> Option<&str> {
        self.collections.get(collection).map(String::as_str)
    }

    pub fn is_collection(&self, element: &str) -> bool {
        self.collections.contains_key(element)
    }

    /// Collection element name holding items of `element`
    pub fn collection_of(&self, element: &str) -> Option<&str> {
        self.collections
            .iter()
            .find(|(_, item)| item.as_str() == element)
            .map(|(collection, _)| collection.as_str())
    }

    /// Validate an element/collection pair, failing fast when unknown
    pub fn entity_kind(&self, element: &str, collection: &str) -> ApiResult<EntityKind> {
        let unknown = || ApiError::UnknownEntityType {
            element: element.to_string(),
            collection: collection.to_string(),
        };
        let type_name = self.elements.get(element).ok_or_else(unknown)?;
        match self.collections.get(collection) {
            Some(item) if item == element => Ok(EntityKind {
                element_name: element.to_string(),
                collection_name: collection.to_string(),
                type_name: type_name.clone(),
            }),
            _ => Err(unknown()),
        }
    }

    /// Validate a serialized payload against the schema
    pub fn validate(&self, xml: &str) -> ApiResult<Vec<Violation>> {
        let root = XmlNode::parse(xml)?;
        Ok(self.validate_node(&root))
    }

    /// Validate an already parsed payload
    pub fn validate_node(&self, root: &XmlNode) -> Vec<Violation> {
        let mut violations = Vec::new();
        let name = root.local_name();
        let path = format!("/{}", name);

        if let Some(item) = self.collection_item(name) {
            for (index, child) in root.children.iter().enumerate() {
                let child_name = child.local_name();
                if STRUCTURAL_ELEMENTS.contains(&child_name) {
                    continue;
                }
                let child_path = format!("{}/{}[{}]", path, child_name, index);
                if child_name != item {
                    violations.push(Violation {
                        path: child_path,
                        message: format!("unexpected element in collection of <{}>", item),
                    });
                    continue;
                }
                if let Some(ty) = self.type_of_element(item) {
                    self.validate_against(child, ty, &child_path, &mut violations);
                }
            }
            return violations;
        }

        match self.type_of_element(name) {
            Some(ty) => self.validate_against(root, ty, &path, &mut violations),
            None => violations.push(Violation {
                path,
                message: "unknown root element".to_string(),
            }),
        }
        violations
    }

    fn validate_against(
        &self,
        node: &XmlNode,
        ty: &EntityType,
        path: &str,
        violations: &mut Vec<Violation>,
    ) {
        for (key, value) in &node.attributes {
            if key == "id" || key == "href" || key.starts_with("xmlns") {
                continue;
            }
            match ty.attribute(key) {
                Some(desc) if desc.xml_attribute => {
                    if !desc.ty.accepts(value) {
                        violations.push(Violation {
                            path: format!("{}/@{}", path, key),
                            message: format!("'{}' is not a valid {:?}", value, desc.ty),
                        });
                    }
                }
                _ => violations.push(Violation {
                    path: format!("{}/@{}", path, key),
                    message: format!("attribute not declared by {}", ty.type_name),
                }),
            }
        }

        let mut seen: HashMap<&str, usize> = HashMap::new();
        for child in &node.children {
            let name = child.local_name();
            if STRUCTURAL_ELEMENTS.contains(&name) {
                continue;
            }
            let child_path = format!("{}/{}", path, name);
            let Some(desc) = ty.attribute(name).filter(|d| !d.xml_attribute) else {
                violations.push(Violation {
                    path: child_path,
                    message: format!("element not declared by {}", ty.type_name),
                });
                continue;
            };

            let count = seen.entry(name).or_insert(0);
            *count += 1;
            if *count == 2 && desc.cardinality == Cardinality::One {
                violations.push(Violation {
                    path: child_path.clone(),
                    message: "element may appear at most once".to_string(),
                });
            }

            match &desc.ty {
                AttrType::Complex(type_name) => {
                    if let Some(child_ty) = self.types.get(type_name) {
                        self.validate_against(child, child_ty, &child_path, violations);
                    }
                }
                scalar => {
                    if !child.is_leaf() {
                        violations.push(Violation {
                            path: child_path,
                            message: format!("expected a {:?} leaf, found nested elements", scalar),
                        });
                    } else if !scalar.accepts(&child.text) {
                        violations.push(Violation {
                            path: child_path,
                            message: format!("'{}' is not a valid {:?}", child.text, scalar),
                        });
                    }
                }
            }
        }
    }
}

fn strip_prefix(name: &str) -> &str {
    if name.starts_with("xs:") || name.starts_with("xsd:") {
        name
    } else {
        name.rsplit_once(':').map(|(_, l)| l).unwrap_or(name)
    }
}

fn required_attr<'a>(node: &'a XmlNode, name: &str) -> ApiResult<&'a str> {
    node.attr(name).ok_or_else(|| {
        ApiError::Schema(format!("<{}> is missing the '{}' attribute", node.name, name))
    })
}

fn read_complex_type(node: &XmlNode) -> ApiResult<RawComplexType> {
    let mut raw = RawComplexType::default();
    let mut body = node;

    if let Some(content) = node.child("complexContent") {
        if let Some(extension) = content.child("extension") {
            raw.base = extension.attr("base").map(|b| strip_prefix(b).to_string());
            body = extension;
        }
    }

    read_particles(body, &mut raw.attributes)?;
    Ok(raw)
}

fn read_particles(node: &XmlNode, out: &mut Vec<RawAttribute>) -> ApiResult<()> {
    for child in &node.children {
        match child.local_name() {
            "sequence" | "all" | "choice" => read_particles(child, out)?,
            "element" => {
                let cardinality = match child.attr("maxOccurs") {
                    Some("unbounded") => Cardinality::Many,
                    Some(n) if n.parse::<u32>().map(|n| n > 1).unwrap_or(false) => {
                        Cardinality::Many
                    }
                    _ => Cardinality::One,
                };
                let (name, ty) = match (child.attr("name"), child.attr("ref")) {
                    (Some(name), _) => (
                        name.to_string(),
                        RawType::Named(child.attr("type").unwrap_or("xs:string").to_string()),
                    ),
                    (None, Some(reference)) => {
                        let reference = strip_prefix(reference).to_string();
                        (reference.clone(), RawType::ElementRef(reference))
                    }
                    (None, None) => {
                        return Err(ApiError::Schema(
                            "nested <xs:element> needs a name or a ref".to_string(),
                        ))
                    }
                };
                out.push(RawAttribute {
                    name,
                    ty,
                    cardinality,
                    xml_attribute: false,
                });
            }
            "attribute" => {
                let name = required_attr(child, "name")?;
                out.push(RawAttribute {
                    name: name.to_string(),
                    ty: RawType::Named(child.attr("type").unwrap_or("xs:string").to_string()),
                    cardinality: Cardinality::One,
                    xml_attribute: true,
                });
            }
            _ => {}
        }
    }
    Ok(())
}

fn collect_attributes(
    type_name: &str,
    raw_types: &HashMap<String, RawComplexType>,
    depth: usize,
    sink: &mut dyn FnMut(&RawAttribute) -> ApiResult<()>,
) -> ApiResult<()> {
    if depth > MAX_INHERITANCE_DEPTH {
        return Err(ApiError::Schema(format!(
            "inheritance chain of {} is too deep (cycle?)",
            type_name
        )));
    }
    let raw = raw_types
        .get(type_name)
        .ok_or_else(|| ApiError::Schema(format!("unknown complex type '{}'", type_name)))?;
    if let Some(base) = &raw.base {
        collect_attributes(base, raw_types, depth + 1, sink)?;
    }
    for attribute in &raw.attributes {
        sink(attribute)?;
    }
    Ok(())
}

fn resolve_type(
    raw: &RawType,
    elements: &HashMap<String, String>,
    simple_types: &HashMap<String, AttrType>,
    raw_types: &HashMap<String, RawComplexType>,
) -> ApiResult<AttrType> {
    let type_name = match raw {
        RawType::Named(name) => name.clone(),
        RawType::ElementRef(element) => elements
            .get(element)
            .cloned()
            .ok_or_else(|| ApiError::Schema(format!("ref to undeclared element '{}'", element)))?,
    };

    if let Some(builtin) = AttrType::from_builtin(&type_name) {
        return Ok(builtin);
    }
    let type_name = strip_prefix(&type_name).to_string();
    if let Some(simple) = simple_types.get(&type_name) {
        return Ok(simple.clone());
    }
    if raw_types.contains_key(&type_name) {
        return Ok(AttrType::Complex(type_name));
    }
    Err(ApiError::Schema(format!("unknown type '{}'", type_name)))
}

#[cfg(test)]
mod tests {
    use super::*;

    const SMALL_XSD: &str = r#"<?xml version="1.0"?>
<xs:schema xmlns:xs="http://www.w3.org/2001/XMLSchema">
  <xs:simpleType name="Memory"><xs:restriction base="xs:long"/></xs:simpleType>
  <xs:element name="cluster" type="Cluster"/>
  <xs:element name="vm" type="VM"/>
  <xs:element name="vms" type="VMs"/>
  <xs:complexType name="BaseResource">
    <xs:sequence>
      <xs:element name="name" type="xs:string" minOccurs="0"/>
      <xs:element name="description" type="xs:string" minOccurs="0"/>
    </xs:sequence>
    <xs:attribute name="id" type="xs:string"/>
    <xs:attribute name="href" type="xs:string"/>
  </xs:complexType>
  <xs:complexType name="Cluster">
    <xs:complexContent><xs:extension base="BaseResource"/></xs:complexContent>
  </xs:complexType>
  <xs:complexType name="VM">
    <xs:complexContent>
      <xs:extension base="BaseResource">
        <xs:sequence>
          <xs:element name="memory" type="Memory" minOccurs="0"/>
          <xs:element name="stateless" type="xs:boolean" minOccurs="0"/>
          <xs:element ref="cluster" minOccurs="0"/>
          <xs:element name="tag" type="xs:string" minOccurs="0" maxOccurs="unbounded"/>
        </xs:sequence>
      </xs:extension>
    </xs:complexContent>
  </xs:complexType>
  <xs:complexType name="VMs">
    <xs:sequence><xs:element ref="vm" minOccurs="0" maxOccurs="unbounded"/></xs:sequence>
  </xs:complexType>
</xs:schema>"#;

    fn schema() -> Schema {
        Schema::parse_xsd(SMALL_XSD).unwrap()
    }

    #[test]
    fn test_inheritance_and_types() {
        let schema = schema();
        let vm = schema.type_of_element("vm").unwrap();
        assert_eq!(vm.attribute("name").unwrap().ty, AttrType::String);
        assert_eq!(vm.attribute("memory").unwrap().ty, AttrType::Integer);
        assert_eq!(vm.attribute("stateless").unwrap().ty, AttrType::Boolean);
        assert_eq!(
            vm.attribute("cluster").unwrap().ty,
            AttrType::Complex("Cluster".to_string())
        );
        assert_eq!(vm.attribute("tag").unwrap().cardinality, Cardinality::Many);
        assert!(vm.attribute("id").unwrap().xml_attribute);
    }

    #[test]
    fn test_collections() {
        let schema = schema();
        assert_eq!(schema.collection_item("vms"), Some("vm"));
        assert_eq!(schema.collection_of("vm"), Some("vms"));
        assert!(!schema.is_collection("vm"));
    }

    #[test]
    fn test_entity_kind_fails_fast_on_unknown_pair() {
        let schema = schema();
        let kind = schema.entity_kind("vm", "vms").unwrap();
        assert_eq!(kind.type_name, "VM");

        assert!(matches!(
            schema.entity_kind("vm", "hosts"),
            Err(ApiError::UnknownEntityType { .. })
        ));
        assert!(matches!(
            schema.entity_kind("cluster", "vms"),
            Err(ApiError::UnknownEntityType { .. })
        ));
    }

    #[test]
    fn test_validate_clean_payload() {
        let schema = schema();
        let xml = r#"<vm id="1" href="/api/vms/1"><name>vm1</name><memory>1024</memory>
            <cluster id="2"><name>Default</name></cluster><link rel="nics" href="/x"/></vm>"#;
        assert!(schema.validate(xml).unwrap().is_empty());
    }

    #[test]
    fn test_validate_reports_every_violation() {
        let schema = schema();
        let xml = r#"<vm><name>a</name><name>b</name><memory>lots</memory><color>red</color></vm>"#;
        let violations = schema.validate(xml).unwrap();
        let paths: Vec<_> = violations.iter().map(|v| v.path.as_str()).collect();
        assert_eq!(paths, vec!["/vm/name", "/vm/memory", "/vm/color"]);
    }

    #[test]
    fn test_validate_collection() {
        let schema = schema();
        let xml = r#"<vms><vm><name>a</name></vm><vm><stateless>maybe</stateless></vm></vms>"#;
        let violations = schema.validate(xml).unwrap();
        assert_eq!(violations.len(), 1);
        assert_eq!(violations[0].path, "/vms/vm[1]/stateless");
    }

    #[test]
    fn test_bundled_schema_parses() {
        let schema = Schema::parse_xsd(BUNDLED_XSD).unwrap();
        for (element, collection) in [
            ("vm", "vms"),
            ("host", "hosts"),
            ("cluster", "clusters"),
            ("data_center", "data_centers"),
            ("storage_domain", "storage_domains"),
            ("network", "networks"),
            ("tag", "tags"),
            ("template", "templates"),
            ("vmpool", "vmpools"),
            ("disk", "disks"),
            ("nic", "nics"),
            ("user", "users"),
        ] {
            assert!(
                schema.entity_kind(element, collection).is_ok(),
                "{}/{} should resolve",
                element,
                collection
            );
        }
    }
}
