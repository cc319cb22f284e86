//! Recursive entity comparison
//!
//! Every attribute of the expected entity is checked against the actual one,
//! except the ignore list. Mismatches make the result unequal but never stop
//! the walk, so one call logs every difference. Attributes missing from the
//! actual entity are logged as warnings and tolerated, since engines omit
//! different optional fields.

use art_core::{Entity, Value};
use std::collections::HashSet;
use tracing::{debug, error, warn};

/// Attributes never compared: engine-owned or self-referential
pub const DEFAULT_IGNORED: &[&str] = &["href", "id", "link", "actions", "creation_status"];

/// Result of comparing two entities
#[derive(Debug, Clone, PartialEq)]
pub struct ComparisonResult {
    pub equal: bool,
    pub differences: Vec<Difference>,
}

impl ComparisonResult {
    /// Differences that made the entities unequal
    pub fn mismatches(&self) -> impl Iterator<Item = &Difference> {
        self.differences
            .iter()
            .filter(|d| d.category != DiffCategory::Missing)
    }
}

/// One difference found during comparison
#[derive(Debug, Clone, PartialEq)]
pub struct Difference {
    pub category: DiffCategory,
    pub path: String,
    pub expected: String,
    pub actual: String,
}

#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum DiffCategory {
    /// Scalar values differ
    Value,
    /// Attribute absent from the actual entity (tolerated)
    Missing,
    /// One side is composite and the other is not
    Structure,
    /// A list element has no counterpart
    ListElement,
}

impl std::fmt::Display for DiffCategory {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        match self {
            DiffCategory::Value => write!(f, "VALUE"),
            DiffCategory::Missing => write!(f, "MISSING"),
            DiffCategory::Structure => write!(f, "STRUCTURE"),
            DiffCategory::ListElement => write!(f, "ELEMENT"),
        }
    }
}

/// Options for comparing entities
#[derive(Debug, Clone)]
pub struct CompareOptions {
    /// Attribute names or dotted paths to skip
    pub ignore_fields: HashSet<String>,
    /// Compare scalar text case-insensitively
    pub case_insensitive: bool,
}

impl Default for CompareOptions {
    fn default() -> Self {
        Self {
            ignore_fields: DEFAULT_IGNORED.iter().map(|s| s.to_string()).collect(),
            case_insensitive: false,
        }
    }
}

impl CompareOptions {
    pub fn new() -> Self {
        Self::default()
    }

    pub fn ignore_field(mut self, field: &str) -> Self {
        self.ignore_fields.insert(field.to_string());
        self
    }

    pub fn case_insensitive(mut self) -> Self {
        self.case_insensitive = true;
        self
    }

    fn ignores(&self, name: &str, path: &str) -> bool {
        self.ignore_fields.contains(name) || self.ignore_fields.contains(path)
    }
}

/// Compare with the default ignore list
pub fn compare(expected: &Entity, actual: &Entity) -> bool {
    compare_entities(expected, actual, &CompareOptions::default()).equal
}

/// Compare every non-ignored attribute of `expected` against `actual`
pub fn compare_entities(
    expected: &Entity,
    actual: &Entity,
    options: &CompareOptions,
) -> ComparisonResult {
    let mut differences = Vec::new();
    compare_entity("", expected, actual, options, &mut differences);

    let equal = differences
        .iter()
        .all(|d| d.category == DiffCategory::Missing);
    if equal {
        debug!(entity = %expected.describe(), "Entities match");
    } else {
        error!(
            entity = %expected.describe(),
            mismatches = differences.iter().filter(|d| d.category != DiffCategory::Missing).count(),
            "Entities differ"
        );
    }
    ComparisonResult { equal, differences }
}

fn join(path: &str, name: &str) -> String {
    if path.is_empty() {
        name.to_string()
    } else {
        format!("{}.{}", path, name)
    }
}

fn compare_entity(
    path: &str,
    expected: &Entity,
    actual: &Entity,
    options: &CompareOptions,
    differences: &mut Vec<Difference>,
) {
    for (name, expected_value) in expected.attributes() {
        let attr_path = join(path, name);
        if options.ignores(name, &attr_path) {
            continue;
        }
        match actual.get(name) {
            Some(actual_value) => {
                compare_value(&attr_path, expected_value, actual_value, options, differences)
            }
            None => record(
                differences,
                DiffCategory::Missing,
                &attr_path,
                expected_value.to_string(),
                "(missing)".to_string(),
            ),
        }
    }
}

fn compare_value(
    path: &str,
    expected: &Value,
    actual: &Value,
    options: &CompareOptions,
    differences: &mut Vec<Difference>,
) {
    match (expected, actual) {
        (Value::Entity(e), Value::Entity(a)) => compare_entity(path, e, a, options, differences),
        (Value::List(e), Value::List(a)) => compare_list(path, e, a, options, differences),
        // A single value against a one-element list, as engines disagree on cardinality
        (Value::List(e), single) => {
            compare_list(path, e, std::slice::from_ref(single), options, differences)
        }
        (single, Value::List(a)) => {
            compare_list(path, std::slice::from_ref(single), a, options, differences)
        }
        (e, a) if e.is_scalar() && a.is_scalar() => {
            let (want, got) = (normalize(e, options), normalize(a, options));
            if want != got {
                record(differences, DiffCategory::Value, path, want, got);
            }
        }
        (e, a) => record(
            differences,
            DiffCategory::Structure,
            path,
            e.to_string(),
            a.to_string(),
        ),
    }
}

fn compare_list(
    path: &str,
    expected: &[Value],
    actual: &[Value],
    options: &CompareOptions,
    differences: &mut Vec<Difference>,
) {
    if expected.iter().all(Value::is_scalar) && actual.iter().all(Value::is_scalar) {
        let mut want: Vec<String> = expected.iter().map(|v| normalize(v, options)).collect();
        let mut got: Vec<String> = actual.iter().map(|v| normalize(v, options)).collect();
        want.sort();
        got.sort();
        if want != got {
            record(
                differences,
                DiffCategory::Value,
                path,
                format!("{:?}", want),
                format!("{:?}", got),
            );
        }
        return;
    }

    for (index, item) in expected.iter().enumerate() {
        let counterpart = match item.as_entity().and_then(Entity::name) {
            Some(name) => actual
                .iter()
                .find(|a| a.as_entity().and_then(Entity::name) == Some(name)),
            None => actual.get(index),
        };
        let item_path = match item.as_entity().and_then(Entity::name) {
            Some(name) => format!("{}[{}]", path, name),
            None => format!("{}[{}]", path, index),
        };
        match counterpart {
            Some(found) => compare_value(&item_path, item, found, options, differences),
            None => record(
                differences,
                DiffCategory::ListElement,
                &item_path,
                item.to_string(),
                "(no counterpart)".to_string(),
            ),
        }
    }
}

/// String form used for comparison; booleans and case normalized
fn normalize(value: &Value, options: &CompareOptions) -> String {
    let text = match value.as_bool() {
        Some(b) => b.to_string(),
        None => value.scalar_string().unwrap_or_default(),
    };
    if options.case_insensitive {
        text.to_lowercase()
    } else {
        text
    }
}

fn record(
    differences: &mut Vec<Difference>,
    category: DiffCategory,
    path: &str,
    expected: String,
    actual: String,
) {
    match category {
        DiffCategory::Missing => warn!(
            attribute = path,
            expected = %expected,
            "Attribute missing from actual entity"
        ),
        _ => error!(
            %category,
            attribute = path,
            expected = %expected,
            actual = %actual,
            "Attribute mismatch"
        ),
    }
    differences.push(Difference {
        category,
        path: path.to_string(),
        expected,
        actual,
    });
}
