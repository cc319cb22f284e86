//! A small XPath subset evaluated over [`XmlNode`] trees
//!
//! Supported: absolute child paths (`/vms/vm/name`), descendant start
//! (`//name`), wildcard steps (`*`), predicates `[child='v']`, `[@attr='v']`
//! and `[n]` (1-based), and a final `@attr` or `text()` step.

use crate::error::{ApiError, ApiResult};
use crate::xml::XmlNode;

#[derive(Debug, PartialEq)]
enum Predicate {
    ChildEquals(String, String),
    AttrEquals(String, String),
    Index(usize),
}

#[derive(Debug, PartialEq)]
struct Step {
    name: String,
    predicates: Vec<Predicate>,
}

#[derive(Debug, PartialEq)]
enum Terminal {
    Nodes,
    Attribute(String),
    Text,
}

/// Evaluate `path` against a document root, returning string results
pub fn evaluate(root: &XmlNode, path: &str) -> ApiResult<Vec<String>> {
    let (descendant, steps, terminal) = parse(path)?;
    let Some((first, rest)) = steps.split_first() else {
        return Err(invalid(path, "no element steps"));
    };

    let mut current: Vec<&XmlNode> = if descendant {
        let mut found = Vec::new();
        collect_descendants(root, first, &mut found);
        apply_predicates(found, &first.predicates)
    } else if step_matches(root, first) {
        apply_predicates(vec![root], &first.predicates)
    } else {
        Vec::new()
    };

    for step in rest {
        let next: Vec<&XmlNode> = current
            .iter()
            .flat_map(|node| node.children.iter().filter(|c| step_matches(c, step)))
            .collect();
        current = apply_predicates(next, &step.predicates);
    }

    Ok(match terminal {
        Terminal::Nodes | Terminal::Text => {
            current.iter().map(|n| n.text.trim().to_string()).collect()
        }
        Terminal::Attribute(name) => current
            .iter()
            .filter_map(|n| n.attr(&name).map(str::to_string))
            .collect(),
    })
}

/// Parse `xml` and evaluate `path` against it
pub fn evaluate_str(xml: &str, path: &str) -> ApiResult<Vec<String>> {
    let root = XmlNode::parse(xml)?;
    evaluate(&root, path)
}

fn invalid(path: &str, reason: &str) -> ApiError {
    ApiError::Xml(format!("invalid xpath '{}': {}", path, reason))
}

fn parse(path: &str) -> ApiResult<(bool, Vec<Step>, Terminal)> {
    let (descendant, body) = if let Some(rest) = path.strip_prefix("//") {
        (true, rest)
    } else if let Some(rest) = path.strip_prefix('/') {
        (false, rest)
    } else {
        return Err(invalid(path, "only absolute paths are supported"));
    };

    let raw_steps = split_steps(body);
    let mut steps = Vec::new();
    let mut terminal = Terminal::Nodes;

    for (i, raw) in raw_steps.iter().enumerate() {
        let last = i + 1 == raw_steps.len();
        if raw.is_empty() {
            return Err(invalid(path, "empty step"));
        }
        if let Some(attr) = raw.strip_prefix('@') {
            if !last {
                return Err(invalid(path, "attribute step must be last"));
            }
            terminal = Terminal::Attribute(attr.to_string());
            continue;
        }
        if *raw == "text()" {
            if !last {
                return Err(invalid(path, "text() must be last"));
            }
            terminal = Terminal::Text;
            continue;
        }
        steps.push(parse_step(path, raw)?);
    }
    Ok((descendant, steps, terminal))
}

/// Split on `/` outside of predicate brackets and quotes
fn split_steps(body: &str) -> Vec<&str> {
    let mut steps = Vec::new();
    let mut depth = 0usize;
    let mut quote: Option<char> = None;
    let mut start = 0;
    for (i, c) in body.char_indices() {
        match (quote, c) {
            (Some(q), c) if c == q => quote = None,
            (Some(_), _) => {}
            (None, '\'' | '"') => quote = Some(c),
            (None, '[') => depth += 1,
            (None, ']') => depth = depth.saturating_sub(1),
            (None, '/') if depth == 0 => {
                steps.push(&body[start..i]);
                start = i + 1;
            }
            _ => {}
        }
    }
    steps.push(&body[start..]);
    steps
}

fn parse_step(path: &str, raw: &str) -> ApiResult<Step> {
    let (name, mut rest) = match raw.find('[') {
        Some(i) => (&raw[..i], &raw[i..]),
        None => (raw, ""),
    };
    let mut predicates = Vec::new();
    while let Some(open) = rest.strip_prefix('[') {
        let close = open
            .find(']')
            .ok_or_else(|| invalid(path, "unclosed predicate"))?;
        predicates.push(parse_predicate(path, open[..close].trim())?);
        rest = &open[close + 1..];
    }
    if !rest.is_empty() {
        return Err(invalid(path, "unexpected text after predicate"));
    }
    Ok(Step {
        name: name.to_string(),
        predicates,
    })
}

fn parse_predicate(path: &str, body: &str) -> ApiResult<Predicate> {
    if let Ok(index) = body.parse::<usize>() {
        if index == 0 {
            return Err(invalid(path, "indexes are 1-based"));
        }
        return Ok(Predicate::Index(index));
    }
    let (lhs, rhs) = body
        .split_once('=')
        .ok_or_else(|| invalid(path, "predicate must be [n] or [name='value']"))?;
    let value = rhs
        .trim()
        .trim_matches(|c| c == '\'' || c == '"')
        .to_string();
    let lhs = lhs.trim();
    Ok(match lhs.strip_prefix('@') {
        Some(attr) => Predicate::AttrEquals(attr.to_string(), value),
        None => Predicate::ChildEquals(lhs.to_string(), value),
    })
}

fn step_matches(node: &XmlNode, step: &Step) -> bool {
    step.name == "*" || node.local_name() == step.name
}

fn collect_descendants<'a>(node: &'a XmlNode, step: &Step, out: &mut Vec<&'a XmlNode>) {
    if step_matches(node, step) {
        out.push(node);
    }
    for child in &node.children {
        collect_descendants(child, step, out);
    }
}

fn apply_predicates<'a>(mut nodes: Vec<&'a XmlNode>, predicates: &[Predicate]) -> Vec<&'a XmlNode> {
    for predicate in predicates {
        nodes = match predicate {
            Predicate::Index(i) => nodes.get(i - 1).copied().into_iter().collect(),
            Predicate::AttrEquals(name, value) => nodes
                .into_iter()
                .filter(|n| n.attr(name) == Some(value.as_str()))
                .collect(),
            Predicate::ChildEquals(name, value) => nodes
                .into_iter()
                .filter(|n| n.children_named(name).any(|c| c.text.trim() == value))
                .collect(),
        };
    }
    nodes
}
