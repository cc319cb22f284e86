//! Relation map of the API root
//!
//! The engine advertises its collections either as `Link` response headers
//! on the root or as `<link rel href>` children of the root document.

use art_core::XmlNode;
use std::collections::HashMap;

/// Parse a `Link` header value: `<url>; rel="name", <url>; rel=name`
pub fn parse_link_header(value: &str, links: &mut HashMap<String, String>) {
    for part in split_outside_brackets(value) {
        let mut href = None;
        let mut rel = None;
        for piece in part.split(';') {
            let piece = piece.trim();
            if let Some(inner) = piece.strip_prefix('<').and_then(|p| p.strip_suffix('>')) {
                href = Some(inner.trim().to_string());
            } else if let Some((key, val)) = piece.split_once('=') {
                if key.trim().eq_ignore_ascii_case("rel") {
                    rel = Some(val.trim().trim_matches('"').to_string());
                }
            }
        }
        if let (Some(href), Some(rel)) = (href, rel) {
            links.insert(rel, href);
        }
    }
}

/// URLs may contain commas, so only split outside `<...>`
fn split_outside_brackets(value: &str) -> Vec<&str> {
    let mut parts = Vec::new();
    let mut inside = false;
    let mut start = 0;
    for (i, c) in value.char_indices() {
        match c {
            '<' => inside = true,
            '>' => inside = false,
            ',' if !inside => {
                parts.push(&value[start..i]);
                start = i + 1;
            }
            _ => {}
        }
    }
    parts.push(&value[start..]);
    parts
}

/// Collect `<link rel href>` children of the root document
pub fn links_from_root(root: &XmlNode, links: &mut HashMap<String, String>) {
    for link in root.children_named("link") {
        if let (Some(rel), Some(href)) = (link.attr("rel"), link.attr("href")) {
            links.insert(rel.to_string(), href.to_string());
        }
    }
}

/// Make `href` absolute against `origin` (`scheme://host:port`)
pub fn resolve(origin: &str, href: &str) -> String {
    if href.starts_with("http://") || href.starts_with("https://") {
        href.to_string()
    } else if href.starts_with('/') {
        format!("{}{}", origin.trim_end_matches('/'), href)
    } else {
        format!("{}/{}", origin.trim_end_matches('/'), href)
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_parse_link_header() {
        let mut links = HashMap::new();
        parse_link_header(
            r#"</api/vms>; rel="vms", <https://e:443/api/hosts?search=a,b>; rel=hosts"#,
            &mut links,
        );
        assert_eq!(links.get("vms").map(String::as_str), Some("/api/vms"));
        assert_eq!(
            links.get("hosts").map(String::as_str),
            Some("https://e:443/api/hosts?search=a,b")
        );
    }

    #[test]
    fn test_links_from_root() {
        let root = XmlNode::parse(
            r#"<api><link rel="vms" href="/api/vms"/><link rel="tags" href="/api/tags"/></api>"#,
        )
        .unwrap();
        let mut links = HashMap::new();
        links_from_root(&root, &mut links);
        assert_eq!(links.len(), 2);
    }

    #[test]
    fn test_resolve() {
        assert_eq!(resolve("https://e:443", "/api/vms"), "https://e:443/api/vms");
        assert_eq!(resolve("https://e:443/", "http://x/y"), "http://x/y");
    }
}
