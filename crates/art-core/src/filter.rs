//! Client-side `find` filtering shared by every adapter

use crate::entity::Entity;
use crate::error::{ApiError, ApiResult};
use tracing::{debug, warn};

/// Does `entity` carry `value` at the dotted `path`?
pub fn matches(entity: &Entity, path: &str, value: &str) -> bool {
    entity
        .get_path_string(path)
        .map(|actual| actual == value)
        .unwrap_or(false)
}

/// Keep the entities matching `attribute == value` and every extra filter
pub fn filter<'a>(
    entities: &'a [Entity],
    value: &str,
    attribute: &str,
    filters: &[(String, String)],
) -> Vec<&'a Entity> {
    entities
        .iter()
        .filter(|e| matches(e, attribute, value))
        .filter(|e| filters.iter().all(|(path, v)| matches(e, path, v)))
        .collect()
}

/// The single entity matching the filters.
///
/// Zero matches is `EntityNotFound`; more than one is `AmbiguousMatch`.
pub fn select_unique(
    entities: Vec<Entity>,
    value: &str,
    attribute: &str,
    filters: &[(String, String)],
) -> ApiResult<Entity> {
    let total = entities.len();
    let mut hits: Vec<Entity> = entities
        .into_iter()
        .filter(|e| matches(e, attribute, value))
        .filter(|e| filters.iter().all(|(path, v)| matches(e, path, v)))
        .collect();

    let query = describe_query(value, attribute, filters);
    debug!(%query, scanned = total, matched = hits.len(), "Filtered collection");

    match hits.len() {
        0 => Err(ApiError::EntityNotFound(query)),
        1 => Ok(hits.remove(0)),
        count => {
            warn!(%query, count, "More than one entity matched");
            Err(ApiError::AmbiguousMatch { query, count })
        }
    }
}

fn describe_query(value: &str, attribute: &str, filters: &[(String, String)]) -> String {
    let mut query = format!("{}={}", attribute, value);
    for (path, v) in filters {
        query.push_str(&format!(" and {}={}", path, v));
    }
    query
}
