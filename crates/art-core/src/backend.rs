//! The operation contract every engine adapter implements

use crate::correlation;
use crate::entity::Entity;
use crate::error::{ApiError, ApiResult};
use crate::sampler::TimeoutingSampler;
use crate::schema::EntityKind;
use serde::{Deserialize, Serialize};
use std::fmt;
use std::str::FromStr;
use std::time::Duration;
use tracing::{debug, error, info};

/// Default delay between polls of an entity's status
pub const DEFAULT_POLL_INTERVAL: Duration = Duration::from_secs(10);

/// Which transport an adapter speaks
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize, Deserialize)]
#[serde(rename_all = "lowercase")]
pub enum BackendKind {
    Rest,
    Cli,
    Sdk,
    /// SDK reached through the embedded managed runtime
    #[serde(rename = "java", alias = "bridged")]
    Bridged,
}

impl BackendKind {
    pub fn as_str(&self) -> &'static str {
        match self {
            BackendKind::Rest => "rest",
            BackendKind::Cli => "cli",
            BackendKind::Sdk => "sdk",
            BackendKind::Bridged => "java",
        }
    }
}

impl fmt::Display for BackendKind {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(self.as_str())
    }
}

impl FromStr for BackendKind {
    type Err = String;

    fn from_str(s: &str) -> Result<Self, Self::Err> {
        match s.to_ascii_lowercase().as_str() {
            "rest" => Ok(BackendKind::Rest),
            "cli" => Ok(BackendKind::Cli),
            "sdk" => Ok(BackendKind::Sdk),
            "java" | "bridged" => Ok(BackendKind::Bridged),
            other => Err(format!("unknown engine '{}'", other)),
        }
    }
}

/// Result entity plus the polarity-adjusted success flag
#[derive(Debug, Clone, PartialEq)]
pub struct Outcome {
    pub entity: Option<Entity>,
    pub success: bool,
}

impl Outcome {
    pub fn new(entity: Option<Entity>, success: bool) -> Self {
        Self { entity, success }
    }

    pub fn failed() -> Self {
        Self::new(None, false)
    }

    pub fn into_parts(self) -> (Option<Entity>, bool) {
        (self.entity, self.success)
    }
}

/// What `get` should fetch
#[derive(Debug, Clone, PartialEq)]
pub enum GetTarget {
    /// A collection by name, resolved through the API root links ("vms")
    Collection(String),
    /// An absolute or root-relative URL / handle
    Href(String),
    /// A relation of an entity ("nics" of a VM)
    Link { entity: Entity, rel: String },
}

impl GetTarget {
    pub fn collection(name: impl Into<String>) -> Self {
        GetTarget::Collection(name.into())
    }

    pub fn href(href: impl Into<String>) -> Self {
        GetTarget::Href(href.into())
    }

    pub fn link(entity: &Entity, rel: impl Into<String>) -> Self {
        GetTarget::Link {
            entity: entity.clone(),
            rel: rel.into(),
        }
    }
}

/// Result of `get`
#[derive(Debug, Clone, PartialEq)]
pub enum Fetched {
    One(Entity),
    Many(Vec<Entity>),
}

impl Fetched {
    pub fn into_list(self) -> Vec<Entity> {
        match self {
            Fetched::One(entity) => vec![entity],
            Fetched::Many(entities) => entities,
        }
    }

    pub fn into_one(self) -> ApiResult<Entity> {
        match self {
            Fetched::One(entity) => Ok(entity),
            Fetched::Many(entities) => {
                let count = entities.len();
                let mut iter = entities.into_iter();
                match (iter.next(), count) {
                    (Some(entity), 1) => Ok(entity),
                    (None, _) => Err(ApiError::EntityNotFound("empty collection".to_string())),
                    (Some(_), count) => Err(ApiError::AmbiguousMatch {
                        query: "get".to_string(),
                        count,
                    }),
                }
            }
        }
    }
}

/// Keyword options accepted by every operation
#[derive(Debug, Clone, Default, PartialEq)]
pub struct OpOptions {
    pub correlation_id: Option<String>,
    /// Overrides the operation's default positive status set
    pub expected_status: Option<Vec<u16>>,
    /// Compare the sent entity with the response; `None` uses the run default
    pub compare: Option<bool>,
    pub async_call: bool,
    pub max: Option<u32>,
    pub current: Option<bool>,
    /// Dotted-path equality filters applied by `find`
    pub filters: Vec<(String, String)>,
    /// Transport-specific extra parameters (CLI parent flags, matrix params)
    pub params: Vec<(String, String)>,
    /// Action parameters or an explicit request body
    pub body: Option<Entity>,
    pub case_sensitive: Option<bool>,
    pub poll_interval: Option<Duration>,
    /// Bound on each request or shell command; a bridged call cannot be cut short
    pub timeout: Option<Duration>,
    /// Search inside this target instead of the adapter's own collection
    pub within: Option<GetTarget>,
}

impl OpOptions {
    pub fn new() -> Self {
        Self::default()
    }

    pub fn with_correlation_id(mut self, id: impl Into<String>) -> Self {
        self.correlation_id = Some(id.into());
        self
    }

    pub fn expect_status(mut self, codes: &[u16]) -> Self {
        self.expected_status = Some(codes.to_vec());
        self
    }

    pub fn with_compare(mut self, compare: bool) -> Self {
        self.compare = Some(compare);
        self
    }

    pub fn asynchronous(mut self, async_call: bool) -> Self {
        self.async_call = async_call;
        self
    }

    pub fn with_max(mut self, max: u32) -> Self {
        self.max = Some(max);
        self
    }

    pub fn with_current(mut self, current: bool) -> Self {
        self.current = Some(current);
        self
    }

    pub fn filter(mut self, path: impl Into<String>, value: impl Into<String>) -> Self {
        self.filters.push((path.into(), value.into()));
        self
    }

    pub fn param(mut self, key: impl Into<String>, value: impl Into<String>) -> Self {
        self.params.push((key.into(), value.into()));
        self
    }

    pub fn with_body(mut self, body: Entity) -> Self {
        self.body = Some(body);
        self
    }

    pub fn with_case_sensitive(mut self, case_sensitive: bool) -> Self {
        self.case_sensitive = Some(case_sensitive);
        self
    }

    pub fn with_poll_interval(mut self, interval: Duration) -> Self {
        self.poll_interval = Some(interval);
        self
    }

    pub fn with_timeout(mut self, timeout: Duration) -> Self {
        self.timeout = Some(timeout);
        self
    }

    pub fn within(mut self, target: GetTarget) -> Self {
        self.within = Some(target);
        self
    }

    /// The caller's correlation id cleaned for the engine, or a fresh one for `operation`
    pub fn correlation_for(&self, operation: &str) -> String {
        match &self.correlation_id {
            Some(id) => correlation::clean(id),
            None => correlation::correlation_id(operation),
        }
    }

    pub fn param_value(&self, key: &str) -> Option<&str> {
        self.params
            .iter()
            .find(|(k, _)| k == key)
            .map(|(_, v)| v.as_str())
    }
}

/// Fold an operation's raw success into the polarity contract
pub fn polarity_outcome(succeeded: bool, positive: bool) -> bool {
    succeeded == positive
}

/// Split a status list such as `"up, powering_up"` into lowercase names
pub fn parse_status_list(statuses: &str) -> Vec<String> {
    statuses
        .split(|c: char| c == ',' || c.is_whitespace())
        .filter(|s| !s.is_empty())
        .map(|s| s.to_ascii_lowercase())
        .collect()
}

/// One engine adapter bound to an entity type
///
/// Mutations and actions fold ordinary failures into the returned flag.
/// Only errors for which [`ApiError::is_fatal`] holds escape them.
pub trait Backend: Send + Sync {
    fn kind(&self) -> BackendKind;

    fn entity_kind(&self) -> &EntityKind;

    /// Establish (or reuse) the process-wide session for this engine
    fn login(&self) -> ApiResult<()>;

    /// Close the shared session; later calls log in again
    fn logout(&self) -> ApiResult<bool>;

    fn create(&self, entity: &Entity, positive: bool, opts: &OpOptions) -> ApiResult<Outcome>;

    fn update(
        &self,
        original: &Entity,
        updated: &Entity,
        positive: bool,
        opts: &OpOptions,
    ) -> ApiResult<Outcome>;

    fn delete(&self, entity: &Entity, positive: bool, opts: &OpOptions) -> ApiResult<bool>;

    /// Exactly one entity whose `attribute` equals `value`
    fn find(&self, value: &str, attribute: &str, opts: &OpOptions) -> ApiResult<Entity>;

    fn get(&self, target: &GetTarget, opts: &OpOptions) -> ApiResult<Fetched>;

    /// Engine-side search over the adapter's collection
    fn query(&self, constraint: &str, opts: &OpOptions) -> ApiResult<Vec<Entity>>;

    fn sync_action(
        &self,
        entity: &Entity,
        action: &str,
        positive: bool,
        opts: &OpOptions,
    ) -> ApiResult<bool>;

    /// Re-read an entity from the engine
    fn refresh(&self, entity: &Entity) -> ApiResult<Entity>;

    /// Poll until the entity's status is one of `statuses`
    fn wait_for_elem_status(
        &self,
        entity: &Entity,
        statuses: &str,
        timeout: Duration,
        opts: &OpOptions,
    ) -> ApiResult<bool> {
        let wanted = parse_status_list(statuses);
        let interval = opts.poll_interval.unwrap_or(DEFAULT_POLL_INTERVAL);
        info!(
            entity = %entity.describe(),
            statuses = ?wanted,
            ?timeout,
            "Waiting for status"
        );

        let mut last_seen = None;
        let mut sampler = TimeoutingSampler::new(timeout, interval, || self.refresh(entity))
            .with_message(format!(
                "{} did not reach status {:?}",
                entity.describe(),
                wanted
            ));

        for sample in &mut sampler {
            match sample {
                Ok(Ok(current)) => {
                    let status = current.status_name();
                    debug!(entity = %entity.describe(), status = ?status, "Polled status");
                    if let Some(status) = &status {
                        if wanted.iter().any(|w| w == status) {
                            return Ok(true);
                        }
                    }
                    last_seen = status;
                }
                Ok(Err(e)) if e.is_fatal() => return Err(e),
                Ok(Err(e)) => debug!(error = %e, "Status poll failed, retrying"),
                Err(timeout) => {
                    error!(
                        entity = %entity.describe(),
                        last_status = ?last_seen,
                        error = %timeout,
                        "Timed out waiting for status"
                    );
                    return Ok(false);
                }
            }
        }
        Ok(false)
    }

    /// XPath-style query over a raw response; only meaningful for REST
    fn xpath(&self, href: &str, path: &str) -> ApiResult<Vec<String>> {
        debug!(href, path, "xpath requested");
        Err(ApiError::unsupported(self.kind(), "xpath queries"))
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use std::sync::atomic::{AtomicUsize, Ordering};

    struct Scripted {
        kind: EntityKind,
        statuses: Vec<&'static str>,
        polls: AtomicUsize,
    }

    impl Scripted {
        fn new(statuses: Vec<&'static str>) -> Self {
            Self {
                kind: EntityKind {
                    element_name: "vm".into(),
                    collection_name: "vms".into(),
                    type_name: "VM".into(),
                },
                statuses,
                polls: AtomicUsize::new(0),
            }
        }
    }

    impl Backend for Scripted {
        fn kind(&self) -> BackendKind {
            BackendKind::Cli
        }
        fn entity_kind(&self) -> &EntityKind {
            &self.kind
        }
        fn login(&self) -> ApiResult<()> {
            Ok(())
        }
        fn logout(&self) -> ApiResult<bool> {
            Ok(true)
        }
        fn create(&self, _: &Entity, _: bool, _: &OpOptions) -> ApiResult<Outcome> {
            Ok(Outcome::failed())
        }
        fn update(&self, _: &Entity, _: &Entity, _: bool, _: &OpOptions) -> ApiResult<Outcome> {
            Ok(Outcome::failed())
        }
        fn delete(&self, _: &Entity, _: bool, _: &OpOptions) -> ApiResult<bool> {
            Ok(false)
        }
        fn find(&self, value: &str, _: &str, _: &OpOptions) -> ApiResult<Entity> {
            Err(ApiError::EntityNotFound(value.to_string()))
        }
        fn get(&self, _: &GetTarget, _: &OpOptions) -> ApiResult<Fetched> {
            Ok(Fetched::Many(vec![]))
        }
        fn query(&self, _: &str, _: &OpOptions) -> ApiResult<Vec<Entity>> {
            Ok(vec![])
        }
        fn sync_action(&self, _: &Entity, _: &str, _: bool, _: &OpOptions) -> ApiResult<bool> {
            Ok(false)
        }
        fn refresh(&self, entity: &Entity) -> ApiResult<Entity> {
            let n = self.polls.fetch_add(1, Ordering::SeqCst);
            let status = self.statuses[n.min(self.statuses.len() - 1)];
            Ok(entity.clone().with("status", Entity::new("status").with("state", status)))
        }
    }

    #[test]
    fn test_backend_kind_parsing() {
        assert_eq!("REST".parse::<BackendKind>().unwrap(), BackendKind::Rest);
        assert_eq!("java".parse::<BackendKind>().unwrap(), BackendKind::Bridged);
        assert!("soap".parse::<BackendKind>().is_err());
        assert_eq!(BackendKind::Bridged.to_string(), "java");
    }

    #[test]
    fn test_status_list() {
        assert_eq!(parse_status_list("Up, powering_up  down"), vec!["up", "powering_up", "down"]);
    }

    #[test]
    fn test_wait_for_elem_status_reaches_state() {
        let backend = Scripted::new(vec!["down", "powering_up", "up"]);
        let opts = OpOptions::new().with_poll_interval(Duration::from_millis(5));
        let ok = backend
            .wait_for_elem_status(&Entity::new("vm"), "UP", Duration::from_secs(2), &opts)
            .unwrap();
        assert!(ok);
        assert_eq!(backend.polls.load(Ordering::SeqCst), 3);
    }

    #[test]
    fn test_wait_for_elem_status_times_out() {
        let backend = Scripted::new(vec!["down"]);
        let opts = OpOptions::new().with_poll_interval(Duration::from_millis(5));
        let ok = backend
            .wait_for_elem_status(&Entity::new("vm"), "up", Duration::from_millis(30), &opts)
            .unwrap();
        assert!(!ok);
    }

    #[test]
    fn test_xpath_unsupported_by_default() {
        let backend = Scripted::new(vec!["down"]);
        let err = backend.xpath("/api/vms", "/vms/vm/name").unwrap_err();
        assert!(matches!(err, ApiError::UnsupportedEngine { backend: BackendKind::Cli, .. }));
    }

    #[test]
    fn test_fetched_into_one() {
        let one = Fetched::Many(vec![Entity::new("vm")]).into_one().unwrap();
        assert_eq!(one.element_name(), "vm");
        assert!(matches!(
            Fetched::Many(vec![]).into_one(),
            Err(ApiError::EntityNotFound(_))
        ));
        assert!(matches!(
            Fetched::Many(vec![Entity::new("vm"), Entity::new("vm")]).into_one(),
            Err(ApiError::AmbiguousMatch { count: 2, .. })
        ));
    }

    #[test]
    fn test_correlation_for_prefers_caller_id() {
        let opts = OpOptions::new().with_correlation_id("fixed");
        assert_eq!(opts.correlation_for("create"), "fixed");
        assert!(OpOptions::new().correlation_for("create").ends_with("_create"));
    }

    #[test]
    fn test_caller_correlation_id_is_cleaned() {
        let opts = OpOptions::new().with_correlation_id(format!("my test/{}", "x".repeat(80)));
        let id = opts.correlation_for("create");
        assert_eq!(id.len(), correlation::MAX_CORRELATION_ID_LEN);
        assert!(id.starts_with("my_test_xxx"));
    }
}
