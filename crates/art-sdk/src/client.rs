//! The SDK client surface the adapter drives

use crate::error::SdkResult;
use crate::object::SdkObject;
use std::time::Duration;

/// Per-call keyword arguments of SDK methods
#[derive(Debug, Clone, Default, PartialEq)]
pub struct SdkParams {
    pub correlation_id: Option<String>,
    pub current: Option<bool>,
    pub async_call: bool,
    pub max: Option<u32>,
    pub case_sensitive: Option<bool>,
    /// Search constraint for `list`
    pub query: Option<String>,
    pub extra: Vec<(String, String)>,
    /// Request deadline; the client default when unset
    pub timeout: Option<Duration>,
}

impl SdkParams {
    pub fn new() -> Self {
        Self::default()
    }

    /// As URL query parameters
    pub fn to_query(&self) -> Vec<(String, String)> {
        let mut query = self.extra.clone();
        if let Some(search) = &self.query {
            query.push(("search".to_string(), search.clone()));
        }
        if let Some(case_sensitive) = self.case_sensitive {
            query.push(("case_sensitive".to_string(), case_sensitive.to_string()));
        }
        if let Some(max) = self.max {
            query.push(("max".to_string(), max.to_string()));
        }
        if let Some(current) = self.current {
            query.push(("current".to_string(), current.to_string()));
        }
        query
    }
}

/// Where a `list` call looks
#[derive(Debug, Clone, PartialEq)]
pub enum Collection<'a> {
    /// A top-level collection of the API ("vms")
    Root(&'a str),
    /// A sub-collection of an object ("nics" of a VM)
    Sub { parent: &'a SdkObject, rel: &'a str },
}

/// One connected SDK instance
pub trait SdkClient: Send + Sync {
    fn list(&self, collection: Collection<'_>, params: &SdkParams) -> SdkResult<Vec<SdkObject>>;

    fn get(&self, href: &str, params: &SdkParams) -> SdkResult<SdkObject>;

    fn add(
        &self,
        collection: Collection<'_>,
        object: &SdkObject,
        params: &SdkParams,
    ) -> SdkResult<SdkObject>;

    fn update(&self, href: &str, object: &SdkObject, params: &SdkParams) -> SdkResult<SdkObject>;

    fn delete(&self, href: &str, body: Option<&SdkObject>, params: &SdkParams) -> SdkResult<()>;

    /// Run `action` on the object at `href`; returns the engine's action object
    fn action(
        &self,
        href: &str,
        action: &str,
        body: &SdkObject,
        params: &SdkParams,
    ) -> SdkResult<SdkObject>;

    fn disconnect(&self) -> SdkResult<()>;
}
