//! The bundled SDK client, speaking XML over the REST session

use crate::client::{Collection, SdkClient, SdkParams};
use crate::error::{SdkError, SdkResult};
use crate::object::SdkObject;
use crate::translate::{from_sdk, to_sdk};
use art_config::ApiOptions;
use art_core::{codec, BackendKind, Schema, XmlNode};
use art_rest::{RestResponse, RestSession};
use std::sync::Arc;
use tracing::{debug, error};

const OK: &[u16] = &[200, 201, 202];
const DELETED: &[u16] = &[200, 202, 204];

pub struct RestSdkClient {
    session: RestSession,
    schema: Arc<Schema>,
}

impl RestSdkClient {
    pub fn connect(api: &ApiOptions, schema: Arc<Schema>) -> SdkResult<Self> {
        let session = RestSession::connect_as(api, BackendKind::Sdk)?;
        Ok(Self { session, schema })
    }

    fn collection_url(&self, collection: &Collection<'_>) -> SdkResult<String> {
        match collection {
            Collection::Root(name) => self
                .session
                .link(name)
                .map(str::to_string)
                .ok_or_else(|| SdkError::NotFound(format!("API root has no '{}'", name))),
            Collection::Sub { parent, rel } => match (parent.link(rel), &parent.href) {
                (Some(href), _) => Ok(self.session.resolve(href)),
                (None, Some(href)) => Ok(format!("{}/{}", self.session.resolve(href), rel)),
                (None, None) => Err(SdkError::NotFound(format!(
                    "{} has no '{}' relation",
                    parent.class_name, rel
                ))),
            },
        }
    }

    /// The response body, or the engine's fault as an error
    fn check(&self, url: &str, response: RestResponse, ok: &[u16]) -> SdkResult<String> {
        if ok.contains(&response.status) {
            return Ok(response.body);
        }
        match response.status {
            401 => Err(SdkError::Unauthorized(url.to_string())),
            404 => Err(SdkError::NotFound(url.to_string())),
            status => {
                let fault = codec::parse_entity(&response.body, &self.schema).ok();
                let field = |name: &str| {
                    fault
                        .as_ref()
                        .and_then(|f| f.get_path_string(name))
                        .unwrap_or_default()
                };
                error!(url, status, body = %response.body, "SDK request rejected");
                Err(SdkError::Request {
                    status,
                    reason: field("reason"),
                    detail: field("detail"),
                })
            }
        }
    }

    fn decode(&self, body: &str) -> SdkResult<SdkObject> {
        let root = XmlNode::parse(body)?;
        Ok(to_sdk(&codec::from_xml(&root, &self.schema), &self.schema))
    }

    fn encode(&self, object: &SdkObject) -> String {
        codec::to_document(&from_sdk(object), &self.schema)
    }

    fn correlation(params: &SdkParams) -> String {
        params.correlation_id.clone().unwrap_or_default()
    }
}

impl SdkClient for RestSdkClient {
    fn list(&self, collection: Collection<'_>, params: &SdkParams) -> SdkResult<Vec<SdkObject>> {
        let url = self.collection_url(&collection)?;
        let response = self.session.get(&url, &params.to_query(), params.timeout)?;
        let body = self.check(&url, response, &[200])?;
        let root = XmlNode::parse(&body)?;
        let objects: Vec<SdkObject> = codec::collection_from_xml(&root, &self.schema)
            .iter()
            .map(|entity| to_sdk(entity, &self.schema))
            .collect();
        debug!(url = %url, count = objects.len(), "Listed");
        Ok(objects)
    }

    fn get(&self, href: &str, params: &SdkParams) -> SdkResult<SdkObject> {
        let url = self.session.resolve(href);
        let response = self.session.get(&url, &[], params.timeout)?;
        let body = self.check(&url, response, &[200])?;
        self.decode(&body)
    }

    fn add(
        &self,
        collection: Collection<'_>,
        object: &SdkObject,
        params: &SdkParams,
    ) -> SdkResult<SdkObject> {
        let url = self.collection_url(&collection)?;
        let scope = self.session.correlation_scope(Self::correlation(params));
        let response = self
            .session
            .post(&url, &params.to_query(), self.encode(object), &scope, params.timeout)?;
        let body = self.check(&url, response, OK)?;
        self.decode(&body)
    }

    fn update(&self, href: &str, object: &SdkObject, params: &SdkParams) -> SdkResult<SdkObject> {
        let url = self.session.resolve(href);
        let scope = self.session.correlation_scope(Self::correlation(params));
        let response = self
            .session
            .put(&url, &params.to_query(), self.encode(object), &scope, params.timeout)?;
        let body = self.check(&url, response, &[200])?;
        self.decode(&body)
    }

    fn delete(&self, href: &str, body: Option<&SdkObject>, params: &SdkParams) -> SdkResult<()> {
        let url = self.session.resolve(href);
        let scope = self.session.correlation_scope(Self::correlation(params));
        let response = self.session.delete(
            &url,
            &params.to_query(),
            body.map(|b| self.encode(b)),
            &scope,
            params.timeout,
        )?;
        self.check(&url, response, DELETED).map(|_| ())
    }

    fn action(
        &self,
        href: &str,
        action: &str,
        body: &SdkObject,
        params: &SdkParams,
    ) -> SdkResult<SdkObject> {
        let url = format!("{}/{}", self.session.resolve(href), action);
        let scope = self.session.correlation_scope(Self::correlation(params));
        let response = self
            .session
            .post(&url, &params.to_query(), self.encode(body), &scope, params.timeout)?;
        let body = self.check(&url, response, OK)?;
        if body.trim().is_empty() {
            return Ok(SdkObject::new("Action", "action"));
        }
        self.decode(&body)
    }

    fn disconnect(&self) -> SdkResult<()> {
        self.session.close().map_err(SdkError::from)
    }
}
