//! Authenticated HTTP session with the engine

use crate::correlation::{CorrelationGuard, CorrelationSlot};
use crate::links;
use art_config::ApiOptions;
use art_core::{ApiError, ApiResult, BackendKind, XmlNode};
use reqwest::blocking::{Client, RequestBuilder};
use reqwest::header::{self, HeaderMap, HeaderValue};
use reqwest::{Certificate, Method, StatusCode};
use std::collections::HashMap;
use std::fs;
use std::time::{Duration, Instant};
use tracing::{debug, error, info, warn};

pub const CORRELATION_HEADER: &str = "Correlation-Id";
const PREFER_HEADER: &str = "prefer";
const SESSION_TTL_HEADER: &str = "session-ttl";
const FILTER_HEADER: &str = "filter";
const XML: &str = "application/xml";

/// Response captured with everything needed for validation and logging
#[derive(Debug, Clone)]
pub struct RestResponse {
    pub status: u16,
    pub headers: Vec<(String, String)>,
    pub body: String,
    pub elapsed: Duration,
}

impl RestResponse {
    pub fn is_success(&self) -> bool {
        (200..300).contains(&self.status)
    }

    pub fn header(&self, name: &str) -> Option<&str> {
        self.headers
            .iter()
            .find(|(k, _)| k.eq_ignore_ascii_case(name))
            .map(|(_, v)| v.as_str())
    }

    pub fn has_body(&self) -> bool {
        !self.body.trim().is_empty()
    }
}

/// One logged-in HTTP session; shared process-wide through the session cache
pub struct RestSession {
    client: Client,
    api: ApiOptions,
    origin: String,
    base_url: String,
    links: HashMap<String, String>,
    correlation: CorrelationSlot,
    /// Engine kind the session is cached under, for error reporting
    kind: BackendKind,
}

impl RestSession {
    /// Log in and read the relation map of the API root
    pub fn connect(api: &ApiOptions) -> ApiResult<Self> {
        Self::connect_as(api, BackendKind::Rest)
    }

    /// Like [`connect`](Self::connect), reporting errors as `kind`
    pub fn connect_as(api: &ApiOptions, kind: BackendKind) -> ApiResult<Self> {
        let client = build_client(api, kind)?;
        let mut session = Self {
            client,
            api: api.clone(),
            origin: api.origin(),
            base_url: api.base_url(),
            links: HashMap::new(),
            correlation: CorrelationSlot::new(),
            kind,
        };
        session.discover_links()?;
        info!(
            url = %session.base_url,
            user = %api.login_name(),
            links = session.links.len(),
            "Logged in"
        );
        Ok(session)
    }

    fn discover_links(&mut self) -> ApiResult<()> {
        let probe = self.send(Method::HEAD, &self.base_url, &[], None, None, None);
        let response = match probe {
            Ok(response) => response,
            Err(e) => return Err(ApiError::login(self.kind, e.to_string())),
        };
        check_login_status(self.kind, response.status)?;

        for (name, value) in &response.headers {
            if name.eq_ignore_ascii_case("link") {
                links::parse_link_header(value, &mut self.links);
            }
        }

        if self.links.is_empty() {
            debug!("No Link headers on the API root, reading the root document");
            let response = self
                .send(Method::GET, &self.base_url, &[], None, None, None)
                .map_err(|e| ApiError::login(self.kind, e.to_string()))?;
            check_login_status(self.kind, response.status)?;
            let root = XmlNode::parse(&response.body)
                .map_err(|e| ApiError::login(self.kind, format!("unreadable API root: {}", e)))?;
            links::links_from_root(&root, &mut self.links);
        }

        let origin = self.origin.clone();
        for href in self.links.values_mut() {
            *href = links::resolve(&origin, href);
        }
        Ok(())
    }

    /// End the engine-side session: one last request without persistent auth
    pub fn close(&self) -> ApiResult<()> {
        match self.send_with(Method::HEAD, &self.base_url, &[], None, None, None, false) {
            Ok(response) => {
                info!(status = response.status, url = %self.base_url, "Logged out");
                Ok(())
            }
            Err(e) => {
                warn!(error = %e, "Logout request failed");
                Err(e)
            }
        }
    }

    pub fn kind(&self) -> BackendKind {
        self.kind
    }

    pub fn base_url(&self) -> &str {
        &self.base_url
    }

    /// Absolute URL of a root relation ("vms")
    pub fn link(&self, rel: &str) -> Option<&str> {
        self.links.get(rel).map(String::as_str)
    }

    pub fn links(&self) -> &HashMap<String, String> {
        &self.links
    }

    /// Make an engine href absolute
    pub fn resolve(&self, href: &str) -> String {
        links::resolve(&self.origin, href)
    }

    /// Hold the correlation slot for one mutating call
    pub fn correlation_scope(&self, id: String) -> CorrelationGuard<'_> {
        self.correlation.scope(id)
    }

    /// `timeout` overrides the client's request timeout for this call
    pub fn get(
        &self,
        url: &str,
        query: &[(String, String)],
        timeout: Option<Duration>,
    ) -> ApiResult<RestResponse> {
        self.send(Method::GET, url, query, None, None, timeout)
    }

    pub fn post(
        &self,
        url: &str,
        query: &[(String, String)],
        body: String,
        scope: &CorrelationGuard<'_>,
        timeout: Option<Duration>,
    ) -> ApiResult<RestResponse> {
        self.send(Method::POST, url, query, Some(body), Some(scope.id()), timeout)
    }

    pub fn put(
        &self,
        url: &str,
        query: &[(String, String)],
        body: String,
        scope: &CorrelationGuard<'_>,
        timeout: Option<Duration>,
    ) -> ApiResult<RestResponse> {
        self.send(Method::PUT, url, query, Some(body), Some(scope.id()), timeout)
    }

    pub fn delete(
        &self,
        url: &str,
        query: &[(String, String)],
        body: Option<String>,
        scope: &CorrelationGuard<'_>,
        timeout: Option<Duration>,
    ) -> ApiResult<RestResponse> {
        self.send(Method::DELETE, url, query, body, Some(scope.id()), timeout)
    }

    fn send(
        &self,
        method: Method,
        url: &str,
        query: &[(String, String)],
        body: Option<String>,
        correlation_id: Option<&str>,
        timeout: Option<Duration>,
    ) -> ApiResult<RestResponse> {
        self.send_with(method, url, query, body, correlation_id, timeout, self.api.persistent_auth)
    }

    #[allow(clippy::too_many_arguments)]
    fn send_with(
        &self,
        method: Method,
        url: &str,
        query: &[(String, String)],
        body: Option<String>,
        correlation_id: Option<&str>,
        timeout: Option<Duration>,
        persist: bool,
    ) -> ApiResult<RestResponse> {
        let mut request: RequestBuilder = self
            .client
            .request(method.clone(), url)
            .basic_auth(self.api.login_name(), Some(&self.api.password))
            .header(header::ACCEPT, XML);
        if persist {
            request = request
                .header(PREFER_HEADER, "persistent-auth")
                .header(SESSION_TTL_HEADER, self.api.session_ttl_minutes);
        }
        if !query.is_empty() {
            request = request.query(query);
        }
        if let Some(id) = correlation_id.filter(|id| !id.is_empty()) {
            request = request.header(CORRELATION_HEADER, id);
        }
        if let Some(timeout) = timeout {
            request = request.timeout(timeout);
        }
        if let Some(body) = &body {
            request = request
                .header(header::CONTENT_TYPE, XML)
                .body(body.clone());
        }

        debug!(%method, url, ?query, correlation_id, "Sending request");
        let started = Instant::now();
        let response = request.send().map_err(|e| {
            if e.is_timeout() {
                ApiError::timeout(format!("{} {}", method, url), started.elapsed())
            } else {
                error!(%method, url, error = %e, body = body.as_deref().unwrap_or(""), "Request failed");
                ApiError::transport(self.kind, e.to_string())
            }
        })?;

        let status = response.status().as_u16();
        let headers = response
            .headers()
            .iter()
            .map(|(k, v)| (k.to_string(), v.to_str().unwrap_or_default().to_string()))
            .collect();
        let text = response
            .text()
            .map_err(|e| ApiError::transport(self.kind, e.to_string()))?;
        let elapsed = started.elapsed();
        debug!(%method, url, status, ?elapsed, "Received response");

        Ok(RestResponse {
            status,
            headers,
            body: text,
            elapsed,
        })
    }
}

fn check_login_status(kind: BackendKind, status: u16) -> ApiResult<()> {
    match StatusCode::from_u16(status) {
        Ok(StatusCode::UNAUTHORIZED) | Ok(StatusCode::FORBIDDEN) => {
            Err(ApiError::login(kind, format!("engine answered {}", status)))
        }
        Ok(code) if code.is_server_error() => {
            Err(ApiError::login(kind, format!("engine answered {}", status)))
        }
        _ => Ok(()),
    }
}

fn build_client(api: &ApiOptions, kind: BackendKind) -> ApiResult<Client> {
    let mut headers = HeaderMap::new();
    headers.insert(
        FILTER_HEADER,
        HeaderValue::from_static(if api.filter { "true" } else { "false" }),
    );

    let mut builder = Client::builder()
        .timeout(api.request_timeout())
        .cookie_store(api.persistent_auth)
        .default_headers(headers);

    if api.insecure {
        builder = builder.danger_accept_invalid_certs(true);
    } else if let Some(ca_file) = &api.ca_file {
        let pem = fs::read(ca_file).map_err(|e| {
            ApiError::login(kind, format!("cannot read CA file {}: {}", ca_file.display(), e))
        })?;
        let certificate = Certificate::from_pem(&pem)
            .map_err(|e| ApiError::login(kind, format!("invalid CA file: {}", e)))?;
        builder = builder.add_root_certificate(certificate);
    }

    builder
        .build()
        .map_err(|e| ApiError::login(kind, format!("cannot build HTTP client: {}", e)))
}
