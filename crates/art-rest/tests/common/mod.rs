//! In-process mock engine for REST adapter tests
//!
//! An axum router on a background thread answers a small subset of the
//! engine API: the root, the `vms` collection, single VMs and VM actions.

#![allow(dead_code)]

use art_config::{ApiOptions, RunOptions};
use art_core::{BackendKind, Schema, XmlNode};
use art_rest::{RestBackend, RestSession, CORRELATION_HEADER};
use axum::extract::{Path, Query, Request, State};
use axum::http::{header, HeaderMap, HeaderValue, StatusCode};
use axum::middleware::{self, Next};
use axum::response::{IntoResponse, Response};
use axum::routing::{get, post};
use axum::Router;
use std::collections::HashMap;
use std::net::SocketAddr;
use std::sync::{mpsc, Arc, Mutex};
use std::time::Duration;

/// `admin@internal:secret`
const EXPECTED_AUTH: &str = "Basic YWRtaW5AaW50ZXJuYWw6c2VjcmV0";

/// One request as the engine saw it
#[derive(Debug, Clone)]
pub struct Recorded {
    pub method: String,
    pub path: String,
    pub query: Option<String>,
    pub correlation_id: Option<String>,
    pub persistent_auth: bool,
}

#[derive(Debug)]
pub struct MockState {
    pub vms: Vec<XmlNode>,
    pub next_id: u32,
    pub requests: Vec<Recorded>,
    /// Advertise collections as `Link` headers instead of root children
    pub link_headers: bool,
}

impl Default for MockState {
    fn default() -> Self {
        Self {
            vms: Vec::new(),
            next_id: 1,
            requests: Vec::new(),
            link_headers: true,
        }
    }
}

type Shared = Arc<Mutex<MockState>>;

pub struct MockEngine {
    pub addr: SocketAddr,
    pub state: Shared,
}

impl MockEngine {
    pub fn start() -> Self {
        Self::start_with(MockState::default())
    }

    pub fn start_with(state: MockState) -> Self {
        let state = Arc::new(Mutex::new(state));
        let app = router(state.clone());
        let (tx, rx) = mpsc::channel();

        std::thread::spawn(move || {
            let runtime = tokio::runtime::Builder::new_current_thread()
                .enable_all()
                .build()
                .expect("mock runtime");
            runtime.block_on(async move {
                let listener = tokio::net::TcpListener::bind("127.0.0.1:0")
                    .await
                    .expect("bind mock engine");
                tx.send(listener.local_addr().expect("local addr"))
                    .expect("report address");
                axum::serve(listener, app).await.expect("serve mock engine");
            });
        });

        let addr = rx.recv().expect("mock engine address");
        Self { addr, state }
    }

    pub fn api_options(&self) -> ApiOptions {
        let mut api = ApiOptions::new("127.0.0.1", "admin");
        api.scheme = "http".to_string();
        api.port = Some(self.addr.port());
        api.password = "secret".to_string();
        api.request_timeout_secs = 5;
        api
    }

    pub fn options(&self) -> RunOptions {
        RunOptions::new(BackendKind::Rest, self.api_options())
    }

    /// VM adapter pinned to a fresh session on this engine
    pub fn vm_backend(&self) -> RestBackend {
        self.vm_backend_with(self.options())
    }

    pub fn vm_backend_with(&self, options: RunOptions) -> RestBackend {
        let schema = Schema::shared().expect("bundled schema");
        let kind = schema.entity_kind("vm", "vms").expect("vm kind");
        let session = RestSession::connect(&options.api).expect("login to mock engine");
        RestBackend::with_session(kind, Arc::new(options), schema, Arc::new(session))
    }

    /// Store a VM directly, returning its id
    pub fn seed_vm(&self, name: &str, cluster: &str) -> String {
        let mut state = self.state.lock().unwrap();
        let id = state.next_id.to_string();
        state.next_id += 1;

        let mut vm = XmlNode::new("vm");
        vm.set_attr("id", id.clone());
        vm.set_attr("href", format!("/api/vms/{}", id));
        vm.push(XmlNode::leaf("name", name));
        let mut status = XmlNode::new("status");
        status.push(XmlNode::leaf("state", "down"));
        vm.push(status);
        let mut cluster_node = XmlNode::new("cluster");
        cluster_node.push(XmlNode::leaf("name", cluster));
        vm.push(cluster_node);
        state.vms.push(vm);
        id
    }

    pub fn requests(&self) -> Vec<Recorded> {
        self.state.lock().unwrap().requests.clone()
    }

    pub fn vm_state(&self, id: &str) -> Option<String> {
        let state = self.state.lock().unwrap();
        state
            .vms
            .iter()
            .find(|vm| vm.attr("id") == Some(id))
            .and_then(|vm| vm.child("status"))
            .and_then(|status| status.child("state"))
            .map(|state| state.text.clone())
    }
}

fn router(state: Shared) -> Router {
    Router::new()
        .route("/api", get(root))
        .route("/api/broken", get(broken))
        .route("/api/vms", get(list_vms).post(add_vm))
        .route("/api/vms/:id", get(show_vm).put(update_vm).delete(remove_vm))
        .route("/api/vms/:id/:action", post(vm_action))
        .layer(middleware::from_fn_with_state(state.clone(), record))
        .with_state(state)
}

async fn record(State(state): State<Shared>, request: Request, next: Next) -> Response {
    let headers = request.headers();
    let recorded = Recorded {
        method: request.method().to_string(),
        path: request.uri().path().to_string(),
        query: request.uri().query().map(str::to_string),
        correlation_id: headers
            .get(CORRELATION_HEADER)
            .and_then(|v| v.to_str().ok())
            .map(str::to_string),
        persistent_auth: headers
            .get("prefer")
            .and_then(|v| v.to_str().ok())
            .map(|v| v == "persistent-auth")
            .unwrap_or(false),
    };
    let authorized = headers
        .get(header::AUTHORIZATION)
        .and_then(|v| v.to_str().ok())
        == Some(EXPECTED_AUTH);
    state.lock().unwrap().requests.push(recorded);

    if !authorized {
        return (StatusCode::UNAUTHORIZED, fault("Unauthorized")).into_response();
    }
    next.run(request).await
}

fn xml(status: StatusCode, node: &XmlNode) -> Response {
    (
        status,
        [(header::CONTENT_TYPE, "application/xml")],
        node.to_document(),
    )
        .into_response()
}

fn fault(reason: &str) -> String {
    let mut node = XmlNode::new("fault");
    node.push(XmlNode::leaf("reason", reason));
    node.push(XmlNode::leaf("detail", format!("[{}]", reason)));
    node.to_document()
}

async fn root(State(state): State<Shared>) -> Response {
    let link_headers = state.lock().unwrap().link_headers;
    let mut api = XmlNode::new("api");
    let mut headers = HeaderMap::new();
    for rel in ["vms", "broken"] {
        let href = format!("/api/{}", rel);
        if link_headers {
            let value = format!("<{}>; rel=\"{}\"", href, rel);
            headers.append(header::LINK, HeaderValue::from_str(&value).unwrap());
        } else {
            let mut link = XmlNode::new("link");
            link.set_attr("rel", rel);
            link.set_attr("href", href);
            api.push(link);
        }
    }
    (headers, xml(StatusCode::OK, &api)).into_response()
}

async fn broken() -> Response {
    let mut vm = XmlNode::new("vm");
    vm.push(XmlNode::leaf("name", "odd"));
    vm.push(XmlNode::leaf("bogus", "x"));
    xml(StatusCode::OK, &vm)
}

async fn list_vms(
    State(state): State<Shared>,
    Query(query): Query<HashMap<String, String>>,
) -> Response {
    let state = state.lock().unwrap();
    let wanted = query
        .get("search")
        .and_then(|s| s.strip_prefix("name="))
        .map(str::to_string);
    let max = query.get("max").and_then(|m| m.parse::<usize>().ok());

    let mut vms = XmlNode::new("vms");
    for vm in &state.vms {
        let name = vm.child("name").map(|n| n.text.as_str());
        if let Some(wanted) = &wanted {
            if name != Some(wanted.as_str()) {
                continue;
            }
        }
        if max.map(|max| vms.children.len() >= max).unwrap_or(false) {
            break;
        }
        vms.push(vm.clone());
    }
    xml(StatusCode::OK, &vms)
}

async fn add_vm(State(state): State<Shared>, body: String) -> Response {
    let mut vm = match XmlNode::parse(&body) {
        Ok(vm) => vm,
        Err(e) => return (StatusCode::BAD_REQUEST, fault(&e.to_string())).into_response(),
    };
    match vm.child("name").map(|n| n.text.clone()).as_deref() {
        None | Some("bad") => {
            return (StatusCode::BAD_REQUEST, fault("Request syntactically incorrect"))
                .into_response()
        }
        Some("renamed-by-engine") => {
            if let Some(name) = vm.children.iter_mut().find(|c| c.name == "name") {
                name.text = "something-else".to_string();
            }
        }
        Some(_) => {}
    }

    let mut state = state.lock().unwrap();
    let id = state.next_id.to_string();
    state.next_id += 1;
    vm.set_attr("id", id.clone());
    vm.set_attr("href", format!("/api/vms/{}", id));
    state.vms.push(vm.clone());
    xml(StatusCode::CREATED, &vm)
}

async fn show_vm(State(state): State<Shared>, Path(id): Path<String>) -> Response {
    let state = state.lock().unwrap();
    match state.vms.iter().find(|vm| vm.attr("id") == Some(id.as_str())) {
        Some(vm) => xml(StatusCode::OK, vm),
        None => (StatusCode::NOT_FOUND, fault("Not Found")).into_response(),
    }
}

async fn update_vm(
    State(state): State<Shared>,
    Path(id): Path<String>,
    body: String,
) -> Response {
    let changes = match XmlNode::parse(&body) {
        Ok(changes) => changes,
        Err(e) => return (StatusCode::BAD_REQUEST, fault(&e.to_string())).into_response(),
    };
    let mut state = state.lock().unwrap();
    let Some(vm) = state.vms.iter_mut().find(|vm| vm.attr("id") == Some(id.as_str())) else {
        return (StatusCode::NOT_FOUND, fault("Not Found")).into_response();
    };
    if changes.child("memory").map(|m| m.text.starts_with('-')) == Some(true) {
        return (StatusCode::BAD_REQUEST, fault("Memory must be positive")).into_response();
    }
    for change in changes.children {
        match vm.children.iter_mut().find(|c| c.name == change.name) {
            Some(existing) => *existing = change,
            None => vm.push(change),
        }
    }
    let vm = vm.clone();
    xml(StatusCode::OK, &vm)
}

async fn remove_vm(State(state): State<Shared>, Path(id): Path<String>) -> Response {
    let mut state = state.lock().unwrap();
    let before = state.vms.len();
    state.vms.retain(|vm| vm.attr("id") != Some(id.as_str()));
    if state.vms.len() == before {
        return (StatusCode::NOT_FOUND, fault("Not Found")).into_response();
    }
    StatusCode::NO_CONTENT.into_response()
}

async fn vm_action(
    State(state): State<Shared>,
    Path((id, action)): Path<(String, String)>,
    body: String,
) -> Response {
    if action == "stall" {
        tokio::time::sleep(Duration::from_secs(2)).await;
        return StatusCode::OK.into_response();
    }
    let requested = XmlNode::parse(&body).ok();
    let async_call = requested
        .as_ref()
        .and_then(|a| a.child("async"))
        .map(|a| a.text == "true")
        .unwrap_or(false);

    let mut state = state.lock().unwrap();
    let Some(vm) = state.vms.iter_mut().find(|vm| vm.attr("id") == Some(id.as_str())) else {
        return (StatusCode::NOT_FOUND, fault("Not Found")).into_response();
    };

    let outcome = match action.as_str() {
        "start" => {
            set_state(vm, "up");
            if async_call {
                "pending"
            } else {
                "complete"
            }
        }
        "stop" => {
            set_state(vm, "down");
            "complete"
        }
        "hang" => "failed",
        _ => {
            return (StatusCode::BAD_REQUEST, fault("Operation Failed")).into_response();
        }
    };

    let mut response = XmlNode::new("action");
    let mut status = XmlNode::new("status");
    status.push(XmlNode::leaf("state", outcome));
    response.push(status);
    xml(StatusCode::OK, &response)
}

fn set_state(vm: &mut XmlNode, value: &str) {
    if let Some(status) = vm.children.iter_mut().find(|c| c.name == "status") {
        if let Some(state) = status.children.iter_mut().find(|c| c.name == "state") {
            state.text = value.to_string();
            return;
        }
    }
    let mut status = XmlNode::new("status");
    status.push(XmlNode::leaf("state", value));
    vm.push(status);
}
