//! In-memory SDK client for adapter tests

#![allow(dead_code)]

use art_config::{ApiOptions, RunOptions};
use art_core::{BackendKind, Schema};
use art_sdk::{Collection, SdkBackend, SdkClient, SdkError, SdkField, SdkObject, SdkParams, SdkResult};
use std::sync::{Arc, Mutex};
use std::time::Duration;

/// One SDK call as the fake saw it
#[derive(Debug, Clone)]
pub struct Call {
    pub method: &'static str,
    pub target: String,
    pub params: SdkParams,
}

#[derive(Debug)]
pub struct FakeState {
    pub vms: Vec<SdkObject>,
    pub next_id: u32,
    pub calls: Vec<Call>,
    pub disconnected: bool,
}

pub struct FakeSdk {
    pub state: Mutex<FakeState>,
}

fn status(state: &str) -> SdkField {
    let mut status = SdkObject::new("Status", "status");
    status.set_field("state", SdkField::Text(state.to_string()));
    SdkField::Object(Box::new(status))
}

fn rejected(status: u16, detail: &str) -> SdkError {
    SdkError::Request {
        status,
        reason: "Operation Failed".to_string(),
        detail: detail.to_string(),
    }
}

impl FakeSdk {
    pub fn new() -> Arc<Self> {
        Arc::new(Self {
            state: Mutex::new(FakeState {
                vms: Vec::new(),
                next_id: 1,
                calls: Vec::new(),
                disconnected: false,
            }),
        })
    }

    pub fn seed(&self, name: &str, cluster: &str) -> String {
        let mut state = self.state.lock().unwrap();
        let id = state.next_id.to_string();
        state.next_id += 1;
        let mut vm = SdkObject::new("VM", "vm");
        vm.id = Some(id.clone());
        vm.href = Some(format!("/api/vms/{}", id));
        vm.links.push(("nics".to_string(), format!("/api/vms/{}/nics", id)));
        vm.set_field("name", SdkField::Text(name.to_string()));
        let mut cl = SdkObject::new("Cluster", "cluster");
        cl.set_field("name", SdkField::Text(cluster.to_string()));
        vm.set_field("cluster", SdkField::Object(Box::new(cl)));
        vm.set_field("status", status("down"));
        state.vms.push(vm);
        id
    }

    pub fn calls(&self) -> Vec<Call> {
        self.state.lock().unwrap().calls.clone()
    }

    pub fn state_of(&self, id: &str) -> Option<String> {
        let state = self.state.lock().unwrap();
        state
            .vms
            .iter()
            .find(|vm| vm.id.as_deref() == Some(id))
            .and_then(SdkObject::state)
    }

    fn record(&self, method: &'static str, target: &str, params: &SdkParams) {
        self.state.lock().unwrap().calls.push(Call {
            method,
            target: target.to_string(),
            params: params.clone(),
        });
    }
}

impl SdkClient for FakeSdk {
    fn list(&self, collection: Collection<'_>, params: &SdkParams) -> SdkResult<Vec<SdkObject>> {
        match collection {
            Collection::Root("vms") => {
                self.record("list", "vms", params);
                let state = self.state.lock().unwrap();
                let wanted = params
                    .query
                    .as_deref()
                    .and_then(|q| q.strip_prefix("name="));
                Ok(state
                    .vms
                    .iter()
                    .filter(|vm| wanted.map_or(true, |name| vm.name() == Some(name)))
                    .take(params.max.map_or(usize::MAX, |m| m as usize))
                    .cloned()
                    .collect())
            }
            Collection::Root(other) => Err(SdkError::NotFound(other.to_string())),
            Collection::Sub { parent, rel } => {
                let target = format!("{}/{}", parent.href.clone().unwrap_or_default(), rel);
                self.record("list", &target, params);
                Ok(Vec::new())
            }
        }
    }

    fn get(&self, href: &str, params: &SdkParams) -> SdkResult<SdkObject> {
        self.record("get", href, params);
        let state = self.state.lock().unwrap();
        state
            .vms
            .iter()
            .find(|vm| vm.href.as_deref() == Some(href))
            .cloned()
            .ok_or_else(|| SdkError::NotFound(href.to_string()))
    }

    fn add(
        &self,
        collection: Collection<'_>,
        object: &SdkObject,
        params: &SdkParams,
    ) -> SdkResult<SdkObject> {
        let target = match collection {
            Collection::Root(name) => name.to_string(),
            Collection::Sub { rel, .. } => rel.to_string(),
        };
        self.record("add", &target, params);
        if object.name() == Some("bad") {
            return Err(rejected(400, "Cannot add VM. The name is invalid."));
        }
        let mut state = self.state.lock().unwrap();
        let id = state.next_id.to_string();
        state.next_id += 1;
        let mut created = object.clone();
        created.id = Some(id.clone());
        created.href = Some(format!("/api/vms/{}", id));
        created.set_field("status", status("down"));
        state.vms.push(created.clone());
        Ok(created)
    }

    fn update(&self, href: &str, object: &SdkObject, params: &SdkParams) -> SdkResult<SdkObject> {
        self.record("update", href, params);
        if matches!(object.field("memory"), Some(SdkField::Long(m)) if *m < 0) {
            return Err(rejected(400, "Memory must be positive"));
        }
        let mut state = self.state.lock().unwrap();
        let vm = state
            .vms
            .iter_mut()
            .find(|vm| vm.href.as_deref() == Some(href))
            .ok_or_else(|| SdkError::NotFound(href.to_string()))?;
        for (name, value) in &object.fields {
            vm.set_field(name.as_str(), value.clone());
        }
        Ok(vm.clone())
    }

    fn delete(&self, href: &str, _body: Option<&SdkObject>, params: &SdkParams) -> SdkResult<()> {
        self.record("delete", href, params);
        let mut state = self.state.lock().unwrap();
        let before = state.vms.len();
        state.vms.retain(|vm| vm.href.as_deref() != Some(href));
        if state.vms.len() == before {
            return Err(SdkError::NotFound(href.to_string()));
        }
        Ok(())
    }

    fn action(
        &self,
        href: &str,
        action: &str,
        body: &SdkObject,
        params: &SdkParams,
    ) -> SdkResult<SdkObject> {
        self.record("action", &format!("{}/{}", href, action), params);
        let asynchronous = body.field("async") == Some(&SdkField::Bool(true));
        let mut answer = SdkObject::new("Action", "action");
        let mut state = self.state.lock().unwrap();
        let vm = state
            .vms
            .iter_mut()
            .find(|vm| vm.href.as_deref() == Some(href))
            .ok_or_else(|| SdkError::NotFound(href.to_string()))?;
        match action {
            "start" => {
                vm.set_field("status", status("up"));
                let done = if asynchronous { "pending" } else { "complete" };
                answer.set_field("status", status(done));
            }
            "stop" => {
                vm.set_field("status", status("down"));
                answer.set_field("status", status("complete"));
            }
            "hang" => answer.set_field("status", status("failed")),
            "stall" => {
                return Err(SdkError::Timeout {
                    operation: format!("POST {}/{}", href, action),
                    elapsed: Duration::from_secs(180),
                })
            }
            _ => return Err(rejected(400, "Unknown action")),
        }
        Ok(answer)
    }

    fn disconnect(&self) -> SdkResult<()> {
        self.state.lock().unwrap().disconnected = true;
        Ok(())
    }
}

pub fn options() -> Arc<RunOptions> {
    let mut api = ApiOptions::new("127.0.0.1", "admin");
    api.scheme = "http".to_string();
    api.port = Some(1);
    api.password = "secret".to_string();
    api.request_timeout_secs = 2;
    Arc::new(RunOptions::new(BackendKind::Sdk, api))
}

pub fn vm_backend(sdk: Arc<FakeSdk>) -> SdkBackend {
    let schema = Schema::shared().unwrap();
    let kind = schema.entity_kind("vm", "vms").unwrap();
    SdkBackend::with_client(kind, options(), schema, sdk)
}
