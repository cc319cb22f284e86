//! In-memory managed runtime for bridged adapter tests
//!
//! `FakeJvm` plays both the runtime and the engine behind it. Every object
//! it hands out refuses calls from threads that are not attached.

#![allow(dead_code)]

use art_bridge::{
    BridgeBackend, BridgeError, BridgeKind, BridgeObject, BridgeResult, BridgeRuntime, BridgeValue,
};
use art_config::{ApiOptions, RunOptions};
use art_core::{BackendKind, Schema};
use std::any::Any;
use std::collections::{BTreeMap, HashSet};
use std::sync::{Arc, Mutex};
use std::thread::{self, ThreadId};
use std::time::Duration;

type Fields = BTreeMap<String, BridgeValue>;

fn object_kind(class: &str) -> BridgeKind {
    BridgeKind::Object(class.to_string())
}

/// Bean properties of the fake SDK classes
fn properties(class: &str) -> Option<Vec<(&'static str, BridgeKind)>> {
    let props = match class {
        "VM" => vec![
            ("Id", BridgeKind::String),
            ("Href", BridgeKind::String),
            ("Name", BridgeKind::String),
            ("Description", BridgeKind::String),
            ("Memory", BridgeKind::Long),
            ("CpuShares", BridgeKind::Int),
            ("Stateless", BridgeKind::Bool),
            ("CreationTime", BridgeKind::Date),
            ("Cluster", object_kind("Cluster")),
            ("Status", object_kind("Status")),
            ("Links", BridgeKind::List),
        ],
        "Cluster" => vec![("Id", BridgeKind::String), ("Name", BridgeKind::String)],
        "Status" => vec![("State", BridgeKind::String)],
        "Action" => vec![
            ("Async", BridgeKind::Bool),
            ("Force", BridgeKind::Bool),
            ("Status", object_kind("Status")),
        ],
        "Link" => vec![("Rel", BridgeKind::String), ("Href", BridgeKind::String)],
        _ => return None,
    };
    Some(props)
}

#[derive(Debug, Clone, PartialEq)]
enum Role {
    Bean,
    Vm,
    Vms,
    Nics { parent: String },
    Api,
}

/// One non-accessor call as the fake saw it
#[derive(Debug, Clone)]
pub struct Call {
    pub class: String,
    pub method: String,
    pub args: Vec<BridgeValue>,
}

impl Call {
    /// Trailing string argument, where the correlation id goes
    pub fn correlation_id(&self) -> Option<&str> {
        self.args.last().and_then(BridgeValue::as_string)
    }
}

#[derive(Debug, Default)]
pub struct JvmState {
    pub vms: Vec<Fields>,
    pub next_id: u32,
    pub calls: Vec<Call>,
    pub attached: HashSet<ThreadId>,
    pub attaches: usize,
    pub detaches: usize,
    pub shut_down: bool,
}

pub struct FakeJvm {
    pub state: Mutex<JvmState>,
}

pub struct FakeObject {
    class: String,
    role: Role,
    fields: Mutex<Fields>,
    jvm: Arc<FakeJvm>,
}

fn rejected(method: &str, status: u16, detail: &str) -> BridgeError {
    BridgeError::Engine {
        method: method.to_string(),
        status,
        reason: if status == 404 { "Not Found" } else { "Operation Failed" }.to_string(),
        detail: detail.to_string(),
    }
}

fn fields_of(value: &BridgeValue) -> Option<Fields> {
    let object = value.as_object()?;
    let fake = object.as_any()?.downcast_ref::<FakeObject>()?;
    Some(fake.fields.lock().unwrap().clone())
}

impl FakeJvm {
    pub fn new() -> Arc<Self> {
        Arc::new(Self {
            state: Mutex::new(JvmState {
                next_id: 1,
                ..JvmState::default()
            }),
        })
    }

    fn make(self: &Arc<Self>, class: &str, role: Role, fields: Fields) -> Arc<FakeObject> {
        Arc::new(FakeObject {
            class: class.to_string(),
            role,
            fields: Mutex::new(fields),
            jvm: self.clone(),
        })
    }

    fn bean(self: &Arc<Self>, class: &str, pairs: Vec<(&str, BridgeValue)>) -> BridgeValue {
        let fields = pairs.into_iter().map(|(k, v)| (k.to_string(), v)).collect();
        BridgeValue::Object(self.make(class, Role::Bean, fields))
    }

    fn status(self: &Arc<Self>, state: &str) -> BridgeValue {
        self.bean("Status", vec![("State", BridgeValue::String(state.to_string()))])
    }

    /// Store a new VM record and return its id
    fn insert(self: &Arc<Self>, mut fields: Fields) -> String {
        let id = {
            let mut state = self.state.lock().unwrap();
            let id = state.next_id.to_string();
            state.next_id += 1;
            id
        };
        let href = format!("/api/vms/{}", id);
        let link = self.bean(
            "Link",
            vec![
                ("Rel", BridgeValue::String("nics".to_string())),
                ("Href", BridgeValue::String(format!("{}/nics", href))),
            ],
        );
        fields.insert("Id".to_string(), BridgeValue::String(id.clone()));
        fields.insert("Href".to_string(), BridgeValue::String(href));
        fields.insert("Status".to_string(), self.status("down"));
        fields.insert("Links".to_string(), BridgeValue::List(vec![link]));
        self.state.lock().unwrap().vms.push(fields);
        id
    }

    pub fn seed(self: &Arc<Self>, name: &str, cluster: &str) -> String {
        let mut fields = Fields::new();
        fields.insert("Name".to_string(), BridgeValue::String(name.to_string()));
        fields.insert(
            "Cluster".to_string(),
            self.bean("Cluster", vec![("Name", BridgeValue::String(cluster.to_string()))]),
        );
        self.insert(fields)
    }

    pub fn calls(&self) -> Vec<Call> {
        self.state.lock().unwrap().calls.clone()
    }

    pub fn calls_named(&self, method: &str) -> Vec<Call> {
        self.calls().into_iter().filter(|c| c.method == method).collect()
    }

    pub fn record(&self, id: &str) -> Option<Fields> {
        let state = self.state.lock().unwrap();
        state
            .vms
            .iter()
            .find(|vm| vm.get("Id").and_then(BridgeValue::as_string) == Some(id))
            .cloned()
    }

    pub fn state_of(&self, id: &str) -> Option<String> {
        let status = self.record(id)?.get("Status").cloned()?;
        fields_of(&status)?
            .get("State")
            .and_then(BridgeValue::as_string)
            .map(str::to_string)
    }

    fn is_attached(&self) -> bool {
        self.state.lock().unwrap().attached.contains(&thread::current().id())
    }

    fn snapshot(self: &Arc<Self>, fields: Fields) -> BridgeValue {
        BridgeValue::Object(self.make("VM", Role::Vm, fields))
    }

    fn find_record(&self, id: &str) -> BridgeResult<Fields> {
        self.record(id)
            .ok_or_else(|| rejected("getById", 404, &format!("no vm with id {}", id)))
    }

    fn write_record(&self, fields: Fields) -> BridgeResult<()> {
        let id = fields.get("Id").and_then(BridgeValue::as_string).unwrap_or_default().to_string();
        let mut state = self.state.lock().unwrap();
        let slot = state
            .vms
            .iter_mut()
            .find(|vm| vm.get("Id").and_then(BridgeValue::as_string) == Some(id.as_str()))
            .ok_or_else(|| rejected("update", 404, "vm is gone"))?;
        *slot = fields;
        Ok(())
    }
}

impl FakeObject {
    fn property<'m>(&self, method: &'m str) -> Option<(&'m str, BridgeKind)> {
        let name = method.strip_prefix("get").or_else(|| method.strip_prefix("set"))?;
        properties(&self.class)?
            .into_iter()
            .find(|(p, _)| *p == name)
            .map(|(_, kind)| (name, kind))
    }

    fn verbs(&self) -> Vec<(&'static str, Vec<BridgeKind>)> {
        let action = || vec![object_kind("Action"), BridgeKind::String];
        match &self.role {
            Role::Bean => Vec::new(),
            Role::Vm => vec![
                ("update", vec![BridgeKind::String]),
                ("delete", action()),
                ("start", action()),
                ("stop", action()),
                ("hang", action()),
                ("stall", action()),
                ("getNics", Vec::new()),
            ],
            Role::Vms => vec![
                ("add", vec![object_kind("VM"), BridgeKind::String]),
                ("list", vec![BridgeKind::String, BridgeKind::Bool, BridgeKind::Int]),
                ("getById", vec![BridgeKind::String]),
            ],
            Role::Nics { .. } => vec![
                ("list", vec![BridgeKind::String, BridgeKind::Bool, BridgeKind::Int]),
                ("getById", vec![BridgeKind::String]),
            ],
            Role::Api => vec![("getVMs", Vec::new()), ("shutdown", Vec::new())],
        }
    }

    fn own_fields(&self) -> Fields {
        self.fields.lock().unwrap().clone()
    }

    fn list(&self, args: &[BridgeValue], records: Vec<Fields>) -> BridgeValue {
        let wanted = args
            .first()
            .and_then(BridgeValue::as_string)
            .and_then(|q| q.strip_prefix("name="))
            .map(str::to_string);
        let max = match args.get(2) {
            Some(BridgeValue::Int(m)) => *m as usize,
            _ => usize::MAX,
        };
        BridgeValue::List(
            records
                .into_iter()
                .filter(|vm| {
                    wanted.as_deref().map_or(true, |name| {
                        vm.get("Name").and_then(BridgeValue::as_string) == Some(name)
                    })
                })
                .take(max)
                .map(|vm| self.jvm.snapshot(vm))
                .collect(),
        )
    }

    fn run_action(&self, verb: &str, args: &[BridgeValue]) -> BridgeResult<BridgeValue> {
        let asynchronous = matches!(
            args.first()
                .and_then(fields_of)
                .and_then(|body| body.get("Async").cloned()),
            Some(BridgeValue::Bool(true))
        );
        let mut fields = self.own_fields();
        let answer = match verb {
            "start" => {
                fields.insert("Status".to_string(), self.jvm.status("up"));
                if asynchronous { "pending" } else { "complete" }
            }
            "stop" => {
                fields.insert("Status".to_string(), self.jvm.status("down"));
                "complete"
            }
            "hang" => "failed",
            _ => {
                return Err(BridgeError::Timeout {
                    method: verb.to_string(),
                    elapsed: Duration::from_secs(180),
                })
            }
        };
        self.jvm.write_record(fields)?;
        Ok(self
            .jvm
            .bean("Action", vec![("Status", self.jvm.status(answer))]))
    }

    fn dispatch(&self, method: &str, args: Vec<BridgeValue>) -> BridgeResult<BridgeValue> {
        match (&self.role, method) {
            (Role::Vm, "update") => {
                let fields = self.own_fields();
                if matches!(fields.get("Memory"), Some(BridgeValue::Long(m)) if *m < 0) {
                    return Err(rejected(method, 400, "Memory must be positive"));
                }
                self.jvm.write_record(fields.clone())?;
                Ok(self.jvm.snapshot(fields))
            }
            (Role::Vm, "delete") => {
                let id = self.own_fields().get("Id").and_then(BridgeValue::as_string).unwrap_or_default().to_string();
                let mut state = self.jvm.state.lock().unwrap();
                let before = state.vms.len();
                state
                    .vms
                    .retain(|vm| vm.get("Id").and_then(BridgeValue::as_string) != Some(id.as_str()));
                if state.vms.len() == before {
                    return Err(rejected(method, 404, "vm is gone"));
                }
                Ok(BridgeValue::Null)
            }
            (Role::Vm, "getNics") => {
                let parent = self.own_fields().get("Href").and_then(BridgeValue::as_string).unwrap_or_default().to_string();
                Ok(BridgeValue::Object(self.jvm.make("VMNics", Role::Nics { parent }, Fields::new())))
            }
            (Role::Vm, "start" | "stop" | "hang" | "stall") => self.run_action(method, &args),
            (Role::Vms, "add") => {
                let fields = args.first().and_then(fields_of).unwrap_or_default();
                if fields.get("Name").and_then(BridgeValue::as_string) == Some("bad") {
                    return Err(rejected(method, 400, "Cannot add VM. The name is invalid."));
                }
                let id = self.jvm.insert(fields);
                Ok(self.jvm.snapshot(self.jvm.find_record(&id)?))
            }
            (Role::Vms, "list") => {
                let records = self.jvm.state.lock().unwrap().vms.clone();
                Ok(self.list(&args, records))
            }
            (Role::Vms, "getById") => {
                let id = args.first().and_then(BridgeValue::as_string).unwrap_or_default();
                Ok(self.jvm.snapshot(self.jvm.find_record(id)?))
            }
            (Role::Nics { .. }, "list") => Ok(BridgeValue::List(Vec::new())),
            (Role::Nics { .. }, _) => Err(rejected(method, 404, "no such nic")),
            (Role::Api, "getVMs") => Ok(BridgeValue::Object(self.jvm.make("VMs", Role::Vms, Fields::new()))),
            (Role::Api, "shutdown") => {
                self.jvm.state.lock().unwrap().shut_down = true;
                Ok(BridgeValue::Null)
            }
            _ => Err(BridgeError::no_such_method(self.class.clone(), method)),
        }
    }
}

impl BridgeObject for FakeObject {
    fn class_name(&self) -> String {
        self.class.clone()
    }

    fn methods(&self) -> Vec<String> {
        let mut methods: Vec<String> = properties(&self.class)
            .unwrap_or_default()
            .into_iter()
            .flat_map(|(p, _)| [format!("get{}", p), format!("set{}", p)])
            .collect();
        methods.extend(self.verbs().into_iter().map(|(verb, _)| verb.to_string()));
        methods.push("getClass".to_string());
        methods
    }

    fn parameter_kinds(&self, method: &str) -> Option<Vec<BridgeKind>> {
        if method == "getClass" {
            return Some(Vec::new());
        }
        if let Some((_, kind)) = self.property(method) {
            return Some(if method.starts_with("set") { vec![kind] } else { Vec::new() });
        }
        self.verbs()
            .into_iter()
            .find(|(verb, _)| *verb == method)
            .map(|(_, kinds)| kinds)
    }

    fn invoke(&self, method: &str, args: Vec<BridgeValue>) -> BridgeResult<BridgeValue> {
        if !self.jvm.is_attached() {
            return Err(BridgeError::Attach(format!("{}.{} called from a detached thread", self.class, method)));
        }
        if let Some((name, _)) = self.property(method) {
            let mut fields = self.fields.lock().unwrap();
            if method.starts_with("set") {
                let value = args.into_iter().next().unwrap_or(BridgeValue::Null);
                fields.insert(name.to_string(), value);
                return Ok(BridgeValue::Null);
            }
            return Ok(fields.get(name).cloned().unwrap_or(BridgeValue::Null));
        }
        self.jvm.state.lock().unwrap().calls.push(Call {
            class: self.class.clone(),
            method: method.to_string(),
            args: args.clone(),
        });
        self.dispatch(method, args)
    }

    fn as_any(&self) -> Option<&dyn Any> {
        Some(self)
    }
}

/// The runtime face of a [`FakeJvm`]
pub struct FakeRuntime(pub Arc<FakeJvm>);

impl BridgeRuntime for FakeRuntime {
    fn is_thread_attached(&self) -> bool {
        self.0.is_attached()
    }

    fn attach_thread(&self) -> BridgeResult<()> {
        let mut state = self.0.state.lock().unwrap();
        state.attached.insert(thread::current().id());
        state.attaches += 1;
        Ok(())
    }

    fn detach_thread(&self) -> BridgeResult<()> {
        let mut state = self.0.state.lock().unwrap();
        state.attached.remove(&thread::current().id());
        state.detaches += 1;
        Ok(())
    }

    fn new_object(&self, class_name: &str) -> BridgeResult<Arc<dyn BridgeObject>> {
        if properties(class_name).is_none() {
            return Err(BridgeError::Runtime(format!("ClassNotFoundException: {}", class_name)));
        }
        Ok(self.0.make(class_name, Role::Bean, Fields::new()))
    }

    fn connect(&self, api: &ApiOptions) -> BridgeResult<Arc<dyn BridgeObject>> {
        if api.password != "secret" {
            return Err(rejected("connect", 401, "Unauthorized"));
        }
        Ok(self.0.make("Api", Role::Api, Fields::new()))
    }
}

pub fn options() -> Arc<RunOptions> {
    let mut api = ApiOptions::new("127.0.0.1", "admin");
    api.password = "secret".to_string();
    Arc::new(RunOptions::new(BackendKind::Bridged, api))
}

pub fn runtime(jvm: &Arc<FakeJvm>) -> Arc<FakeRuntime> {
    Arc::new(FakeRuntime(jvm.clone()))
}

pub fn vm_backend(jvm: &Arc<FakeJvm>) -> BridgeBackend {
    let schema = Schema::shared().unwrap();
    let kind = schema.entity_kind("vm", "vms").unwrap();
    let runtime = runtime(jvm);
    let api = runtime.connect(&options().api).unwrap();
    BridgeBackend::with_api(kind, options(), schema, runtime, api)
}
