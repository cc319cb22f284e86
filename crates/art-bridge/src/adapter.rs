//! Bridged-SDK implementation of the backend contract

use crate::attach::AttachGuard;
use crate::error::{BridgeError, BridgeResult};
use crate::naming;
use crate::proxy::EntityProxy;
use crate::value::{BridgeKind, BridgeObject, BridgeRuntime, BridgeValue};
use art_compare::status::{fold_error, polarity};
use art_config::RunOptions;
use art_core::filter::select_unique;
use art_core::session;
use art_core::{
    ApiError, ApiResult, Backend, BackendKind, Entity, EntityKind, Fetched, GetTarget, OpOptions,
    Outcome, Schema, Value,
};
use std::sync::Arc;
use tracing::{debug, error, info, warn};

/// The connected SDK entry object as kept in the session cache
pub struct BridgeConnection {
    api: Arc<dyn BridgeObject>,
}

impl BridgeConnection {
    pub fn new(api: Arc<dyn BridgeObject>) -> Self {
        Self { api }
    }

    pub fn api(&self) -> &Arc<dyn BridgeObject> {
        &self.api
    }
}

/// Adapter for one entity type over the bridged SDK
pub struct BridgeBackend {
    kind: EntityKind,
    schema: Arc<Schema>,
    options: Arc<RunOptions>,
    runtime: Arc<dyn BridgeRuntime>,
    /// Entry object used instead of the process-wide cache, when set
    pinned: Option<Arc<dyn BridgeObject>>,
}

fn object_of(value: BridgeValue, what: &str) -> ApiResult<Arc<dyn BridgeObject>> {
    match value {
        BridgeValue::Object(object) => Ok(object),
        BridgeValue::Null => Err(ApiError::EntityNotFound(what.to_string())),
        other => Err(BridgeError::conversion(what, format!("expected an object, got {:?}", other)).into()),
    }
}

fn not_found_as(err: BridgeError, what: &str) -> ApiError {
    match err {
        BridgeError::Engine { status: 404, .. } | BridgeError::NoSuchMethod { .. } => {
            ApiError::EntityNotFound(what.to_string())
        }
        other => other.into(),
    }
}

impl BridgeBackend {
    pub fn new(
        kind: EntityKind,
        options: Arc<RunOptions>,
        schema: Arc<Schema>,
        runtime: Arc<dyn BridgeRuntime>,
    ) -> Self {
        Self {
            kind,
            schema,
            options,
            runtime,
            pinned: None,
        }
    }

    /// Adapter bound to an already connected entry object
    pub fn with_api(
        kind: EntityKind,
        options: Arc<RunOptions>,
        schema: Arc<Schema>,
        runtime: Arc<dyn BridgeRuntime>,
        api: Arc<dyn BridgeObject>,
    ) -> Self {
        Self {
            kind,
            schema,
            options,
            runtime,
            pinned: Some(api),
        }
    }

    fn enter(&self) -> ApiResult<AttachGuard<'_>> {
        Ok(AttachGuard::enter(self.runtime.as_ref())?)
    }

    /// Caller must hold an [`AttachGuard`]
    fn api(&self) -> ApiResult<Arc<dyn BridgeObject>> {
        if let Some(api) = &self.pinned {
            return Ok(api.clone());
        }
        let connection = session::get_or_login(BackendKind::Bridged, || {
            let api = self
                .runtime
                .connect(&self.options.api)
                .map_err(BridgeError::at_login)?;
            Ok(BridgeConnection::new(api))
        })?;
        Ok(connection.api().clone())
    }

    fn compare_enabled(&self, opts: &OpOptions) -> bool {
        opts.compare.unwrap_or(self.options.validation.compare)
    }

    /// Invoke `method`, appending the correlation id when its widest overload takes one
    fn call(
        object: &dyn BridgeObject,
        method: &str,
        mut args: Vec<BridgeValue>,
        correlation_id: Option<String>,
    ) -> BridgeResult<BridgeValue> {
        let kinds = object
            .parameter_kinds(method)
            .ok_or_else(|| BridgeError::no_such_method(object.class_name(), method))?;
        if let Some(id) = correlation_id {
            if kinds.len() == args.len() + 1 && kinds.last() == Some(&BridgeKind::String) {
                args.push(BridgeValue::String(id));
            }
        }
        object.invoke(method, args)
    }

    /// Collection broker of the API root ("vms" -> `getVMs()`)
    fn broker(&self, api: &dyn BridgeObject, collection: &str) -> ApiResult<Arc<dyn BridgeObject>> {
        let getter = naming::getter(collection);
        let value = Self::call(api, &getter, Vec::new(), None)
            .map_err(|e| not_found_as(e, collection))?;
        object_of(value, collection)
    }

    /// Broker for a relation of an entity ("nics" of a VM)
    fn sub_broker(&self, api: &dyn BridgeObject, parent: &Entity, rel: &str) -> ApiResult<Arc<dyn BridgeObject>> {
        let parent = self.resolve_in(api, parent, None)?;
        let value = Self::call(parent.as_ref(), &naming::getter(rel), Vec::new(), None)
            .map_err(|e| not_found_as(e, rel))?;
        object_of(value, rel)
    }

    /// Broker the adapter adds to and lists: `within`, else its own collection
    fn scoped_broker(&self, api: &dyn BridgeObject, opts: &OpOptions) -> ApiResult<Arc<dyn BridgeObject>> {
        match &opts.within {
            Some(GetTarget::Link { entity, rel }) => self.sub_broker(api, entity, rel),
            Some(GetTarget::Collection(name)) => self.broker(api, name),
            Some(GetTarget::Href(href)) => Err(ApiError::unsupported(
                BackendKind::Bridged,
                format!("collections addressed by href ({})", href),
            )),
            None => self.broker(api, &self.kind.collection_name),
        }
    }

    /// Live bridged object behind `entity`, looked up by id in its collection
    fn resolve_in(
        &self,
        api: &dyn BridgeObject,
        entity: &Entity,
        broker: Option<Arc<dyn BridgeObject>>,
    ) -> ApiResult<Arc<dyn BridgeObject>> {
        if let Some(href) = entity.href() {
            if broker.is_none() {
                return self.by_href(api, href);
            }
        }
        let id = entity
            .id()
            .ok_or_else(|| ApiError::EntityNotFound(format!("{} has no id", entity.describe())))?;
        let broker = match broker {
            Some(broker) => broker,
            None => {
                let collection = self
                    .schema
                    .collection_of(entity.element_name())
                    .map(str::to_string)
                    .unwrap_or_else(|| format!("{}s", entity.element_name()));
                self.broker(api, &collection)?
            }
        };
        let value = Self::call(broker.as_ref(), "getById", vec![BridgeValue::String(id.to_string())], None)
            .map_err(|e| not_found_as(e, &entity.describe()))?;
        object_of(value, &entity.describe())
    }

    /// Walk an href ("/api/vms/7/nics/3") through brokers and `getById`
    fn by_href(&self, api: &dyn BridgeObject, href: &str) -> ApiResult<Arc<dyn BridgeObject>> {
        let path = href.split('?').next().unwrap_or(href);
        let segments: Vec<&str> = path
            .split('/')
            .filter(|s| !s.is_empty())
            .skip_while(|s| *s != "api")
            .skip(1)
            .collect();
        if segments.is_empty() || segments.len() % 2 != 0 {
            return Err(ApiError::EntityNotFound(format!("no entity at {}", href)));
        }

        let mut current: Option<Arc<dyn BridgeObject>> = None;
        for pair in segments.chunks(2) {
            let broker = match &current {
                None => self.broker(api, pair[0])?,
                Some(parent) => {
                    let value = Self::call(parent.as_ref(), &naming::getter(pair[0]), Vec::new(), None)
                        .map_err(|e| not_found_as(e, href))?;
                    object_of(value, pair[0])?
                }
            };
            let value = Self::call(broker.as_ref(), "getById", vec![BridgeValue::String(pair[1].to_string())], None)
                .map_err(|e| not_found_as(e, href))?;
            current = Some(object_of(value, href)?);
        }
        current.ok_or_else(|| ApiError::EntityNotFound(href.to_string()))
    }

    /// Own entity, resolved through `within` when it is given
    fn resolve(&self, api: &dyn BridgeObject, entity: &Entity, opts: &OpOptions) -> ApiResult<Arc<dyn BridgeObject>> {
        match &opts.within {
            Some(_) => {
                let broker = self.scoped_broker(api, opts)?;
                self.resolve_in(api, entity, Some(broker))
            }
            None if entity.href().is_none() => {
                let broker = self.broker(api, &self.kind.collection_name)?;
                self.resolve_in(api, entity, Some(broker))
            }
            None => self.resolve_in(api, entity, None),
        }
    }

    /// `list()` or `list(query, caseSensitive, max)` on a broker
    fn list(
        &self,
        broker: &dyn BridgeObject,
        element: &str,
        query: Option<&str>,
        opts: &OpOptions,
    ) -> ApiResult<Vec<Entity>> {
        let args = if query.is_none() && opts.max.is_none() && opts.case_sensitive.is_none() {
            Vec::new()
        } else {
            vec![
                query.map_or(BridgeValue::Null, |q| BridgeValue::String(q.to_string())),
                opts.case_sensitive.map_or(BridgeValue::Null, BridgeValue::Bool),
                opts.max
                    .map_or(BridgeValue::Null, |m| BridgeValue::Int(i32::try_from(m).unwrap_or(i32::MAX))),
            ]
        };
        let listed = Self::call(broker, "list", args, None)?;
        let objects = match listed {
            BridgeValue::List(items) => items,
            BridgeValue::Null => Vec::new(),
            other => {
                return Err(BridgeError::conversion("list", format!("expected a list, got {:?}", other)).into())
            }
        };
        objects
            .into_iter()
            .filter_map(|item| item.as_object().cloned())
            .map(|object| EntityProxy::new(object).to_entity(element).map_err(ApiError::from))
            .collect()
    }

    /// Item element name of a collection, falling back to the adapter's own
    fn item_element(&self, collection: &str) -> String {
        self.schema
            .collection_item(collection)
            .map(str::to_string)
            .unwrap_or_else(|| self.kind.element_name.clone())
    }

    fn accept(&self, sent: &Entity, returned: BridgeValue, opts: &OpOptions) -> ApiResult<Outcome> {
        let object = object_of(returned, &sent.describe())?;
        let received = EntityProxy::new(object).to_entity(&self.kind.element_name)?;
        if received.id().is_none() {
            error!(entity = %sent.describe(), "Bridged SDK returned an object without id");
            return Ok(Outcome::failed());
        }
        if self.compare_enabled(opts) && !art_compare::compare(sent, &received) {
            return Ok(Outcome::failed());
        }
        Ok(Outcome::new(Some(received), true))
    }

    fn try_create(&self, entity: &Entity, positive: bool, opts: &OpOptions) -> ApiResult<Outcome> {
        let _guard = self.enter()?;
        let api = self.api()?;
        let broker = self.scoped_broker(api.as_ref(), opts)?;
        let proxy = EntityProxy::from_entity(self.runtime.as_ref(), entity, &self.schema)?;
        let correlation_id = opts.correlation_for("create");
        info!(
            entity = %entity.describe(),
            class = %proxy.class_name(),
            correlation_id = %correlation_id,
            "Creating"
        );

        let returned = Self::call(
            broker.as_ref(),
            "add",
            vec![BridgeValue::Object(proxy.object().clone())],
            Some(correlation_id),
        )?;
        if !positive {
            return Ok(Outcome::new(None, polarity(true, positive, "create")));
        }
        self.accept(entity, returned, opts)
    }

    fn try_update(
        &self,
        original: &Entity,
        updated: &Entity,
        positive: bool,
        opts: &OpOptions,
    ) -> ApiResult<Outcome> {
        let _guard = self.enter()?;
        let api = self.api()?;
        let target = EntityProxy::new(self.resolve(api.as_ref(), original, opts)?);
        let correlation_id = opts.correlation_for("update");
        info!(entity = %original.describe(), correlation_id = %correlation_id, "Updating");

        target.assign(self.runtime.as_ref(), updated, &self.schema)?;
        let returned = Self::call(target.object().as_ref(), "update", Vec::new(), Some(correlation_id))?;
        if !positive {
            return Ok(Outcome::new(None, polarity(true, positive, "update")));
        }
        self.accept(updated, returned, opts)
    }

    fn try_delete(&self, entity: &Entity, positive: bool, opts: &OpOptions) -> ApiResult<bool> {
        let _guard = self.enter()?;
        let api = self.api()?;
        let target = self.resolve(api.as_ref(), entity, opts)?;
        let correlation_id = opts.correlation_for("delete");
        info!(entity = %entity.describe(), correlation_id = %correlation_id, "Deleting");

        let args = match &opts.body {
            Some(body) => {
                let body = EntityProxy::from_entity(self.runtime.as_ref(), body, &self.schema)?;
                vec![BridgeValue::Object(body.object().clone())]
            }
            None => Vec::new(),
        };
        Self::call(target.as_ref(), "delete", args, Some(correlation_id))?;
        Ok(polarity(true, positive, "delete"))
    }

    fn try_action(
        &self,
        entity: &Entity,
        action: &str,
        positive: bool,
        opts: &OpOptions,
    ) -> ApiResult<bool> {
        let _guard = self.enter()?;
        let api = self.api()?;
        let target = self.resolve(api.as_ref(), entity, opts)?;
        let mut body = opts.body.clone().unwrap_or_else(|| Entity::new("action"));
        body.set_element_name("action");
        if opts.async_call {
            body.set("async", Value::Bool(true));
        }
        let body = EntityProxy::from_entity(self.runtime.as_ref(), &body, &self.schema)?;
        let correlation_id = opts.correlation_for(action);
        info!(
            entity = %entity.describe(),
            action,
            correlation_id = %correlation_id,
            "Running action"
        );

        let answer = Self::call(
            target.as_ref(),
            &naming::action_method(action),
            vec![BridgeValue::Object(body.object().clone())],
            Some(correlation_id),
        )?;
        let state = match answer {
            BridgeValue::Object(object) => EntityProxy::new(object).to_entity("action")?.status_name(),
            _ => None,
        };
        let accepted = match state.as_deref() {
            Some("failed") => {
                error!(action, "Action failed");
                false
            }
            Some("pending") | Some("in_progress") if !opts.async_call => {
                error!(action, "Synchronous action still pending");
                false
            }
            state => {
                debug!(action, ?state, "Action answered");
                true
            }
        };
        Ok(polarity(accepted, positive, action))
    }

    /// Caller must hold an [`AttachGuard`]
    fn reread(&self, api: &dyn BridgeObject, entity: &Entity) -> ApiResult<Entity> {
        let object = self.resolve(api, entity, &OpOptions::new())?;
        Ok(EntityProxy::new(object).to_entity(entity.element_name())?)
    }
}

impl Backend for BridgeBackend {
    fn kind(&self) -> BackendKind {
        BackendKind::Bridged
    }

    fn entity_kind(&self) -> &EntityKind {
        &self.kind
    }

    fn login(&self) -> ApiResult<()> {
        let _guard = self.enter()?;
        self.api().map(|_| ())
    }

    fn logout(&self) -> ApiResult<bool> {
        let _guard = self.enter()?;
        let api = match &self.pinned {
            Some(api) => Some(api.clone()),
            None => session::forget::<BridgeConnection>(BackendKind::Bridged)?
                .map(|connection| connection.api().clone()),
        };
        match api {
            Some(api) => match api.invoke("shutdown", Vec::new()) {
                Ok(_) => {
                    info!("Bridged SDK shut down");
                    Ok(true)
                }
                Err(e) => {
                    warn!(error = %e, "Bridged SDK shutdown failed");
                    Ok(false)
                }
            },
            None => {
                debug!("No bridged SDK connection to close");
                Ok(false)
            }
        }
    }

    fn create(&self, entity: &Entity, positive: bool, opts: &OpOptions) -> ApiResult<Outcome> {
        fold_error(
            self.try_create(entity, positive, opts),
            positive,
            "create",
            |ok| Outcome::new(None, ok),
        )
    }

    fn update(
        &self,
        original: &Entity,
        updated: &Entity,
        positive: bool,
        opts: &OpOptions,
    ) -> ApiResult<Outcome> {
        fold_error(
            self.try_update(original, updated, positive, opts),
            positive,
            "update",
            |ok| Outcome::new(None, ok),
        )
    }

    fn delete(&self, entity: &Entity, positive: bool, opts: &OpOptions) -> ApiResult<bool> {
        fold_error(self.try_delete(entity, positive, opts), positive, "delete", |ok| ok)
    }

    fn find(&self, value: &str, attribute: &str, opts: &OpOptions) -> ApiResult<Entity> {
        let _guard = self.enter()?;
        let api = self.api()?;
        let broker = self.scoped_broker(api.as_ref(), opts)?;
        let entities = self.list(broker.as_ref(), &self.kind.element_name, None, opts)?;
        select_unique(entities, value, attribute, &opts.filters)
    }

    fn get(&self, target: &GetTarget, opts: &OpOptions) -> ApiResult<Fetched> {
        let _guard = self.enter()?;
        let api = self.api()?;
        match target {
            GetTarget::Collection(name) => {
                let broker = self.broker(api.as_ref(), name)?;
                let entities = self.list(broker.as_ref(), &self.item_element(name), None, opts)?;
                debug!(collection = %name, count = entities.len(), "Listed collection");
                Ok(Fetched::Many(entities))
            }
            GetTarget::Href(href) => {
                let object = self.by_href(api.as_ref(), href)?;
                let proxy = EntityProxy::new(object);
                let element = naming::to_snake(&proxy.class_name());
                Ok(Fetched::One(proxy.to_entity(&element)?))
            }
            GetTarget::Link { entity, rel } => {
                let broker = self.sub_broker(api.as_ref(), entity, rel)?;
                let entities = self.list(broker.as_ref(), &self.item_element(rel), None, opts)?;
                Ok(Fetched::Many(entities))
            }
        }
    }

    fn query(&self, constraint: &str, opts: &OpOptions) -> ApiResult<Vec<Entity>> {
        let _guard = self.enter()?;
        let api = self.api()?;
        let broker = self.scoped_broker(api.as_ref(), opts)?;
        let entities = self.list(broker.as_ref(), &self.kind.element_name, Some(constraint), opts)?;
        debug!(constraint, count = entities.len(), "Query answered");
        Ok(entities)
    }

    fn sync_action(
        &self,
        entity: &Entity,
        action: &str,
        positive: bool,
        opts: &OpOptions,
    ) -> ApiResult<bool> {
        fold_error(
            self.try_action(entity, action, positive, opts),
            positive,
            action,
            |ok| ok,
        )
    }

    fn refresh(&self, entity: &Entity) -> ApiResult<Entity> {
        let _guard = self.enter()?;
        let api = self.api()?;
        if entity.id().is_some() || entity.href().is_some() {
            return self.reread(api.as_ref(), entity);
        }
        match entity.name() {
            Some(name) => {
                let broker = self.broker(api.as_ref(), &self.kind.collection_name)?;
                let entities = self.list(broker.as_ref(), &self.kind.element_name, None, &OpOptions::new())?;
                select_unique(entities, name, "name", &[])
            }
            None => Err(ApiError::EntityNotFound(format!(
                "cannot refresh {} without id or name",
                entity.describe()
            ))),
        }
    }
}
