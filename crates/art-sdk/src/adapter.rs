//! SDK implementation of the backend contract

use crate::client::{Collection, SdkClient, SdkParams};
use crate::error::SdkError;
use crate::object::{SdkField, SdkObject};
use crate::rest::RestSdkClient;
use crate::translate::{from_sdk, to_sdk};
use art_compare::status::{fold_error, polarity};
use art_config::RunOptions;
use art_core::filter::select_unique;
use art_core::session;
use art_core::{
    ApiError, ApiResult, Backend, BackendKind, Entity, EntityKind, Fetched, GetTarget, OpOptions,
    Outcome, Schema,
};
use std::sync::Arc;
use tracing::{debug, error, info, warn};

/// A connected SDK client as kept in the session cache
pub struct SdkConnection {
    client: Arc<dyn SdkClient>,
}

impl SdkConnection {
    pub fn new(client: Arc<dyn SdkClient>) -> Self {
        Self { client }
    }

    pub fn client(&self) -> &Arc<dyn SdkClient> {
        &self.client
    }
}

/// Adapter for one entity type over the SDK
pub struct SdkBackend {
    kind: EntityKind,
    schema: Arc<Schema>,
    options: Arc<RunOptions>,
    /// Client used instead of the process-wide cache, when set
    pinned: Option<Arc<dyn SdkClient>>,
}

impl SdkBackend {
    pub fn new(kind: EntityKind, options: Arc<RunOptions>, schema: Arc<Schema>) -> Self {
        Self {
            kind,
            schema,
            options,
            pinned: None,
        }
    }

    /// Adapter bound to an already connected client
    pub fn with_client(
        kind: EntityKind,
        options: Arc<RunOptions>,
        schema: Arc<Schema>,
        client: Arc<dyn SdkClient>,
    ) -> Self {
        Self {
            kind,
            schema,
            options,
            pinned: Some(client),
        }
    }

    fn client(&self) -> ApiResult<Arc<dyn SdkClient>> {
        if let Some(client) = &self.pinned {
            return Ok(client.clone());
        }
        let connection = session::get_or_login(BackendKind::Sdk, || {
            let client = RestSdkClient::connect(&self.options.api, self.schema.clone())
                .map_err(SdkError::at_login)?;
            Ok(SdkConnection::new(Arc::new(client)))
        })?;
        Ok(connection.client().clone())
    }

    fn compare_enabled(&self, opts: &OpOptions) -> bool {
        opts.compare.unwrap_or(self.options.validation.compare)
    }

    fn params(opts: &OpOptions, operation: Option<&str>) -> SdkParams {
        SdkParams {
            correlation_id: operation.map(|op| opts.correlation_for(op)),
            current: opts.current,
            async_call: opts.async_call,
            max: opts.max,
            case_sensitive: opts.case_sensitive,
            query: None,
            extra: opts.params.clone(),
            timeout: opts.timeout,
        }
    }

    fn href_of(entity: &Entity) -> ApiResult<&str> {
        entity
            .href()
            .ok_or_else(|| ApiError::EntityNotFound(format!("{} has no href", entity.describe())))
    }

    /// Collection the adapter adds to and lists: `within`, else its own
    fn with_collection<T>(
        &self,
        opts: &OpOptions,
        run: impl FnOnce(Collection<'_>) -> ApiResult<T>,
    ) -> ApiResult<T> {
        match &opts.within {
            Some(GetTarget::Link { entity, rel }) => {
                let parent = to_sdk(entity, &self.schema);
                run(Collection::Sub { parent: &parent, rel })
            }
            Some(GetTarget::Collection(name)) => run(Collection::Root(name)),
            Some(GetTarget::Href(href)) => Err(ApiError::unsupported(
                BackendKind::Sdk,
                format!("collections addressed by href ({})", href),
            )),
            None => run(Collection::Root(&self.kind.collection_name)),
        }
    }

    fn accept(&self, sent: &Entity, returned: &SdkObject, opts: &OpOptions) -> Outcome {
        let received = from_sdk(returned);
        if received.id().is_none() {
            error!(entity = %sent.describe(), "SDK returned an object without id");
            return Outcome::failed();
        }
        if self.compare_enabled(opts) && !art_compare::compare(sent, &received) {
            return Outcome::failed();
        }
        Outcome::new(Some(received), true)
    }

    fn try_create(&self, entity: &Entity, positive: bool, opts: &OpOptions) -> ApiResult<Outcome> {
        let client = self.client()?;
        let object = to_sdk(entity, &self.schema);
        let params = Self::params(opts, Some("create"));
        info!(
            entity = %entity.describe(),
            class = %object.class_name,
            correlation_id = ?params.correlation_id,
            "Creating"
        );

        let returned = self.with_collection(opts, |collection| {
            client.add(collection, &object, &params).map_err(ApiError::from)
        })?;
        if !positive {
            return Ok(Outcome::new(None, polarity(true, positive, "create")));
        }
        Ok(self.accept(entity, &returned, opts))
    }

    fn try_update(
        &self,
        original: &Entity,
        updated: &Entity,
        positive: bool,
        opts: &OpOptions,
    ) -> ApiResult<Outcome> {
        let client = self.client()?;
        let href = Self::href_of(original)?;
        let params = Self::params(opts, Some("update"));
        info!(entity = %original.describe(), correlation_id = ?params.correlation_id, "Updating");

        let returned = client.update(href, &to_sdk(updated, &self.schema), &params)?;
        if !positive {
            return Ok(Outcome::new(None, polarity(true, positive, "update")));
        }
        Ok(self.accept(updated, &returned, opts))
    }

    fn try_delete(&self, entity: &Entity, positive: bool, opts: &OpOptions) -> ApiResult<bool> {
        let client = self.client()?;
        let href = Self::href_of(entity)?;
        let params = Self::params(opts, Some("delete"));
        let body = opts.body.as_ref().map(|b| to_sdk(b, &self.schema));
        info!(entity = %entity.describe(), correlation_id = ?params.correlation_id, "Deleting");

        client.delete(href, body.as_ref(), &params)?;
        Ok(polarity(true, positive, "delete"))
    }

    fn try_action(
        &self,
        entity: &Entity,
        action: &str,
        positive: bool,
        opts: &OpOptions,
    ) -> ApiResult<bool> {
        let client = self.client()?;
        let href = Self::href_of(entity)?;
        let params = Self::params(opts, Some(action));
        let mut body = match &opts.body {
            Some(body) => to_sdk(body, &self.schema),
            None => SdkObject::new("Action", "action"),
        };
        body.tag = "action".to_string();
        if opts.async_call {
            body.set_field("async", SdkField::Bool(true));
        }
        info!(
            entity = %entity.describe(),
            action,
            correlation_id = ?params.correlation_id,
            "Running action"
        );

        let answer = client.action(href, action, &body, &params)?;
        let accepted = match answer.state().as_deref() {
            Some("failed") => {
                error!(action, fault = ?answer.field("fault"), "Action failed");
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

    fn list(&self, collection: Collection<'_>, params: &SdkParams) -> ApiResult<Vec<Entity>> {
        let client = self.client()?;
        let objects = client.list(collection, params)?;
        Ok(objects.iter().map(from_sdk).collect())
    }
}

impl Backend for SdkBackend {
    fn kind(&self) -> BackendKind {
        BackendKind::Sdk
    }

    fn entity_kind(&self) -> &EntityKind {
        &self.kind
    }

    fn login(&self) -> ApiResult<()> {
        self.client().map(|_| ())
    }

    fn logout(&self) -> ApiResult<bool> {
        let client = match &self.pinned {
            Some(client) => Some(client.clone()),
            None => session::forget::<SdkConnection>(BackendKind::Sdk)?
                .map(|connection| connection.client().clone()),
        };
        match client {
            Some(client) => match client.disconnect() {
                Ok(()) => {
                    info!("SDK disconnected");
                    Ok(true)
                }
                Err(e) => {
                    warn!(error = %e, "SDK disconnect failed");
                    Ok(false)
                }
            },
            None => {
                debug!("No SDK connection to close");
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
        let params = Self::params(opts, None);
        let entities = self.with_collection(opts, |collection| self.list(collection, &params))?;
        select_unique(entities, value, attribute, &opts.filters)
    }

    fn get(&self, target: &GetTarget, opts: &OpOptions) -> ApiResult<Fetched> {
        let params = Self::params(opts, None);
        match target {
            GetTarget::Collection(name) => {
                let entities = self.list(Collection::Root(name), &params)?;
                debug!(collection = %name, count = entities.len(), "Listed collection");
                Ok(Fetched::Many(entities))
            }
            GetTarget::Href(href) => {
                let object = self.client()?.get(href, &params)?;
                Ok(Fetched::One(from_sdk(&object)))
            }
            GetTarget::Link { entity, rel } => {
                let parent = to_sdk(entity, &self.schema);
                let entities = self.list(Collection::Sub { parent: &parent, rel }, &params)?;
                Ok(Fetched::Many(entities))
            }
        }
    }

    fn query(&self, constraint: &str, opts: &OpOptions) -> ApiResult<Vec<Entity>> {
        let mut params = Self::params(opts, None);
        params.query = Some(constraint.to_string());
        let entities = self.with_collection(opts, |collection| self.list(collection, &params))?;
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
        match (entity.href(), entity.name()) {
            (Some(href), _) => Ok(from_sdk(&self.client()?.get(href, &SdkParams::new())?)),
            (None, Some(name)) => self.find(name, "name", &OpOptions::new()),
            (None, None) => Err(ApiError::EntityNotFound(format!(
                "cannot refresh {} without href or name",
                entity.describe()
            ))),
        }
    }
}
