//! REST implementation of the backend contract

use crate::session::{RestResponse, RestSession};
use crate::validation;
use art_compare::status::{
    fold_error, polarity, validate_status, ACTION_OK, CREATE_OK, DELETE_OK, GET_OK, UPDATE_OK,
};
use art_config::RunOptions;
use art_core::codec;
use art_core::filter::select_unique;
use art_core::session;
use art_core::xpath;
use art_core::{
    ApiError, ApiResult, Backend, BackendKind, Entity, EntityKind, Fetched, GetTarget, OpOptions,
    Outcome, Schema, XmlNode,
};
use std::sync::Arc;
use tracing::{debug, error, info, warn};

/// Adapter for one entity type over the REST engine
pub struct RestBackend {
    kind: EntityKind,
    schema: Arc<Schema>,
    options: Arc<RunOptions>,
    /// Session used instead of the process-wide cache, when set
    pinned: Option<Arc<RestSession>>,
}

impl RestBackend {
    pub fn new(kind: EntityKind, options: Arc<RunOptions>, schema: Arc<Schema>) -> Self {
        Self {
            kind,
            schema,
            options,
            pinned: None,
        }
    }

    /// Adapter bound to an already open session
    pub fn with_session(
        kind: EntityKind,
        options: Arc<RunOptions>,
        schema: Arc<Schema>,
        session: Arc<RestSession>,
    ) -> Self {
        Self {
            kind,
            schema,
            options,
            pinned: Some(session),
        }
    }

    fn session(&self) -> ApiResult<Arc<RestSession>> {
        match &self.pinned {
            Some(session) => Ok(session.clone()),
            None => session::get_or_login(BackendKind::Rest, || {
                RestSession::connect(&self.options.api)
            }),
        }
    }

    fn target_url(&self, session: &RestSession, target: &GetTarget) -> ApiResult<String> {
        match target {
            GetTarget::Collection(name) => session.link(name).map(str::to_string).ok_or_else(|| {
                ApiError::EntityNotFound(format!("API root has no '{}' relation", name))
            }),
            GetTarget::Href(href) => Ok(session.resolve(href)),
            GetTarget::Link { entity, rel } => match (entity.link(rel), entity.href()) {
                (Some(href), _) => Ok(session.resolve(href)),
                (None, Some(href)) => Ok(format!("{}/{}", session.resolve(href), rel)),
                (None, None) => Err(ApiError::EntityNotFound(format!(
                    "{} has no '{}' relation",
                    entity.describe(),
                    rel
                ))),
            },
        }
    }

    fn collection_url(&self, session: &RestSession, opts: &OpOptions) -> ApiResult<String> {
        match &opts.within {
            Some(target) => self.target_url(session, target),
            None => self.target_url(
                session,
                &GetTarget::collection(self.kind.collection_name.as_str()),
            ),
        }
    }

    fn entity_url(&self, session: &RestSession, entity: &Entity) -> ApiResult<String> {
        entity
            .href()
            .map(|href| session.resolve(href))
            .ok_or_else(|| ApiError::EntityNotFound(format!("{} has no href", entity.describe())))
    }

    fn validate(&self, response: &RestResponse, context: &str) {
        if self.options.validation.validate_responses {
            validation::validate_response(&self.schema, &response.body, context);
        }
    }

    fn compare_enabled(&self, opts: &OpOptions) -> bool {
        opts.compare.unwrap_or(self.options.validation.compare)
    }

    fn fetch(&self, url: &str, query: &[(String, String)], opts: &OpOptions) -> ApiResult<XmlNode> {
        let session = self.session()?;
        let response = session.get(url, query, opts.timeout)?;
        if response.status == 404 {
            return Err(ApiError::EntityNotFound(url.to_string()));
        }
        if !validate_status(response.status, true, GET_OK, opts.expected_status.as_deref()) {
            error!(url, status = response.status, body = %response.body, "GET failed");
            return Err(ApiError::transport(
                BackendKind::Rest,
                format!("GET {} answered {}", url, response.status),
            ));
        }
        self.validate(&response, &format!("GET {}", url));
        XmlNode::parse(&response.body)
    }

    /// Parse a mutation response and compare it with what was sent
    fn accept_entity(
        &self,
        sent: &Entity,
        response: &RestResponse,
        opts: &OpOptions,
    ) -> ApiResult<Outcome> {
        if !response.has_body() {
            return Ok(Outcome::new(None, true));
        }
        let received = codec::parse_entity(&response.body, &self.schema)?;
        if self.compare_enabled(opts) && !art_compare::compare(sent, &received) {
            return Ok(Outcome::failed());
        }
        Ok(Outcome::new(Some(received), true))
    }

    fn try_create(&self, entity: &Entity, positive: bool, opts: &OpOptions) -> ApiResult<Outcome> {
        let session = self.session()?;
        let url = self.collection_url(&session, opts)?;
        let body = codec::to_document(entity, &self.schema);
        let scope = session.correlation_scope(opts.correlation_for("create"));
        info!(
            entity = %entity.describe(),
            url = %url,
            correlation_id = scope.id(),
            "Creating"
        );

        let response = session.post(&url, &base_query(opts), body, &scope, opts.timeout)?;
        let ok = validate_status(
            response.status,
            positive,
            CREATE_OK,
            opts.expected_status.as_deref(),
        );
        if !positive {
            return Ok(Outcome::new(None, ok));
        }
        if !ok {
            error!(url = %url, status = response.status, body = %response.body, "Create rejected");
            return Ok(Outcome::failed());
        }
        self.validate(&response, &format!("POST {}", url));
        self.accept_entity(entity, &response, opts)
    }

    fn try_update(
        &self,
        original: &Entity,
        updated: &Entity,
        positive: bool,
        opts: &OpOptions,
    ) -> ApiResult<Outcome> {
        let session = self.session()?;
        let url = self.entity_url(&session, original)?;
        let body = codec::to_document(updated, &self.schema);
        let scope = session.correlation_scope(opts.correlation_for("update"));
        info!(
            entity = %original.describe(),
            url = %url,
            correlation_id = scope.id(),
            "Updating"
        );

        let response = session.put(&url, &base_query(opts), body, &scope, opts.timeout)?;
        let ok = validate_status(
            response.status,
            positive,
            UPDATE_OK,
            opts.expected_status.as_deref(),
        );
        if !positive {
            return Ok(Outcome::new(None, ok));
        }
        if !ok {
            error!(url = %url, status = response.status, body = %response.body, "Update rejected");
            return Ok(Outcome::failed());
        }
        self.validate(&response, &format!("PUT {}", url));
        self.accept_entity(updated, &response, opts)
    }

    fn try_delete(&self, entity: &Entity, positive: bool, opts: &OpOptions) -> ApiResult<bool> {
        let session = self.session()?;
        let url = self.entity_url(&session, entity)?;
        let body = opts
            .body
            .as_ref()
            .map(|body| codec::to_document(body, &self.schema));
        let scope = session.correlation_scope(opts.correlation_for("delete"));
        info!(
            entity = %entity.describe(),
            url = %url,
            correlation_id = scope.id(),
            "Deleting"
        );

        let response = session.delete(&url, &base_query(opts), body, &scope, opts.timeout)?;
        let ok = validate_status(
            response.status,
            positive,
            DELETE_OK,
            opts.expected_status.as_deref(),
        );
        if !ok {
            error!(url = %url, status = response.status, body = %response.body, "Unexpected delete result");
        }
        Ok(ok)
    }

    fn try_action(
        &self,
        entity: &Entity,
        action: &str,
        positive: bool,
        opts: &OpOptions,
    ) -> ApiResult<bool> {
        let session = self.session()?;
        let url = match entity.link(action) {
            Some(href) => session.resolve(href),
            None => format!("{}/{}", self.entity_url(&session, entity)?, action),
        };
        let mut body = opts.body.clone().unwrap_or_else(|| Entity::new("action"));
        body.set_element_name("action");
        if opts.async_call {
            body.set("async", true);
        }
        let scope = session.correlation_scope(opts.correlation_for(action));
        info!(
            entity = %entity.describe(),
            action,
            correlation_id = scope.id(),
            "Running action"
        );

        let response = session.post(
            &url,
            &base_query(opts),
            codec::to_document(&body, &self.schema),
            &scope,
            opts.timeout,
        )?;
        if let Some(expected) = opts.expected_status.as_deref() {
            return Ok(validate_status(response.status, positive, ACTION_OK, Some(expected)));
        }

        let accepted = ACTION_OK.contains(&response.status)
            && self.action_state_accepted(&response, opts.async_call);
        if !accepted {
            debug!(url = %url, status = response.status, body = %response.body, "Action not accepted");
        }
        Ok(polarity(accepted, positive, action))
    }

    fn action_state_accepted(&self, response: &RestResponse, async_call: bool) -> bool {
        if !response.has_body() {
            return true;
        }
        self.validate(response, "POST action");
        let action = match codec::parse_entity(&response.body, &self.schema) {
            Ok(action) => action,
            Err(e) => {
                warn!(error = %e, "Unreadable action response");
                return false;
            }
        };
        match action.status_name().as_deref() {
            Some("complete") => true,
            Some("pending") | Some("in_progress") if async_call => true,
            Some("failed") => {
                error!(fault = ?action.get_path_string("fault.detail"), "Action failed");
                false
            }
            Some(state) => {
                error!(state, async_call, "Unexpected action state");
                false
            }
            None => {
                warn!("Action response carries no state, assuming complete");
                true
            }
        }
    }
}

/// Extra parameters and `current`, as query parameters
fn base_query(opts: &OpOptions) -> Vec<(String, String)> {
    let mut query = opts.params.clone();
    if let Some(current) = opts.current {
        query.push(("current".to_string(), current.to_string()));
    }
    query
}

fn with_max(mut query: Vec<(String, String)>, opts: &OpOptions) -> Vec<(String, String)> {
    if let Some(max) = opts.max {
        query.push(("max".to_string(), max.to_string()));
    }
    query
}

impl Backend for RestBackend {
    fn kind(&self) -> BackendKind {
        BackendKind::Rest
    }

    fn entity_kind(&self) -> &EntityKind {
        &self.kind
    }

    fn login(&self) -> ApiResult<()> {
        self.session().map(|_| ())
    }

    fn logout(&self) -> ApiResult<bool> {
        let session = match &self.pinned {
            Some(session) => Some(session.clone()),
            None => session::forget::<RestSession>(BackendKind::Rest)?,
        };
        match session {
            Some(session) => match session.close() {
                Ok(()) => Ok(true),
                Err(e) => {
                    warn!(error = %e, "Logout did not complete cleanly");
                    Ok(false)
                }
            },
            None => {
                debug!("No REST session to close");
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
        let target = opts
            .within
            .clone()
            .unwrap_or_else(|| GetTarget::collection(self.kind.collection_name.as_str()));
        let entities = self.get(&target, opts)?.into_list();
        select_unique(entities, value, attribute, &opts.filters)
    }

    fn get(&self, target: &GetTarget, opts: &OpOptions) -> ApiResult<Fetched> {
        let session = self.session()?;
        let url = self.target_url(&session, target)?;
        let root = self.fetch(&url, &with_max(Vec::new(), opts), opts)?;
        if self.schema.is_collection(root.local_name()) {
            let entities = codec::collection_from_xml(&root, &self.schema);
            debug!(url = %url, count = entities.len(), "Fetched collection");
            Ok(Fetched::Many(entities))
        } else {
            Ok(Fetched::One(codec::from_xml(&root, &self.schema)))
        }
    }

    fn query(&self, constraint: &str, opts: &OpOptions) -> ApiResult<Vec<Entity>> {
        let session = self.session()?;
        let url = self.collection_url(&session, opts)?;
        let mut query = vec![("search".to_string(), constraint.to_string())];
        if let Some(case_sensitive) = opts.case_sensitive {
            query.push(("case_sensitive".to_string(), case_sensitive.to_string()));
        }
        let root = self.fetch(&url, &with_max(query, opts), opts)?;
        let entities = codec::collection_from_xml(&root, &self.schema);
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
            (Some(href), _) => self.get(&GetTarget::href(href), &OpOptions::new())?.into_one(),
            (None, Some(name)) => self.find(name, "name", &OpOptions::new()),
            (None, None) => Err(ApiError::EntityNotFound(format!(
                "cannot refresh {} without href or name",
                entity.describe()
            ))),
        }
    }

    fn xpath(&self, href: &str, path: &str) -> ApiResult<Vec<String>> {
        let session = self.session()?;
        let url = session.resolve(href);
        let root = self.fetch(&url, &[], &OpOptions::new())?;
        let values = xpath::evaluate(&root, path)?;
        debug!(url = %url, path, matches = values.len(), "Evaluated xpath");
        Ok(values)
    }
}
