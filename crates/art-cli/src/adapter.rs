//! CLI implementation of the backend contract

use crate::command::CliCommand;
use crate::parse::parse_entities;
use crate::session::CliSession;
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

/// Shell type names drop the underscores of element names ("storage_domain" -> "storagedomain")
pub fn shell_type(element: &str) -> String {
    element.replace('_', "")
}

/// Adapter for one entity type over the interactive shell
pub struct CliBackend {
    kind: EntityKind,
    schema: Arc<Schema>,
    options: Arc<RunOptions>,
    /// Session used instead of the process-wide cache, when set
    pinned: Option<Arc<CliSession>>,
}

impl CliBackend {
    pub fn new(kind: EntityKind, options: Arc<RunOptions>, schema: Arc<Schema>) -> Self {
        Self {
            kind,
            schema,
            options,
            pinned: None,
        }
    }

    /// Adapter bound to an already logged-in shell
    pub fn with_session(
        kind: EntityKind,
        options: Arc<RunOptions>,
        schema: Arc<Schema>,
        session: Arc<CliSession>,
    ) -> Self {
        Self {
            kind,
            schema,
            options,
            pinned: Some(session),
        }
    }

    fn session(&self) -> ApiResult<Arc<CliSession>> {
        match &self.pinned {
            Some(session) => Ok(session.clone()),
            None => {
                let open = || CliSession::open(&self.options);
                let shared = session::get_or_login(BackendKind::Cli, open)?;
                if !shared.is_broken() {
                    return Ok(shared);
                }
                warn!("Replacing a shell that lost its prompt");
                session::forget::<CliSession>(BackendKind::Cli)?;
                session::get_or_login(BackendKind::Cli, open)
            }
        }
    }

    fn element(&self) -> &str {
        &self.kind.element_name
    }

    fn compare_enabled(&self, opts: &OpOptions) -> bool {
        opts.compare.unwrap_or(self.options.validation.compare)
    }

    /// Identifier the shell accepts for `entity`: its id, else its name
    fn identifier(entity: &Entity) -> ApiResult<String> {
        entity
            .id()
            .or_else(|| entity.name())
            .map(str::to_string)
            .ok_or_else(|| {
                ApiError::EntityNotFound(format!("{} has no id or name", entity.describe()))
            })
    }

    fn with_common_flags(command: CliCommand, opts: &OpOptions, operation: &str) -> CliCommand {
        let mut command = command
            .params(&opts.params)
            .flag("correlation_id", opts.correlation_for(operation))
            .deadline(opts.timeout);
        if opts.async_call {
            command = command.flag("async", "true");
        }
        if let Some(current) = opts.current {
            command = command.flag("current", current.to_string());
        }
        command
    }

    /// First entity printed by a mutation, if any
    fn parsed(&self, output: &str) -> Option<Entity> {
        parse_entities(output, self.element(), &self.schema)
            .into_iter()
            .next()
    }

    fn accept_entity(&self, sent: &Entity, output: &str, opts: &OpOptions) -> Outcome {
        match self.parsed(output) {
            Some(received) if received.id().is_some() => {
                if self.compare_enabled(opts) && !art_compare::compare(sent, &received) {
                    return Outcome::failed();
                }
                Outcome::new(Some(received), true)
            }
            _ => {
                error!(entity = %sent.describe(), output, "Shell printed no entity");
                Outcome::failed()
            }
        }
    }

    fn try_create(&self, entity: &Entity, positive: bool, opts: &OpOptions) -> ApiResult<Outcome> {
        let session = self.session()?;
        let command = Self::with_common_flags(
            CliCommand::new("add", shell_type(self.element())).entity_flags(entity),
            opts,
            "create",
        );
        info!(entity = %entity.describe(), command = %command, "Creating");

        let output = session.run(command)?;
        if !positive {
            // a command the shell accepted created the entity, printed or not
            return Ok(Outcome::new(self.parsed(&output), polarity(true, positive, "create")));
        }
        Ok(self.accept_entity(entity, &output, opts))
    }

    fn try_update(
        &self,
        original: &Entity,
        updated: &Entity,
        positive: bool,
        opts: &OpOptions,
    ) -> ApiResult<Outcome> {
        let session = self.session()?;
        let command = Self::with_common_flags(
            CliCommand::new("update", shell_type(self.element()))
                .identifier(Self::identifier(original)?)
                .entity_flags(updated),
            opts,
            "update",
        );
        info!(entity = %original.describe(), command = %command, "Updating");

        let output = session.run(command)?;
        if !positive {
            return Ok(Outcome::new(None, polarity(true, positive, "update")));
        }
        Ok(self.accept_entity(updated, &output, opts))
    }

    fn try_delete(&self, entity: &Entity, positive: bool, opts: &OpOptions) -> ApiResult<bool> {
        let session = self.session()?;
        let mut command = CliCommand::new("remove", shell_type(self.element()))
            .identifier(Self::identifier(entity)?);
        if let Some(body) = &opts.body {
            command = command.entity_flags(body);
        }
        let command = Self::with_common_flags(command, opts, "delete");
        info!(entity = %entity.describe(), command = %command, "Deleting");

        session.run(command)?;
        Ok(polarity(true, positive, "delete"))
    }

    fn try_action(
        &self,
        entity: &Entity,
        action: &str,
        positive: bool,
        opts: &OpOptions,
    ) -> ApiResult<bool> {
        let session = self.session()?;
        let mut command = CliCommand::new("action", shell_type(self.element()))
            .identifier(Self::identifier(entity)?)
            .action(action);
        if let Some(body) = &opts.body {
            command = command.entity_flags(body);
        }
        let command = Self::with_common_flags(command, opts, action);
        info!(entity = %entity.describe(), action, command = %command, "Running action");

        let output = session.run(command)?;
        let accepted = match parse_entities(&output, "action", &self.schema)
            .first()
            .and_then(Entity::status_name)
        {
            Some(state) if state == "failed" => {
                error!(action, output = %output, "Action failed");
                false
            }
            Some(state) => {
                debug!(action, state = %state, "Action answered");
                true
            }
            None => true,
        };
        Ok(polarity(accepted, positive, action))
    }

    fn list(&self, command: CliCommand, element: &str) -> ApiResult<Vec<Entity>> {
        let session = self.session()?;
        let output = session.run(command)?;
        Ok(parse_entities(&output, element, &self.schema))
    }

    /// `show` command for an href: the last segment pair names the entity,
    /// earlier pairs become parent identifiers
    fn show_href(&self, href: &str) -> ApiResult<(CliCommand, String)> {
        let path = href.split('?').next().unwrap_or(href);
        let segments: Vec<&str> = path
            .split('/')
            .filter(|s| !s.is_empty())
            .skip_while(|s| !self.schema.is_collection(s))
            .collect();
        if segments.len() < 2 || segments.len() % 2 != 0 {
            return Err(ApiError::EntityNotFound(format!(
                "cannot map '{}' to a shell command",
                href
            )));
        }

        let pairs: Vec<(&str, &str)> = segments.chunks(2).map(|c| (c[0], c[1])).collect();
        let item = |collection: &str| {
            self.schema
                .collection_item(collection)
                .map(str::to_string)
                .ok_or_else(|| ApiError::UnknownEntityType {
                    element: collection.to_string(),
                    collection: collection.to_string(),
                })
        };

        let (collection, id) = pairs[pairs.len() - 1];
        let element = item(collection)?;
        let mut command = CliCommand::new("show", shell_type(&element)).identifier(id);
        for (parent, parent_id) in &pairs[..pairs.len() - 1] {
            let parent = item(parent)?;
            command = command.flag(format!("{}-identifier", shell_type(&parent)), *parent_id);
        }
        Ok((command, element))
    }

    fn list_command(&self, collection: &str, opts: &OpOptions) -> CliCommand {
        let mut command = CliCommand::new("list", shell_type(collection))
            .params(&opts.params)
            .deadline(opts.timeout);
        if let Some(max) = opts.max {
            command = command.flag("max", max.to_string());
        }
        command
    }

    /// `list` scoped by `within`, when it names an entity's relation
    fn scoped_list(&self, verb_flags: CliCommand, opts: &OpOptions) -> ApiResult<CliCommand> {
        match &opts.within {
            Some(GetTarget::Link { entity, .. }) => Ok(verb_flags.flag(
                format!("{}-identifier", shell_type(entity.element_name())),
                Self::identifier(entity)?,
            )),
            Some(other) => {
                warn!(target = ?other, "Shell lists cannot be scoped by this target, ignoring");
                Ok(verb_flags)
            }
            None => Ok(verb_flags),
        }
    }
}

impl Backend for CliBackend {
    fn kind(&self) -> BackendKind {
        BackendKind::Cli
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
            None => session::forget::<CliSession>(BackendKind::Cli)?,
        };
        match session {
            Some(session) => match session.close() {
                Ok(()) => Ok(true),
                Err(e) => {
                    warn!(error = %e, "Shell did not exit cleanly");
                    Ok(false)
                }
            },
            None => {
                debug!("No shell session to close");
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
        match target {
            GetTarget::Collection(collection) => {
                let element = self
                    .schema
                    .collection_item(collection)
                    .unwrap_or(self.element())
                    .to_string();
                let command = self.list_command(collection, opts).switch("show-all");
                let entities = self.list(command, &element)?;
                debug!(collection, count = entities.len(), "Listed collection");
                Ok(Fetched::Many(entities))
            }
            GetTarget::Href(href) => {
                let (command, element) = self.show_href(href)?;
                self.list(command.deadline(opts.timeout), &element)?
                    .into_iter()
                    .next()
                    .map(Fetched::One)
                    .ok_or_else(|| ApiError::EntityNotFound(href.clone()))
            }
            GetTarget::Link { entity, rel } => {
                let element = self.schema.collection_item(rel).unwrap_or(rel).to_string();
                let command = self
                    .list_command(rel, opts)
                    .switch("show-all")
                    .flag(
                        format!("{}-identifier", shell_type(entity.element_name())),
                        Self::identifier(entity)?,
                    );
                let entities = self.list(command, &element)?;
                debug!(entity = %entity.describe(), rel, count = entities.len(), "Listed relation");
                Ok(Fetched::Many(entities))
            }
        }
    }

    fn query(&self, constraint: &str, opts: &OpOptions) -> ApiResult<Vec<Entity>> {
        let mut command = self
            .list_command(&self.kind.collection_name, opts)
            .flag("query", constraint);
        if let Some(case_sensitive) = opts.case_sensitive {
            command = command.flag("case_sensitive", case_sensitive.to_string());
        }
        let command = self.scoped_list(command, opts)?;
        let entities = self.list(command, self.element())?;
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
        let command = CliCommand::new("show", shell_type(self.element()))
            .identifier(Self::identifier(entity)?);
        self.list(command, self.element())?
            .into_iter()
            .next()
            .ok_or_else(|| ApiError::EntityNotFound(entity.describe()))
    }
}
