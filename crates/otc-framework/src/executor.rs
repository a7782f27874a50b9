//! # Lifecycle Executor
//!
//! Wraps the callbacks of a [`ResourceEntry`] with the lifecycle contract. Every operation
//! runs inside an `info` span carrying `resource` and `id`, and every failure is wrapped into
//! an [`OperationError`] (`error creating <resource> <id>: <cause>`).
//!
//! | Operation | Sequence | Recovered locally |
//! |-----------|----------|-------------------|
//! | create | callback → tags (warn on failure) → read | - |
//! | read | callback → tags | gone ⇒ cleared ID, success |
//! | update | callback → tag diff → read | - |
//! | delete | callback | gone ⇒ success |
//! | import | import callback → read | - |
//!
//! ## Partial state
//!
//! An [`Outcome`] always carries the state the engine should persist, even on failure.
//! A create that fails or is cancelled after the callback recorded the ID keeps that ID, so
//! the next plan reads the orphan instead of losing it. A create cancelled before the ID was
//! known leaves an empty state. Nothing is rolled back.

use crate::context::RequestContext;
use crate::diag::{Diagnostic, Diagnostics};
use crate::diff::{plan as plan_instance, Plan};
use crate::error::{OperationError, ProviderError, Verb};
use crate::resource::{DataSourceEntry, ResourceEntry};
use crate::state::{InstanceState, ResourceData};
use crate::value::Value;
use std::collections::BTreeMap;
use tracing::{debug, field, info, info_span, warn, Instrument, Span};

/// Result of a lifecycle operation.
#[derive(Debug)]
pub struct Outcome {
    /// State to persist. An empty ID means the instance does not exist.
    pub state: InstanceState,
    pub warnings: Diagnostics,
    pub error: Option<OperationError>,
}

impl Outcome {
    fn ok(state: InstanceState, warnings: Diagnostics) -> Self {
        Self {
            state,
            warnings,
            error: None,
        }
    }

    fn failed(state: InstanceState, warnings: Diagnostics, error: OperationError) -> Self {
        Self {
            state,
            warnings,
            error: Some(error),
        }
    }

    pub fn is_ok(&self) -> bool {
        self.error.is_none()
    }

    /// Warnings followed by the error, if any.
    pub fn diagnostics(&self) -> Diagnostics {
        let mut diags = self.warnings.clone();
        if let Some(err) = &self.error {
            diags.push(Diagnostic::from_error(err));
        }
        diags
    }

    pub fn into_result(self) -> Result<InstanceState, OperationError> {
        match self.error {
            Some(err) => Err(err),
            None => Ok(self.state),
        }
    }
}

/// Plans a change: generic plan, then the resource's custom-diff hook.
pub fn plan(entry: &ResourceEntry, prior: Option<&InstanceState>, config: &BTreeMap<String, Value>) -> Plan {
    let mut plan = plan_instance(&entry.schema, prior, config);
    if plan.is_valid() {
        if let Err(e) = entry.resource.customize_diff(&mut plan, prior) {
            plan.error(Diagnostic::from_error(&e));
        }
    }
    debug!(resource = entry.name(), action = ?plan.action(), changes = plan.diff.attributes.len(), "Planned");
    plan
}

fn fail(verb: Verb, entry: &ResourceEntry, id: &str, err: ProviderError) -> OperationError {
    warn!(error = %err, "{} failed", verb.progressive());
    OperationError::new(verb, entry.name(), id, err)
}

/// Creates the instance from planned values.
pub async fn create(entry: &ResourceEntry, ctx: &RequestContext, planned: BTreeMap<String, Value>) -> Outcome {
    let span = info_span!("lifecycle", op = "create", resource = entry.name(), id = field::Empty);
    async {
        let mut d = ResourceData::new(entry.schema.clone(), InstanceState::default(), planned)
            .with_timeouts(entry.timeouts);

        if ctx.is_cancelled() {
            let err = fail(Verb::Create, entry, "", ProviderError::Cancelled);
            return Outcome::failed(InstanceState::default(), ctx.take_warnings(), err);
        }

        let result = create_steps(entry, ctx, &mut d).await;
        let id = d.id().to_owned();
        match result {
            Ok(()) if id.is_empty() => {
                // the instance vanished between create and the first read
                let err = ProviderError::fatal("resource disappeared right after creation");
                let err = fail(Verb::Create, entry, &id, err);
                Outcome::failed(InstanceState::default(), ctx.take_warnings(), err)
            }
            Ok(()) => {
                info!("Created");
                Outcome::ok(d.into_state(), ctx.take_warnings())
            }
            Err(e) => {
                let err = fail(Verb::Create, entry, &id, e);
                let state = if id.is_empty() {
                    InstanceState::default()
                } else {
                    d.into_state()
                };
                Outcome::failed(state, ctx.take_warnings(), err)
            }
        }
    }
    .instrument(span)
    .await
}

async fn create_steps(entry: &ResourceEntry, ctx: &RequestContext, d: &mut ResourceData) -> Result<(), ProviderError> {
    entry.resource.create(ctx, d).await?;
    Span::current().record("id", d.id());
    if let Some(tags) = entry.resource.tags() {
        tags.on_create(ctx, d).await?;
    }
    read_steps(entry, ctx, d).await
}

/// Callback then tags; a gone instance ends with a cleared ID.
async fn read_steps(entry: &ResourceEntry, ctx: &RequestContext, d: &mut ResourceData) -> Result<(), ProviderError> {
    let result: Result<(), ProviderError> = async {
        entry.resource.read(ctx, d).await?;
        if d.id().is_empty() {
            return Ok(());
        }
        if let Some(tags) = entry.resource.tags() {
            tags.on_read(ctx, d).await?;
        }
        Ok(())
    }
    .await;

    match result {
        Err(e) if e.is_gone() => {
            info!(id = d.id(), "Resource gone, removing from state");
            d.clear_id();
            Ok(())
        }
        other => other,
    }
}

/// Refreshes an instance from the cloud.
pub async fn read(entry: &ResourceEntry, ctx: &RequestContext, prior: InstanceState) -> Outcome {
    let span = info_span!("lifecycle", op = "read", resource = entry.name(), id = %prior.id);
    async {
        let fallback = prior.clone();
        let mut d = ResourceData::from_state(entry.schema.clone(), prior).with_timeouts(entry.timeouts);
        let id = d.id().to_owned();
        match read_steps(entry, ctx, &mut d).await {
            Ok(()) if d.id().is_empty() => Outcome::ok(InstanceState::default(), ctx.take_warnings()),
            Ok(()) => Outcome::ok(d.into_state(), ctx.take_warnings()),
            Err(e) => {
                let err = fail(Verb::Read, entry, &id, e);
                Outcome::failed(fallback, ctx.take_warnings(), err)
            }
        }
    }
    .instrument(span)
    .await
}

/// Applies an in-place update from `prior` to `planned`.
pub async fn update(
    entry: &ResourceEntry,
    ctx: &RequestContext,
    prior: InstanceState,
    planned: BTreeMap<String, Value>,
) -> Outcome {
    let span = info_span!("lifecycle", op = "update", resource = entry.name(), id = %prior.id);
    async {
        let fallback = prior.clone();
        let mut d = ResourceData::new(entry.schema.clone(), prior, planned).with_timeouts(entry.timeouts);
        let id = d.id().to_owned();

        let result: Result<(), ProviderError> = async {
            entry.resource.update(ctx, &mut d).await?;
            if let Some(tags) = entry.resource.tags() {
                tags.on_update(ctx, &d).await?;
            }
            read_steps(entry, ctx, &mut d).await
        }
        .await;

        match result {
            Ok(()) if d.id().is_empty() => Outcome::ok(InstanceState::default(), ctx.take_warnings()),
            Ok(()) => {
                info!("Updated");
                Outcome::ok(d.into_state(), ctx.take_warnings())
            }
            Err(e) => {
                let err = fail(Verb::Update, entry, &id, e);
                Outcome::failed(fallback, ctx.take_warnings(), err)
            }
        }
    }
    .instrument(span)
    .await
}

/// Deletes an instance. An instance that is already gone counts as deleted.
pub async fn delete(entry: &ResourceEntry, ctx: &RequestContext, prior: InstanceState) -> Outcome {
    let span = info_span!("lifecycle", op = "delete", resource = entry.name(), id = %prior.id);
    async {
        let fallback = prior.clone();
        let mut d = ResourceData::from_state(entry.schema.clone(), prior).with_timeouts(entry.timeouts);
        let id = d.id().to_owned();
        match entry.resource.delete(ctx, &mut d).await {
            Ok(()) => {
                info!("Deleted");
                Outcome::ok(InstanceState::default(), ctx.take_warnings())
            }
            Err(e) if e.is_gone() => {
                info!("Already gone");
                Outcome::ok(InstanceState::default(), ctx.take_warnings())
            }
            Err(e) => {
                let err = fail(Verb::Delete, entry, &id, e);
                Outcome::failed(fallback, ctx.take_warnings(), err)
            }
        }
    }
    .instrument(span)
    .await
}

/// Imports an existing instance by its import string.
pub async fn import(entry: &ResourceEntry, ctx: &RequestContext, import_id: &str) -> Outcome {
    let span = info_span!("lifecycle", op = "import", resource = entry.name(), id = %import_id);
    async {
        let mut d = ResourceData::for_import(entry.schema.clone(), "").with_timeouts(entry.timeouts);
        let result: Result<(), ProviderError> = async {
            entry.resource.import(ctx, &mut d, import_id).await?;
            read_steps(entry, ctx, &mut d).await?;
            if d.id().is_empty() {
                return Err(ProviderError::Import {
                    id: import_id.to_owned(),
                    reason: "cannot import non-existent remote object".to_owned(),
                });
            }
            Ok(())
        }
        .await;

        match result {
            Ok(()) => {
                info!(id = d.id(), "Imported");
                Outcome::ok(d.into_state(), ctx.take_warnings())
            }
            Err(e) => {
                let err = fail(Verb::Import, entry, import_id, e);
                Outcome::failed(InstanceState::default(), ctx.take_warnings(), err)
            }
        }
    }
    .instrument(span)
    .await
}

/// Reads a data source. The config must already be validated.
pub async fn read_data_source(
    entry: &DataSourceEntry,
    ctx: &RequestContext,
    config: BTreeMap<String, Value>,
) -> Result<(InstanceState, Diagnostics), OperationError> {
    let span = info_span!("data_source", resource = entry.name());
    async {
        let mut d = ResourceData::from_config(entry.schema.clone(), config);
        match entry.source.read(ctx, &mut d).await {
            Ok(()) => Ok((d.into_state(), ctx.take_warnings())),
            Err(e) => {
                warn!(error = %e, "reading failed");
                Err(OperationError::new(Verb::Read, entry.name(), "", e))
            }
        }
    }
    .instrument(span)
    .await
}
