//! Per-source run orchestration.
//!
//! Drives one schedule source through the run state machine:
//! Fetching -> Interpreting -> Normalizing -> Diffing -> Dispatching ->
//! Committed | Failed. Prior state is only touched at the commit step, so an
//! abort between stages never persists anything.

use std::collections::BTreeMap;
use std::path::Path;

use log::{debug, info, warn};
use serde::{Deserialize, Serialize};

use crate::config::EngineConfig;
use crate::diagnostics::Diagnostic;
use crate::diff::{self, SyncOperation};
use crate::dispatch::{DispatchBatch, Dispatcher, RowSource};
use crate::error::GridCalResult;
use crate::event::CanonicalEvent;
use crate::identity::EventIdentity;
use crate::interpret::interpret;
use crate::normalize::normalize;
use crate::state::PriorState;

/// Terminal phase of a run (the intermediate phases only show up in logs).
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum RunPhase {
    Committed,
    Failed,
}

/// What one run did, for the operator.
#[derive(Debug)]
pub struct RunReport {
    pub source: String,
    pub phase: RunPhase,
    /// Source token matched the prior commit; nothing was parsed.
    pub skipped: bool,
    pub created: usize,
    pub updated: usize,
    pub deleted: usize,
    pub rejected: Vec<(EventIdentity, String)>,
    pub diagnostics: Vec<Diagnostic>,
}

impl RunReport {
    fn skipped(source: String) -> Self {
        RunReport {
            source,
            phase: RunPhase::Committed,
            skipped: true,
            created: 0,
            updated: 0,
            deleted: 0,
            rejected: Vec::new(),
            diagnostics: Vec::new(),
        }
    }
}

/// Everything the pure stages produce for one source.
#[derive(Debug)]
pub struct ParseOutcome {
    pub events: BTreeMap<EventIdentity, CanonicalEvent>,
    pub diagnostics: Vec<Diagnostic>,
    /// Combined last-modified token of the fetched sheets, when they all
    /// carry one.
    pub source_token: Option<String>,
}

/// Fetch, interpret and normalize one source. Used directly by `check` and
/// `status`, and as the front half of [`run_source`].
pub async fn parse_source(
    source: &impl RowSource,
    config: &EngineConfig,
) -> GridCalResult<ParseOutcome> {
    debug!("[{}] fetching rows", source.name());
    let grids = source.fetch().await?;
    let source_token = combined_token(&grids.iter().map(|g| g.meta.clone()).collect::<Vec<_>>());

    debug!("[{}] interpreting {} sheet(s)", source.name(), grids.len());
    let mut fragments = Vec::new();
    let mut diagnostics = Vec::new();
    for grid in &grids {
        let mut interpretation = interpret(grid, config.window, &config.precedence);
        fragments.append(&mut interpretation.fragments);
        diagnostics.append(&mut interpretation.diagnostics);
    }

    debug!("[{}] normalizing {} fragment(s)", source.name(), fragments.len());
    let mut normalized = normalize(fragments, config.window);
    diagnostics.append(&mut normalized.diagnostics);

    let (events, mut collisions) = diff::index_by_identity(normalized.events);
    diagnostics.append(&mut collisions);

    for diagnostic in &diagnostics {
        warn!("[{}] {}", source.name(), diagnostic);
    }

    Ok(ParseOutcome {
        events,
        diagnostics,
        source_token,
    })
}

/// Run the full pipeline for one source and commit the result.
///
/// Commit rule: only acknowledged-as-applied operations are folded into the
/// prior snapshot. A partial dispatch therefore persists old state plus the
/// applied subset, and the retry recomputes exactly the remainder.
pub async fn run_source(
    source: &impl RowSource,
    dispatcher: &impl Dispatcher,
    config: &EngineConfig,
    state_path: &Path,
    force: bool,
) -> GridCalResult<RunReport> {
    let prior = PriorState::load(state_path)?;

    let outcome = parse_source(source, config).await?;

    if !force
        && outcome.source_token.is_some()
        && outcome.source_token == prior.source_token
    {
        info!("[{}] source unchanged, skipping", source.name());
        return Ok(RunReport::skipped(source.name().to_string()));
    }

    debug!("[{}] diffing against {} prior event(s)", source.name(), prior.len());
    let operations = diff::compute(&outcome.events, &prior);

    if operations.is_empty() {
        info!("[{}] nothing to sync", source.name());
        // Record the fresh token so the next run can short-circuit.
        if prior.source_token != outcome.source_token {
            let mut next = prior;
            next.source_token = outcome.source_token;
            next.save(state_path)?;
        }
        return Ok(RunReport {
            source: source.name().to_string(),
            phase: RunPhase::Committed,
            skipped: false,
            created: 0,
            updated: 0,
            deleted: 0,
            rejected: Vec::new(),
            diagnostics: outcome.diagnostics,
        });
    }

    let batch = DispatchBatch::new(operations);
    info!(
        "[{}] dispatching {} operation(s), token {}",
        source.name(),
        batch.operations.len(),
        batch.token
    );
    let acks = dispatcher.dispatch(&batch).await?;

    // Commit: fold in exactly the applied subset.
    let mut next = prior;
    let mut rejected = Vec::new();
    let (mut created, mut updated, mut deleted) = (0, 0, 0);
    for operation in &batch.operations {
        let ack = acks.iter().find(|a| a.identity == *operation.identity());
        match ack {
            Some(ack) if ack.is_applied() => {
                next.apply(operation);
                match operation {
                    SyncOperation::Create { .. } => created += 1,
                    SyncOperation::Update { .. } => updated += 1,
                    SyncOperation::Delete { .. } => deleted += 1,
                }
            }
            Some(ack) => {
                let reason = match &ack.status {
                    crate::dispatch::AckStatus::Rejected { reason } => reason.clone(),
                    crate::dispatch::AckStatus::Applied => unreachable!(),
                };
                rejected.push((operation.identity().clone(), reason));
            }
            None => rejected.push((
                operation.identity().clone(),
                "no acknowledgment received".to_string(),
            )),
        }
    }

    let phase = if rejected.is_empty() {
        // Everything applied; record the token for short-circuiting.
        next.source_token = outcome.source_token;
        RunPhase::Committed
    } else {
        // Keep the stale token so the retry re-parses the source.
        RunPhase::Failed
    };
    next.save(state_path)?;

    for (identity, reason) in &rejected {
        warn!("[{}] {} rejected: {}", source.name(), identity, reason);
    }

    Ok(RunReport {
        source: source.name().to_string(),
        phase,
        skipped: false,
        created,
        updated,
        deleted,
        rejected,
        diagnostics: outcome.diagnostics,
    })
}

/// One token for the whole source: every sheet must carry one, otherwise
/// change detection is off for this source.
fn combined_token(metas: &[crate::grid::SheetMeta]) -> Option<String> {
    if metas.is_empty() || metas.iter().any(|m| m.last_modified.is_none()) {
        return None;
    }
    Some(
        metas
            .iter()
            .filter_map(|m| m.last_modified.as_deref())
            .collect::<Vec<_>>()
            .join("|"),
    )
}
