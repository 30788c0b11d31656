//! One invocation: discover → reconcile → select → session.
//!
//! Everything before the session is read-only apart from stale done-record
//! invalidation, so failures there propagate without cleanup.
use crate::config::{CheckRegistry, RunConfig};
use crate::discovery::{discover, validate_filters};
use crate::reconcile::{derive_items, reconcile};
use crate::select::{select, unlock, Mode, Selection, Summary};
use crate::session::{run_session, SessionReport, Viewer};
use anyhow::{anyhow, Context, Result};

/// How a run ended.
#[derive(Debug)]
pub enum Outcome {
    /// Discovery found no artifacts for the query.
    NothingDiscovered,
    /// Artifacts exist but none are eligible for the active mode.
    NothingToDo,
    Summary(Summary),
    Unlocked(usize),
    Reviewed(SessionReport),
}

pub fn run(registry: &CheckRegistry, config: &RunConfig, viewer: &dyn Viewer) -> Result<Outcome> {
    let query = &config.query;
    let def = registry.get(&query.check)?;
    validate_filters(&def.primary, &query.filters)?;
    let base_dir = query
        .base_dir
        .canonicalize()
        .with_context(|| format!("resolve data directory {}", query.base_dir.display()))?;

    tracing::info!(check = %def.name, base_dir = %base_dir.display(), "searching for images");
    let artifacts = discover(&def.primary, &base_dir, &query.filters)?;
    if artifacts.is_empty() {
        return Ok(Outcome::NothingDiscovered);
    }

    tracing::info!(count = artifacts.len(), "validating files");
    let items = if query.mode == Mode::Unlock {
        derive_items(def, &base_dir, &artifacts)?
    } else {
        reconcile(def, &base_dir, &artifacts)?
    };

    match select(items, query.mode, query.batch_size) {
        Selection::NothingToDo => Ok(Outcome::NothingToDo),
        Selection::Summary(summary) => Ok(Outcome::Summary(summary)),
        Selection::Unlock(locked) => Ok(Outcome::Unlocked(unlock(&locked)?)),
        Selection::Batch(batch) => {
            viewer.preflight()?;
            if !config.session.viewer_template_dir.is_dir() {
                return Err(anyhow!(
                    "viewer template directory {} does not exist",
                    config.session.viewer_template_dir.display()
                ));
            }
            tracing::info!(batch = batch.len(), "starting review session");
            let report = run_session(def, &config.session, &batch, viewer)?;
            Ok(Outcome::Reviewed(report))
        }
    }
}
