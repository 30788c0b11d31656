//! Per-item state reconciliation.
//!
//! Items are rebuilt from the filesystem on every run. The only write this
//! stage performs is deleting a done-record that predates its artifact.
use crate::config::{CheckDefinition, DATA_DIR_FIELD};
use crate::record::{modified_at, read_done};
use crate::template::{TemplateMatcher, Variables};
use anyhow::{Context, Result};
use chrono::{DateTime, Local};
use std::fs;
use std::path::{Path, PathBuf};

/// One discovered artifact and everything derived from it.
#[derive(Debug, Clone)]
pub struct Item {
    /// Absolute primary artifact path; the item's identity.
    pub artifact: PathBuf,
    pub variables: Variables,
    pub overlay: PathBuf,
    pub output_dir: PathBuf,
    pub lock_file: PathBuf,
    pub done_file: PathBuf,
    pub overlay_exists: bool,
    pub is_locked: bool,
    pub is_done: bool,
    pub rating: Option<f64>,
    pub flagged: Option<bool>,
    pub done_at: Option<DateTime<Local>>,
    /// Modification time of what the reviewer saw: the overlay, or the
    /// primary artifact when the overlay is missing.
    pub artifact_modified_at: Option<DateTime<Local>>,
}

impl Item {
    /// Name the viewer reports verdicts under.
    pub fn basename(&self) -> String {
        self.artifact
            .file_name()
            .map(|name| name.to_string_lossy().to_string())
            .unwrap_or_default()
    }

    pub fn is_failed(&self) -> bool {
        self.rating == Some(0.0)
    }

    pub fn is_flagged(&self) -> bool {
        self.flagged == Some(true)
    }

    fn clear_verdict(&mut self) {
        self.is_done = false;
        self.rating = None;
        self.flagged = None;
        self.done_at = None;
    }
}

/// Derive paths and presence flags for each artifact without reading any
/// record contents.
pub fn derive_items(
    def: &CheckDefinition,
    base_dir: &Path,
    artifacts: &[PathBuf],
) -> Result<Vec<Item>> {
    let mut fixed = Variables::new();
    fixed.insert(
        DATA_DIR_FIELD.to_string(),
        base_dir.to_string_lossy().to_string(),
    );
    let matcher = def.primary.matcher(&fixed)?;
    artifacts
        .iter()
        .map(|artifact| derive_item(def, &matcher, artifact))
        .collect()
}

fn derive_item(def: &CheckDefinition, matcher: &TemplateMatcher, artifact: &Path) -> Result<Item> {
    let variables = matcher.bind(artifact)?;
    let overlay = absolutize(Path::new(&def.overlay.expand(&variables)?))?;
    let output_dir = absolutize(Path::new(&def.output_dir.expand(&variables)?))?;
    let done_file = output_dir.join(def.done_file_name());
    let lock_file = output_dir.join(def.lock_file_name());
    Ok(Item {
        artifact: absolutize(artifact)?,
        overlay_exists: overlay.is_file(),
        is_done: done_file.is_file(),
        is_locked: lock_file.is_file(),
        variables,
        overlay,
        output_dir,
        lock_file,
        done_file,
        rating: None,
        flagged: None,
        done_at: None,
        artifact_modified_at: None,
    })
}

/// Derive items, load prior verdicts, and invalidate stale done-records.
///
/// A done-record strictly older than the overlay it reviewed is deleted and
/// the item reverts to not-done, so a regenerated overlay is re-reviewed.
pub fn reconcile(def: &CheckDefinition, base_dir: &Path, artifacts: &[PathBuf]) -> Result<Vec<Item>> {
    let mut items = derive_items(def, base_dir, artifacts)?;
    for item in &mut items {
        let reviewed = if item.overlay_exists {
            &item.overlay
        } else {
            &item.artifact
        };
        item.artifact_modified_at = Some(modified_at(reviewed)?);
        if !item.is_done {
            continue;
        }
        let prior = read_done(&item.done_file)?;
        item.rating = prior.rating;
        item.flagged = prior.flagged;
        item.done_at = Some(modified_at(&item.done_file)?);

        if item.done_at < item.artifact_modified_at {
            tracing::info!(
                done_file = %item.done_file.display(),
                overlay = %item.overlay.display(),
                "done-record predates overlay; invalidating"
            );
            fs::remove_file(&item.done_file)
                .with_context(|| format!("remove stale {}", item.done_file.display()))?;
            item.clear_verdict();
        }
    }
    for item in items.iter().filter(|item| !item.overlay_exists) {
        tracing::warn!(overlay = %item.overlay.display(), "overlay missing");
    }
    Ok(items)
}

fn absolutize(path: &Path) -> Result<PathBuf> {
    if path.is_absolute() {
        return Ok(path.to_path_buf());
    }
    let cwd = std::env::current_dir().context("resolve current directory")?;
    Ok(cwd.join(path))
}

#[cfg(test)]
#[path = "reconcile_tests.rs"]
mod tests;
