//! Transactional review session for one batch.
//!
//! A session claims every item in the batch, prepares a working area for the
//! viewer, waits for the viewer, persists the verdicts, then releases its
//! claims. If any step fails (or the session is dropped mid-flight) every
//! lock it created, its working area, and the verdict table are removed
//! before the triggering error is returned. Done-records already written are
//! kept.
mod verdict;
mod viewer;
mod workarea;

pub use verdict::{join_verdicts, read_verdicts, verdict_path, VerdictRow};
pub use viewer::{BrowserViewer, Viewer};
pub use workarea::{WorkArea, ENV_FILE, INDEX_FILE, MANIFEST_FILE, METADATA_FILE};

use crate::config::{CheckDefinition, SessionSettings};
use crate::error::QcError;
use crate::reconcile::Item;
use crate::record::{modified_at, write_done, write_lock, CompletedResult};
use anyhow::{Context, Result};
use chrono::{DateTime, Local};
use std::fmt;
use std::fs;
use std::path::{Path, PathBuf};

/// Lifecycle of a session; `RolledBack` is terminal on failure.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum SessionState {
    Idle,
    Locked,
    Prepared,
    Launched,
    Collected,
    Persisted,
    Released,
    RolledBack,
}

impl fmt::Display for SessionState {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        let name = match self {
            SessionState::Idle => "idle",
            SessionState::Locked => "locked",
            SessionState::Prepared => "prepared",
            SessionState::Launched => "launched",
            SessionState::Collected => "collected",
            SessionState::Persisted => "persisted",
            SessionState::Released => "released",
            SessionState::RolledBack => "rolled back",
        };
        f.write_str(name)
    }
}

/// Outcome of a released session.
#[derive(Debug, Clone)]
pub struct SessionReport {
    pub work_area: String,
    pub verdict_timestamp: DateTime<Local>,
    /// Done-records written, in manifest order.
    pub saved: Vec<PathBuf>,
    /// Batch items released without a verdict.
    pub unreviewed: usize,
}

/// Run one batch through the full session lifecycle.
pub fn run_session(
    def: &CheckDefinition,
    settings: &SessionSettings,
    batch: &[Item],
    viewer: &dyn Viewer,
) -> Result<SessionReport> {
    let mut session = Session::new(def, settings);
    match session.run(batch, viewer) {
        Ok(report) => Ok(report),
        Err(err) => {
            let reached = session.state();
            session.roll_back();
            tracing::warn!(state = %reached, error = %err, "session rolled back");
            Err(err.context(format!("{} session rolled back from {reached}", def.name)))
        }
    }
}

/// Owns everything a session has created so it can be undone.
///
/// Dropping a session that has neither released nor rolled back rolls it
/// back.
pub struct Session<'a> {
    def: &'a CheckDefinition,
    settings: &'a SessionSettings,
    state: SessionState,
    locks: Vec<PathBuf>,
    work_area: Option<WorkArea>,
    verdict: Option<PathBuf>,
}

impl<'a> Session<'a> {
    pub fn new(def: &'a CheckDefinition, settings: &'a SessionSettings) -> Self {
        Self {
            def,
            settings,
            state: SessionState::Idle,
            locks: Vec::new(),
            work_area: None,
            verdict: None,
        }
    }

    pub fn state(&self) -> SessionState {
        self.state
    }

    pub fn run(&mut self, batch: &[Item], viewer: &dyn Viewer) -> Result<SessionReport> {
        let now = Local::now();
        self.acquire(batch, now)?;
        self.prepare(batch, now)?;
        self.launch(viewer)?;
        let (verdicts, timestamp) = self.collect(batch)?;
        let saved = self.persist(&verdicts, timestamp)?;
        let unreviewed = batch.len() - verdicts.len();
        let work_area = self
            .work_area
            .as_ref()
            .map(|area| area.name().to_string())
            .unwrap_or_default();
        self.release()?;
        Ok(SessionReport {
            work_area,
            verdict_timestamp: timestamp,
            saved,
            unreviewed,
        })
    }

    /// Idle → Locked: create output directories, then one lock per item.
    fn acquire(&mut self, batch: &[Item], now: DateTime<Local>) -> Result<()> {
        for item in batch {
            fs::create_dir_all(&item.output_dir).map_err(|source| QcError::PartialLock {
                path: item.output_dir.clone(),
                source,
            })?;
        }
        for item in batch {
            write_lock(&item.lock_file, &self.settings.user, now).map_err(|source| {
                QcError::PartialLock {
                    path: item.lock_file.clone(),
                    source,
                }
            })?;
            self.locks.push(item.lock_file.clone());
        }
        tracing::info!(locks = self.locks.len(), "batch locked");
        self.state = SessionState::Locked;
        Ok(())
    }

    /// Locked → Prepared: working area, assets, descriptor, manifest, metadata.
    fn prepare(&mut self, batch: &[Item], now: DateTime<Local>) -> Result<()> {
        let name = WorkArea::name_for(&self.settings.user, now);
        let area = WorkArea::create(&self.settings.work_root, &name)?;
        let area = self.work_area.insert(area);
        self.verdict = Some(verdict_path(&self.settings.downloads_dir, area.name()));

        let copied = area.copy_assets(&self.settings.viewer_template_dir)?;
        area.write_env(&self.settings.user, &self.def.name)?;
        area.write_manifest(batch)?;
        area.write_metadata(self.def, batch)?;
        tracing::info!(work_area = %area.root().display(), assets = copied, "viewer prepared");
        self.state = SessionState::Prepared;
        Ok(())
    }

    /// Prepared → Launched: blocks until the viewer exits.
    fn launch(&mut self, viewer: &dyn Viewer) -> Result<()> {
        let index = self
            .work_area
            .as_ref()
            .map(WorkArea::index_path)
            .context("work area not prepared")?;
        self.state = SessionState::Launched;
        viewer.launch(&index)
    }

    /// Launched → Collected: the verdict table must exist once the viewer is
    /// gone.
    fn collect<'b>(
        &mut self,
        batch: &'b [Item],
    ) -> Result<(Vec<(&'b Item, VerdictRow)>, DateTime<Local>)> {
        let path = self.verdict.clone().context("verdict path not set")?;
        if !path.is_file() {
            return Err(QcError::ViewerAborted { path }.into());
        }
        let timestamp = modified_at(&path)?;
        let rows = read_verdicts(&path)?;
        let joined = join_verdicts(&path, &self.def.name, batch, rows)?;
        tracing::info!(verdicts = joined.len(), batch = batch.len(), "verdicts collected");
        self.state = SessionState::Collected;
        Ok((joined, timestamp))
    }

    /// Collected → Persisted: one done-record per joined verdict.
    fn persist(
        &mut self,
        verdicts: &[(&Item, VerdictRow)],
        timestamp: DateTime<Local>,
    ) -> Result<Vec<PathBuf>> {
        let mut saved = Vec::with_capacity(verdicts.len());
        for (item, row) in verdicts {
            let result = CompletedResult {
                rating: row.rating,
                flagged: row.flagged,
                user: row.user.clone(),
                timestamp,
            };
            write_done(&item.done_file, &result)?;
            tracing::info!(done_file = %item.done_file.display(), "saved");
            saved.push(item.done_file.clone());
        }
        self.state = SessionState::Persisted;
        Ok(saved)
    }

    /// Persisted → Released: drop claims and scratch state.
    fn release(&mut self) -> Result<()> {
        while let Some(lock) = self.locks.last() {
            fs::remove_file(lock).with_context(|| format!("remove {}", lock.display()))?;
            self.locks.pop();
        }
        if let Some(area) = &self.work_area {
            fs::remove_dir_all(area.root())
                .with_context(|| format!("remove {}", area.root().display()))?;
            self.work_area = None;
        }
        if let Some(path) = &self.verdict {
            fs::remove_file(path).with_context(|| format!("remove {}", path.display()))?;
            self.verdict = None;
        }
        self.state = SessionState::Released;
        tracing::info!("batch completed");
        Ok(())
    }

    /// Best-effort undo of everything this session created. Individual
    /// removal failures are logged and skipped.
    pub fn roll_back(&mut self) {
        for lock in self.locks.drain(..) {
            remove_quietly(&lock, false);
        }
        if let Some(area) = self.work_area.take() {
            remove_quietly(area.root(), true);
        }
        if let Some(path) = self.verdict.take() {
            remove_quietly(&path, false);
        }
        self.state = SessionState::RolledBack;
    }
}

impl Drop for Session<'_> {
    fn drop(&mut self) {
        if !matches!(
            self.state,
            SessionState::Released | SessionState::RolledBack
        ) {
            self.roll_back();
        }
    }
}

fn remove_quietly(path: &Path, dir: bool) {
    if !path.exists() {
        return;
    }
    let result = if dir {
        fs::remove_dir_all(path)
    } else {
        fs::remove_file(path)
    };
    if let Err(err) = result {
        tracing::warn!(path = %path.display(), %err, "rollback could not remove");
    }
}

#[cfg(test)]
#[path = "session_tests.rs"]
mod tests;
