//! Batch selection by query mode.
use crate::reconcile::Item;
use anyhow::{Context, Result};
use serde::Serialize;
use std::fmt;
use std::fs;

/// The single active query mode.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Default)]
pub enum Mode {
    /// Items without a done-record.
    #[default]
    Unreviewed,
    /// Items whose prior rating is 0.
    Failed,
    /// Items whose prior verdict is flagged.
    Flagged,
    /// Remove every lock in the query; no session follows.
    Unlock,
    /// Report aggregate counts; no session follows.
    Summary,
}

/// What a run should do after selection.
#[derive(Debug, Clone)]
pub enum Selection {
    Batch(Vec<Item>),
    Unlock(Vec<Item>),
    Summary(Summary),
    NothingToDo,
}

/// Select at most `cap` items for `mode`, preserving discovery order.
///
/// Locked items are never eligible for a review batch; unlock mode selects
/// exactly the locked items instead, possibly none.
pub fn select(items: Vec<Item>, mode: Mode, cap: usize) -> Selection {
    match mode {
        Mode::Summary => return Selection::Summary(Summary::from_items(&items)),
        Mode::Unlock => {
            let locked = items.into_iter().filter(|item| item.is_locked).collect();
            return Selection::Unlock(locked);
        }
        Mode::Unreviewed | Mode::Failed | Mode::Flagged => {}
    }
    let batch: Vec<Item> = items
        .into_iter()
        .filter(|item| !item.is_locked)
        .filter(|item| match mode {
            Mode::Failed => item.is_failed(),
            Mode::Flagged => item.is_flagged(),
            _ => !item.is_done,
        })
        .take(cap)
        .collect();
    if batch.is_empty() {
        Selection::NothingToDo
    } else {
        Selection::Batch(batch)
    }
}

/// Remove the lock files of `items`, returning how many were removed.
pub fn unlock(items: &[Item]) -> Result<usize> {
    let mut removed = 0;
    for item in items {
        if item.lock_file.exists() {
            fs::remove_file(&item.lock_file)
                .with_context(|| format!("remove {}", item.lock_file.display()))?;
            tracing::debug!(lock = %item.lock_file.display(), "lock removed");
            removed += 1;
        }
    }
    Ok(removed)
}

/// Aggregate counts over one query.
#[derive(Debug, Clone, PartialEq, Serialize)]
pub struct Summary {
    pub total: usize,
    pub done: usize,
    pub done_percent: f64,
    pub failed: usize,
    pub flagged: usize,
    pub locked: usize,
    pub missing_overlays: usize,
}

impl Summary {
    pub fn from_items(items: &[Item]) -> Self {
        let count = |pred: fn(&Item) -> bool| items.iter().filter(|item| pred(item)).count();
        let total = items.len();
        let done = count(|item| item.is_done);
        let done_percent = if total == 0 {
            0.0
        } else {
            done as f64 * 100.0 / total as f64
        };
        Self {
            total,
            done,
            done_percent,
            failed: count(Item::is_failed),
            flagged: count(Item::is_flagged),
            locked: count(|item| item.is_locked),
            missing_overlays: count(|item| !item.overlay_exists),
        }
    }
}

impl fmt::Display for Summary {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        writeln!(f, "---------------- SUMMARY ---------------")?;
        writeln!(f, "Number of files in query: {}", self.total)?;
        writeln!(
            f,
            "Number of files checked: {} ({:.2}%)",
            self.done, self.done_percent
        )?;
        writeln!(f, "Number of files failed: {}", self.failed)?;
        writeln!(f, "Number of files flagged: {}", self.flagged)?;
        writeln!(f, "Number of files currently locked: {}", self.locked)?;
        if self.missing_overlays > 0 {
            writeln!(f, "Number of missing overlays: {}", self.missing_overlays)?;
        }
        write!(f, "----------------------------------------")
    }
}
