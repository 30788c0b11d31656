//! Verdict table produced by the viewer.
use crate::error::QcError;
use crate::reconcile::Item;
use crate::record::{parse_flag, parse_rating};
use anyhow::{Context, Result};
use std::collections::{BTreeMap, VecDeque};
use std::path::{Path, PathBuf};

/// One reviewed row: `basename, Rating, Flagged, User, check`.
#[derive(Debug, Clone, PartialEq)]
pub struct VerdictRow {
    pub basename: String,
    pub rating: Option<f64>,
    pub flagged: bool,
    pub user: String,
    pub check: Option<String>,
}

/// Where the browser saves the table for a given working area.
pub fn verdict_path(downloads_dir: &Path, work_area_name: &str) -> PathBuf {
    downloads_dir.join(format!("{work_area_name}.csv"))
}

/// Parse the table positionally; the header row is skipped.
pub fn read_verdicts(path: &Path) -> Result<Vec<VerdictRow>> {
    let mut reader = csv::ReaderBuilder::new()
        .has_headers(true)
        .flexible(true)
        .trim(csv::Trim::All)
        .from_path(path)
        .with_context(|| format!("read {}", path.display()))?;
    let mut rows = Vec::new();
    for (idx, record) in reader.records().enumerate() {
        let record = record.with_context(|| format!("read {}", path.display()))?;
        let line = idx + 2;
        let bad = |reason: String| QcError::Verdict {
            path: path.to_path_buf(),
            reason: format!("line {line}: {reason}"),
        };
        let cell = |i: usize| record.get(i).unwrap_or("");
        let basename = cell(0).to_string();
        if basename.is_empty() {
            return Err(bad("missing basename".to_string()).into());
        }
        let rating = parse_rating(cell(1)).map_err(|err| bad(err.to_string()))?;
        let flagged = parse_flag(cell(2))
            .map_err(|err| bad(err.to_string()))?
            .unwrap_or(false);
        let check = Some(cell(4).to_string()).filter(|value| !value.is_empty());
        rows.push(VerdictRow {
            basename,
            rating,
            flagged,
            user: cell(3).to_string(),
            check,
        });
    }
    Ok(rows)
}

/// Attach each row to its batch item by primary artifact basename.
///
/// Items sharing a basename are consumed in manifest order. Once every item
/// with a basename has a row, a further row for that basename replaces the
/// most recent one, so a re-rated item keeps its last verdict. Rows without a
/// rating are kept and persisted with an empty Rating.
pub fn join_verdicts<'a>(
    path: &Path,
    check: &str,
    batch: &'a [Item],
    rows: Vec<VerdictRow>,
) -> Result<Vec<(&'a Item, VerdictRow)>> {
    let mut pending: BTreeMap<String, VecDeque<&Item>> = BTreeMap::new();
    for item in batch {
        pending.entry(item.basename()).or_default().push_back(item);
    }
    let mut joined: Vec<(&Item, VerdictRow)> = Vec::new();
    let mut latest: BTreeMap<String, usize> = BTreeMap::new();
    for row in rows {
        if let Some(row_check) = row.check.as_deref().filter(|c| *c != check) {
            tracing::warn!(basename = %row.basename, row_check, check, "verdict row names another check");
        }
        if row.rating.is_none() {
            tracing::warn!(basename = %row.basename, "verdict row has no rating");
        }
        if let Some(item) = pending.get_mut(&row.basename).and_then(VecDeque::pop_front) {
            latest.insert(row.basename.clone(), joined.len());
            joined.push((item, row));
        } else if let Some(&idx) = latest.get(&row.basename) {
            tracing::warn!(basename = %row.basename, "item rated again; keeping the later row");
            joined[idx].1 = row;
        } else {
            return Err(QcError::Verdict {
                path: path.to_path_buf(),
                reason: format!("'{}' is not an item of this batch", row.basename),
            }
            .into());
        }
    }
    Ok(joined)
}
