//! On-disk per-item records: `<check>.done` verdicts and `<check>.lock` claims.
use anyhow::{anyhow, Context, Result};
use chrono::{DateTime, Local};
use std::fs;
use std::path::Path;
use std::time::SystemTime;

const DONE_HEADER: [&str; 4] = ["Rating", "Flagged", "User", "Timestamp"];

/// Timestamp layout used in done-records and lock files.
pub const TIMESTAMP_FORMAT: &str = "%Y-%m-%d %H:%M:%S%.6f";

/// A persisted verdict for one item under one check type.
#[derive(Debug, Clone, PartialEq)]
pub struct CompletedResult {
    /// Reviewer score; `0` means failed, `None` is written as an empty cell.
    pub rating: Option<f64>,
    pub flagged: bool,
    pub user: String,
    pub timestamp: DateTime<Local>,
}

/// The parts of a done-record the reconciler needs.
#[derive(Debug, Clone, Copy, PartialEq, Default)]
pub struct PriorVerdict {
    pub rating: Option<f64>,
    pub flagged: Option<bool>,
}

/// Write (or overwrite) a done-record: one header line and one data line.
pub fn write_done(path: &Path, result: &CompletedResult) -> Result<()> {
    let mut writer = csv::WriterBuilder::new()
        .delimiter(b'\t')
        .from_path(path)
        .with_context(|| format!("create {}", path.display()))?;
    let flagged = if result.flagged { "1" } else { "0" };
    let timestamp = result.timestamp.format(TIMESTAMP_FORMAT).to_string();
    let rating = result
        .rating
        .map(|rating| rating.to_string())
        .unwrap_or_default();
    writer
        .write_record(DONE_HEADER)
        .with_context(|| format!("write {}", path.display()))?;
    writer
        .write_record([rating.as_str(), flagged, result.user.as_str(), timestamp.as_str()])
        .with_context(|| format!("write {}", path.display()))?;
    writer
        .flush()
        .with_context(|| format!("write {}", path.display()))?;
    Ok(())
}

/// Read the Rating and Flagged columns of a done-record.
///
/// Empty or `nan` cells read back as unset rather than failing, so records
/// written by other tools with missing verdict fields stay readable.
pub fn read_done(path: &Path) -> Result<PriorVerdict> {
    let mut reader = csv::ReaderBuilder::new()
        .delimiter(b'\t')
        .flexible(true)
        .from_path(path)
        .with_context(|| format!("read {}", path.display()))?;
    let headers = reader
        .headers()
        .with_context(|| format!("read header of {}", path.display()))?
        .clone();
    let column = |name: &str| {
        headers
            .iter()
            .position(|h| h.trim() == name)
            .ok_or_else(|| anyhow!("{} has no {name} column", path.display()))
    };
    let rating_col = column("Rating")?;
    let flagged_col = column("Flagged")?;

    let record = reader
        .records()
        .next()
        .ok_or_else(|| anyhow!("{} has no data row", path.display()))?
        .with_context(|| format!("read {}", path.display()))?;
    let cell = |idx: usize| record.get(idx).unwrap_or("").trim();

    let rating = parse_rating(cell(rating_col))
        .with_context(|| format!("parse Rating in {}", path.display()))?;
    let flagged = parse_flag(cell(flagged_col))
        .with_context(|| format!("parse Flagged in {}", path.display()))?;
    Ok(PriorVerdict { rating, flagged })
}

pub(crate) fn parse_rating(text: &str) -> Result<Option<f64>> {
    if is_unset(text) {
        return Ok(None);
    }
    let value: f64 = text
        .parse()
        .map_err(|_| anyhow!("'{text}' is not a number"))?;
    Ok(Some(value))
}

pub(crate) fn parse_flag(text: &str) -> Result<Option<bool>> {
    if is_unset(text) {
        return Ok(None);
    }
    match text.to_ascii_lowercase().as_str() {
        "1" | "1.0" | "true" => Ok(Some(true)),
        "0" | "0.0" | "false" => Ok(Some(false)),
        _ => Err(anyhow!("'{text}' is not a flag value")),
    }
}

fn is_unset(text: &str) -> bool {
    text.is_empty() || text.eq_ignore_ascii_case("nan")
}

/// Claim an item by writing the reviewer identity and a timestamp.
///
/// The existence check done by selection and this write are separate steps,
/// so two sessions starting in the same instant can both claim an item.
pub fn write_lock(path: &Path, user: &str, now: DateTime<Local>) -> std::io::Result<()> {
    fs::write(path, format!("{user}{}", now.format(TIMESTAMP_FORMAT)))
}

/// Modification time of `path` in local time.
pub fn modified_at(path: &Path) -> Result<DateTime<Local>> {
    let modified: SystemTime = fs::metadata(path)
        .and_then(|meta| meta.modified())
        .with_context(|| format!("stat {}", path.display()))?;
    Ok(DateTime::<Local>::from(modified))
}
