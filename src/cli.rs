//! CLI argument parsing for review runs.
//!
//! Arguments are folded into one immutable [`RunConfig`] before anything
//! touches the filesystem.
use crate::config::{
    default_config_path, default_downloads_dir, default_user, default_viewer_template_dir,
    default_work_root, Filters, Query, RunConfig, SessionSettings, DEFAULT_BATCH_SIZE,
};
use crate::select::Mode;
use anyhow::{anyhow, Context, Result};
use clap::{Args, Parser};
use std::path::PathBuf;

/// Root CLI entrypoint.
#[derive(Parser, Debug)]
#[command(
    name = "juicy-qc",
    version,
    about = "Perform visual quality checks on a dataset in batches",
    after_help = "Examples:\n  juicy-qc -d /data/study -c t1\n  juicy-qc -d /data/study -c t1 --filter subj=sub-01,sub-02 -n 10\n  juicy-qc -d /data/study -c t1 --fail\n  juicy-qc -d /data/study -c t1 --summary --json\n  juicy-qc -d /data/study -c t1 --unlock"
)]
pub struct RootArgs {
    /// Base path of the data directory
    #[arg(short = 'd', long, value_name = "DIR")]
    pub data_dir: PathBuf,

    /// Check type to perform; must be a key in the config file
    #[arg(short = 'c', long, value_name = "CHECK")]
    pub check: String,

    /// Number of images to include in a batch
    #[arg(short = 'n', long, value_name = "N", default_value_t = DEFAULT_BATCH_SIZE)]
    pub n_batch: usize,

    /// Search filter FIELD=VALUE[,VALUE...]; FIELD must be a placeholder in the primary template
    #[arg(long, value_name = "FIELD=VALUES", value_parser = parse_filter)]
    pub filter: Vec<(String, Vec<String>)>,

    /// Browser command used to open the viewer
    #[arg(long, value_name = "CMD", default_value = "firefox")]
    pub browser_cmd: String,

    /// Check registry JSON
    #[arg(long, value_name = "PATH")]
    pub config: Option<PathBuf>,

    /// Directory holding the viewer's static files
    #[arg(long, value_name = "DIR", alias = "papaya-template-dir")]
    pub viewer_template_dir: Option<PathBuf>,

    /// Reviewer identity recorded in locks and results (default: $USER)
    #[arg(long, value_name = "NAME")]
    pub user: Option<String>,

    /// Parent directory for per-session working areas
    #[arg(long, value_name = "DIR")]
    pub work_root: Option<PathBuf>,

    /// Directory where the browser saves the verdict table
    #[arg(long, value_name = "DIR")]
    pub downloads_dir: Option<PathBuf>,

    #[command(flatten)]
    pub mode: ModeArgs,

    /// Emit the summary as JSON
    #[arg(long, requires = "summary")]
    pub json: bool,

    /// Debug-level logging
    #[arg(short, long, conflicts_with = "quiet")]
    pub verbose: bool,

    /// Errors only
    #[arg(short, long)]
    pub quiet: bool,
}

/// Mutually exclusive query modes; none selects unreviewed items.
#[derive(Args, Debug, Default)]
#[group(multiple = false)]
pub struct ModeArgs {
    /// Review items that were failed within the current query
    #[arg(long)]
    pub fail: bool,

    /// Review items that were flagged within the current query
    #[arg(long)]
    pub flag: bool,

    /// Remove lock files for the current query
    #[arg(long)]
    pub unlock: bool,

    /// Print summary counts for the current query
    #[arg(long)]
    pub summary: bool,
}

impl ModeArgs {
    pub fn mode(&self) -> Mode {
        if self.fail {
            Mode::Failed
        } else if self.flag {
            Mode::Flagged
        } else if self.unlock {
            Mode::Unlock
        } else if self.summary {
            Mode::Summary
        } else {
            Mode::Unreviewed
        }
    }
}

impl RootArgs {
    pub fn config_path(&self) -> PathBuf {
        self.config.clone().unwrap_or_else(default_config_path)
    }

    pub fn run_config(&self) -> Result<RunConfig> {
        let browser_cmd = shell_words::split(&self.browser_cmd)
            .with_context(|| format!("parse browser command '{}'", self.browser_cmd))?;
        if browser_cmd.is_empty() {
            return Err(anyhow!("--browser-cmd is empty"));
        }
        Ok(RunConfig {
            query: Query {
                check: self.check.clone(),
                base_dir: self.data_dir.clone(),
                filters: merge_filters(&self.filter),
                batch_size: self.n_batch,
                mode: self.mode.mode(),
            },
            session: SessionSettings {
                user: self.user.clone().unwrap_or_else(default_user),
                browser_cmd,
                viewer_template_dir: self
                    .viewer_template_dir
                    .clone()
                    .unwrap_or_else(default_viewer_template_dir),
                downloads_dir: self
                    .downloads_dir
                    .clone()
                    .unwrap_or_else(default_downloads_dir),
                work_root: self.work_root.clone().unwrap_or_else(default_work_root),
            },
            json: self.json,
        })
    }
}

fn parse_filter(raw: &str) -> std::result::Result<(String, Vec<String>), String> {
    let (field, values) = raw
        .split_once('=')
        .ok_or_else(|| format!("expected FIELD=VALUE[,VALUE...], got '{raw}'"))?;
    let field = field.trim();
    if field.is_empty() {
        return Err(format!("missing field name in '{raw}'"));
    }
    let values: Vec<String> = values
        .split(',')
        .map(str::trim)
        .filter(|value| !value.is_empty())
        .map(str::to_string)
        .collect();
    if values.is_empty() {
        return Err(format!("no values for filter '{field}'"));
    }
    Ok((field.to_string(), values))
}

/// Repeated filters on one field accumulate values in order, without
/// duplicates.
fn merge_filters(pairs: &[(String, Vec<String>)]) -> Filters {
    let mut filters = Filters::new();
    for (field, values) in pairs {
        let entry = filters.entry(field.clone()).or_default();
        for value in values {
            if !entry.contains(value) {
                entry.push(value.clone());
            }
        }
    }
    filters
}
