//! Check registry loading and run settings.
//!
//! The registry is validated once at load: every field the overlay and output
//! templates need must be bound by the primary template, since the primary is
//! the only template ever reverse-matched.
use crate::error::QcError;
use crate::select::Mode;
use crate::template::Template;
use anyhow::{Context, Result};
use serde::{Deserialize, Serialize};
use std::collections::BTreeMap;
use std::fs;
use std::path::{Path, PathBuf};

/// Placeholder bound to the query's base directory in every template.
pub const DATA_DIR_FIELD: &str = "data_dir";

/// Default number of items per review batch.
pub const DEFAULT_BATCH_SIZE: usize = 50;

/// Raw template triple as written in the registry file.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "camelCase", deny_unknown_fields)]
pub struct CheckSpec {
    pub primary: String,
    pub overlay: String,
    pub output_dir: String,
}

/// Parsed and validated templates for one check type.
///
/// Relative templates are rooted at `{data_dir}` so that discovery and path
/// derivation are always anchored at the query's base directory.
#[derive(Debug, Clone)]
pub struct CheckDefinition {
    pub name: String,
    pub primary: Template,
    pub overlay: Template,
    pub output_dir: Template,
}

impl CheckDefinition {
    pub fn from_spec(name: &str, spec: &CheckSpec) -> Result<Self> {
        let primary = Template::parse(&root_template(&spec.primary))?;
        let overlay = Template::parse(&root_template(&spec.overlay))?;
        let output_dir = Template::parse(&root_template(&spec.output_dir))?;

        let bound = primary.fields();
        for (label, template) in [("overlay", &overlay), ("outputDir", &output_dir)] {
            let unbound: Vec<&str> = template
                .fields()
                .into_iter()
                .filter(|field| *field != DATA_DIR_FIELD && !bound.contains(field))
                .collect();
            if !unbound.is_empty() {
                return Err(QcError::Config(format!(
                    "{name}.{label} uses field(s) {} that {name}.primary does not provide",
                    unbound.join(", ")
                ))
                .into());
            }
        }

        Ok(Self {
            name: name.to_string(),
            primary,
            overlay,
            output_dir,
        })
    }

    /// Primary fields a search filter may constrain.
    pub fn filterable_fields(&self) -> Vec<&str> {
        self.primary
            .field_order()
            .into_iter()
            .filter(|field| *field != DATA_DIR_FIELD)
            .collect()
    }

    pub fn done_file_name(&self) -> String {
        format!("{}.done", self.name)
    }

    pub fn lock_file_name(&self) -> String {
        format!("{}.lock", self.name)
    }
}

fn root_template(raw: &str) -> String {
    let references_root = raw.contains(&format!("{{{DATA_DIR_FIELD}}}"));
    if references_root || Path::new(raw).is_absolute() {
        return raw.to_string();
    }
    let rel = raw.strip_prefix("./").unwrap_or(raw);
    format!("{{{DATA_DIR_FIELD}}}/{rel}")
}

/// All check types known to a registry file.
#[derive(Debug, Clone)]
pub struct CheckRegistry {
    checks: BTreeMap<String, CheckDefinition>,
}

impl CheckRegistry {
    /// Load and validate the registry at `path`.
    pub fn load(path: &Path) -> Result<Self> {
        let text =
            fs::read_to_string(path).with_context(|| format!("read config {}", path.display()))?;
        Self::from_json(&text).with_context(|| format!("load config {}", path.display()))
    }

    pub fn from_json(text: &str) -> Result<Self> {
        let specs: BTreeMap<String, CheckSpec> = serde_json::from_str(text)
            .map_err(|err| QcError::Config(format!("parse check registry JSON: {err}")))?;
        let mut checks = BTreeMap::new();
        for (name, spec) in &specs {
            checks.insert(name.clone(), CheckDefinition::from_spec(name, spec)?);
        }
        Ok(Self { checks })
    }

    /// Look up a check type, failing with the list of known names.
    pub fn get(&self, check: &str) -> Result<&CheckDefinition> {
        self.checks.get(check).ok_or_else(|| {
            QcError::UnknownCheck {
                check: check.to_string(),
                available: self.names().join(", "),
            }
            .into()
        })
    }

    pub fn names(&self) -> Vec<&str> {
        self.checks.keys().map(String::as_str).collect()
    }
}

/// Registry location used when `--config` is not given.
pub fn default_config_path() -> PathBuf {
    dirs::config_dir()
        .unwrap_or_else(|| PathBuf::from("."))
        .join("juicy-qc")
        .join("config.json")
}

/// Viewer asset location used when `--viewer-template-dir` is not given.
pub fn default_viewer_template_dir() -> PathBuf {
    dirs::data_dir()
        .unwrap_or_else(|| PathBuf::from("."))
        .join("juicy-qc")
        .join("papaya_template")
}

/// Directory where the browser saves the verdict table.
pub fn default_downloads_dir() -> PathBuf {
    dirs::download_dir()
        .or_else(|| dirs::home_dir().map(|home| home.join("Downloads")))
        .unwrap_or_else(|| PathBuf::from("Downloads"))
}

/// Parent of per-session working areas.
pub fn default_work_root() -> PathBuf {
    std::env::temp_dir().join("juicy-qc")
}

/// Reviewer identity from the environment.
pub fn default_user() -> String {
    ["USER", "USERNAME"]
        .iter()
        .find_map(|var| std::env::var(var).ok().filter(|value| !value.trim().is_empty()))
        .unwrap_or_else(|| "unknown".to_string())
}

/// Per-field search filter: field → ordered allowed values.
pub type Filters = BTreeMap<String, Vec<String>>;

/// One invocation's selection inputs.
#[derive(Debug, Clone)]
pub struct Query {
    pub check: String,
    pub base_dir: PathBuf,
    pub filters: Filters,
    pub batch_size: usize,
    pub mode: Mode,
}

/// Settings used only once a session starts mutating state.
#[derive(Debug, Clone)]
pub struct SessionSettings {
    pub user: String,
    pub browser_cmd: Vec<String>,
    pub viewer_template_dir: PathBuf,
    pub downloads_dir: PathBuf,
    pub work_root: PathBuf,
}

/// Immutable configuration for one run, threaded into each stage.
#[derive(Debug, Clone)]
pub struct RunConfig {
    pub query: Query,
    pub session: SessionSettings,
    pub json: bool,
}
