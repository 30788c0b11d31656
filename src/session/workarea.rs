//! Working area handed to the viewer: static assets plus the batch manifest.
use crate::config::CheckDefinition;
use crate::reconcile::Item;
use anyhow::{anyhow, Context, Result};
use chrono::{DateTime, Local};
use std::fs;
use std::path::{Path, PathBuf};

/// Viewer entry page inside the working area.
pub const INDEX_FILE: &str = "index.html";
pub const ENV_FILE: &str = "envvars.js";
pub const MANIFEST_FILE: &str = "images.json";
pub const METADATA_FILE: &str = "subs.csv";

#[derive(Debug, Clone)]
pub struct WorkArea {
    root: PathBuf,
    name: String,
}

impl WorkArea {
    /// Name derived from reviewer identity and a second-resolution timestamp.
    pub fn name_for(user: &str, now: DateTime<Local>) -> String {
        format!("{user}_{}", now.format("%Y-%m-%d_%H-%M-%S"))
    }

    /// Create a fresh directory under `work_root`; an existing one is an error.
    pub fn create(work_root: &Path, name: &str) -> Result<Self> {
        fs::create_dir_all(work_root)
            .with_context(|| format!("create {}", work_root.display()))?;
        let root = work_root.join(name);
        fs::create_dir(&root).with_context(|| format!("create work area {}", root.display()))?;
        Ok(Self {
            root,
            name: name.to_string(),
        })
    }

    pub fn root(&self) -> &Path {
        &self.root
    }

    pub fn name(&self) -> &str {
        &self.name
    }

    pub fn index_path(&self) -> PathBuf {
        self.root.join(INDEX_FILE)
    }

    pub fn metadata_path(&self) -> PathBuf {
        self.root.join(METADATA_FILE)
    }

    /// Copy the viewer's static files, preserving relative layout.
    pub fn copy_assets(&self, template_dir: &Path) -> Result<usize> {
        if !template_dir.is_dir() {
            return Err(anyhow!(
                "viewer template directory {} does not exist",
                template_dir.display()
            ));
        }
        let files = collect_files_recursive(template_dir)?;
        for file in &files {
            let rel = file
                .strip_prefix(template_dir)
                .context("strip template prefix")?;
            let dest = self.root.join(rel);
            if let Some(parent) = dest.parent() {
                fs::create_dir_all(parent)
                    .with_context(|| format!("create {}", parent.display()))?;
            }
            fs::copy(file, &dest).with_context(|| format!("copy {}", file.display()))?;
        }
        Ok(files.len())
    }

    /// Environment descriptor read by the viewer page.
    pub fn write_env(&self, user: &str, check: &str) -> Result<()> {
        let metadata = self.metadata_path();
        let entries = [
            ("username", user.to_string()),
            ("filename", metadata.to_string_lossy().to_string()),
            ("checktype", check.to_string()),
            ("tempname", self.name.clone()),
        ];
        let mut text = String::new();
        for (key, value) in entries {
            let literal = serde_json::to_string(&value).context("encode envvars value")?;
            text.push_str(&format!("{key}={literal};\n"));
        }
        let path = self.root.join(ENV_FILE);
        fs::write(&path, text).with_context(|| format!("write {}", path.display()))?;
        Ok(())
    }

    /// `[artifact, overlay]` pairs in batch order, closed by an empty pair.
    pub fn write_manifest(&self, batch: &[Item]) -> Result<()> {
        let mut pairs: Vec<[String; 2]> = batch
            .iter()
            .map(|item| {
                [
                    item.artifact.to_string_lossy().to_string(),
                    item.overlay.to_string_lossy().to_string(),
                ]
            })
            .collect();
        pairs.push([String::new(), String::new()]);
        let path = self.root.join(MANIFEST_FILE);
        let bytes = serde_json::to_vec(&pairs).context("serialize manifest")?;
        fs::write(&path, bytes).with_context(|| format!("write {}", path.display()))?;
        Ok(())
    }

    /// One `field=value, field=value` row per item, in manifest order.
    pub fn write_metadata(&self, def: &CheckDefinition, batch: &[Item]) -> Result<()> {
        let fields = def.filterable_fields();
        let mut text = String::new();
        for item in batch {
            let row: Vec<String> = fields
                .iter()
                .map(|field| {
                    let value = item.variables.get(*field).map(String::as_str).unwrap_or("");
                    format!("{field}={value}")
                })
                .collect();
            text.push_str(&row.join(", "));
            text.push('\n');
        }
        let path = self.metadata_path();
        fs::write(&path, text).with_context(|| format!("write {}", path.display()))?;
        Ok(())
    }
}

fn collect_files_recursive(root: &Path) -> Result<Vec<PathBuf>> {
    let mut files = Vec::new();
    for entry in fs::read_dir(root).with_context(|| format!("read {}", root.display()))? {
        let entry = entry?;
        let path = entry.path();
        if path.is_dir() {
            files.extend(collect_files_recursive(&path)?);
        } else if path.is_file() {
            files.push(path);
        }
    }
    files.sort();
    Ok(files)
}
