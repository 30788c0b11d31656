//! Shared fixtures for unit tests.
use crate::config::{CheckDefinition, CheckSpec, Filters};
use crate::discovery::discover;
use crate::reconcile::{derive_items, reconcile, Item};
use filetime::{set_file_mtime, FileTime};
use std::fs;
use std::path::{Path, PathBuf};
use tempfile::TempDir;

pub(crate) const CHECK: &str = "t1";

/// A canonical base directory holding `{subj}_{sess}_T1w.nii.gz` artifacts
/// with per-item output directories under `qc/`.
pub(crate) struct Fixture {
    _temp: TempDir,
    pub base: PathBuf,
    pub def: CheckDefinition,
}

impl Fixture {
    pub fn new() -> Self {
        let temp = TempDir::new().expect("create temp dir");
        let base = temp.path().canonicalize().expect("canonicalize temp dir");
        let spec = CheckSpec {
            primary: "{subj}_{sess}_T1w.nii.gz".to_string(),
            overlay: "{subj}_{sess}_T1w.nii.gz".to_string(),
            output_dir: "qc/{subj}_{sess}".to_string(),
        };
        let def = CheckDefinition::from_spec(CHECK, &spec).expect("valid check");
        Self {
            _temp: temp,
            base,
            def,
        }
    }

    pub fn artifact(&self, name: &str) -> PathBuf {
        let path = self.base.join(name);
        fs::write(&path, b"nifti").expect("write artifact");
        path
    }

    pub fn discovered(&self) -> Vec<PathBuf> {
        discover(&self.def.primary, &self.base, &Filters::new()).expect("discover")
    }

    pub fn items(&self) -> Vec<Item> {
        reconcile(&self.def, &self.base, &self.discovered()).expect("reconcile")
    }

    pub fn item(&self, artifact: &Path) -> Item {
        derive_items(&self.def, &self.base, &[artifact.to_path_buf()])
            .expect("derive item")
            .remove(0)
    }

    /// Write a done-record for `artifact`; `None` leaves Flagged unset.
    pub fn done(&self, artifact: &Path, rating: f64, flagged: Option<bool>) -> PathBuf {
        let item = self.item(artifact);
        fs::create_dir_all(&item.output_dir).expect("create output dir");
        let flag = match flagged {
            Some(true) => "1",
            Some(false) => "0",
            None => "",
        };
        fs::write(
            &item.done_file,
            format!("Rating\tFlagged\tUser\tTimestamp\n{rating}\t{flag}\ttester\t2024-01-01 00:00:00\n"),
        )
        .expect("write done");
        item.done_file
    }

    pub fn lock(&self, artifact: &Path) -> PathBuf {
        let item = self.item(artifact);
        fs::create_dir_all(&item.output_dir).expect("create output dir");
        fs::write(&item.lock_file, "tester").expect("write lock");
        item.lock_file
    }
}

pub(crate) fn set_mtime(path: &Path, unix_seconds: i64) {
    set_file_mtime(path, FileTime::from_unix_time(unix_seconds, 0)).expect("set mtime");
}

/// Every file under `root`, relative, sorted.
pub(crate) fn tree(root: &Path) -> Vec<String> {
    let mut out = Vec::new();
    collect(root, root, &mut out);
    out.sort();
    out
}

fn collect(root: &Path, dir: &Path, out: &mut Vec<String>) {
    let Ok(entries) = fs::read_dir(dir) else {
        return;
    };
    for entry in entries.flatten() {
        let path = entry.path();
        if path.is_dir() {
            collect(root, &path, out);
        } else {
            out.push(
                path.strip_prefix(root)
                    .unwrap_or(&path)
                    .to_string_lossy()
                    .to_string(),
            );
        }
    }
}
