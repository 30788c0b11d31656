//! Shared test infrastructure for integration tests.

use std::fs;
use std::os::unix::fs::PermissionsExt;
use std::path::{Path, PathBuf};
use std::process::{Command, Output};
use tempfile::TempDir;

/// Registry used by every CLI test: one `t1` check over
/// `{subj}_{sess}_T1w.nii.gz` with results under `qc/<subj>_<sess>/`.
pub const REGISTRY: &str = r#"{
    "t1": {
        "primary": "{subj}_{sess}_T1w.nii.gz",
        "overlay": "{subj}_{sess}_T1w.nii.gz",
        "outputDir": "qc/{subj}_{sess}"
    }
}"#;

/// A scratch study: data directory, registry, viewer assets, downloads.
pub struct Study {
    _temp: TempDir,
    pub root: PathBuf,
    pub data: PathBuf,
}

impl Study {
    pub fn new() -> Self {
        let temp = TempDir::new().expect("create temp dir");
        let root = temp.path().canonicalize().expect("canonicalize temp dir");
        let data = root.join("data");
        fs::create_dir_all(&data).expect("create data dir");
        fs::write(root.join("config.json"), REGISTRY).expect("write registry");
        let viewer = root.join("viewer");
        fs::create_dir_all(&viewer).expect("create viewer dir");
        fs::write(viewer.join("index.html"), "<html></html>").expect("write index");
        fs::create_dir_all(root.join("Downloads")).expect("create downloads");
        Self {
            _temp: temp,
            root,
            data,
        }
    }

    pub fn artifact(&self, name: &str) -> PathBuf {
        let path = self.data.join(name);
        fs::write(&path, b"nifti").expect("write artifact");
        path
    }

    pub fn lock(&self, item_dir: &str) -> PathBuf {
        let dir = self.data.join("qc").join(item_dir);
        fs::create_dir_all(&dir).expect("create qc dir");
        let path = dir.join("t1.lock");
        fs::write(&path, "someone").expect("write lock");
        path
    }

    pub fn done(&self, item_dir: &str, rating: &str, flagged: &str) -> PathBuf {
        let dir = self.data.join("qc").join(item_dir);
        fs::create_dir_all(&dir).expect("create qc dir");
        let path = dir.join("t1.done");
        fs::write(
            &path,
            format!(
                "Rating\tFlagged\tUser\tTimestamp\n{rating}\t{flagged}\tbo\t2024-01-01 00:00:00\n"
            ),
        )
        .expect("write done");
        path
    }

    /// Install an executable viewer script; `$1` is the index page path.
    pub fn viewer_script(&self, body: &str) -> PathBuf {
        let path = self.root.join("fake-browser.sh");
        fs::write(&path, format!("#!/bin/sh\n{body}\n")).expect("write script");
        let mut perms = fs::metadata(&path).expect("stat script").permissions();
        perms.set_mode(0o755);
        fs::set_permissions(&path, perms).expect("chmod script");
        path
    }

    pub fn downloads(&self) -> PathBuf {
        self.root.join("Downloads")
    }

    pub fn work_root(&self) -> PathBuf {
        self.root.join("work")
    }

    /// Run the binary against this study with `extra` arguments.
    pub fn run(&self, browser: &Path, extra: &[&str]) -> Output {
        Command::new(env!("CARGO_BIN_EXE_juicy-qc"))
            .arg("--data-dir")
            .arg(&self.data)
            .args(["--check", "t1"])
            .arg("--config")
            .arg(self.root.join("config.json"))
            .arg("--viewer-template-dir")
            .arg(self.root.join("viewer"))
            .arg("--downloads-dir")
            .arg(self.downloads())
            .arg("--work-root")
            .arg(self.work_root())
            .arg("--browser-cmd")
            .arg(browser)
            .args(["--user", "ana"])
            .args(extra)
            .env_remove("JUICY_QC_LOG")
            .output()
            .expect("run juicy-qc")
    }

    /// Every `.lock`/`.done` file under the data directory, relative.
    pub fn records(&self) -> Vec<String> {
        let mut out = files_under(&self.data);
        out.retain(|p| p.ends_with(".lock") || p.ends_with(".done"));
        out
    }
}

/// Every file under `root`, relative and sorted; empty if `root` is absent.
pub fn files_under(root: &Path) -> Vec<String> {
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
            out.push(path.strip_prefix(root).unwrap().to_string_lossy().to_string());
        }
    }
}

pub fn stdout(output: &Output) -> String {
    String::from_utf8_lossy(&output.stdout).to_string()
}

pub fn stderr(output: &Output) -> String {
    String::from_utf8_lossy(&output.stderr).to_string()
}
