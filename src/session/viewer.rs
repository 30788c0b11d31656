//! Handoff to the external review viewer.
use anyhow::{anyhow, Context, Result};
use std::path::{Path, PathBuf};
use std::process::{Command, Stdio};

/// Blocking handoff to whatever displays the batch and saves the verdict
/// table. Returns once the reviewer is finished.
pub trait Viewer {
    /// Check that the viewer can be started, before any lock is taken.
    fn preflight(&self) -> Result<()> {
        Ok(())
    }

    fn launch(&self, index: &Path) -> Result<()>;
}

/// Opens the prepared `index.html` in a local browser process and waits for
/// it to exit.
#[derive(Debug, Clone)]
pub struct BrowserViewer {
    command: Vec<String>,
}

impl BrowserViewer {
    /// `command` is the program followed by its leading arguments; the
    /// index path is appended at launch.
    pub fn new(command: Vec<String>) -> Result<Self> {
        if command.is_empty() {
            return Err(anyhow!("browser command is empty"));
        }
        Ok(Self { command })
    }

    /// Resolve the browser program on `PATH`.
    pub fn resolve_program(&self) -> Result<PathBuf> {
        let program = &self.command[0];
        which::which(program).with_context(|| format!("browser command '{program}' not found"))
    }
}

impl Viewer for BrowserViewer {
    fn preflight(&self) -> Result<()> {
        let resolved = self.resolve_program()?;
        tracing::debug!(browser = %resolved.display(), "browser resolved");
        Ok(())
    }

    fn launch(&self, index: &Path) -> Result<()> {
        let (program, args) = self
            .command
            .split_first()
            .ok_or_else(|| anyhow!("browser command is empty"))?;
        tracing::info!(%program, index = %index.display(), "launching viewer");
        let status = Command::new(program)
            .args(args)
            .arg(index)
            .stderr(Stdio::null())
            .status()
            .with_context(|| format!("run {program}"))?;
        // Exit status is advisory; a missing verdict table is the failure.
        if !status.success() {
            tracing::warn!(%status, "viewer exited with failure status");
        }
        Ok(())
    }
}
