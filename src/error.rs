//! Failure kinds raised by the discovery and session pipeline.
//!
//! Everything else travels as plain `anyhow` context; these variants are the
//! ones callers branch on, so they stay recoverable via `downcast_ref`.
use std::path::PathBuf;
use thiserror::Error;

#[derive(Error, Debug)]
pub enum QcError {
    /// The check registry is malformed.
    #[error("config error: {0}")]
    Config(String),

    #[error("unknown check type '{check}' (available: {available})")]
    UnknownCheck { check: String, available: String },

    /// A search filter names a field the primary template does not bind.
    #[error("filter field '{field}' is not a placeholder in '{template}'")]
    Filter { field: String, template: String },

    #[error("invalid template '{template}': {reason}")]
    Template { template: String, reason: String },

    #[error("template '{template}' references '{field}' but no value was bound")]
    MissingField { template: String, field: String },

    /// A discovered path does not reverse-match the template that produced it.
    #[error("path {} does not match template '{template}'", path.display())]
    Match { template: String, path: PathBuf },

    #[error("viewer exited before the verdict table was saved (expected {})", path.display())]
    ViewerAborted { path: PathBuf },

    #[error("lock acquisition failed at {}: {source}", path.display())]
    PartialLock {
        path: PathBuf,
        #[source]
        source: std::io::Error,
    },

    #[error("verdict table {}: {reason}", path.display())]
    Verdict { path: PathBuf, reason: String },
}
