//! Batch visual quality-check sessions over derived image artifacts.
//!
//! Artifacts are discovered by expanding a check's primary template against a
//! search filter, reconciled against prior verdicts and lock files, and
//! handed to an external viewer one bounded batch at a time.
pub mod cli;
pub mod config;
pub mod discovery;
pub mod error;
pub mod reconcile;
pub mod record;
pub mod select;
pub mod session;
pub mod template;
pub mod workflow;

#[cfg(test)]
mod test_support;

pub use error::QcError;
