//! # Error Handling
//!
//! This module defines the error types shared by the `fleetcfg` library. It
//! uses the `thiserror` library to build enums whose messages carry enough
//! context (item names, repository paths) for an operator to locate and fix
//! the repository without reading logs.
//!
//! ## Key Components
//!
//! - **`Error`**: infrastructure failures such as I/O errors, configuration
//!   parsing problems, or a change-notification backend that cannot be
//!   created. These abort the operation that hit them.
//!
//! - **`ResolveError`**: failures of a single resolution call, i.e. one
//!   (item, client) pair. A `ResolveError` never affects the resolution of
//!   other items or other clients.
//!
//! - **`Result<T>`**: A type alias for `std::result::Result<T, Error>`.
//!
//! A file that cannot be classified is reported through
//! [`crate::specificity::UnclassifiableFile`] instead, which has no
//! conversion into either enum here. A bad file name is logged and skipped
//! and never fails a resolution.

use std::path::PathBuf;
use thiserror::Error;

/// Main error type for fleetcfg infrastructure operations
#[derive(Error, Debug)]
pub enum Error {
    /// An error occurred while parsing the configuration file.
    ///
    /// This error includes the specific parsing issue and optionally a hint
    /// about how to fix it.
    #[error("Configuration parsing error: {message}{}", hint.as_ref().map(|h| format!("\n  hint: {}", h)).unwrap_or_default())]
    ConfigParse {
        message: String,
        /// Optional hint for how to fix the configuration issue
        hint: Option<String>,
    },

    /// A path could not be registered with the change-notification backend.
    #[error("Failed to monitor {}: {message}", path.display())]
    Monitor { path: PathBuf, message: String },

    /// The OS change-notification facility reported an error.
    #[error("Change notification error: {0}")]
    Notify(#[from] notify::Error),

    /// An ignore-list pattern is not a valid glob.
    #[error("Glob pattern error: {0}")]
    Glob(#[from] glob::PatternError),

    /// An I/O error, wrapped from `std::io::Error`.
    #[error("I/O error: {0}")]
    Io(#[from] std::io::Error),

    /// A YAML parsing error, wrapped from `serde_yaml::Error`.
    #[error("YAML parsing error: {0}")]
    Yaml(#[from] serde_yaml::Error),

    /// An error indicating that a lock guarding the index has been poisoned.
    #[error("Lock poisoned: {context}")]
    LockPoisoned { context: String },
}

/// A convenient type alias for `Result<T, Error>`.
pub type Result<T> = std::result::Result<T, Error>;

/// Failure of one resolution call.
///
/// Every variant names the logical item or the repository file involved.
#[derive(Error, Debug, Clone, PartialEq, Eq)]
pub enum ResolveError {
    /// The item has no entry set at all in the repository.
    #[error("Unknown configuration item: {item}")]
    UnknownItem { item: String },

    /// Two or more applicable files occupy the same specificity slot.
    #[error("Ambiguous candidates for {item}: {}", format_paths(paths))]
    AmbiguousCandidate { item: String, paths: Vec<PathBuf> },

    /// No candidate of the item applies to the client.
    #[error("No base file found for {item} on client {hostname}")]
    NoBaseFound { item: String, hostname: String },

    /// A `-` line of a line delta names text absent from the buffer.
    #[error("Delta {} removes missing line: {line:?}", path.display())]
    DeltaTargetMissing { path: PathBuf, line: String },

    /// A delta could not be applied (patch failure, timeout, bad text).
    #[error("Failed to apply delta {}: {message}", path.display())]
    DeltaApplyFailed { path: PathBuf, message: String },

    /// Materialized content is not UTF-8 text and the item is not base64.
    #[error("Content of {item} is not valid UTF-8 ({message}); {}", format_paths(paths))]
    Encoding {
        item: String,
        /// Base file, then every applied delta
        paths: Vec<PathBuf>,
        message: String,
    },

    /// The index lock was poisoned by a panicking writer.
    #[error("Lock poisoned: {context}")]
    LockPoisoned { context: String },
}

impl ResolveError {
    /// Repository paths an operator should look at to fix this failure.
    pub fn paths(&self) -> Vec<PathBuf> {
        match self {
            ResolveError::AmbiguousCandidate { paths, .. }
            | ResolveError::Encoding { paths, .. } => paths.clone(),
            ResolveError::DeltaTargetMissing { path, .. }
            | ResolveError::DeltaApplyFailed { path, .. } => vec![path.clone()],
            _ => Vec::new(),
        }
    }
}

fn format_paths(paths: &[PathBuf]) -> String {
    paths
        .iter()
        .map(|p| p.display().to_string())
        .collect::<Vec<_>>()
        .join(", ")
}
