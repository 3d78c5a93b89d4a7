//! Error types for wikimig.
//!
//! Library crates use [`MigrationError`] via `thiserror`.
//! The CLI wraps this with `color-eyre` for rich diagnostics.
//!
//! Only run-level failures are errors. Problems local to one document
//! (malformed frontmatter, unmapped call-outs, unresolved links) are carried
//! as [`UnitWarning`](crate::UnitWarning)s on the unit instead.

use std::path::PathBuf;

/// Top-level error type for all wikimig operations.
#[derive(Debug, thiserror::Error)]
pub enum MigrationError {
    /// Configuration loading, parsing, or compilation error.
    #[error("config error: {message}")]
    Config { message: String },

    /// A report or manifest could not be serialized.
    #[error("serialization error: {message}")]
    Serialization { message: String },

    /// Filesystem I/O error.
    #[error("I/O error at {path:?}: {source}")]
    Io {
        path: PathBuf,
        source: std::io::Error,
    },

    /// Corpus-wide invariant violation.
    #[error("validation error: {message}")]
    Validation { message: String },

    /// Inventory store error.
    #[error("inventory error: {0}")]
    Inventory(String),

    /// A worker task panicked or was aborted.
    #[error("worker error: {0}")]
    Worker(String),

    /// The run was cancelled between stage boundaries.
    #[error("run cancelled after {completed} of {total} units")]
    Cancelled { completed: usize, total: usize },
}

/// Convenience alias used throughout the codebase.
pub type Result<T> = std::result::Result<T, MigrationError>;

impl MigrationError {
    /// Create a config error from any displayable message.
    pub fn config(msg: impl Into<String>) -> Self {
        Self::Config {
            message: msg.into(),
        }
    }

    /// Create a serialization error from any displayable message.
    pub fn serialization(msg: impl Into<String>) -> Self {
        Self::Serialization {
            message: msg.into(),
        }
    }

    /// Create a validation error from any displayable message.
    pub fn validation(msg: impl Into<String>) -> Self {
        Self::Validation {
            message: msg.into(),
        }
    }

    /// Wrap a `std::io::Error` with a path for context.
    pub fn io(path: impl Into<PathBuf>, source: std::io::Error) -> Self {
        Self::Io {
            path: path.into(),
            source,
        }
    }
}
