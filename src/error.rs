//! Error types for a reorganization run.
//!
//! Only run-level failures travel through [`SortError`]. Failures moving a
//! single file are downgraded to [`crate::organizer::MoveOutcome::Failed`]
//! and never abort the run.

use crate::config::ConfigError;
use std::path::PathBuf;
use thiserror::Error;

/// Errors that can occur while reorganizing a tree.
#[derive(Error, Debug)]
pub enum SortError {
    /// The supplied root is missing, not a directory, or cannot be resolved.
    /// Raised before any traversal, so no side effects have happened.
    #[error("Invalid root {}: {reason}", path.display())]
    InvalidRoot { path: PathBuf, reason: String },

    /// A destination folder could not be created or the root vanished.
    #[error("Failed to set up {}: {source}", path.display())]
    SetupFailed {
        path: PathBuf,
        #[source]
        source: std::io::Error,
    },

    /// A directory or file could not be listed or moved for lack of permission.
    #[error("Access denied for {}: {source}", path.display())]
    AccessDenied {
        path: PathBuf,
        #[source]
        source: std::io::Error,
    },

    /// The OS refused to move a file (cross-device, locked, disk full).
    #[error("Failed to move {} to {}: {source}", from.display(), to.display())]
    MoveFailed {
        from: PathBuf,
        to: PathBuf,
        #[source]
        source: std::io::Error,
    },

    #[error(transparent)]
    Config(#[from] ConfigError),
}

impl SortError {
    /// Classifies an I/O error raised while moving `from` to `to`.
    pub fn from_move(from: PathBuf, to: PathBuf, source: std::io::Error) -> Self {
        if source.kind() == std::io::ErrorKind::PermissionDenied {
            Self::AccessDenied { path: from, source }
        } else {
            Self::MoveFailed { from, to, source }
        }
    }
}

/// Result type for reorganization operations.
pub type SortResult<T> = Result<T, SortError>;
