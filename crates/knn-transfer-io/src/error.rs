use std::path::PathBuf;

use knn_transfer_core::TransferError;
use thiserror::Error;

/// Errors that can occur while loading inputs or persisting results.
#[derive(Debug, Error)]
pub enum IoError {
    /// A file could not be opened, read or written.
    #[error("{}: {source}", .path.display())]
    Io {
        /// The file being accessed.
        path: PathBuf,
        /// The underlying I/O error.
        #[source]
        source: std::io::Error,
    },

    /// A file does not follow the expected delimited layout.
    #[error("{}:{line}: {reason}", .path.display())]
    Malformed {
        /// The offending file.
        path: PathBuf,
        /// 1-based line number.
        line: usize,
        /// What was wrong with the line.
        reason: String,
    },

    /// An auxiliary embedding file lacks a row for an entity of the primary matrix.
    #[error("{}: no row for entity {id:?}", .path.display())]
    MissingEntity {
        /// The auxiliary embedding file.
        path: PathBuf,
        /// The entity without a row.
        id: String,
    },

    /// The loaded data violates a data model invariant.
    #[error(transparent)]
    Core(#[from] TransferError),

    /// JSON encoding failed.
    #[error("JSON error: {0}")]
    Json(#[from] serde_json::Error),
}

/// Result type alias for I/O operations.
pub type Result<T> = std::result::Result<T, IoError>;

impl IoError {
    pub(crate) fn io(path: impl Into<PathBuf>, source: std::io::Error) -> Self {
        Self::Io {
            path: path.into(),
            source,
        }
    }

    pub(crate) fn malformed(path: impl Into<PathBuf>, line: usize, reason: impl Into<String>) -> Self {
        Self::Malformed {
            path: path.into(),
            line,
            reason: reason.into(),
        }
    }
}
