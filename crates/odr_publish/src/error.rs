//! Error types for staging and publishing files.

use std::path::PathBuf;

/// Errors raised while staging or committing artifacts.
#[derive(Debug, thiserror::Error)]
pub enum PublishError {
    /// A file system operation failed.
    #[error("{op} failed for {path}: {source}")]
    Io {
        /// The operation that failed (for example "rename").
        op: &'static str,
        /// The path the operation was applied to.
        path: PathBuf,
        /// The underlying I/O error.
        source: std::io::Error,
    },

    /// A directory sits where a file is to be replaced or removed.
    #[error("cannot replace directory {path}")]
    IsDirectory {
        /// The directory path.
        path: PathBuf,
    },

    /// The requested ownership is inconsistent.
    #[error("invalid permission: {reason}")]
    InvalidPermission {
        /// What is wrong with it.
        reason: String,
    },

    /// The final path cannot hold a staged file beside it.
    #[error("invalid final path {path}")]
    InvalidPath {
        /// The offending path.
        path: PathBuf,
    },
}

impl PublishError {
    pub(crate) fn io(op: &'static str, path: impl Into<PathBuf>, source: std::io::Error) -> Self {
        Self::Io {
            op,
            path: path.into(),
            source,
        }
    }
}
