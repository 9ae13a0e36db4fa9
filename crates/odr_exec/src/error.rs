//! Error types for process inspection.

/// Errors raised while inspecting a child process.
#[derive(Debug, thiserror::Error)]
pub enum ExecError {
    /// A `/proc` file could not be read.
    #[error("failed to read {path}: {source}")]
    Io {
        /// The `/proc` path.
        path: String,
        /// The underlying I/O error.
        source: std::io::Error,
    },

    /// A `/proc` file did not have the expected layout.
    #[error("malformed {path}: {reason}")]
    Malformed {
        /// The `/proc` path.
        path: String,
        /// What was wrong with it.
        reason: String,
    },
}
