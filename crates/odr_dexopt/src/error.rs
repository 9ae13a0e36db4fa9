//! Error types for compiler invocations.

use std::path::PathBuf;

use odr_paths::PathError;
use odr_publish::PublishError;

/// Errors raised while preparing, running or publishing a compilation.
#[derive(Debug, thiserror::Error)]
pub enum DexoptError {
    /// An input or output path was rejected.
    #[error(transparent)]
    Path(#[from] PathError),

    /// An input could not be opened.
    #[error("failed to open {path}: {source}")]
    Io {
        /// The path that caused the error.
        path: PathBuf,
        /// The underlying I/O error.
        source: std::io::Error,
    },

    /// Staging or committing the outputs failed.
    #[error(transparent)]
    Publish(#[from] PublishError),

    /// The compiler could not be started.
    #[error("failed to start compiler: {reason}")]
    StartFailed {
        /// Why the start failed.
        reason: String,
    },

    /// The compiler exited with a non-zero code.
    #[error("compiler exited with code {code}")]
    Failed {
        /// The exit code.
        code: i32,
    },

    /// The compiler was killed by a signal without being cancelled.
    #[error("compiler killed by signal {signal}")]
    Signaled {
        /// The signal number.
        signal: i32,
    },

    /// The compiler ran past its deadline.
    #[error("compiler timed out")]
    TimedOut,
}
