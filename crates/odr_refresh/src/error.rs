//! Error types for the refresh loop.

use std::path::PathBuf;

use odr_cache::CacheError;
use odr_dexopt::DexoptError;
use odr_oat::OatError;
use odr_paths::PathError;
use odr_publish::PublishError;

/// Errors raised while checking or compiling artifacts.
///
/// None of these escape [`OnDeviceRefresh`](crate::OnDeviceRefresh): each
/// is logged and folded into an [`ExitCode`](crate::ExitCode).
#[derive(Debug, thiserror::Error)]
pub enum RefreshError {
    /// An I/O error occurred on a file or directory.
    #[error("I/O error at {path}: {source}")]
    Io {
        /// The path that caused the error.
        path: PathBuf,
        /// The underlying I/O error.
        source: std::io::Error,
    },

    /// The module list does not name the runtime module.
    #[error("module {name} is not in the module list")]
    MissingModule {
        /// The module that was looked up.
        name: String,
    },

    /// The artifact partition is too full to compile into.
    #[error("only {available} bytes free on the artifact partition, need {required}")]
    InsufficientSpace {
        /// Bytes available to unprivileged writers.
        available: u64,
        /// Bytes required.
        required: u64,
    },

    /// The overall time budget ran out before a compilation could start.
    #[error("time budget exhausted")]
    BudgetExhausted,

    /// The run was cancelled while a compilation was in progress.
    #[error("compilation cancelled")]
    Cancelled,

    /// The analyzer could not be started or ended abnormally.
    #[error("analyzer failed: {reason}")]
    Analyzer {
        /// Description of the failure.
        reason: String,
    },

    /// Reading or writing persistent state failed.
    #[error(transparent)]
    Cache(#[from] CacheError),

    /// A compilation failed.
    #[error(transparent)]
    Dexopt(#[from] DexoptError),

    /// Inspecting an artifact failed.
    #[error(transparent)]
    Oat(#[from] OatError),

    /// An artifact path could not be derived.
    #[error(transparent)]
    Path(#[from] PathError),

    /// Creating a directory or publishing a file failed.
    #[error(transparent)]
    Publish(#[from] PublishError),
}
