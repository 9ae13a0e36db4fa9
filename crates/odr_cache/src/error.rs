//! Failures while persisting cache info, module lists and the compilation log.

use std::path::PathBuf;

use odr_publish::PublishError;

/// Errors raised while reading or writing persisted refresh state.
#[derive(Debug, thiserror::Error)]
pub enum CacheError {
    /// A state file could not be read or written.
    #[error("{path}: {source}")]
    Io {
        /// File being accessed.
        path: PathBuf,
        /// OS error.
        source: std::io::Error,
    },

    /// A state file exists but its contents are malformed.
    #[error("{path} is malformed: {reason}")]
    Parse {
        /// The offending file.
        path: PathBuf,
        /// What the decoder rejected.
        reason: String,
    },

    /// Encoding a record to JSON failed.
    #[error("cannot encode state: {reason}")]
    Serialization {
        /// Encoder message.
        reason: String,
    },

    /// Publishing the new state failed.
    #[error(transparent)]
    Publish(#[from] PublishError),

    /// The checksums of a jar could not be computed.
    #[error("cannot checksum {path}: {reason}")]
    Checksum {
        /// The jar.
        path: PathBuf,
        /// Why the entries could not be hashed.
        reason: String,
    },
}
