//! Error types for artifact inspection.

use std::path::PathBuf;

use odr_paths::PathError;

/// Errors raised while opening artifacts or their inputs.
///
/// The staleness engine never escalates these for a candidate artifact: an
/// artifact that fails to open is simply [`CannotOpen`](crate::OatStatus::CannotOpen).
#[derive(Debug, thiserror::Error)]
pub enum OatError {
    /// An I/O error occurred while reading a file.
    #[error("I/O error at {path}: {source}")]
    Io {
        /// The path that caused the error.
        path: PathBuf,
        /// The underlying I/O error.
        source: std::io::Error,
    },

    /// The file does not start with the artifact magic.
    #[error("{path} is not a compiled artifact")]
    BadMagic {
        /// The file path.
        path: PathBuf,
    },

    /// The artifact header was written by an incompatible version.
    #[error("unsupported header version in {path}: expected {expected}, got {actual}")]
    UnsupportedVersion {
        /// The file path.
        path: PathBuf,
        /// The supported header version.
        expected: u32,
        /// The version found in the file.
        actual: u32,
    },

    /// The header could not be decoded.
    #[error("corrupt header in {path}: {reason}")]
    CorruptHeader {
        /// The file path.
        path: PathBuf,
        /// Description of the decoding failure.
        reason: String,
    },

    /// The header could not be encoded.
    #[error("failed to encode header: {reason}")]
    Encode {
        /// Description of the encoding failure.
        reason: String,
    },

    /// The source location was rejected.
    #[error(transparent)]
    Path(#[from] PathError),
}
