//! Error types for path validation and resolution.

/// A path was rejected or could not be mapped.
#[derive(Debug, Clone, PartialEq, Eq, thiserror::Error)]
pub enum PathError {
    /// The path is empty.
    #[error("path is empty")]
    Empty,

    /// The path contains a NUL byte.
    #[error("path '{path}' contains a NUL character")]
    ContainsNul {
        /// The offending path.
        path: String,
    },

    /// The path is relative.
    #[error("path '{path}' is not absolute")]
    NotAbsolute {
        /// The offending path.
        path: String,
    },

    /// The path has `.`, `..` or empty components.
    #[error("path '{path}' is not in normal form")]
    NotNormal {
        /// The offending path.
        path: String,
    },

    /// The path does not have an accepted extension.
    #[error("path '{path}' has an unsupported extension (expected {expected})")]
    BadExtension {
        /// The offending path.
        path: String,
        /// The accepted extensions.
        expected: &'static str,
    },

    /// The path cannot be mapped to an artifact location.
    #[error("cannot derive artifact path from '{path}': {reason}")]
    Unmappable {
        /// The offending path.
        path: String,
        /// Why no artifact path exists.
        reason: &'static str,
    },
}
