//! Errors raised while reading `odrefresh.toml`.

/// Failure to produce a usable [`crate::RefreshConfig`].
#[derive(Debug, thiserror::Error)]
pub enum ConfigError {
    /// The file could not be read.
    #[error("cannot read odrefresh config: {0}")]
    IoError(#[from] std::io::Error),

    /// The file is not valid TOML or does not match the expected shape.
    #[error("malformed odrefresh config: {0}")]
    ParseError(String),

    /// A key that has no default was left out.
    #[error("odrefresh config lacks `{0}`")]
    MissingField(String),

    /// A value was present but unusable, such as an empty ISA list.
    #[error("invalid odrefresh config: {0}")]
    ValidationError(String),
}
