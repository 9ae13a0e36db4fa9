//! Parsing and validation of `odrefresh.toml` configuration files.
//!
//! This crate reads the refresh configuration and produces a strongly-typed
//! [`RefreshConfig`], then lets command-line flags override selected values
//! through [`ConfigOverrides`].

#![warn(missing_docs)]

pub mod error;
pub mod loader;
pub mod overrides;
pub mod types;

pub use error::ConfigError;
pub use loader::{load_config, load_config_file, load_config_from_str, CONFIG_FILE};
pub use overrides::ConfigOverrides;
pub use types::*;
