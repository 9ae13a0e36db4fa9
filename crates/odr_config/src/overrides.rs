//! Command-line overrides layered on top of a loaded configuration.

use crate::error::ConfigError;
use crate::loader::validate_config;
use crate::types::RefreshConfig;
use std::path::PathBuf;

/// Values given on the command line that take precedence over the file.
///
/// `None` keeps the configured value.
#[derive(Debug, Clone, Default)]
pub struct ConfigOverrides {
    /// Replaces `paths.artifact_dir`.
    pub artifact_dir: Option<PathBuf>,
    /// Replaces `compile.dry_run`.
    pub dry_run: Option<bool>,
    /// Replaces `compile.partial_compilation`.
    pub partial_compilation: Option<bool>,
    /// Replaces `compile.refresh`.
    pub refresh: Option<bool>,
    /// Replaces `compile.max_execution_seconds`.
    pub max_execution_seconds: Option<u64>,
    /// Replaces `compile.max_child_process_seconds`.
    pub max_child_process_seconds: Option<u64>,
}

impl ConfigOverrides {
    /// Applies the overrides and re-validates the merged configuration.
    pub fn apply(&self, mut config: RefreshConfig) -> Result<RefreshConfig, ConfigError> {
        if let Some(dir) = &self.artifact_dir {
            config.paths.artifact_dir = dir.clone();
        }
        if let Some(v) = self.dry_run {
            config.compile.dry_run = v;
        }
        if let Some(v) = self.partial_compilation {
            config.compile.partial_compilation = v;
        }
        if let Some(v) = self.refresh {
            config.compile.refresh = v;
        }
        if let Some(v) = self.max_execution_seconds {
            config.compile.max_execution_seconds = v;
        }
        if let Some(v) = self.max_child_process_seconds {
            config.compile.max_child_process_seconds = v;
            if config.compile.min_child_process_seconds > v {
                config.compile.min_child_process_seconds = v;
            }
        }
        validate_config(&config)?;
        Ok(config)
    }
}
