//! Configuration file loading and validation.

use crate::error::ConfigError;
use crate::types::RefreshConfig;
use std::path::Path;

/// Name of the configuration file looked up in a configuration directory.
pub const CONFIG_FILE: &str = "odrefresh.toml";

/// Loads and validates `odrefresh.toml` from a configuration directory.
pub fn load_config(config_dir: &Path) -> Result<RefreshConfig, ConfigError> {
    load_config_file(&config_dir.join(CONFIG_FILE))
}

/// Loads and validates a configuration file at an explicit path.
pub fn load_config_file(path: &Path) -> Result<RefreshConfig, ConfigError> {
    let content = std::fs::read_to_string(path)?;
    load_config_from_str(&content)
}

/// Parses and validates a configuration from a string.
///
/// Useful for testing without filesystem dependencies.
pub fn load_config_from_str(content: &str) -> Result<RefreshConfig, ConfigError> {
    let config: RefreshConfig =
        toml::from_str(content).map_err(|e| ConfigError::ParseError(e.to_string()))?;
    validate_config(&config)?;
    Ok(config)
}

/// Validates that required fields are present and configuration values are consistent.
pub(crate) fn validate_config(config: &RefreshConfig) -> Result<(), ConfigError> {
    if config.paths.artifact_dir.as_os_str().is_empty() {
        return Err(ConfigError::MissingField("paths.artifact_dir".to_string()));
    }
    if !config.paths.artifact_dir.is_absolute() {
        return Err(ConfigError::ValidationError(format!(
            "paths.artifact_dir must be absolute, got '{}'",
            config.paths.artifact_dir.display()
        )));
    }
    if config.paths.dex2oat.as_os_str().is_empty() {
        return Err(ConfigError::MissingField("paths.dex2oat".to_string()));
    }
    if config.compile.boot_extension_isas.is_empty() {
        return Err(ConfigError::MissingField(
            "compile.boot_extension_isas".to_string(),
        ));
    }
    if !config
        .compile
        .boot_extension_isas
        .contains(&config.compile.system_server_isa)
    {
        return Err(ConfigError::ValidationError(format!(
            "system server isa {} has no boot extension isa",
            config.compile.system_server_isa
        )));
    }
    if config.compile.max_child_process_seconds == 0 {
        return Err(ConfigError::ValidationError(
            "compile.max_child_process_seconds must be positive".to_string(),
        ));
    }
    if config.compile.min_child_process_seconds > config.compile.max_child_process_seconds {
        return Err(ConfigError::ValidationError(
            "compile.min_child_process_seconds exceeds compile.max_child_process_seconds"
                .to_string(),
        ));
    }
    let all_jars = config
        .classpath
        .boot_classpath
        .iter()
        .chain(&config.classpath.dex2oat_boot_classpath)
        .chain(&config.classpath.system_server_classpath)
        .chain(&config.classpath.standalone_system_server_jars);
    for jar in all_jars {
        if !Path::new(jar).is_absolute() {
            return Err(ConfigError::ValidationError(format!(
                "classpath entry '{jar}' is not absolute"
            )));
        }
    }
    Ok(())
}
