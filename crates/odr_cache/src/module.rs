//! Installed modules and their versions.

use std::path::Path;

use serde::{Deserialize, Serialize};

use crate::error::CacheError;
use crate::json::read_json;

/// Name of the runtime module whose version gates the boot tier.
pub const ART_MODULE: &str = "com.android.art";

/// One entry of the module list published by the package manager.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct ApexInfo {
    /// Module name, such as `com.android.art`.
    pub name: String,
    /// Monotonic version code.
    pub version_code: i64,
    /// Human-readable version.
    #[serde(default)]
    pub version_name: String,
    /// When the module was last updated, in milliseconds since the epoch.
    #[serde(default)]
    pub last_update_millis: i64,
    /// The module is the version shipped with the system image.
    #[serde(default)]
    pub is_factory: bool,
    /// The module is the one currently mounted.
    #[serde(default = "default_true")]
    pub is_active: bool,
}

fn default_true() -> bool {
    true
}

/// Reads the module list at `path` (a JSON array of [`ApexInfo`]) and
/// returns the active entries.
pub fn read_module_list(path: &Path) -> Result<Vec<ApexInfo>, CacheError> {
    let list: Vec<ApexInfo> = read_json(path)?.ok_or_else(|| CacheError::Io {
        path: path.to_path_buf(),
        source: std::io::Error::from(std::io::ErrorKind::NotFound),
    })?;
    Ok(list.into_iter().filter(|m| m.is_active).collect())
}

/// The version information recorded for a module.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct ModuleInfo {
    /// Module name.
    pub name: String,
    /// Monotonic version code.
    pub version_code: i64,
    /// Human-readable version.
    pub version_name: String,
    /// Last update time in milliseconds since the epoch.
    pub last_update_millis: i64,
}

impl From<&ApexInfo> for ModuleInfo {
    fn from(info: &ApexInfo) -> Self {
        Self {
            name: info.name.clone(),
            version_code: info.version_code,
            version_name: info.version_name.clone(),
            last_update_millis: info.last_update_millis,
        }
    }
}

impl ModuleInfo {
    /// Converts a module list, sorted by name so lists compare by content.
    pub fn from_list(list: &[ApexInfo]) -> Vec<Self> {
        let mut infos: Vec<Self> = list.iter().map(Self::from).collect();
        infos.sort_by(|a, b| a.name.cmp(&b.name));
        infos
    }
}
