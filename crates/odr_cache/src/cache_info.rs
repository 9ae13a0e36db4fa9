//! The manifest of what the current artifacts were compiled from.

use std::path::{Path, PathBuf};

use serde::{Deserialize, Serialize};

use crate::component::{Component, SystemServerComponent};
use crate::error::CacheError;
use crate::json::{read_json, write_json};
use crate::module::ModuleInfo;

/// Name of the manifest file within the artifact directory.
pub const CACHE_INFO_FILE: &str = "cache-info.json";

/// Inputs of the artifacts in the artifact directory.
///
/// Rewritten before every compilation attempt and read at the start of
/// every check.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct CacheInfo {
    /// The runtime module the artifacts were compiled for.
    pub art_module: ModuleInfo,
    /// Every active module, sorted by name.
    pub modules: Vec<ModuleInfo>,
    /// The full boot classpath.
    pub boot_classpath: Vec<Component>,
    /// Boot classpath jars compiled into the boot image extension.
    pub dex2oat_boot_classpath: Vec<Component>,
    /// System server jars, classpath first.
    pub system_server: Vec<SystemServerComponent>,
}

impl CacheInfo {
    /// Path of the manifest inside `artifact_dir`.
    pub fn path(artifact_dir: &Path) -> PathBuf {
        artifact_dir.join(CACHE_INFO_FILE)
    }

    /// Loads the manifest from `artifact_dir`.
    ///
    /// `Ok(None)` means there is no manifest, which is the case on first
    /// boot. A manifest that exists but cannot be parsed is an error, and
    /// the caller should discard every artifact.
    pub fn load(artifact_dir: &Path) -> Result<Option<Self>, CacheError> {
        read_json(&Self::path(artifact_dir))
    }

    /// Atomically replaces the manifest in `artifact_dir`.
    pub fn save(&self, artifact_dir: &Path) -> Result<(), CacheError> {
        write_json(&Self::path(artifact_dir), self)
    }
}
