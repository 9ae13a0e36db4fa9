//! Where the refresh loop expects each artifact.

use std::path::{Path, PathBuf};

use odr_common::InstructionSet;
use odr_config::RefreshConfig;
use odr_paths::{boot_image_filename, side_cache_filename, ArtifactKind, ArtifactPaths, PathError};

/// Name of the primary boot image inside `<boot_image_dir>/<isa>`.
const PRIMARY_BOOT_IMAGE: &str = "boot.art";

/// Artifact locations derived from a [`RefreshConfig`].
#[derive(Debug, Clone, Copy)]
pub struct ArtifactLayout<'a> {
    config: &'a RefreshConfig,
}

impl<'a> ArtifactLayout<'a> {
    /// Creates the layout for `config`.
    pub fn new(config: &'a RefreshConfig) -> Self {
        Self { config }
    }

    /// The artifact directory.
    pub fn artifact_dir(&self) -> &'a Path {
        &self.config.paths.artifact_dir
    }

    /// The per-ISA subdirectory of the artifact directory.
    pub fn isa_dir(&self, isa: InstructionSet) -> PathBuf {
        self.artifact_dir().join(isa.as_str())
    }

    /// The boot image extension compiled on device for `isa`.
    ///
    /// `None` when every boot classpath jar ships precompiled.
    pub fn boot_extension(&self, isa: InstructionSet) -> Result<Option<ArtifactPaths>, PathError> {
        self.boot_extension_in(&self.isa_dir(isa))
    }

    /// The boot image extension shipped on the system partition for `isa`.
    pub fn system_boot_extension(
        &self,
        isa: InstructionSet,
    ) -> Result<Option<ArtifactPaths>, PathError> {
        let dir = self
            .config
            .paths
            .android_root
            .join("framework")
            .join(isa.as_str());
        self.boot_extension_in(&dir)
    }

    fn boot_extension_in(&self, dir: &Path) -> Result<Option<ArtifactPaths>, PathError> {
        let jars = self.config.boot_extension_compilable_jars();
        let Some(first) = jars.first() else {
            return Ok(None);
        };
        let image = boot_image_filename(dir, first)?;
        Ok(Some(ArtifactPaths::for_boot_image(&image)))
    }

    /// The artifacts of one system server jar.
    pub fn system_server(&self, jar: &str) -> Result<ArtifactPaths, PathError> {
        let isa = self.config.compile.system_server_isa;
        let code = side_cache_filename(jar, isa, self.artifact_dir(), ArtifactKind::Code)?;
        Ok(ArtifactPaths::from_oat_path(&code))
    }

    /// The primary boot image for `isa`, which may not exist.
    pub fn primary_boot_image(&self, isa: InstructionSet) -> PathBuf {
        self.config
            .boot_image_dir()
            .join(isa.as_str())
            .join(PRIMARY_BOOT_IMAGE)
    }
}
