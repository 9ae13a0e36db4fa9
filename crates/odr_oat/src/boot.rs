//! Boot image state, gathered once per run.

use std::collections::BTreeMap;
use std::path::Path;

use odr_common::{ContentHash, InstructionSet};

use crate::checksum::{format_checksums, DexChecksumSource};
use crate::error::OatError;

/// Name of the primary boot image inside `<image_dir>/<isa>/`.
const PRIMARY_BOOT_IMAGE: &str = "boot.art";

/// Boot classpath checksums for one instruction set.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct BootImageInfo {
    /// `i;<jars>/<checksum>` when a primary boot image is present.
    pub image_checksums: Option<String>,
    /// `d/<checksums>` for each boot classpath jar, joined by `:`.
    pub dex_checksums: String,
}

impl BootImageInfo {
    /// Returns `true` if the primary boot image can be used.
    pub fn primary_boot_image_usable(&self) -> bool {
        self.image_checksums.is_some()
    }

    /// Returns `true` if an artifact recording `recorded` was compiled
    /// against the current boot classpath, in either form.
    pub fn matches(&self, recorded: &str) -> bool {
        self.image_checksums.as_deref() == Some(recorded) || self.dex_checksums == recorded
    }
}

/// Boot image information for every instruction set of a run.
///
/// Built once by [`fetch`](Self::fetch) and read-only afterwards, so one
/// context can be shared by reference across all staleness checks of a run.
#[derive(Debug, Clone, Default)]
pub struct BootImageContext {
    infos: BTreeMap<InstructionSet, BootImageInfo>,
}

impl BootImageContext {
    /// Builds a context from already computed infos.
    pub fn from_infos(infos: impl IntoIterator<Item = (InstructionSet, BootImageInfo)>) -> Self {
        Self {
            infos: infos.into_iter().collect(),
        }
    }

    /// Computes boot classpath checksums for every ISA in `isas`.
    ///
    /// The primary boot image for an ISA is `<image_dir>/<isa>/boot.art`.
    pub fn fetch(
        isas: &[InstructionSet],
        boot_classpath: &[String],
        image_dir: &Path,
        checksums: &dyn DexChecksumSource,
    ) -> Result<Self, OatError> {
        let mut dex_parts = Vec::with_capacity(boot_classpath.len());
        for jar in boot_classpath {
            let info = checksums.dex_file_info(Path::new(jar))?;
            dex_parts.push(format!("d/{}", format_checksums(&info.checksums)));
        }
        let dex_checksums = dex_parts.join(":");

        let mut infos = BTreeMap::new();
        for &isa in isas {
            let image = image_dir.join(isa.as_str()).join(PRIMARY_BOOT_IMAGE);
            let image_checksums = match std::fs::File::open(&image) {
                Ok(file) => {
                    let hash = ContentHash::from_reader(std::io::BufReader::new(file)).map_err(
                        |e| OatError::Io {
                            path: image.clone(),
                            source: e,
                        },
                    )?;
                    Some(format!(
                        "i;{}/{:08x}",
                        boot_classpath.len(),
                        hash.checksum32()
                    ))
                }
                Err(e) => {
                    log::debug!("no primary boot image at {}: {e}", image.display());
                    None
                }
            };
            infos.insert(
                isa,
                BootImageInfo {
                    image_checksums,
                    dex_checksums: dex_checksums.clone(),
                },
            );
        }
        Ok(Self { infos })
    }

    /// Returns the info for `isa`, if it was fetched.
    pub fn get(&self, isa: InstructionSet) -> Option<&BootImageInfo> {
        self.infos.get(&isa)
    }

    /// Returns `true` if `recorded` matches the boot classpath of `isa`.
    pub fn matches(&self, isa: InstructionSet, recorded: &str) -> bool {
        self.get(isa).is_some_and(|info| info.matches(recorded))
    }

    /// Returns `true` if a primary boot image is usable for `isa`.
    pub fn primary_boot_image_usable(&self, isa: InstructionSet) -> bool {
        self.get(isa)
            .is_some_and(BootImageInfo::primary_boot_image_usable)
    }
}
