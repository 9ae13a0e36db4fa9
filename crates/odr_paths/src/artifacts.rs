//! Artifact file naming.
//!
//! Two layouts exist. Beside the source, artifacts live in `oat/<isa>/`
//! next to the archive with the extension swapped. In a cache directory, the
//! source path is flattened into one file name by dropping the leading `/`
//! and replacing every other `/` with `@`, so
//! `/system/framework/services.jar` becomes
//! `system@framework@services.jar@classes.dex`.

use std::path::{Path, PathBuf};

use odr_common::InstructionSet;

use crate::error::PathError;
use crate::validate::{validate_absolute_normal_path, validate_dex_path};

/// One of the three files a compilation unit produces.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash)]
pub enum ArtifactKind {
    /// The image file (`.art`).
    Image,
    /// The code file (`.odex` or `.oat`).
    Code,
    /// The verification metadata file (`.vdex`).
    Metadata,
}

impl ArtifactKind {
    /// The extension used in a side cache or beside the source.
    pub fn extension(&self) -> &'static str {
        match self {
            ArtifactKind::Image => "art",
            ArtifactKind::Code => "odex",
            ArtifactKind::Metadata => "vdex",
        }
    }
}

/// Replaces the extension of the last path component, or appends one.
pub fn replace_file_extension(path: &str, new_ext: &str) -> String {
    let name_start = path.rfind('/').map_or(0, |i| i + 1);
    match path[name_start..].rfind('.') {
        Some(dot) => format!("{}.{new_ext}", &path[..name_start + dot]),
        None => format!("{path}.{new_ext}"),
    }
}

/// Returns `<dir>/oat/<isa>/<stem>.odex` for a source at `<dir>/<stem>.<ext>`.
pub fn odex_filename(location: &str, isa: InstructionSet) -> Result<PathBuf, PathError> {
    validate_absolute_normal_path(location)?;
    let unmappable = |reason| PathError::Unmappable {
        path: location.to_string(),
        reason,
    };
    let slash = location.rfind('/').ok_or_else(|| unmappable("no directory"))?;
    let (dir, file) = (&location[..slash], &location[slash + 1..]);
    let dot = file.rfind('.').ok_or_else(|| unmappable("no extension"))?;
    let stem = &file[..dot];
    Ok(PathBuf::from(format!(
        "{dir}/oat/{isa}/{stem}.{}",
        ArtifactKind::Code.extension()
    )))
}

/// Returns the per-ISA cache directory `<root>/dalvik-cache/<isa>`.
pub fn dalvik_cache_location(root: &Path, isa: InstructionSet) -> PathBuf {
    root.join("dalvik-cache").join(isa.as_str())
}

/// Flattens `location` into a file name inside `cache_dir`.
///
/// Archives get `/classes.dex` appended before flattening, so the result for
/// `/a/b.apk` is `<cache_dir>/a@b.apk@classes.dex`.
pub fn dalvik_cache_filename(location: &str, cache_dir: &Path) -> Result<PathBuf, PathError> {
    validate_absolute_normal_path(location)?;
    let mut name = location[1..].to_string();
    if name.is_empty() {
        return Err(PathError::Unmappable {
            path: location.to_string(),
            reason: "no file name",
        });
    }
    if !name.ends_with(".dex") && !name.ends_with(".art") && !name.ends_with(".oat") {
        name.push_str("/classes.dex");
    }
    Ok(cache_dir.join(name.replace('/', "@")))
}

/// Returns the side-cache file for `location` with the extension of `kind`.
///
/// The side cache holds artifacts compiled on device for system-owned
/// inputs, laid out as `<artifact_dir>/<isa>/<flattened>.{odex,vdex,art}`.
pub fn side_cache_filename(
    location: &str,
    isa: InstructionSet,
    artifact_dir: &Path,
    kind: ArtifactKind,
) -> Result<PathBuf, PathError> {
    let flat = dalvik_cache_filename(location, &artifact_dir.join(isa.as_str()))?;
    Ok(PathBuf::from(replace_file_extension(
        &flat.to_string_lossy(),
        kind.extension(),
    )))
}

/// Returns the boot image extension named after `jar`:
/// `<cache_dir>/boot-<stem>.art`.
pub fn boot_image_filename(cache_dir: &Path, jar: &str) -> Result<PathBuf, PathError> {
    validate_absolute_normal_path(jar)?;
    let file = jar.rsplit('/').next().unwrap_or(jar);
    let stem = replace_file_extension(file, ArtifactKind::Image.extension());
    Ok(cache_dir.join(format!("boot-{stem}")))
}

/// Returns where the code artifact for `dex_path` lives.
///
/// With `in_dalvik_cache` the path is inside `<root>/dalvik-cache/<isa>`,
/// otherwise it is the odex beside the source.
pub fn build_oat_path(
    dex_path: &str,
    isa: InstructionSet,
    in_dalvik_cache: bool,
    root: &Path,
) -> Result<PathBuf, PathError> {
    validate_dex_path(dex_path)?;
    if in_dalvik_cache {
        dalvik_cache_filename(dex_path, &dalvik_cache_location(root, isa))
    } else {
        odex_filename(dex_path, isa)
    }
}

/// Prefers an existing side-cache code artifact over the dalvik-cache one.
///
/// Returns the side-cache path when that file exists and side-cache access
/// is not denied; otherwise the dalvik-cache path under `root`.
pub fn side_cache_oat_path(
    dex_path: &str,
    isa: InstructionSet,
    root: &Path,
    artifact_dir: &Path,
    deny_side_cache: bool,
) -> Result<PathBuf, PathError> {
    if !deny_side_cache {
        let side = side_cache_filename(dex_path, isa, artifact_dir, ArtifactKind::Code)?;
        if side.exists() {
            return Ok(side);
        }
    }
    build_oat_path(dex_path, isa, true, root)
}

/// Swaps a code artifact path to its `.vdex` companion.
pub fn oat_path_to_vdex_path(oat_path: &Path) -> PathBuf {
    PathBuf::from(replace_file_extension(&oat_path.to_string_lossy(), "vdex"))
}

/// Swaps a code artifact path to its `.art` companion.
pub fn oat_path_to_art_path(oat_path: &Path) -> PathBuf {
    PathBuf::from(replace_file_extension(&oat_path.to_string_lossy(), "art"))
}

/// Returns the metadata bundle that may ship beside `dex_path`.
pub fn dm_path(dex_path: &str) -> Result<PathBuf, PathError> {
    validate_dex_path(dex_path)?;
    Ok(PathBuf::from(replace_file_extension(dex_path, "dm")))
}

/// The three files produced by one compilation unit.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct ArtifactPaths {
    /// The image file.
    pub image: PathBuf,
    /// The code file.
    pub code: PathBuf,
    /// The verification metadata file.
    pub metadata: PathBuf,
}

impl ArtifactPaths {
    /// Derives the triple from the code file path.
    pub fn from_oat_path(oat_path: &Path) -> Self {
        Self {
            image: oat_path_to_art_path(oat_path),
            code: oat_path.to_path_buf(),
            metadata: oat_path_to_vdex_path(oat_path),
        }
    }

    /// Derives the triple from a boot image extension path (`boot-*.art`).
    pub fn for_boot_image(image_path: &Path) -> Self {
        let image = image_path.to_string_lossy();
        Self {
            image: image_path.to_path_buf(),
            code: PathBuf::from(replace_file_extension(&image, "oat")),
            metadata: PathBuf::from(replace_file_extension(&image, "vdex")),
        }
    }

    /// Returns the path for one artifact kind.
    pub fn get(&self, kind: ArtifactKind) -> &Path {
        match kind {
            ArtifactKind::Image => &self.image,
            ArtifactKind::Code => &self.code,
            ArtifactKind::Metadata => &self.metadata,
        }
    }

    /// Iterates over all three paths.
    pub fn iter(&self) -> impl Iterator<Item = &Path> {
        [
            self.image.as_path(),
            self.code.as_path(),
            self.metadata.as_path(),
        ]
        .into_iter()
    }
}
