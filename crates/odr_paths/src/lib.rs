//! Deterministic mapping from compilation inputs to artifact paths.
//!
//! Every function here is pure: the same source location, instruction set
//! and roots always produce the same path, and malformed inputs (empty,
//! relative or non-normalized paths) are rejected with a [`PathError`] rather
//! than coerced. The only exception is [`side_cache_oat_path`], which looks at
//! the file system to prefer an existing side-cache artifact.

#![warn(missing_docs)]

pub mod artifacts;
pub mod error;
pub mod profile;
pub mod validate;

pub use artifacts::{
    boot_image_filename, build_oat_path, dalvik_cache_filename, dalvik_cache_location, dm_path,
    odex_filename, oat_path_to_art_path, oat_path_to_vdex_path, replace_file_extension,
    side_cache_filename, side_cache_oat_path, ArtifactKind, ArtifactPaths,
};
pub use error::PathError;
pub use profile::prebuilt_profile_path;
pub use validate::{validate_absolute_normal_path, validate_dex_path};
