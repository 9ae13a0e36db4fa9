//! Profile file locations.

use std::path::PathBuf;

use crate::error::PathError;
use crate::validate::validate_dex_path;

/// The profile shipped beside an archive: `<dex>.prof`.
pub fn prebuilt_profile_path(dex_path: &str) -> Result<PathBuf, PathError> {
    validate_dex_path(dex_path)?;
    Ok(PathBuf::from(format!("{dex_path}.prof")))
}
