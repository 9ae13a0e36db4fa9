//! JSON state files, read tolerantly and replaced atomically.

use std::io::Write;
use std::path::Path;

use odr_publish::{FsPermission, StagedFile};
use serde::de::DeserializeOwned;
use serde::Serialize;

use crate::error::CacheError;

/// Reads `path` as JSON. A missing file is `Ok(None)`; a file that exists
/// but does not parse is [`CacheError::Parse`].
pub fn read_json<T: DeserializeOwned>(path: &Path) -> Result<Option<T>, CacheError> {
    let content = match std::fs::read_to_string(path) {
        Ok(content) => content,
        Err(e) if e.kind() == std::io::ErrorKind::NotFound => return Ok(None),
        Err(e) => {
            return Err(CacheError::Io {
                path: path.to_path_buf(),
                source: e,
            })
        }
    };
    serde_json::from_str(&content)
        .map(Some)
        .map_err(|e| CacheError::Parse {
            path: path.to_path_buf(),
            reason: e.to_string(),
        })
}

/// Writes `value` to `path` through a staged file, creating the parent
/// directory if needed. Readers see either the old or the new content.
pub fn write_json<T: Serialize>(path: &Path, value: &T) -> Result<(), CacheError> {
    if let Some(parent) = path.parent() {
        std::fs::create_dir_all(parent).map_err(|e| CacheError::Io {
            path: parent.to_path_buf(),
            source: e,
        })?;
    }
    let json = serde_json::to_string_pretty(value).map_err(|e| CacheError::Serialization {
        reason: e.to_string(),
    })?;
    let staged = StagedFile::create(path, &FsPermission::world_readable())?;
    staged
        .file()
        .write_all(json.as_bytes())
        .map_err(|e| CacheError::Io {
            path: staged.temp_path().to_path_buf(),
            source: e,
        })?;
    staged.commit_or_abandon()?;
    Ok(())
}
