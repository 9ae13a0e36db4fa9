//! Removal of artifacts that no check vouched for.

use std::collections::BTreeSet;
use std::io::ErrorKind;
use std::path::{Path, PathBuf};

use crate::error::RefreshError;

/// Removes every file below `dir` that is not in `keep`.
///
/// Directories are kept so compilations can write into them again. A
/// missing `dir` is not an error.
pub fn remove_unexpected(dir: &Path, keep: &BTreeSet<PathBuf>) -> Result<usize, RefreshError> {
    let entries = match std::fs::read_dir(dir) {
        Ok(entries) => entries,
        Err(e) if e.kind() == ErrorKind::NotFound => return Ok(0),
        Err(e) => {
            return Err(RefreshError::Io {
                path: dir.to_path_buf(),
                source: e,
            })
        }
    };
    let io_err = |path: &Path, source| RefreshError::Io {
        path: path.to_path_buf(),
        source,
    };

    let mut removed = 0;
    for entry in entries {
        let entry = entry.map_err(|e| io_err(dir, e))?;
        let path = entry.path();
        let file_type = entry.file_type().map_err(|e| io_err(&path, e))?;
        if file_type.is_dir() {
            removed += remove_unexpected(&path, keep)?;
        } else if !keep.contains(&path) {
            log::debug!("removing unexpected file {}", path.display());
            std::fs::remove_file(&path).map_err(|e| io_err(&path, e))?;
            removed += 1;
        }
    }
    Ok(removed)
}

/// Removes `dir` and everything below it. A missing `dir` is not an error.
pub fn remove_dir(dir: &Path) -> Result<(), RefreshError> {
    match std::fs::remove_dir_all(dir) {
        Ok(()) => {
            log::info!("removed {}", dir.display());
            Ok(())
        }
        Err(e) if e.kind() == ErrorKind::NotFound => Ok(()),
        Err(e) => Err(RefreshError::Io {
            path: dir.to_path_buf(),
            source: e,
        }),
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn removes_only_unlisted_files() {
        let dir = tempfile::tempdir().unwrap();
        let arm64 = dir.path().join("arm64");
        std::fs::create_dir(&arm64).unwrap();
        let kept = arm64.join("boot-framework.oat");
        let stale = arm64.join("boot-old.oat");
        let manifest = dir.path().join("cache-info.json");
        for path in [&kept, &stale, &manifest] {
            std::fs::write(path, b"x").unwrap();
        }

        let keep = BTreeSet::from([kept.clone(), manifest.clone()]);
        assert_eq!(remove_unexpected(dir.path(), &keep).unwrap(), 1);
        assert!(kept.exists());
        assert!(manifest.exists());
        assert!(!stale.exists());
        assert!(arm64.is_dir());
    }

    #[test]
    fn missing_directory_is_clean() {
        let dir = tempfile::tempdir().unwrap();
        let absent = dir.path().join("absent");
        assert_eq!(remove_unexpected(&absent, &BTreeSet::new()).unwrap(), 0);
        remove_dir(&absent).unwrap();
    }

    #[test]
    fn remove_dir_removes_tree() {
        let dir = tempfile::tempdir().unwrap();
        let root = dir.path().join("dalvik-cache");
        std::fs::create_dir_all(root.join("arm64")).unwrap();
        std::fs::write(root.join("arm64").join("a.odex"), b"x").unwrap();
        remove_dir(&root).unwrap();
        assert!(!root.exists());
    }
}
