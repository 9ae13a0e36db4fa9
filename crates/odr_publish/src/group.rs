//! All-or-nothing commit of several staged files plus deletions.

use std::io;
use std::path::{Path, PathBuf};

use crate::error::PublishError;
use crate::staged::{temp_sibling, StagedFile};

/// Commits every file in `files` and removes every path in `to_remove`, or
/// leaves all of their final paths exactly as they were.
///
/// Existing files at the affected paths are first renamed aside, then the
/// staged files are committed, and only then are the set-aside originals
/// deleted. If anything fails before that point, committed files are
/// removed, the rest are abandoned and the originals are renamed back. A
/// failure to restore an original is logged; there is nothing further to do.
///
/// Not safe to call concurrently for overlapping paths. Callers serialize
/// group commits over the same artifact set.
pub fn commit_all_or_abandon(
    mut files: Vec<StagedFile>,
    to_remove: &[PathBuf],
) -> Result<(), PublishError> {
    let mut moved_aside: Vec<(PathBuf, PathBuf)> = Vec::new();
    match move_aside_and_commit(&mut files, to_remove, &mut moved_aside) {
        Ok(()) => {
            for (_, aside) in &moved_aside {
                if let Err(e) = std::fs::remove_file(aside) {
                    log::warn!("failed to remove {}: {e}", aside.display());
                }
            }
            Ok(())
        }
        Err(err) => {
            for file in files.iter().filter(|f| f.is_committed()) {
                if let Err(e) = std::fs::remove_file(file.final_path()) {
                    log::error!("failed to remove {}: {e}", file.final_path().display());
                }
            }
            // Abandons everything not yet committed.
            drop(files);
            for (original, aside) in moved_aside.iter().rev() {
                if let Err(e) = std::fs::rename(aside, original) {
                    log::error!(
                        "failed to restore {} from {}: {e}",
                        original.display(),
                        aside.display()
                    );
                }
            }
            Err(err)
        }
    }
}

fn move_aside_and_commit(
    files: &mut [StagedFile],
    to_remove: &[PathBuf],
    moved_aside: &mut Vec<(PathBuf, PathBuf)>,
) -> Result<(), PublishError> {
    let finals: Vec<PathBuf> = files.iter().map(|f| f.final_path().to_path_buf()).collect();
    for path in finals.iter().chain(to_remove) {
        if let Some(aside) = move_aside(path)? {
            moved_aside.push((path.clone(), aside));
        }
    }
    for file in files.iter_mut() {
        file.commit()?;
    }
    Ok(())
}

/// Renames an existing file at `path` to a temporary sibling.
fn move_aside(path: &Path) -> Result<Option<PathBuf>, PublishError> {
    match std::fs::symlink_metadata(path) {
        Ok(meta) if meta.is_dir() => Err(PublishError::IsDirectory {
            path: path.to_path_buf(),
        }),
        Ok(_) => {
            let (aside, _) = temp_sibling(path);
            std::fs::rename(path, &aside).map_err(|e| PublishError::io("rename", path, e))?;
            Ok(Some(aside))
        }
        Err(e) if e.kind() == io::ErrorKind::NotFound => Ok(None),
        Err(e) => Err(PublishError::io("stat", path, e)),
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::permission::FsPermission;
    use std::io::Write;

    fn stage(path: &Path, content: &[u8]) -> StagedFile {
        let staged = StagedFile::create(path, &FsPermission::default()).unwrap();
        (&*staged.file()).write_all(content).unwrap();
        staged
    }

    fn entries(dir: &Path) -> Vec<String> {
        let mut names: Vec<_> = std::fs::read_dir(dir)
            .unwrap()
            .map(|e| e.unwrap().file_name().to_string_lossy().into_owned())
            .collect();
        names.sort();
        names
    }

    #[test]
    fn commits_new_files() {
        let dir = tempfile::tempdir().unwrap();
        let p1 = dir.path().join("b.odex");
        let p2 = dir.path().join("b.vdex");
        let files = vec![stage(&p1, b"odex"), stage(&p2, b"vdex")];
        commit_all_or_abandon(files, &[]).unwrap();
        assert_eq!(std::fs::read(&p1).unwrap(), b"odex");
        assert_eq!(std::fs::read(&p2).unwrap(), b"vdex");
        assert_eq!(entries(dir.path()), vec!["b.odex", "b.vdex"]);
    }

    #[test]
    fn replaces_existing_and_removes_requested() {
        let dir = tempfile::tempdir().unwrap();
        let p1 = dir.path().join("b.odex");
        let p2 = dir.path().join("b.vdex");
        let stale = dir.path().join("b.art");
        for (path, content) in [(&p1, "old odex"), (&p2, "old vdex"), (&stale, "old art")] {
            std::fs::write(path, content).unwrap();
        }
        let files = vec![stage(&p1, b"new odex"), stage(&p2, b"new vdex")];
        commit_all_or_abandon(files, &[stale.clone()]).unwrap();
        assert_eq!(std::fs::read(&p1).unwrap(), b"new odex");
        assert_eq!(std::fs::read(&p2).unwrap(), b"new vdex");
        assert!(!stale.exists());
        assert_eq!(entries(dir.path()), vec!["b.odex", "b.vdex"]);
    }

    #[test]
    fn removing_missing_path_is_fine() {
        let dir = tempfile::tempdir().unwrap();
        let p1 = dir.path().join("b.odex");
        let absent = dir.path().join("b.art");
        commit_all_or_abandon(vec![stage(&p1, b"odex")], &[absent]).unwrap();
        assert_eq!(entries(dir.path()), vec!["b.odex"]);
    }

    #[test]
    fn failed_commit_restores_originals() {
        let dir = tempfile::tempdir().unwrap();
        let p1 = dir.path().join("b.odex");
        let p2 = dir.path().join("b.vdex");
        std::fs::write(&p1, b"original odex").unwrap();
        std::fs::write(&p2, b"original vdex").unwrap();

        let f1 = stage(&p1, b"new odex");
        let f2 = stage(&p2, b"new vdex");
        // Make f2's rename fail after f1 has been committed.
        std::fs::remove_file(f2.temp_path()).unwrap();

        assert!(commit_all_or_abandon(vec![f1, f2], &[]).is_err());
        assert_eq!(std::fs::read(&p1).unwrap(), b"original odex");
        assert_eq!(std::fs::read(&p2).unwrap(), b"original vdex");
        assert_eq!(entries(dir.path()), vec!["b.odex", "b.vdex"]);
    }

    #[test]
    fn failed_commit_leaves_no_new_paths() {
        let dir = tempfile::tempdir().unwrap();
        let p1 = dir.path().join("b.odex");
        let p2 = dir.path().join("b.vdex");
        let f1 = stage(&p1, b"new odex");
        let f2 = stage(&p2, b"new vdex");
        std::fs::remove_file(f2.temp_path()).unwrap();

        assert!(commit_all_or_abandon(vec![f1, f2], &[]).is_err());
        assert!(entries(dir.path()).is_empty());
    }

    #[test]
    fn directory_in_the_way_aborts_everything() {
        let dir = tempfile::tempdir().unwrap();
        let p1 = dir.path().join("b.odex");
        let blocked = dir.path().join("b.art");
        std::fs::write(&p1, b"original odex").unwrap();
        std::fs::create_dir(&blocked).unwrap();

        let err = commit_all_or_abandon(vec![stage(&p1, b"new odex")], &[blocked.clone()])
            .unwrap_err();
        assert!(matches!(err, PublishError::IsDirectory { .. }));
        assert_eq!(std::fs::read(&p1).unwrap(), b"original odex");
        assert!(blocked.is_dir());
        assert_eq!(entries(dir.path()), vec!["b.art", "b.odex"]);
    }
}
