//! A single file staged beside its final path.

use std::fs::{File, OpenOptions};
use std::io;
use std::os::fd::{AsRawFd, RawFd};
use std::os::unix::fs::OpenOptionsExt;
use std::path::{Path, PathBuf};

use crate::error::PublishError;
use crate::permission::FsPermission;

const MAX_CREATE_ATTEMPTS: u32 = 16;

#[derive(Debug, Clone, Copy, PartialEq, Eq)]
enum State {
    Staged,
    Committed,
    Abandoned,
    Kept,
}

/// A to-be-published file.
///
/// The file is written at `<final>.<id>.tmp` and only appears at its final
/// path on [`commit_or_abandon`](Self::commit_or_abandon). Dropping a staged
/// file that was neither committed nor kept deletes the temporary file.
#[derive(Debug)]
pub struct StagedFile {
    file: File,
    temp_path: PathBuf,
    final_path: PathBuf,
    id: u32,
    state: State,
}

/// Returns a fresh `<path>.<id>.tmp` sibling name and its id.
pub(crate) fn temp_sibling(path: &Path) -> (PathBuf, u32) {
    let id: u32 = rand::random();
    let mut name = path.as_os_str().to_os_string();
    name.push(format!(".{id:08x}.tmp"));
    (PathBuf::from(name), id)
}

impl StagedFile {
    /// Creates an empty staged file for `final_path` with `permission` applied.
    pub fn create(final_path: &Path, permission: &FsPermission) -> Result<Self, PublishError> {
        permission.validate()?;
        if final_path.file_name().is_none() {
            return Err(PublishError::InvalidPath {
                path: final_path.to_path_buf(),
            });
        }
        let mut attempts = 0;
        let (file, temp_path, id) = loop {
            let (temp_path, id) = temp_sibling(final_path);
            match OpenOptions::new()
                .read(true)
                .write(true)
                .create_new(true)
                .mode(0o600)
                .open(&temp_path)
            {
                Ok(file) => break (file, temp_path, id),
                Err(e) if e.kind() == io::ErrorKind::AlreadyExists => {
                    attempts += 1;
                    if attempts >= MAX_CREATE_ATTEMPTS {
                        return Err(PublishError::io("create", temp_path, e));
                    }
                }
                Err(e) => return Err(PublishError::io("create", temp_path, e)),
            }
        };
        let staged = Self {
            file,
            temp_path,
            final_path: final_path.to_path_buf(),
            id,
            state: State::Staged,
        };
        // On failure `staged` is dropped and removes the temp file.
        permission.apply(&staged.file, &staged.temp_path)?;
        Ok(staged)
    }

    /// The open temporary file.
    pub fn file(&self) -> &File {
        &self.file
    }

    /// The raw descriptor, for handing to a subprocess. It stays owned here.
    pub fn fd(&self) -> RawFd {
        self.file.as_raw_fd()
    }

    /// Where the content is written until commit.
    pub fn temp_path(&self) -> &Path {
        &self.temp_path
    }

    /// Where the content appears on commit.
    pub fn final_path(&self) -> &Path {
        &self.final_path
    }

    /// The disambiguator embedded in the temporary name.
    pub fn id(&self) -> u32 {
        self.id
    }

    /// Current size of the staged content in bytes.
    pub fn size(&self) -> Result<u64, PublishError> {
        self.file
            .metadata()
            .map(|m| m.len())
            .map_err(|e| PublishError::io("fstat", &self.temp_path, e))
    }

    pub(crate) fn is_committed(&self) -> bool {
        self.state == State::Committed
    }

    /// Flushes the content and renames it over the final path.
    ///
    /// On failure the temporary file is removed.
    pub fn commit_or_abandon(mut self) -> Result<(), PublishError> {
        self.commit()
    }

    /// Leaves the temporary file on disk when this value is dropped.
    pub fn keep(&mut self) {
        if self.state == State::Staged {
            self.state = State::Kept;
        }
    }

    pub(crate) fn commit(&mut self) -> Result<(), PublishError> {
        let result = self
            .file
            .sync_all()
            .map_err(|e| PublishError::io("fsync", &self.temp_path, e))
            .and_then(|()| {
                std::fs::rename(&self.temp_path, &self.final_path)
                    .map_err(|e| PublishError::io("rename", &self.final_path, e))
            });
        match result {
            Ok(()) => {
                self.state = State::Committed;
                Ok(())
            }
            Err(e) => {
                self.abandon();
                Err(e)
            }
        }
    }

    fn abandon(&mut self) {
        if self.state != State::Staged {
            return;
        }
        self.state = State::Abandoned;
        match std::fs::remove_file(&self.temp_path) {
            Ok(()) => {}
            Err(e) if e.kind() == io::ErrorKind::NotFound => {}
            Err(e) => log::warn!("failed to remove {}: {e}", self.temp_path.display()),
        }
    }
}

impl Drop for StagedFile {
    fn drop(&mut self) {
        self.abandon();
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use std::io::Write;
    use std::os::unix::fs::PermissionsExt;

    fn entries(dir: &Path) -> Vec<String> {
        let mut names: Vec<_> = std::fs::read_dir(dir)
            .unwrap()
            .map(|e| e.unwrap().file_name().to_string_lossy().into_owned())
            .collect();
        names.sort();
        names
    }

    #[test]
    fn temp_name_is_beside_final() {
        let dir = tempfile::tempdir().unwrap();
        let final_path = dir.path().join("b.odex");
        let staged = StagedFile::create(&final_path, &FsPermission::default()).unwrap();
        let temp = staged.temp_path().to_string_lossy().into_owned();
        assert!(temp.starts_with(&*final_path.to_string_lossy()));
        assert!(temp.ends_with(".tmp"));
        assert!(temp.contains(&format!(".{:08x}.", staged.id())));
        assert!(staged.temp_path().exists());
        assert!(!final_path.exists());
    }

    #[test]
    fn commit_publishes_content_with_mode() {
        let dir = tempfile::tempdir().unwrap();
        let final_path = dir.path().join("b.vdex");
        let staged = StagedFile::create(&final_path, &FsPermission::world_readable()).unwrap();
        (&*staged.file()).write_all(b"vdex").unwrap();
        assert_eq!(staged.size().unwrap(), 4);
        staged.commit_or_abandon().unwrap();
        assert_eq!(std::fs::read(&final_path).unwrap(), b"vdex");
        let mode = std::fs::metadata(&final_path).unwrap().permissions().mode();
        assert_eq!(mode & 0o777, 0o644);
        assert_eq!(entries(dir.path()), vec!["b.vdex"]);
    }

    #[test]
    fn commit_replaces_existing_file() {
        let dir = tempfile::tempdir().unwrap();
        let final_path = dir.path().join("b.odex");
        std::fs::write(&final_path, b"old").unwrap();
        let staged = StagedFile::create(&final_path, &FsPermission::default()).unwrap();
        (&*staged.file()).write_all(b"new").unwrap();
        staged.commit_or_abandon().unwrap();
        assert_eq!(std::fs::read(&final_path).unwrap(), b"new");
    }

    #[test]
    fn drop_without_commit_removes_temp() {
        let dir = tempfile::tempdir().unwrap();
        let final_path = dir.path().join("b.odex");
        {
            let staged = StagedFile::create(&final_path, &FsPermission::default()).unwrap();
            (&*staged.file()).write_all(b"partial").unwrap();
        }
        assert!(entries(dir.path()).is_empty());
    }

    #[test]
    fn keep_leaves_temp() {
        let dir = tempfile::tempdir().unwrap();
        let final_path = dir.path().join("b.odex");
        let temp = {
            let mut staged = StagedFile::create(&final_path, &FsPermission::default()).unwrap();
            staged.keep();
            staged.temp_path().to_path_buf()
        };
        assert!(temp.exists());
        assert!(!final_path.exists());
    }

    #[test]
    fn failed_commit_cleans_up() {
        let dir = tempfile::tempdir().unwrap();
        let final_path = dir.path().join("b.odex");
        std::fs::create_dir(&final_path).unwrap();
        std::fs::write(final_path.join("occupied"), b"x").unwrap();
        let staged = StagedFile::create(&final_path, &FsPermission::default()).unwrap();
        let temp = staged.temp_path().to_path_buf();
        assert!(staged.commit_or_abandon().is_err());
        assert!(!temp.exists());
    }

    #[test]
    fn missing_parent_fails_to_create() {
        let dir = tempfile::tempdir().unwrap();
        let final_path = dir.path().join("missing").join("b.odex");
        assert!(matches!(
            StagedFile::create(&final_path, &FsPermission::default()),
            Err(PublishError::Io { op: "create", .. })
        ));
    }

    #[test]
    fn rejects_half_ownership() {
        let dir = tempfile::tempdir().unwrap();
        let perm = FsPermission {
            gid: Some(1000),
            ..Default::default()
        };
        assert!(StagedFile::create(&dir.path().join("b.odex"), &perm).is_err());
        assert!(entries(dir.path()).is_empty());
    }
}
