//! Ownership and mode of published files.

use std::fs::{File, Permissions};
use std::os::unix::fs::PermissionsExt;
use std::path::Path;

use crate::error::PublishError;

/// Ownership and visibility requested for an artifact.
///
/// Files are always `u+rw g+r`; `other_readable` and `other_executable`
/// add the matching bits for everyone else. Ownership is changed only when
/// both `uid` and `gid` are given.
#[derive(Debug, Clone, Copy, Default, PartialEq, Eq)]
pub struct FsPermission {
    /// Owning user, or `None` to keep the creating user.
    pub uid: Option<u32>,
    /// Owning group, or `None` to keep the creating group.
    pub gid: Option<u32>,
    /// Whether other users may read.
    pub other_readable: bool,
    /// Whether other users may execute (for directories, traverse).
    pub other_executable: bool,
}

impl FsPermission {
    /// World-readable files owned by the current user.
    pub fn world_readable() -> Self {
        Self {
            other_readable: true,
            ..Self::default()
        }
    }

    /// Mode bits for a file.
    pub fn file_mode(&self) -> u32 {
        let mut mode = 0o640;
        if self.other_readable {
            mode |= 0o004;
        }
        if self.other_executable {
            mode |= 0o001;
        }
        mode
    }

    /// Mode bits for a directory: the file mode plus `u+x g+x`.
    pub fn dir_mode(&self) -> u32 {
        self.file_mode() | 0o110
    }

    /// Rejects a uid without a gid and vice versa.
    pub fn validate(&self) -> Result<(), PublishError> {
        if self.uid.is_some() != self.gid.is_some() {
            return Err(PublishError::InvalidPermission {
                reason: format!(
                    "uid and gid must be given together (uid: {:?}, gid: {:?})",
                    self.uid, self.gid
                ),
            });
        }
        Ok(())
    }

    /// Applies mode and ownership to an open file.
    pub(crate) fn apply(&self, file: &File, path: &Path) -> Result<(), PublishError> {
        file.set_permissions(Permissions::from_mode(self.file_mode()))
            .map_err(|e| PublishError::io("fchmod", path, e))?;
        if let (Some(uid), Some(gid)) = (self.uid, self.gid) {
            std::os::unix::fs::fchown(file, Some(uid), Some(gid))
                .map_err(|e| PublishError::io("fchown", path, e))?;
        }
        Ok(())
    }
}

/// Creates `dir` (and missing parents) and applies the directory mode of
/// `permission` to the leaf.
pub fn create_dir_with_permission(dir: &Path, permission: &FsPermission) -> Result<(), PublishError> {
    permission.validate()?;
    std::fs::create_dir_all(dir).map_err(|e| PublishError::io("mkdir", dir, e))?;
    std::fs::set_permissions(dir, Permissions::from_mode(permission.dir_mode()))
        .map_err(|e| PublishError::io("chmod", dir, e))?;
    if let (Some(uid), Some(gid)) = (permission.uid, permission.gid) {
        std::os::unix::fs::chown(dir, Some(uid), Some(gid))
            .map_err(|e| PublishError::io("chown", dir, e))?;
    }
    Ok(())
}
