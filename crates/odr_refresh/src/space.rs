//! Free space on the artifact partition.

use std::ffi::CString;
use std::os::unix::ffi::OsStrExt;
use std::path::Path;

use crate::error::RefreshError;

/// Space that must be free before compiling. Compiled artifacts of the
/// system server and boot extensions take up to this much.
pub const MIN_FREE_BYTES: u64 = 48 << 20;

/// Bytes available to unprivileged writers on the filesystem of `path`.
pub fn available_bytes(path: &Path) -> Result<u64, RefreshError> {
    let io_err = |source| RefreshError::Io {
        path: path.to_path_buf(),
        source,
    };
    let c_path = CString::new(path.as_os_str().as_bytes()).map_err(|_| {
        io_err(std::io::Error::new(
            std::io::ErrorKind::InvalidInput,
            "path contains a NUL byte",
        ))
    })?;
    // SAFETY: statvfs is plain old data and fully written on success.
    let mut stat: libc::statvfs = unsafe { std::mem::zeroed() };
    // SAFETY: c_path is NUL-terminated and stat is a valid out pointer.
    if unsafe { libc::statvfs(c_path.as_ptr(), &mut stat) } != 0 {
        return Err(io_err(std::io::Error::last_os_error()));
    }
    Ok(u64::from(stat.f_bavail).saturating_mul(u64::from(stat.f_frsize)))
}

/// Fails unless at least `required` bytes are free at `path`.
pub fn ensure_available(path: &Path, required: u64) -> Result<(), RefreshError> {
    let available = available_bytes(path)?;
    log::debug!("{available} bytes free at {}", path.display());
    if available < required {
        return Err(RefreshError::InsufficientSpace {
            available,
            required,
        });
    }
    Ok(())
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn temp_dir_has_space() {
        let dir = tempfile::tempdir().unwrap();
        assert!(available_bytes(dir.path()).unwrap() > 0);
        ensure_available(dir.path(), 1).unwrap();
    }

    #[test]
    fn impossible_requirement_fails() {
        let dir = tempfile::tempdir().unwrap();
        let err = ensure_available(dir.path(), u64::MAX).unwrap_err();
        assert!(matches!(err, RefreshError::InsufficientSpace { .. }));
    }

    #[test]
    fn missing_path_is_io_error() {
        let dir = tempfile::tempdir().unwrap();
        let err = available_bytes(&dir.path().join("absent")).unwrap_err();
        assert!(matches!(err, RefreshError::Io { .. }));
    }
}
