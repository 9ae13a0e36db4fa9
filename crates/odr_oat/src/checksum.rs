//! Bytecode checksums of source archives.

use std::path::Path;

use odr_common::ContentHash;

use crate::error::OatError;

/// What the staleness engine needs to know about a source archive.
#[derive(Debug, Clone, Default, PartialEq, Eq)]
pub struct DexFileInfo {
    /// Checksums of the dex files in the archive, in order. Empty for an
    /// archive without code.
    pub checksums: Vec<u32>,
    /// Whether every dex file is stored uncompressed, so it can be mapped
    /// directly instead of being extracted into the artifact.
    pub uncompressed: bool,
}

impl DexFileInfo {
    /// Returns `true` if the archive contains dex code.
    pub fn has_dex_code(&self) -> bool {
        !self.checksums.is_empty()
    }
}

/// Supplies dex checksums for source archives.
pub trait DexChecksumSource {
    /// Inspects the archive at `path`.
    fn dex_file_info(&self, path: &Path) -> Result<DexFileInfo, OatError>;
}

/// Fingerprints whole archives with XXH3 in place of per-dex checksums.
///
/// Any byte change to the archive changes the checksum. An empty archive is
/// treated as having no dex code.
#[derive(Debug, Clone, Copy, Default)]
pub struct ContentChecksums;

impl DexChecksumSource for ContentChecksums {
    fn dex_file_info(&self, path: &Path) -> Result<DexFileInfo, OatError> {
        let io_err = |e| OatError::Io {
            path: path.to_path_buf(),
            source: e,
        };
        let file = std::fs::File::open(path).map_err(io_err)?;
        let len = file.metadata().map_err(io_err)?.len();
        if len == 0 {
            return Ok(DexFileInfo::default());
        }
        let hash = ContentHash::from_reader(std::io::BufReader::new(file)).map_err(io_err)?;
        Ok(DexFileInfo {
            checksums: vec![hash.checksum32()],
            uncompressed: false,
        })
    }
}

/// Formats checksums as `%08x` joined by `;`.
pub fn format_checksums(checksums: &[u32]) -> String {
    checksums
        .iter()
        .map(|c| format!("{c:08x}"))
        .collect::<Vec<_>>()
        .join(";")
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn formatting() {
        assert_eq!(format_checksums(&[]), "");
        assert_eq!(format_checksums(&[0xab]), "000000ab");
        assert_eq!(format_checksums(&[1, 0xdeadbeef]), "00000001;deadbeef");
    }

    #[test]
    fn content_checksums_track_content() {
        let dir = tempfile::tempdir().unwrap();
        let jar = dir.path().join("services.jar");
        std::fs::write(&jar, b"v1").unwrap();
        let first = ContentChecksums.dex_file_info(&jar).unwrap();
        assert!(first.has_dex_code());
        assert_eq!(first, ContentChecksums.dex_file_info(&jar).unwrap());

        std::fs::write(&jar, b"v2").unwrap();
        assert_ne!(first, ContentChecksums.dex_file_info(&jar).unwrap());
    }

    #[test]
    fn empty_archive_has_no_code() {
        let dir = tempfile::tempdir().unwrap();
        let apk = dir.path().join("res.apk");
        std::fs::write(&apk, b"").unwrap();
        assert!(!ContentChecksums.dex_file_info(&apk).unwrap().has_dex_code());
    }

    #[test]
    fn missing_archive_errors() {
        let dir = tempfile::tempdir().unwrap();
        assert!(ContentChecksums
            .dex_file_info(&dir.path().join("absent.jar"))
            .is_err());
    }
}
