//! The key/value header carried by compiled artifacts.
//!
//! Only the fields the staleness engine consults are modelled. On disk the
//! header sits at the start of the artifact:
//!
//! ```text
//! [magic: 4 bytes][header length: u32 LE][bincode-encoded OatHeader][payload...]
//! ```

use std::io::{Read, Write};
use std::path::Path;

use odr_common::CompilerFilter;
use serde::{Deserialize, Serialize};

use crate::error::OatError;

/// Magic bytes identifying a compiled artifact.
const OAT_MAGIC: [u8; 4] = *b"oat\n";

/// Current header format version. Increment on breaking changes.
const HEADER_VERSION: u32 = 1;

/// Headers larger than this are treated as corrupt.
const MAX_HEADER_LEN: u32 = 1 << 20;

/// What an artifact records about how it was built.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct OatHeader {
    /// Header format version.
    pub version: u32,
    /// Filter the artifact was compiled with.
    pub compiler_filter: CompilerFilter,
    /// Checksums of the dex files the artifact was built from, in order.
    pub dex_checksums: Vec<u32>,
    /// Boot classpath checksums the artifact was compiled against. Starts
    /// with `i` when compiled against a boot image and `d` when compiled
    /// against the boot classpath dex files only.
    pub boot_class_path_checksums: String,
    /// Class loader context the artifact was compiled in, if recorded.
    pub class_loader_context: Option<String>,
    /// Whether the dex code is embedded in the artifact.
    pub has_dex_code: bool,
}

impl OatHeader {
    /// Creates a header for the current format version.
    pub fn new(compiler_filter: CompilerFilter, dex_checksums: Vec<u32>) -> Self {
        Self {
            version: HEADER_VERSION,
            compiler_filter,
            dex_checksums,
            boot_class_path_checksums: String::new(),
            class_loader_context: None,
            has_dex_code: false,
        }
    }

    /// Writes the magic, length and encoded header.
    pub fn write_to<W: Write>(&self, out: &mut W) -> Result<(), OatError> {
        let encoded = bincode::serde::encode_to_vec(self, bincode::config::standard())
            .map_err(|e| OatError::Encode {
                reason: e.to_string(),
            })?;
        let len = u32::try_from(encoded.len()).map_err(|_| OatError::Encode {
            reason: format!("header of {} bytes is too large", encoded.len()),
        })?;
        let io_err = |e: std::io::Error| OatError::Encode {
            reason: e.to_string(),
        };
        out.write_all(&OAT_MAGIC).map_err(io_err)?;
        out.write_all(&len.to_le_bytes()).map_err(io_err)?;
        out.write_all(&encoded).map_err(io_err)
    }

    /// Reads and validates the header at the start of `path`.
    pub fn read_from(path: &Path) -> Result<Self, OatError> {
        let io_err = |e: std::io::Error| OatError::Io {
            path: path.to_path_buf(),
            source: e,
        };
        let corrupt = |reason: String| OatError::CorruptHeader {
            path: path.to_path_buf(),
            reason,
        };
        let mut file = std::fs::File::open(path).map_err(io_err)?;

        let mut prefix = [0u8; 8];
        file.read_exact(&mut prefix).map_err(|e| match e.kind() {
            std::io::ErrorKind::UnexpectedEof => OatError::BadMagic {
                path: path.to_path_buf(),
            },
            _ => io_err(e),
        })?;
        if prefix[..4] != OAT_MAGIC {
            return Err(OatError::BadMagic {
                path: path.to_path_buf(),
            });
        }
        let len = u32::from_le_bytes([prefix[4], prefix[5], prefix[6], prefix[7]]);
        if len > MAX_HEADER_LEN {
            return Err(corrupt(format!("header length {len} too large")));
        }

        let mut encoded = vec![0u8; len as usize];
        file.read_exact(&mut encoded)
            .map_err(|e| corrupt(e.to_string()))?;
        let (header, _): (OatHeader, usize) =
            bincode::serde::decode_from_slice(&encoded, bincode::config::standard())
                .map_err(|e| corrupt(e.to_string()))?;
        if header.version != HEADER_VERSION {
            return Err(OatError::UnsupportedVersion {
                path: path.to_path_buf(),
                expected: HEADER_VERSION,
                actual: header.version,
            });
        }
        Ok(header)
    }
}

/// Opens compiled artifacts and yields their headers.
pub trait ArtifactLoader {
    /// Loads the header of the artifact at `path`.
    fn load(&self, path: &Path) -> Result<OatHeader, OatError>;
}

/// Reads headers in the on-disk format described in the module docs.
#[derive(Debug, Clone, Copy, Default)]
pub struct HeaderLoader;

impl ArtifactLoader for HeaderLoader {
    fn load(&self, path: &Path) -> Result<OatHeader, OatError> {
        OatHeader::read_from(path)
    }
}
