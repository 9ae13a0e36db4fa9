//! Content hashing for component checksums and change detection.

use serde::{Deserialize, Serialize};
use std::fmt;
use std::io::Read;

/// A 128-bit content hash computed using XXH3.
///
/// Two archives with the same `ContentHash` are assumed to have identical
/// content. Used to fingerprint compilation inputs so that a changed jar can be
/// detected without understanding its container format.
#[derive(Clone, Copy, PartialEq, Eq, Hash, Serialize, Deserialize)]
pub struct ContentHash([u8; 16]);

impl ContentHash {
    /// Computes a content hash from a byte slice using XXH3-128.
    pub fn from_bytes(data: &[u8]) -> Self {
        let hash = xxhash_rust::xxh3::xxh3_128(data);
        Self(hash.to_le_bytes())
    }

    /// Computes a content hash by streaming everything `reader` yields.
    pub fn from_reader<R: Read>(mut reader: R) -> std::io::Result<Self> {
        let mut hasher = xxhash_rust::xxh3::Xxh3::new();
        let mut buf = [0u8; 64 * 1024];
        loop {
            let n = reader.read(&mut buf)?;
            if n == 0 {
                break;
            }
            hasher.update(&buf[..n]);
        }
        Ok(Self(hasher.digest128().to_le_bytes()))
    }

    /// Folds the hash into a 32-bit checksum, the width dex checksums use.
    pub fn checksum32(&self) -> u32 {
        let mut out = 0u32;
        for chunk in self.0.chunks_exact(4) {
            out ^= u32::from_le_bytes([chunk[0], chunk[1], chunk[2], chunk[3]]);
        }
        out
    }
}

impl fmt::Display for ContentHash {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        for byte in &self.0 {
            write!(f, "{byte:02x}")?;
        }
        Ok(())
    }
}

impl fmt::Debug for ContentHash {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(f, "ContentHash({:02x}{:02x}..)", self.0[0], self.0[1])
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn deterministic() {
        let a = ContentHash::from_bytes(b"classes.dex");
        let b = ContentHash::from_bytes(b"classes.dex");
        assert_eq!(a, b);
        assert_eq!(a.checksum32(), b.checksum32());
    }

    #[test]
    fn different_inputs_differ() {
        let a = ContentHash::from_bytes(b"framework.jar");
        let b = ContentHash::from_bytes(b"services.jar");
        assert_ne!(a, b);
    }

    #[test]
    fn reader_matches_bytes() {
        let data = vec![7u8; 200_000];
        let streamed = ContentHash::from_reader(&data[..]).unwrap();
        assert_eq!(streamed, ContentHash::from_bytes(&data));
    }

    #[test]
    fn display_format() {
        let h = ContentHash::from_bytes(b"test");
        let s = format!("{h}");
        assert_eq!(s.len(), 32);
        assert!(s.chars().all(|c| c.is_ascii_hexdigit()));
    }

    #[test]
    fn debug_abbreviated() {
        let h = ContentHash::from_bytes(b"test");
        let s = format!("{h:?}");
        assert!(s.starts_with("ContentHash("));
        assert!(s.ends_with(")"));
    }
}
