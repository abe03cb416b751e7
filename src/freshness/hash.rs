//! Content fingerprints using blake3.

use std::fs::File;
use std::io::{self, BufReader, Read};
use std::path::Path;

/// A 256-bit content fingerprint (blake3 output).
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash)]
pub struct Fingerprint([u8; 32]);

impl Fingerprint {
    #[inline]
    pub const fn new(bytes: [u8; 32]) -> Self {
        Self(bytes)
    }

    #[inline]
    pub const fn as_bytes(&self) -> &[u8; 32] {
        &self.0
    }

    /// Fingerprint an in-memory buffer.
    pub fn of_bytes(bytes: &[u8]) -> Self {
        Self(*blake3::hash(bytes).as_bytes())
    }

    /// Full lowercase hex form, as stored in the cache file.
    pub fn to_hex(self) -> String {
        hex::encode(self.0)
    }

    pub fn from_hex(s: &str) -> Option<Self> {
        let bytes = hex::decode(s).ok()?;
        let arr: [u8; 32] = bytes.try_into().ok()?;
        Some(Self(arr))
    }
}

impl std::fmt::Display for Fingerprint {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        // First 16 hex chars are enough to tell files apart in logs
        write!(f, "{}", &self.to_hex()[..16])
    }
}

/// Stream a file through blake3.
///
/// Errors are returned as-is so callers can tell a vanished file
/// (`NotFound`) from an unreadable one.
pub fn fingerprint_file(path: &Path) -> io::Result<Fingerprint> {
    let file = File::open(path)?;
    let mut reader = BufReader::with_capacity(64 * 1024, file);
    let mut hasher = blake3::Hasher::new();
    let mut buffer = [0u8; 64 * 1024];

    loop {
        match reader.read(&mut buffer) {
            Ok(0) => break,
            Ok(n) => {
                hasher.update(&buffer[..n]);
            }
            Err(e) if e.kind() == io::ErrorKind::Interrupted => continue,
            Err(e) => return Err(e),
        }
    }

    Ok(Fingerprint::new(*hasher.finalize().as_bytes()))
}

#[cfg(test)]
mod tests {
    use super::*;
    use std::fs;
    use tempfile::TempDir;

    #[test]
    fn test_fingerprint_display() {
        let fp = Fingerprint::new([0xab; 32]);
        assert_eq!(format!("{fp}"), "abababababababab");
        assert_eq!(fp.to_hex().len(), 64);
    }

    #[test]
    fn test_from_hex_rejects_wrong_length() {
        assert!(Fingerprint::from_hex("abcd").is_none());
        assert!(Fingerprint::from_hex("zz").is_none());
        let fp = Fingerprint::new([0x12; 32]);
        assert_eq!(Fingerprint::from_hex(&fp.to_hex()), Some(fp));
    }

    #[test]
    fn test_fingerprint_file_matches_bytes() {
        let dir = TempDir::new().unwrap();
        let path = dir.path().join("a.md");
        fs::write(&path, "hello world").unwrap();

        let from_file = fingerprint_file(&path).unwrap();
        assert_eq!(from_file, Fingerprint::of_bytes(b"hello world"));

        fs::write(&path, "goodbye world").unwrap();
        assert_ne!(fingerprint_file(&path).unwrap(), from_file);
    }

    #[test]
    fn test_fingerprint_missing_file() {
        let err = fingerprint_file(Path::new("/nonexistent/file.md")).unwrap_err();
        assert_eq!(err.kind(), io::ErrorKind::NotFound);
    }
}
