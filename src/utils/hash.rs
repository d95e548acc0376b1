//! Content digest calculation.

use crate::core::error::{Error, Result};
use sha2::{Digest, Sha256};
use std::fs::File;
use std::io::{BufReader, Read};
use std::path::Path;

/// Buffer size for streaming reads (64 KiB). Memory use is independent of
/// input size.
const BUFFER_SIZE: usize = 64 * 1024;

/// SHA-256 digest calculator.
pub struct Hasher;

impl Hasher {
    /// Digest an arbitrary byte source in bounded chunks.
    ///
    /// A read error surfaces as-is; no partial digest is ever returned.
    pub fn sha256_reader<R: Read>(mut reader: R) -> std::io::Result<String> {
        let mut hasher = Sha256::new();
        let mut buffer = [0u8; BUFFER_SIZE];

        loop {
            let bytes_read = reader.read(&mut buffer)?;
            if bytes_read == 0 {
                break;
            }
            hasher.update(&buffer[..bytes_read]);
        }

        Ok(hex::encode(hasher.finalize()))
    }

    /// Digest a file without loading it into memory.
    pub fn sha256_file(path: &Path) -> Result<String> {
        let file = File::open(path).map_err(|e| Error::file_read(path, e))?;
        let reader = BufReader::with_capacity(BUFFER_SIZE, file);
        Self::sha256_reader(reader).map_err(|e| Error::file_read(path, e))
    }

    /// Digest an in-memory buffer.
    pub fn sha256_bytes(data: &[u8]) -> String {
        let mut hasher = Sha256::new();
        hasher.update(data);
        hex::encode(hasher.finalize())
    }
}

/// Check that a string looks like a SHA-256 hex digest.
pub fn is_valid_digest(s: &str) -> bool {
    s.len() == 64 && s.bytes().all(|b| b.is_ascii_hexdigit())
}

#[cfg(test)]
mod tests {
    use super::*;
    use std::io::Write;
    use tempfile::NamedTempFile;

    // Test vector: SHA256("hello")
    const HELLO_SHA256: &str = "2cf24dba5fb0a30e26e83b2ac5b9e29e1b161e5c1fa7425e73043362938b9824";

    #[test]
    fn test_sha256_bytes() {
        assert_eq!(Hasher::sha256_bytes(b"hello"), HELLO_SHA256);
    }

    #[test]
    fn test_sha256_file_matches_bytes() {
        let mut file = NamedTempFile::new().unwrap();
        file.write_all(b"hello").unwrap();

        let hash = Hasher::sha256_file(file.path()).unwrap();
        assert_eq!(hash, HELLO_SHA256);
    }

    #[test]
    fn test_sha256_reader_chunked() {
        // Larger than one buffer to exercise the chunk loop.
        let data = vec![0xABu8; BUFFER_SIZE * 2 + 17];
        let streamed = Hasher::sha256_reader(&data[..]).unwrap();
        assert_eq!(streamed, Hasher::sha256_bytes(&data));
    }

    #[test]
    fn test_missing_file_fails() {
        let err = Hasher::sha256_file(Path::new("/nonexistent/file")).unwrap_err();
        assert!(err.is_recoverable());
    }

    #[test]
    fn test_digest_validation() {
        assert!(is_valid_digest(HELLO_SHA256));
        assert!(!is_valid_digest("abc"));
        assert!(!is_valid_digest(&"g".repeat(64)));
    }
}
