//! Content fingerprinting for change detection.
//!
//! Each source file gets a SHA-256 digest computed in fixed-size reads so
//! large files never load fully into memory. The reconciler compares digests
//! to decide whether a file's indexed row is stale.

use sha2::{Digest, Sha256};
use std::fs::File;
use std::io::Read;
use std::path::Path;

const READ_CHUNK_BYTES: usize = 4096;

/// Streaming SHA-256 of a file's raw bytes, as lowercase hex.
pub fn hash_file(path: &Path) -> std::io::Result<String> {
    let mut file = File::open(path)?;
    let mut hasher = Sha256::new();
    let mut buf = [0u8; READ_CHUNK_BYTES];

    loop {
        let n = file.read(&mut buf)?;
        if n == 0 {
            break;
        }
        hasher.update(&buf[..n]);
    }

    Ok(format!("{:x}", hasher.finalize()))
}

#[cfg(test)]
mod tests {
    use super::*;
    use std::io::Write;

    fn hash_bytes(bytes: &[u8]) -> String {
        let mut hasher = Sha256::new();
        hasher.update(bytes);
        format!("{:x}", hasher.finalize())
    }

    #[test]
    fn test_known_digest() {
        // sha256("") and sha256("abc") are fixed by the standard.
        assert_eq!(
            hash_bytes(b""),
            "e3b0c44298fc1c149afbf4c8996fb92427ae41e4649b934ca495991b7852b855"
        );
        assert_eq!(
            hash_bytes(b"abc"),
            "ba7816bf8f01cfea414140de5dae2223b00361a396177a9cb410ff61f20015ad"
        );
    }

    #[test]
    fn test_file_matches_bytes() {
        let dir = tempfile::TempDir::new().unwrap();
        let path = dir.path().join("post.md");
        let content = b"---\ntitle: T\n---\nsome body\n";
        std::fs::write(&path, content).unwrap();
        assert_eq!(hash_file(&path).unwrap(), hash_bytes(content));
    }

    #[test]
    fn test_chunked_read_spans_boundaries() {
        // Content larger than one read so the digest accumulates across reads.
        let dir = tempfile::TempDir::new().unwrap();
        let path = dir.path().join("big.md");
        let content = vec![b'x'; READ_CHUNK_BYTES * 3 + 17];
        let mut f = File::create(&path).unwrap();
        f.write_all(&content).unwrap();
        drop(f);
        assert_eq!(hash_file(&path).unwrap(), hash_bytes(&content));
    }

    #[test]
    fn test_missing_file_is_io_error() {
        let dir = tempfile::TempDir::new().unwrap();
        assert!(hash_file(&dir.path().join("absent.md")).is_err());
    }
}
