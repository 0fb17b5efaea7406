use anyhow::{Context, Result};
use memmap2::MmapOptions;
use std::fs::File;
use std::path::Path;
use xxhash_rust::xxh3::xxh3_128;

/// Files at or above this size are hashed through a memory mapping.
const MMAP_THRESHOLD: u64 = 1_048_576;

/// Computes the XXH3 128-bit hex digest of raw bytes.
#[must_use]
pub fn hash_bytes(data: &[u8]) -> String {
    let hash = xxh3_128(data);
    format!("{hash:032x}")
}

/// Computes the content digest of a file's full byte content.
///
/// Deterministic and stable for identical bytes. An unreadable file is an
/// error the caller must treat as fatal for that single file only, never for
/// the whole run.
pub fn hash_file(path: &Path) -> Result<String> {
    let file = File::open(path)
        .with_context(|| format!("failed to open source file: {}", path.display()))?;
    let metadata = file
        .metadata()
        .with_context(|| format!("failed to stat source file: {}", path.display()))?;

    if metadata.len() == 0 {
        return Ok(hash_bytes(b""));
    }

    if metadata.len() < MMAP_THRESHOLD {
        let content = std::fs::read(path)
            .with_context(|| format!("failed to read source file: {}", path.display()))?;
        Ok(hash_bytes(&content))
    } else {
        let mmap = unsafe { MmapOptions::new().map(&file) }
            .with_context(|| format!("failed to map source file: {}", path.display()))?;
        Ok(hash_bytes(&mmap))
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use tempfile::tempdir;

    #[test]
    fn test_hash_bytes_stable() {
        let hash1 = hash_bytes(b"RIFF....WAVE");
        let hash2 = hash_bytes(b"RIFF....WAVE");
        assert_eq!(hash1, hash2);
        assert_eq!(hash1.len(), 32);
        assert_ne!(hash1, hash_bytes(b"different"));
    }

    #[test]
    fn test_hash_file_matches_bytes() -> Result<()> {
        let dir = tempdir()?;
        let path = dir.path().join("clip.wav");
        std::fs::write(&path, b"fake wav content")?;

        assert_eq!(hash_file(&path)?, hash_bytes(b"fake wav content"));
        Ok(())
    }

    #[test]
    fn test_hash_large_file() -> Result<()> {
        let dir = tempdir()?;
        let path = dir.path().join("big.wav");
        let content = vec![0x42u8; 2 * 1024 * 1024];
        std::fs::write(&path, &content)?;

        assert_eq!(hash_file(&path)?, hash_bytes(&content));
        Ok(())
    }

    #[test]
    fn test_hash_missing_file_errors() {
        assert!(hash_file(Path::new("/no/such/file.wav")).is_err());
    }
}
