//! Filesystem helpers shared across the assetpack crates.

use std::path::Path;

use anyhow::{Context, Result};

/// Maximum allowed font file size for reading into memory.
pub const MAX_FONT_BYTES: u64 = 64 * 1024 * 1024; // 64 MiB
/// Maximum allowed source image size (backgrounds, emoji).
pub const MAX_IMAGE_BYTES: u64 = 32 * 1024 * 1024; // 32 MiB
/// Maximum allowed size of a single wake-word model file.
pub const MAX_MODEL_FILE_BYTES: u64 = 16 * 1024 * 1024; // 16 MiB
/// Maximum allowed size of a finished bundle read back for inspection.
pub const MAX_BUNDLE_BYTES: u64 = 128 * 1024 * 1024; // 128 MiB

/// Read a file into memory with a size cap.
pub fn read_file_with_limit(path: &Path, max_bytes: u64) -> Result<Vec<u8>> {
    let metadata = std::fs::metadata(path)
        .with_context(|| format!("Failed to read file metadata: {}", path.display()))?;
    let len = metadata.len();
    if len > max_bytes {
        anyhow::bail!(
            "File too large: {} ({} bytes, max {} bytes)",
            path.display(),
            len,
            max_bytes
        );
    }
    std::fs::read(path).with_context(|| format!("Failed to read file: {}", path.display()))
}

#[cfg(test)]
mod tests {
    use super::*;
    use tempfile::tempdir;

    #[test]
    fn test_read_within_limit() {
        let dir = tempdir().unwrap();
        let path = dir.path().join("small.bin");
        std::fs::write(&path, [1u8, 2, 3]).unwrap();

        let data = read_file_with_limit(&path, 16).unwrap();
        assert_eq!(data, vec![1, 2, 3]);
    }

    #[test]
    fn test_read_over_limit() {
        let dir = tempdir().unwrap();
        let path = dir.path().join("big.bin");
        std::fs::write(&path, [0u8; 32]).unwrap();

        let err = read_file_with_limit(&path, 16).unwrap_err();
        assert!(err.to_string().contains("File too large"));
    }

    #[test]
    fn test_read_missing_file() {
        let dir = tempdir().unwrap();
        let result = read_file_with_limit(&dir.path().join("missing.bin"), 16);
        assert!(result.is_err());
    }
}
