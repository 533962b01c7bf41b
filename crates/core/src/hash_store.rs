//! Binary hash-sequence files (`dhashes.bin`).
//!
//! A hash file is a flat array of big-endian `u64` values, one per sampled
//! frame, with no header. Files are written to a temporary sibling and then
//! renamed so a crash never leaves a half-written sequence behind.

use std::path::{Path, PathBuf};

use crate::dhash::DHash;
use crate::error::CoreError;

// ---------------------------------------------------------------------------
// Constants
// ---------------------------------------------------------------------------

/// File name of the hash sequence inside a library entry directory.
pub const HASH_FILE_NAME: &str = "dhashes.bin";

/// Size of one encoded hash in bytes.
pub const HASH_WIDTH: usize = 8;

/// Sequences shorter than this are considered interrupted generations.
/// Any real video sampled at 1 fps yields at least this many frames.
pub const MIN_VALID_HASHES: usize = 10;

// ---------------------------------------------------------------------------
// Encoding
// ---------------------------------------------------------------------------

/// Encode hashes as consecutive big-endian `u64`s.
pub fn encode_hashes(hashes: &[DHash]) -> Vec<u8> {
    let mut bytes = Vec::with_capacity(hashes.len() * HASH_WIDTH);
    for hash in hashes {
        bytes.extend_from_slice(&hash.0.to_be_bytes());
    }
    bytes
}

/// Decode a hash file body.
///
/// Fails if the length is not a multiple of [`HASH_WIDTH`].
pub fn decode_hashes(bytes: &[u8]) -> Result<Vec<DHash>, CoreError> {
    if bytes.len() % HASH_WIDTH != 0 {
        return Err(CoreError::Validation(format!(
            "Hash file length {} is not a multiple of {HASH_WIDTH}",
            bytes.len()
        )));
    }

    Ok(bytes
        .chunks_exact(HASH_WIDTH)
        .map(|chunk| {
            let mut raw = [0u8; HASH_WIDTH];
            raw.copy_from_slice(chunk);
            DHash(u64::from_be_bytes(raw))
        })
        .collect())
}

// ---------------------------------------------------------------------------
// File I/O
// ---------------------------------------------------------------------------

/// Path of the hash file that belongs next to `video_path`.
pub fn hash_file_for(video_path: &Path) -> PathBuf {
    video_path
        .parent()
        .unwrap_or_else(|| Path::new("."))
        .join(HASH_FILE_NAME)
}

/// Write `hashes` to `path`, replacing any existing file.
pub async fn write_hashes(path: &Path, hashes: &[DHash]) -> Result<(), CoreError> {
    let tmp = path.with_extension("bin.tmp");
    tokio::fs::write(&tmp, encode_hashes(hashes)).await?;
    tokio::fs::rename(&tmp, path).await?;
    Ok(())
}

/// Read every hash stored in `path`.
pub async fn read_hashes(path: &Path) -> Result<Vec<DHash>, CoreError> {
    let bytes = tokio::fs::read(path).await?;
    decode_hashes(&bytes)
}

/// Read a hash file, treating missing, misaligned or too-short files as
/// absent.
///
/// Files that exist but are unusable are deleted so the caller regenerates
/// them. Returns `Ok(None)` when no usable sequence is present.
pub async fn load_valid_hashes(path: &Path) -> Result<Option<Vec<DHash>>, CoreError> {
    let bytes = match tokio::fs::read(path).await {
        Ok(bytes) => bytes,
        Err(e) if e.kind() == std::io::ErrorKind::NotFound => return Ok(None),
        Err(e) => return Err(e.into()),
    };

    match decode_hashes(&bytes) {
        Ok(hashes) if hashes.len() >= MIN_VALID_HASHES => return Ok(Some(hashes)),
        Ok(hashes) => {
            tracing::warn!(
                path = %path.display(),
                count = hashes.len(),
                "Discarding incomplete hash file",
            );
        }
        Err(e) => {
            tracing::warn!(path = %path.display(), error = %e, "Discarding corrupt hash file");
        }
    }

    tokio::fs::remove_file(path).await?;
    Ok(None)
}

// ---------------------------------------------------------------------------
// Tests
// ---------------------------------------------------------------------------
