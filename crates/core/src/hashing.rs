//! Shared SHA-256 hex digest utilities.
//!
//! Media library entries are addressed by a digest of the URL they were
//! downloaded from, so the download manager, the library and the duplicate
//! calculator all agree on ids without a shared registry.

use sha2::{Digest, Sha256};

use crate::types::ContentId;

/// Minimum width of a rendered content id.
const CONTENT_ID_MIN_WIDTH: usize = 32;

/// Compute a SHA-256 hex digest of the given bytes.
pub fn sha256_hex(data: &[u8]) -> String {
    let hash = Sha256::digest(data);
    format!("{hash:x}")
}

/// Derive the library id for an origin URL.
///
/// The digest is rendered as the hex value of an unsigned integer: leading
/// zero nibbles are dropped and the result is left-padded to at least 32
/// characters. Existing libraries on disk use this exact rendering.
pub fn content_id(origin_url: &str) -> ContentId {
    let hex = sha256_hex(origin_url.as_bytes());
    let trimmed = hex.trim_start_matches('0');
    format!("{trimmed:0>width$}", width = CONTENT_ID_MIN_WIDTH)
}
