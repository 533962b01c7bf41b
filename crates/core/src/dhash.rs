//! Difference hash (dHash) perceptual fingerprint.
//!
//! A frame is shrunk to a 9×8 grayscale grid and each of the 8 adjacent
//! horizontal pixel pairs per row is compared. The 64 comparison bits form
//! the hash, first comparison in the most significant bit. Visually similar
//! frames produce hashes with a small Hamming distance.

use std::fmt;

use image::imageops::FilterType;
use image::DynamicImage;
use serde::{Deserialize, Serialize};

use crate::error::CoreError;

// ---------------------------------------------------------------------------
// Constants
// ---------------------------------------------------------------------------

/// Width of the downsampled grid (one more column than comparisons).
const GRID_WIDTH: u32 = 9;

/// Height of the downsampled grid.
const GRID_HEIGHT: u32 = 8;

/// Largest possible distance between two hashes.
pub const MAX_DISTANCE: u32 = 64;

// ---------------------------------------------------------------------------
// DHash
// ---------------------------------------------------------------------------

/// A 64-bit difference hash of a single frame.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, PartialOrd, Ord, Serialize, Deserialize)]
#[serde(transparent)]
pub struct DHash(pub u64);

impl DHash {
    /// Compute the hash of a decoded image.
    pub fn from_image(img: &DynamicImage) -> Self {
        let grid = img
            .resize_exact(GRID_WIDTH, GRID_HEIGHT, FilterType::Triangle)
            .to_luma8();

        let mut raw = 0u64;
        for row in 0..GRID_HEIGHT {
            for col in 0..GRID_WIDTH - 1 {
                let left = grid.get_pixel(col, row)[0];
                let right = grid.get_pixel(col + 1, row)[0];
                raw = (raw << 1) | u64::from(left <= right);
            }
        }
        Self(raw)
    }

    /// Decode a JPEG frame and hash it.
    pub fn from_jpeg(bytes: &[u8]) -> Result<Self, CoreError> {
        let img = image::load_from_memory_with_format(bytes, image::ImageFormat::Jpeg)?;
        Ok(Self::from_image(&img))
    }

    /// Hamming distance to another hash, in `0..=64`.
    pub const fn distance_to(self, other: Self) -> u32 {
        (self.0 ^ other.0).count_ones()
    }

    pub const fn raw(self) -> u64 {
        self.0
    }
}

impl From<u64> for DHash {
    fn from(raw: u64) -> Self {
        Self(raw)
    }
}

impl fmt::Display for DHash {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(f, "{:x}", self.0)
    }
}

/// Distance from `target` to its nearest neighbour in `hashes`.
///
/// Returns `None` when `hashes` is empty.
pub fn minimal_distance(hashes: &[DHash], target: DHash) -> Option<u32> {
    hashes.iter().map(|h| h.distance_to(target)).min()
}

// ---------------------------------------------------------------------------
// Tests
// ---------------------------------------------------------------------------

#[cfg(test)]
mod tests {
    use super::*;
    use image::{GrayImage, Luma};

    fn gray(width: u32, height: u32, f: impl Fn(u32, u32) -> u8) -> DynamicImage {
        DynamicImage::ImageLuma8(GrayImage::from_fn(width, height, |x, y| Luma([f(x, y)])))
    }

    // -- from_image -----------------------------------------------------------

    #[test]
    fn rising_gradient_sets_every_bit() {
        let img = gray(9, 8, |x, _| (x * 25) as u8);
        assert_eq!(DHash::from_image(&img), DHash(u64::MAX));
    }

    #[test]
    fn falling_gradient_clears_every_bit() {
        let img = gray(9, 8, |x, _| 255 - (x * 25) as u8);
        assert_eq!(DHash::from_image(&img), DHash(0));
    }

    #[test]
    fn flat_image_counts_as_rising() {
        let img = gray(9, 8, |_, _| 128);
        assert_eq!(DHash::from_image(&img), DHash(u64::MAX));
    }

    #[test]
    fn first_row_maps_to_most_significant_byte() {
        // Row 0 falls, every other row rises.
        let img = gray(9, 8, |x, y| {
            if y == 0 {
                255 - (x * 25) as u8
            } else {
                (x * 25) as u8
            }
        });
        assert_eq!(DHash::from_image(&img), DHash(0x00FF_FFFF_FFFF_FFFF));
    }

    #[test]
    fn hashing_is_deterministic() {
        let img = gray(64, 48, |x, y| ((x * 7 + y * 13) % 256) as u8);
        assert_eq!(DHash::from_image(&img), DHash::from_image(&img));
    }

    #[test]
    fn invalid_jpeg_is_an_error() {
        assert!(DHash::from_jpeg(&[0xFF, 0xD8, 0x00, 0xFF, 0xD9]).is_err());
    }

    // -- distance_to ----------------------------------------------------------

    #[test]
    fn distance_identity_and_symmetry() {
        let a = DHash(0xDEAD_BEEF_0000_FFFF);
        let b = DHash(0x0123_4567_89AB_CDEF);
        assert_eq!(a.distance_to(a), 0);
        assert_eq!(a.distance_to(b), b.distance_to(a));
    }

    #[test]
    fn distance_is_bounded() {
        assert_eq!(DHash(0).distance_to(DHash(u64::MAX)), MAX_DISTANCE);
        assert_eq!(DHash(0b1011).distance_to(DHash(0)), 3);
    }

    // -- minimal_distance -----------------------------------------------------

    #[test]
    fn minimal_distance_picks_nearest() {
        let hashes = [DHash(0xFF), DHash(0x0F), DHash(0x01)];
        assert_eq!(minimal_distance(&hashes, DHash(0x00)), Some(1));
    }

    #[test]
    fn minimal_distance_of_empty_is_none() {
        assert_eq!(minimal_distance(&[], DHash(0)), None);
    }

    #[test]
    fn display_is_lowercase_hex() {
        assert_eq!(DHash(0xABCD).to_string(), "abcd");
    }
}
