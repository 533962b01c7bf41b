//! Sampling nearest-neighbour search over hash sequences.
//!
//! Comparing every hash of one video against every hash of every other video
//! is quadratic in library size times sequence length. Instead a fixed-size
//! sample of the target's hashes is matched against each candidate: for each
//! sampled hash the nearest hash in the candidate is found and the distances
//! are summed. The candidate with the smallest sum is the likely duplicate.

use rand::Rng;
use serde::Serialize;

use crate::dhash::{minimal_distance, DHash};

// ---------------------------------------------------------------------------
// Constants
// ---------------------------------------------------------------------------

/// Number of hashes drawn (with replacement) from the target sequence.
pub const DEFAULT_SAMPLE_SIZE: usize = 100;

// ---------------------------------------------------------------------------
// Types
// ---------------------------------------------------------------------------

/// Result of a duplicate search: the closest candidate and its cumulative
/// distance over the sample.
#[derive(Debug, Clone, PartialEq, Eq, Serialize)]
pub struct IdWithDistance {
    pub id: String,
    pub distance: u32,
}

// ---------------------------------------------------------------------------
// Search
// ---------------------------------------------------------------------------

/// Draw `count` hashes from `hashes` with replacement.
///
/// Returns an empty sample when `hashes` is empty.
pub fn sample_hashes<R: Rng + ?Sized>(hashes: &[DHash], count: usize, rng: &mut R) -> Vec<DHash> {
    if hashes.is_empty() {
        return Vec::new();
    }
    (0..count)
        .map(|_| hashes[rng.random_range(0..hashes.len())])
        .collect()
}

/// Sum of each sample's distance to its nearest neighbour in `candidate`,
/// giving up as soon as the sum exceeds `bound`.
///
/// Returns `None` for an empty candidate or when the bound was exceeded.
pub fn cumulative_distance(sample: &[DHash], candidate: &[DHash], bound: u32) -> Option<u32> {
    let mut total = 0u32;
    for &hash in sample {
        total = total.saturating_add(minimal_distance(candidate, hash)?);
        if total > bound {
            return None;
        }
    }
    Some(total)
}

/// Find the candidate whose hashes are closest to a pre-drawn sample.
///
/// Candidates with the id `exclude` or with no hashes are skipped. Equal
/// distances are resolved in favour of the lexicographically lowest id, so
/// the result does not depend on candidate iteration order.
pub fn find_closest<'a, I>(sample: &[DHash], exclude: Option<&str>, candidates: I) -> Option<IdWithDistance>
where
    I: IntoIterator<Item = (&'a str, &'a [DHash])>,
{
    if sample.is_empty() {
        return None;
    }

    let mut best: Option<IdWithDistance> = None;
    for (id, hashes) in candidates {
        if Some(id) == exclude || hashes.is_empty() {
            continue;
        }

        let bound = best.as_ref().map_or(u32::MAX, |b| b.distance);
        let Some(distance) = cumulative_distance(sample, hashes, bound) else {
            continue;
        };

        let better = match &best {
            None => true,
            Some(current) => {
                distance < current.distance || (distance == current.distance && id < current.id.as_str())
            }
        };
        if better {
            best = Some(IdWithDistance {
                id: id.to_string(),
                distance,
            });
        }
    }
    best
}

/// Find the likely duplicate of `target` among `candidates`.
///
/// Draws [`DEFAULT_SAMPLE_SIZE`] hashes from `target` using `rng` and
/// delegates to [`find_closest`]. Returns `None` when `target` is empty or no
/// candidate qualifies; callers treat that as "no duplicate", not an error.
pub fn find_likely_duplicate<'a, I, R>(
    target_id: Option<&str>,
    target: &[DHash],
    candidates: I,
    rng: &mut R,
) -> Option<IdWithDistance>
where
    I: IntoIterator<Item = (&'a str, &'a [DHash])>,
    R: Rng + ?Sized,
{
    let sample = sample_hashes(target, DEFAULT_SAMPLE_SIZE, rng);
    find_closest(&sample, target_id, candidates)
}

// ---------------------------------------------------------------------------
// Tests
// ---------------------------------------------------------------------------
