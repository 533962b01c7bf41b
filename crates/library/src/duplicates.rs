//! Library-wide duplicate calculation.
//!
//! Every entry with a usable hash sequence is matched against all other
//! entries. Matching is CPU bound and runs on the blocking pool, one task
//! per entry.

use std::sync::Arc;
use std::time::Instant;

use mediavault_core::dhash::DHash;
use mediavault_core::duplicates::{find_likely_duplicate, IdWithDistance};
use serde::Serialize;
use tokio::task::JoinSet;

use crate::error::StoreError;
use crate::media_library::MediaLibrary;
use crate::models::MediaEntry;

/// One entry together with its most likely duplicate.
#[derive(Debug, Clone, PartialEq, Eq, Serialize)]
pub struct DuplicateMatch {
    pub entry: MediaEntry,
    pub duplicate: IdWithDistance,
}

type HashedEntries = Arc<Vec<(MediaEntry, Vec<DHash>)>>;

pub struct DuplicateCalculator {
    library: Arc<MediaLibrary>,
}

impl DuplicateCalculator {
    pub fn new(library: Arc<MediaLibrary>) -> Self {
        Self { library }
    }

    /// Load every entry whose hash file is present and complete.
    async fn load_hashed_entries(&self) -> Result<Vec<(MediaEntry, Vec<DHash>)>, StoreError> {
        let mut hashed = Vec::new();
        for entry in self.library.entries().await? {
            match self.library.load_hashes(&entry.id).await {
                Ok(Some(hashes)) => hashed.push((entry, hashes)),
                Ok(None) => {
                    tracing::debug!(id = %entry.id, "No usable hashes, skipping");
                }
                Err(e) => {
                    tracing::warn!(id = %entry.id, error = %e, "Failed to load hashes");
                }
            }
        }
        Ok(hashed)
    }

    /// Find the likely duplicate of every hashed entry.
    ///
    /// Results are ordered by ascending distance, closest pairs first.
    /// Entries without any other hashed entry to compare against produce no
    /// result.
    pub async fn calculate(&self) -> Result<Vec<DuplicateMatch>, StoreError> {
        let started = Instant::now();
        let hashed: HashedEntries = Arc::new(self.load_hashed_entries().await?);
        tracing::info!(entries = hashed.len(), "Starting duplicate calculation");

        let mut tasks = JoinSet::new();
        for index in 0..hashed.len() {
            let hashed = Arc::clone(&hashed);
            tasks.spawn_blocking(move || {
                let (entry, hashes) = &hashed[index];
                let candidates = hashed.iter().map(|(e, h)| (e.id.as_str(), h.as_slice()));
                find_likely_duplicate(Some(entry.id.as_str()), hashes, candidates, &mut rand::rng()).map(|duplicate| {
                    DuplicateMatch {
                        entry: entry.clone(),
                        duplicate,
                    }
                })
            });
        }

        let mut matches = Vec::new();
        while let Some(result) = tasks.join_next().await {
            if let Some(found) = result? {
                matches.push(found);
            }
        }
        matches.sort_by(|a, b| {
            a.duplicate
                .distance
                .cmp(&b.duplicate.distance)
                .then_with(|| a.entry.id.cmp(&b.entry.id))
        });

        tracing::info!(
            matches = matches.len(),
            elapsed_ms = started.elapsed().as_millis() as u64,
            "Finished duplicate calculation",
        );
        Ok(matches)
    }

    /// Find the likely duplicate of a single entry.
    ///
    /// Returns `None` if the entry has no usable hashes or nothing to compare
    /// against.
    pub async fn duplicate_of(&self, id: &str) -> Result<Option<IdWithDistance>, StoreError> {
        let Some(target) = self.library.load_hashes(id).await? else {
            return Ok(None);
        };
        let hashed = self.load_hashed_entries().await?;
        let id = id.to_string();

        let found = tokio::task::spawn_blocking(move || {
            let candidates = hashed.iter().map(|(e, h)| (e.id.as_str(), h.as_slice()));
            find_likely_duplicate(Some(id.as_str()), &target, candidates, &mut rand::rng())
        })
        .await?;
        Ok(found)
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::fs_store::FsMetadataStore;
    use mediavault_core::hash_store::write_hashes;
    use mediavault_core::media_tool::MediaToolLock;

    async fn add(lib: &MediaLibrary, url: &str, hashes: &[u64]) -> MediaEntry {
        let entry = MediaEntry::new(url, None, []);
        lib.store().put(&entry).await.unwrap();
        let hashes: Vec<DHash> = hashes.iter().copied().map(DHash).collect();
        write_hashes(&lib.hash_path(&entry.id), &hashes).await.unwrap();
        entry
    }

    fn repeat(value: u64, n: usize) -> Vec<u64> {
        vec![value; n]
    }

    #[tokio::test]
    async fn identical_sequences_pair_up_first() {
        let root = tempfile::tempdir().unwrap();
        let lib = Arc::new(MediaLibrary::new(
            root.path(),
            Arc::new(FsMetadataStore::new(root.path())),
            MediaToolLock::default(),
        ));
        let a = add(&lib, "http://x/a.mp4", &repeat(0x00FF, 12)).await;
        let b = add(&lib, "http://x/b.mp4", &repeat(0x00FF, 12)).await;
        let c = add(&lib, "http://x/c.mp4", &repeat(0xFF00_0000_0000_0000, 12)).await;

        let matches = DuplicateCalculator::new(Arc::clone(&lib)).calculate().await.unwrap();

        assert_eq!(matches.len(), 3);
        assert_eq!(matches[0].duplicate.distance, 0);
        assert_eq!(matches[1].duplicate.distance, 0);
        let first_pair = [&matches[0], &matches[1]];
        assert!(first_pair.iter().any(|m| m.entry.id == a.id && m.duplicate.id == b.id));
        assert!(first_pair.iter().any(|m| m.entry.id == b.id && m.duplicate.id == a.id));
        assert_eq!(matches[2].entry.id, c.id);
        assert!(matches[2].duplicate.distance > 0);
    }

    #[tokio::test]
    async fn entries_without_valid_hashes_are_ignored() {
        let root = tempfile::tempdir().unwrap();
        let lib = Arc::new(MediaLibrary::new(
            root.path(),
            Arc::new(FsMetadataStore::new(root.path())),
            MediaToolLock::default(),
        ));
        let a = add(&lib, "http://x/a.mp4", &repeat(1, 12)).await;
        add(&lib, "http://x/short.mp4", &repeat(1, 3)).await;

        let calc = DuplicateCalculator::new(Arc::clone(&lib));

        assert!(calc.calculate().await.unwrap().is_empty());
        assert!(calc.duplicate_of(&a.id).await.unwrap().is_none());
    }

    #[tokio::test]
    async fn duplicate_of_single_entry() {
        let root = tempfile::tempdir().unwrap();
        let lib = Arc::new(MediaLibrary::new(
            root.path(),
            Arc::new(FsMetadataStore::new(root.path())),
            MediaToolLock::default(),
        ));
        let a = add(&lib, "http://x/a.mp4", &repeat(0b1111, 12)).await;
        let b = add(&lib, "http://x/b.mp4", &repeat(0b0111, 12)).await;

        let found = DuplicateCalculator::new(lib).duplicate_of(&a.id).await.unwrap().unwrap();

        assert_eq!(found.id, b.id);
        assert_eq!(found.distance, 100);
    }
}
