//! Integration tests for the filesystem media library.
//!
//! Exercises entry ingestion, tombstones and duplicate calculation through
//! the public API against a temporary library directory.

use std::sync::Arc;

use assert_matches::assert_matches;
use mediavault_core::dhash::DHash;
use mediavault_core::hash_store::{self, MIN_VALID_HASHES};
use mediavault_core::media_tool::MediaToolLock;
use mediavault_library::duplicates::DuplicateCalculator;
use mediavault_library::fs_store::FsMetadataStore;
use mediavault_library::{MediaEntry, MediaLibrary, MetadataLookup, MetadataStore};

fn open(root: &std::path::Path) -> Arc<MediaLibrary> {
    Arc::new(MediaLibrary::new(
        root,
        Arc::new(FsMetadataStore::new(root)),
        MediaToolLock::new("test"),
    ))
}

async fn ingest(lib: &MediaLibrary, url: &str, scratch: &std::path::Path) -> MediaEntry {
    let source = scratch.join(format!("{}.part", url.len()));
    tokio::fs::write(&source, url.as_bytes()).await.unwrap();
    let entry = MediaEntry::new(url, Some(format!("title of {url}")), ["clip".to_string()]);
    lib.add_video(&entry, &source).await.unwrap();
    entry
}

// ---------------------------------------------------------------------------
// Test: ingested entries reload from disk
// ---------------------------------------------------------------------------

/// A second library instance over the same directory sees the entry exactly
/// as it was written.
#[tokio::test]
async fn ingested_entry_is_visible_to_a_fresh_instance() {
    let root = tempfile::tempdir().unwrap();
    let scratch = tempfile::tempdir().unwrap();
    let entry = ingest(&open(root.path()), "http://x/a.mp4", scratch.path()).await;

    let reopened = open(root.path());
    let entries = reopened.entries().await.unwrap();

    assert_eq!(entries.len(), 1);
    assert_eq!(entries[0].id, entry.id);
    assert_eq!(entries[0].name, "title of http://x/a.mp4");
    assert!(reopened.video_path(&entry.id).is_file());
}

// ---------------------------------------------------------------------------
// Test: deletion leaves a tombstone
// ---------------------------------------------------------------------------

/// Deleted entries disappear from listings but their id stays reserved.
#[tokio::test]
async fn deleted_entry_becomes_tombstone() {
    let root = tempfile::tempdir().unwrap();
    let scratch = tempfile::tempdir().unwrap();
    let lib = open(root.path());
    let entry = ingest(&lib, "http://x/a.mp4", scratch.path()).await;

    lib.delete(&entry.id).await.unwrap();

    assert!(lib.entries().await.unwrap().is_empty());
    assert_matches!(lib.store().get(&entry.id).await.unwrap(), MetadataLookup::Tombstone);
    let store = FsMetadataStore::new(root.path());
    assert_matches!(store.get(&entry.id).await.unwrap(), MetadataLookup::Tombstone);
}

// ---------------------------------------------------------------------------
// Test: duplicate calculation over stored hash files
// ---------------------------------------------------------------------------

/// Two entries sharing a hash sequence are reported as each other's
/// duplicate at distance zero, ahead of the unrelated entry.
#[tokio::test]
async fn calculator_ranks_identical_entries_first() {
    let root = tempfile::tempdir().unwrap();
    let scratch = tempfile::tempdir().unwrap();
    let lib = open(root.path());

    let mut ids = Vec::new();
    for (url, value) in [
        ("http://x/a.mp4", 0x0F0F_0F0F_0F0F_0F0Fu64),
        ("http://x/b.mp4", 0x0F0F_0F0F_0F0F_0F0F),
        ("http://x/c.mp4", 0xF0F0_F0F0_F0F0_F0F0),
    ] {
        let entry = ingest(&lib, url, scratch.path()).await;
        let hashes = vec![DHash(value); MIN_VALID_HASHES];
        hash_store::write_hashes(&lib.hash_path(&entry.id), &hashes)
            .await
            .unwrap();
        ids.push(entry.id);
    }

    let matches = DuplicateCalculator::new(Arc::clone(&lib)).calculate().await.unwrap();

    assert_eq!(matches.len(), 3);
    assert!(matches[..2].iter().all(|m| m.duplicate.distance == 0));
    assert_eq!(matches[2].entry.id, ids[2]);
    assert_eq!(matches[2].duplicate.distance, 64 * 100);
}
