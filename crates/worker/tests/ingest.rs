//! Integration tests for moving finished downloads into the library.

use std::sync::Arc;

use async_trait::async_trait;
use mediavault_core::hashing::content_id;
use mediavault_core::media_tool::MediaToolLock;
use mediavault_downloader::decoder::{DirectUrlDecoder, MediaMetadata, UrlDecoder};
use mediavault_downloader::task::{CompletedDownload, CompletionHandler, ResolvedMedia};
use mediavault_downloader::DownloadError;
use mediavault_library::fs_store::FsMetadataStore;
use mediavault_library::MediaLibrary;
use mediavault_worker::LibraryIngest;

struct Described;

#[async_trait]
impl UrlDecoder for Described {
    async fn decode(&self, _: &str) -> Result<Option<ResolvedMedia>, DownloadError> {
        Ok(None)
    }

    async fn metadata(&self, _: &str) -> Result<Option<MediaMetadata>, DownloadError> {
        Ok(Some(MediaMetadata {
            title: "Sunset over the bay".into(),
            tags: vec!["nature".into(), "sea".into()],
        }))
    }
}

fn library(root: &std::path::Path) -> Arc<MediaLibrary> {
    Arc::new(MediaLibrary::new(
        root,
        Arc::new(FsMetadataStore::new(root)),
        MediaToolLock::new("test"),
    ))
}

// ---------------------------------------------------------------------------
// Test: a finished download becomes a library entry with decoder metadata
// ---------------------------------------------------------------------------

#[tokio::test]
async fn finished_file_is_stored_with_metadata() {
    let root = tempfile::tempdir().unwrap();
    let scratch = tempfile::tempdir().unwrap();
    let lib = library(root.path());
    let file = scratch.path().join("out.mp4");
    std::fs::write(&file, b"not a real video").unwrap();

    let ingest = LibraryIngest::new(Arc::clone(&lib), Arc::new(Described));
    ingest
        .on_complete(&CompletedDownload {
            origin_url: "http://x/sunset".into(),
            file: file.clone(),
        })
        .await
        .unwrap();

    let id = content_id("http://x/sunset");
    let entry = lib.find(&id).await.unwrap().unwrap();
    assert_eq!(entry.name, "Sunset over the bay");
    assert!(entry.tags.contains("sea"));
    assert!(!file.exists());
    assert_eq!(std::fs::read(lib.video_path(&id)).unwrap(), b"not a real video");
}

// ---------------------------------------------------------------------------
// Test: without metadata the origin URL names the entry
// ---------------------------------------------------------------------------

#[tokio::test]
async fn missing_metadata_falls_back_to_url() {
    let root = tempfile::tempdir().unwrap();
    let scratch = tempfile::tempdir().unwrap();
    let lib = library(root.path());
    let file = scratch.path().join("out.mp4");
    std::fs::write(&file, b"bytes").unwrap();

    LibraryIngest::new(Arc::clone(&lib), Arc::new(DirectUrlDecoder))
        .on_complete(&CompletedDownload {
            origin_url: "http://x/untitled.mp4".into(),
            file,
        })
        .await
        .unwrap();

    let entry = lib.find(&content_id("http://x/untitled.mp4")).await.unwrap().unwrap();
    assert_eq!(entry.name, "http://x/untitled.mp4");
    assert!(entry.tags.is_empty());
}

// ---------------------------------------------------------------------------
// Test: a vanished download file fails the completion
// ---------------------------------------------------------------------------

#[tokio::test]
async fn missing_file_is_an_error() {
    let root = tempfile::tempdir().unwrap();
    let lib = library(root.path());

    let result = LibraryIngest::new(Arc::clone(&lib), Arc::new(DirectUrlDecoder))
        .on_complete(&CompletedDownload {
            origin_url: "http://x/a.mp4".into(),
            file: root.path().join("nowhere.mp4"),
        })
        .await;

    assert!(matches!(result, Err(DownloadError::Store(_))));
    assert!(lib.find(&content_id("http://x/a.mp4")).await.unwrap().is_none());
}

// ---------------------------------------------------------------------------
// Test: an entry deleted while its URL was downloading is not re-added
// ---------------------------------------------------------------------------

#[tokio::test]
async fn tombstoned_entry_discards_download() {
    let root = tempfile::tempdir().unwrap();
    let scratch = tempfile::tempdir().unwrap();
    let lib = library(root.path());
    let id = content_id("http://x/gone.mp4");
    lib.delete(&id).await.unwrap();
    let file = scratch.path().join("out.mp4");
    std::fs::write(&file, b"bytes").unwrap();

    LibraryIngest::new(Arc::clone(&lib), Arc::new(Described))
        .on_complete(&CompletedDownload {
            origin_url: "http://x/gone.mp4".into(),
            file: file.clone(),
        })
        .await
        .unwrap();

    assert!(!file.exists());
    assert!(lib.find(&id).await.unwrap().is_none());
    assert!(!lib.video_path(&id).exists());
}
