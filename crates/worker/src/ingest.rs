//! Completion handler moving finished downloads into the media library.

use std::sync::Arc;

use async_trait::async_trait;
use mediavault_core::hash_store::MIN_VALID_HASHES;
use mediavault_core::hashing::content_id;
use mediavault_downloader::decoder::UrlDecoder;
use mediavault_downloader::task::{CompletedDownload, CompletionHandler};
use mediavault_downloader::DownloadError;
use mediavault_library::{MediaEntry, MediaLibrary, StoreError};
use tracing::Level;

pub struct LibraryIngest {
    library: Arc<MediaLibrary>,
    decoder: Arc<dyn UrlDecoder>,
}

impl LibraryIngest {
    pub fn new(library: Arc<MediaLibrary>, decoder: Arc<dyn UrlDecoder>) -> Self {
        Self { library, decoder }
    }
}

#[async_trait]
impl CompletionHandler for LibraryIngest {
    /// Store the file under its content id with whatever metadata the
    /// decoders know, then hash its frames.
    ///
    /// A download whose id is already in the library, live or tombstoned,
    /// is discarded. Hash generation failures are logged only; the entry is
    /// kept and `ensure-hashes` can retry later.
    async fn on_complete(&self, completed: &CompletedDownload) -> Result<(), DownloadError> {
        let id = content_id(&completed.origin_url);
        if self.library.exists_or_tombstone(&id).await? {
            tracing::warn!(
                id = %id,
                origin_url = %completed.origin_url,
                "Entry appeared in the library while downloading, discarding file",
            );
            tokio::fs::remove_file(&completed.file)
                .await
                .map_err(|e| DownloadError::Store(StoreError::Io(e)))?;
            return Ok(());
        }

        let metadata = match self.decoder.metadata(&completed.origin_url).await {
            Ok(metadata) => metadata,
            Err(e) => {
                tracing::warn!(origin_url = %completed.origin_url, error = %e, "Metadata lookup failed");
                None
            }
        };
        let (title, tags) = match metadata {
            Some(m) => (Some(m.title), m.tags),
            None => (None, Vec::new()),
        };

        let entry = MediaEntry::new(&completed.origin_url, title, tags);
        self.library.add_video(&entry, &completed.file).await?;

        log_hash_result(&entry.id, &self.library.generate_hashes(&entry.id).await);
        Ok(())
    }
}

/// Log the outcome of hashing a new entry and return the level used.
///
/// A file with fewer than [`MIN_VALID_HASHES`] hashes is dropped on its next
/// load, so a short video is regenerated on every `ensure-hashes` run.
fn log_hash_result(id: &str, result: &Result<usize, StoreError>) -> Level {
    match result {
        Ok(count) if *count < MIN_VALID_HASHES => {
            tracing::warn!(
                id = %id,
                count,
                min = MIN_VALID_HASHES,
                "Too few frame hashes, file will be discarded and regenerated",
            );
            Level::WARN
        }
        Ok(count) => {
            tracing::info!(id = %id, count, "Frame hashes stored");
            Level::INFO
        }
        Err(e) => {
            tracing::warn!(id = %id, error = %e, "Frame hashing failed");
            Level::WARN
        }
    }
}
