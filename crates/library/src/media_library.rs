//! On-disk media library.
//!
//! Layout per entry:
//!
//! ```text
//! <root>/<id>/<id>.mp4      video
//! <root>/<id>/<id>.json     metadata (owned by the metadata store)
//! <root>/<id>/dhashes.bin   frame hashes
//! <root>/<id>/thumbNNNN.jpg thumbnails
//! ```

use std::path::{Path, PathBuf};
use std::sync::Arc;

use mediavault_core::dhash::DHash;
use mediavault_core::ffmpeg::{self, THUMBNAIL_TIMEOUT};
use mediavault_core::frames;
use mediavault_core::hash_store::{self, HASH_FILE_NAME};
use mediavault_core::media_tool::MediaToolLock;
use serde::Serialize;

use crate::error::StoreError;
use crate::models::MediaEntry;
use crate::store::MetadataStore;

/// Prefix shared by all generated thumbnail files.
const THUMBNAIL_PREFIX: &str = "thumb";

/// Outcome of [`MediaLibrary::ensure_hashes`].
#[derive(Debug, Clone, Default, PartialEq, Eq, Serialize)]
pub struct EnsureHashesReport {
    /// Entries that already had a usable hash file.
    pub present: usize,
    /// Entries whose hashes were (re)generated.
    pub generated: usize,
    /// Entries with no video file on disk.
    pub missing_video: usize,
    /// Entries whose generation failed.
    pub failed: usize,
}

pub struct MediaLibrary {
    root: PathBuf,
    store: Arc<dyn MetadataStore>,
    tool_lock: MediaToolLock,
}

impl MediaLibrary {
    pub fn new(root: impl Into<PathBuf>, store: Arc<dyn MetadataStore>, tool_lock: MediaToolLock) -> Self {
        Self {
            root: root.into(),
            store,
            tool_lock,
        }
    }

    pub fn root(&self) -> &Path {
        &self.root
    }

    pub fn store(&self) -> &Arc<dyn MetadataStore> {
        &self.store
    }

    pub fn tool_lock(&self) -> &MediaToolLock {
        &self.tool_lock
    }

    // ---- layout ----

    pub fn entry_dir(&self, id: &str) -> PathBuf {
        self.root.join(id)
    }

    pub fn video_path(&self, id: &str) -> PathBuf {
        self.entry_dir(id).join(format!("{id}.mp4"))
    }

    pub fn hash_path(&self, id: &str) -> PathBuf {
        self.entry_dir(id).join(HASH_FILE_NAME)
    }

    // ---- metadata ----

    pub async fn entries(&self) -> Result<Vec<MediaEntry>, StoreError> {
        self.store.list_all().await
    }

    pub async fn find(&self, id: &str) -> Result<Option<MediaEntry>, StoreError> {
        Ok(self.store.get(id).await?.entry())
    }

    /// Whether `id` is a live entry or a tombstone, in the store or on disk.
    pub async fn exists_or_tombstone(&self, id: &str) -> Result<bool, StoreError> {
        if self.store.get(id).await?.is_known() {
            return Ok(true);
        }
        Ok(tokio::fs::try_exists(self.entry_dir(id)).await?)
    }

    // ---- content ----

    /// Move `source` into the library under `entry.id` and persist `entry`.
    ///
    /// The video is copied first and the source removed only after the
    /// metadata has been written. Returns the video's library path.
    pub async fn add_video(&self, entry: &MediaEntry, source: &Path) -> Result<PathBuf, StoreError> {
        if !tokio::fs::try_exists(source).await? {
            return Err(StoreError::Io(std::io::Error::new(
                std::io::ErrorKind::NotFound,
                format!("Source file does not exist: {}", source.display()),
            )));
        }

        let target = self.video_path(&entry.id);
        tokio::fs::create_dir_all(self.entry_dir(&entry.id)).await?;

        tracing::info!(id = %entry.id, source = %source.display(), "Copying video into library");
        tokio::fs::copy(source, &target).await?;
        self.store.put(entry).await?;
        tokio::fs::remove_file(source).await?;

        tracing::info!(id = %entry.id, name = %entry.name, "Added library entry");
        Ok(target)
    }

    /// Delete an entry's files and metadata, keeping its directory as a
    /// tombstone.
    pub async fn delete(&self, id: &str) -> Result<(), StoreError> {
        let dir = self.entry_dir(id);
        match tokio::fs::read_dir(&dir).await {
            Ok(mut items) => {
                while let Some(item) = items.next_entry().await? {
                    let path = item.path();
                    if item.file_type().await?.is_dir() {
                        tokio::fs::remove_dir_all(&path).await?;
                    } else {
                        tokio::fs::remove_file(&path).await?;
                    }
                }
            }
            Err(e) if e.kind() == std::io::ErrorKind::NotFound => {
                tokio::fs::create_dir_all(&dir).await?;
            }
            Err(e) => return Err(e.into()),
        }
        self.store.delete(id).await?;
        tracing::info!(id = %id, "Deleted library entry");
        Ok(())
    }

    // ---- hashes ----

    /// Load the entry's hash sequence, or `None` if it is missing or was
    /// discarded as incomplete.
    pub async fn load_hashes(&self, id: &str) -> Result<Option<Vec<DHash>>, StoreError> {
        Ok(hash_store::load_valid_hashes(&self.hash_path(id)).await?)
    }

    /// Regenerate the entry's hash file from its video.
    pub async fn generate_hashes(&self, id: &str) -> Result<usize, StoreError> {
        Ok(frames::generate_and_store_hashes(&self.video_path(id), &self.tool_lock).await?)
    }

    /// Generate hashes for every entry that lacks a usable hash file.
    ///
    /// Individual failures are logged and counted; they do not stop the run.
    pub async fn ensure_hashes(&self) -> Result<EnsureHashesReport, StoreError> {
        let mut report = EnsureHashesReport::default();

        for entry in self.entries().await? {
            match self.load_hashes(&entry.id).await {
                Ok(Some(_)) => {
                    report.present += 1;
                    continue;
                }
                Ok(None) => {}
                Err(e) => {
                    tracing::warn!(id = %entry.id, error = %e, "Unreadable hash file, regenerating");
                }
            }

            if !tokio::fs::try_exists(self.video_path(&entry.id)).await? {
                report.missing_video += 1;
                continue;
            }

            match self.generate_hashes(&entry.id).await {
                Ok(count) => {
                    tracing::info!(id = %entry.id, count, "Generated missing hashes");
                    report.generated += 1;
                }
                Err(e) => {
                    tracing::error!(id = %entry.id, error = %e, "Hash generation failed");
                    report.failed += 1;
                }
            }
        }

        Ok(report)
    }

    // ---- thumbnails ----

    /// Render preview thumbnails next to the entry's video.
    ///
    /// Waits for the media tool lock like hash generation does.
    pub async fn generate_thumbnails(&self, id: &str) -> Result<(), StoreError> {
        let video = self.video_path(id);
        self.tool_lock
            .run(|| ffmpeg::generate_thumbnails(&video, THUMBNAIL_TIMEOUT))
            .await?;
        Ok(())
    }

    /// Thumbnail files of an entry, in name order.
    pub async fn thumbnails(&self, id: &str) -> Result<Vec<PathBuf>, StoreError> {
        let mut items = match tokio::fs::read_dir(self.entry_dir(id)).await {
            Ok(items) => items,
            Err(e) if e.kind() == std::io::ErrorKind::NotFound => return Ok(Vec::new()),
            Err(e) => return Err(e.into()),
        };

        let mut thumbs = Vec::new();
        while let Some(item) = items.next_entry().await? {
            if item.file_name().to_string_lossy().starts_with(THUMBNAIL_PREFIX) {
                thumbs.push(item.path());
            }
        }
        thumbs.sort();
        Ok(thumbs)
    }
}
