//! Filesystem-backed metadata store.
//!
//! Each entry lives in its own directory `<root>/<id>/` with the metadata in
//! `<id>.json`. A directory without that JSON file is a tombstone: the entry
//! was deleted but its id stays reserved.

use std::path::{Path, PathBuf};

use async_trait::async_trait;

use crate::error::StoreError;
use crate::models::MediaEntry;
use crate::store::{MetadataLookup, MetadataStore};

#[derive(Debug, Clone)]
pub struct FsMetadataStore {
    root: PathBuf,
}

impl FsMetadataStore {
    pub fn new(root: impl Into<PathBuf>) -> Self {
        Self { root: root.into() }
    }

    pub fn root(&self) -> &Path {
        &self.root
    }

    pub fn entry_dir(&self, id: &str) -> PathBuf {
        self.root.join(id)
    }

    pub fn metadata_path(&self, id: &str) -> PathBuf {
        self.entry_dir(id).join(format!("{id}.json"))
    }
}

#[async_trait]
impl MetadataStore for FsMetadataStore {
    async fn get(&self, id: &str) -> Result<MetadataLookup, StoreError> {
        if !tokio::fs::try_exists(self.entry_dir(id)).await? {
            return Ok(MetadataLookup::NotFound);
        }

        let bytes = match tokio::fs::read(self.metadata_path(id)).await {
            Ok(bytes) => bytes,
            Err(e) if e.kind() == std::io::ErrorKind::NotFound => {
                return Ok(MetadataLookup::Tombstone)
            }
            Err(e) => return Err(e.into()),
        };

        let mut entry: MediaEntry = serde_json::from_slice(&bytes)?;
        // The directory name is authoritative.
        entry.id = id.to_string();
        Ok(MetadataLookup::Found(entry))
    }

    async fn put(&self, entry: &MediaEntry) -> Result<(), StoreError> {
        tokio::fs::create_dir_all(self.entry_dir(&entry.id)).await?;

        let path = self.metadata_path(&entry.id);
        let tmp = path.with_extension("json.tmp");
        tokio::fs::write(&tmp, serde_json::to_vec_pretty(entry)?).await?;
        tokio::fs::rename(&tmp, &path).await?;
        Ok(())
    }

    async fn delete(&self, id: &str) -> Result<(), StoreError> {
        match tokio::fs::remove_file(self.metadata_path(id)).await {
            Ok(()) => Ok(()),
            Err(e) if e.kind() == std::io::ErrorKind::NotFound => Ok(()),
            Err(e) => Err(e.into()),
        }
    }

    async fn list_all(&self) -> Result<Vec<MediaEntry>, StoreError> {
        let mut dir = match tokio::fs::read_dir(&self.root).await {
            Ok(dir) => dir,
            Err(e) if e.kind() == std::io::ErrorKind::NotFound => return Ok(Vec::new()),
            Err(e) => return Err(e.into()),
        };

        let mut entries = Vec::new();
        while let Some(item) = dir.next_entry().await? {
            if !item.file_type().await?.is_dir() {
                continue;
            }
            let Some(id) = item.file_name().to_str().map(str::to_string) else {
                continue;
            };
            match self.get(&id).await {
                Ok(MetadataLookup::Found(entry)) => entries.push(entry),
                Ok(_) => {}
                Err(e) => {
                    tracing::warn!(id = %id, error = %e, "Skipping unreadable library entry");
                }
            }
        }

        entries.sort_by(|a, b| a.id.cmp(&b.id));
        Ok(entries)
    }
}
