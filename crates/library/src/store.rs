//! Metadata store abstraction.

use async_trait::async_trait;

use crate::error::StoreError;
use crate::models::MediaEntry;

/// Result of looking up an id in a [`MetadataStore`].
#[derive(Debug, Clone, PartialEq, Eq)]
pub enum MetadataLookup {
    /// The entry exists.
    Found(MediaEntry),
    /// The entry existed and was deleted. Its URL must not be downloaded
    /// again.
    Tombstone,
    /// The id was never seen.
    NotFound,
}

impl MetadataLookup {
    pub fn entry(self) -> Option<MediaEntry> {
        match self {
            Self::Found(entry) => Some(entry),
            Self::Tombstone | Self::NotFound => None,
        }
    }

    /// Whether the id is known, either live or deleted.
    pub fn is_known(&self) -> bool {
        !matches!(self, Self::NotFound)
    }
}

/// Persistent storage of [`MediaEntry`] metadata.
#[async_trait]
pub trait MetadataStore: Send + Sync {
    async fn get(&self, id: &str) -> Result<MetadataLookup, StoreError>;

    /// Insert or replace the entry stored under `entry.id`.
    async fn put(&self, entry: &MediaEntry) -> Result<(), StoreError>;

    /// Remove the entry, leaving a tombstone behind.
    async fn delete(&self, id: &str) -> Result<(), StoreError>;

    /// Every live entry. Tombstones are not listed.
    async fn list_all(&self) -> Result<Vec<MediaEntry>, StoreError>;
}
