//! In-memory metadata store, used by tests and paused setups.

use std::collections::HashMap;
use std::sync::Mutex;

use async_trait::async_trait;

use crate::error::StoreError;
use crate::models::MediaEntry;
use crate::store::{MetadataLookup, MetadataStore};

/// `None` values are tombstones.
#[derive(Debug, Default)]
pub struct InMemoryMetadataStore {
    entries: Mutex<HashMap<String, Option<MediaEntry>>>,
}

impl InMemoryMetadataStore {
    pub fn new() -> Self {
        Self::default()
    }

    /// Mark `id` as deleted without ever having stored it.
    pub fn insert_tombstone(&self, id: impl Into<String>) {
        self.lock().insert(id.into(), None);
    }

    fn lock(&self) -> std::sync::MutexGuard<'_, HashMap<String, Option<MediaEntry>>> {
        self.entries.lock().unwrap_or_else(|poisoned| poisoned.into_inner())
    }
}

#[async_trait]
impl MetadataStore for InMemoryMetadataStore {
    async fn get(&self, id: &str) -> Result<MetadataLookup, StoreError> {
        Ok(match self.lock().get(id) {
            Some(Some(entry)) => MetadataLookup::Found(entry.clone()),
            Some(None) => MetadataLookup::Tombstone,
            None => MetadataLookup::NotFound,
        })
    }

    async fn put(&self, entry: &MediaEntry) -> Result<(), StoreError> {
        self.lock().insert(entry.id.clone(), Some(entry.clone()));
        Ok(())
    }

    async fn delete(&self, id: &str) -> Result<(), StoreError> {
        self.lock().insert(id.to_string(), None);
        Ok(())
    }

    async fn list_all(&self) -> Result<Vec<MediaEntry>, StoreError> {
        let mut entries: Vec<MediaEntry> = self.lock().values().flatten().cloned().collect();
        entries.sort_by(|a, b| a.id.cmp(&b.id));
        Ok(entries)
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use assert_matches::assert_matches;

    #[tokio::test]
    async fn put_get_delete_lifecycle() {
        let store = InMemoryMetadataStore::new();
        let entry = MediaEntry::new("http://x/a.mp4", None, []);

        assert_matches!(store.get(&entry.id).await.unwrap(), MetadataLookup::NotFound);

        store.put(&entry).await.unwrap();
        assert_matches!(store.get(&entry.id).await.unwrap(), MetadataLookup::Found(e) if e == entry);

        store.delete(&entry.id).await.unwrap();
        assert_matches!(store.get(&entry.id).await.unwrap(), MetadataLookup::Tombstone);
        assert!(store.list_all().await.unwrap().is_empty());
    }

    #[tokio::test]
    async fn explicit_tombstone_is_known() {
        let store = InMemoryMetadataStore::new();
        store.insert_tombstone("gone");
        assert!(store.get("gone").await.unwrap().is_known());
    }
}
