//! Media library entry model.

use std::collections::BTreeSet;

use chrono::Utc;
use mediavault_core::hashing::content_id;
use mediavault_core::types::{ContentId, Timestamp};
use serde::{Deserialize, Serialize};

/// Metadata of one library entry, persisted as `<id>/<id>.json`.
///
/// `creationDate` is stored as Unix seconds so that existing libraries load
/// unchanged.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct MediaEntry {
    pub id: ContentId,
    pub name: String,
    pub origin_url: String,
    #[serde(with = "chrono::serde::ts_seconds")]
    pub creation_date: Timestamp,
    #[serde(default)]
    pub tags: BTreeSet<String>,
    #[serde(default)]
    pub hits: u64,
}

impl MediaEntry {
    /// Create an entry for a freshly downloaded origin URL.
    ///
    /// The id is derived from the URL; an empty `name` falls back to the URL.
    pub fn new(origin_url: &str, name: Option<String>, tags: impl IntoIterator<Item = String>) -> Self {
        Self {
            id: content_id(origin_url),
            name: name
                .filter(|n| !n.trim().is_empty())
                .unwrap_or_else(|| origin_url.to_string()),
            origin_url: origin_url.to_string(),
            creation_date: Utc::now(),
            tags: tags.into_iter().collect(),
            hits: 0,
        }
    }
}
