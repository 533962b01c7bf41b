//! Download task model.

use std::fmt;
use std::path::PathBuf;
use std::sync::Arc;

use async_trait::async_trait;
use mediavault_core::hashing::content_id;
use mediavault_core::types::ContentId;
use serde::{Deserialize, Serialize};

use crate::error::DownloadError;
use crate::progress::Progress;

// ---------------------------------------------------------------------------
// Resolution
// ---------------------------------------------------------------------------

/// Shape of the media behind a set of direct URLs.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize, Deserialize)]
#[serde(rename_all = "SCREAMING_SNAKE_CASE")]
pub enum MediaKind {
    /// One URL, one complete file.
    SingleFile,
    /// HLS playlist segments: MPEG transport stream parts in order.
    #[serde(rename = "M3U8")]
    TransportStream,
    /// Separate video and audio streams, in that order.
    #[serde(rename = "DASH")]
    Dash,
    None,
}

/// Direct URLs for an origin URL.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct ResolvedMedia {
    pub urls: Vec<String>,
    #[serde(rename = "type")]
    pub kind: MediaKind,
}

/// Turns an origin URL into direct download URLs.
///
/// May be called more than once per task: direct URLs expire and are
/// re-resolved after an HTTP 403.
#[async_trait]
pub trait Resolver: Send + Sync {
    async fn resolve(&self, origin_url: &str) -> Result<ResolvedMedia, DownloadError>;
}

/// Resolver for URLs that are already direct.
#[derive(Debug, Clone)]
pub struct StaticResolver {
    media: ResolvedMedia,
}

impl StaticResolver {
    pub fn new(urls: Vec<String>, kind: MediaKind) -> Self {
        Self {
            media: ResolvedMedia { urls, kind },
        }
    }

    /// The origin URL itself is the single file to download.
    pub fn direct(url: impl Into<String>) -> Self {
        Self::new(vec![url.into()], MediaKind::SingleFile)
    }
}

#[async_trait]
impl Resolver for StaticResolver {
    async fn resolve(&self, _origin_url: &str) -> Result<ResolvedMedia, DownloadError> {
        Ok(self.media.clone())
    }
}

// ---------------------------------------------------------------------------
// Completion
// ---------------------------------------------------------------------------

/// A download that finished post-processing.
#[derive(Debug, Clone, PartialEq, Eq, Serialize)]
#[serde(rename_all = "camelCase")]
pub struct CompletedDownload {
    pub origin_url: String,
    pub file: PathBuf,
}

/// Receives the finished file of a task, e.g. to move it into the library.
#[async_trait]
pub trait CompletionHandler: Send + Sync {
    async fn on_complete(&self, completed: &CompletedDownload) -> Result<(), DownloadError>;
}

/// Leaves the finished file where it is.
#[derive(Debug, Clone, Copy, Default)]
pub struct KeepFile;

#[async_trait]
impl CompletionHandler for KeepFile {
    async fn on_complete(&self, completed: &CompletedDownload) -> Result<(), DownloadError> {
        tracing::info!(
            origin_url = %completed.origin_url,
            file = %completed.file.display(),
            "Download kept in work directory",
        );
        Ok(())
    }
}

// ---------------------------------------------------------------------------
// Tasks
// ---------------------------------------------------------------------------

pub struct DownloadTask {
    origin_url: String,
    id: ContentId,
    resolver: Arc<dyn Resolver>,
    on_complete: Arc<dyn CompletionHandler>,
    progress: Progress,
}

impl DownloadTask {
    pub fn new(
        origin_url: impl Into<String>,
        resolver: Arc<dyn Resolver>,
        on_complete: Arc<dyn CompletionHandler>,
    ) -> Self {
        let origin_url = origin_url.into();
        Self {
            id: content_id(&origin_url),
            origin_url,
            resolver,
            on_complete,
            progress: Progress::default(),
        }
    }

    pub fn origin_url(&self) -> &str {
        &self.origin_url
    }

    /// Library id the finished download will be stored under.
    pub fn content_id(&self) -> &str {
        &self.id
    }

    pub fn progress(&self) -> &Progress {
        &self.progress
    }

    pub async fn resolve(&self) -> Result<ResolvedMedia, DownloadError> {
        self.resolver.resolve(&self.origin_url).await
    }

    pub fn completion(&self) -> &Arc<dyn CompletionHandler> {
        &self.on_complete
    }

    pub fn snapshot(&self) -> DownloadSnapshot {
        DownloadSnapshot {
            origin_url: self.origin_url.clone(),
            id: self.id.clone(),
            progress: self.progress.get(),
            error: None,
        }
    }

    pub fn to_dto(&self) -> DownloadTaskDto {
        DownloadTaskDto {
            origin_url: self.origin_url.clone(),
            progress: self.progress.get(),
        }
    }
}

impl fmt::Debug for DownloadTask {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.debug_struct("DownloadTask")
            .field("origin_url", &self.origin_url)
            .field("progress", &self.progress.get())
            .finish_non_exhaustive()
    }
}

/// A task that failed and waits to be retried or removed.
#[derive(Debug, Clone)]
pub struct ProblematicTask {
    pub origin_url: String,
    pub error: Arc<DownloadError>,
}

impl ProblematicTask {
    pub fn new(origin_url: impl Into<String>, error: DownloadError) -> Self {
        Self {
            origin_url: origin_url.into(),
            error: Arc::new(error),
        }
    }

    /// Whether the task was interrupted by shutdown rather than failing.
    pub fn cancelled(&self) -> bool {
        self.error.is_cancellation()
    }

    pub fn snapshot(&self) -> DownloadSnapshot {
        DownloadSnapshot {
            id: content_id(&self.origin_url),
            origin_url: self.origin_url.clone(),
            progress: 0.0,
            error: Some(self.error.to_string()),
        }
    }

    pub fn to_dto(&self) -> DownloadTaskDto {
        DownloadTaskDto {
            origin_url: self.origin_url.clone(),
            progress: 0.0,
        }
    }
}

// ---------------------------------------------------------------------------
// Views
// ---------------------------------------------------------------------------

/// Persisted queue record.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct DownloadTaskDto {
    pub origin_url: String,
    #[serde(default)]
    pub progress: f64,
}

/// Point-in-time view of a queued, running or problematic task.
#[derive(Debug, Clone, PartialEq, Serialize)]
#[serde(rename_all = "camelCase")]
pub struct DownloadSnapshot {
    pub origin_url: String,
    pub id: ContentId,
    pub progress: f64,
    #[serde(skip_serializing_if = "Option::is_none")]
    pub error: Option<String>,
}
