//! Download lifecycle events fanned out over a `tokio::sync::broadcast`
//! channel.

use std::path::PathBuf;

use chrono::{DateTime, Utc};
use serde::Serialize;
use tokio::sync::broadcast;

/// Default buffer capacity for the broadcast channel.
const DEFAULT_CAPACITY: usize = 256;

#[derive(Debug, Clone, PartialEq, Serialize)]
#[serde(tag = "event", rename_all = "snake_case")]
pub enum DownloadEvent {
    Queued {
        origin_url: String,
        at: DateTime<Utc>,
    },
    Started {
        worker_id: usize,
        origin_url: String,
        at: DateTime<Utc>,
    },
    Completed {
        origin_url: String,
        file: PathBuf,
        at: DateTime<Utc>,
    },
    Failed {
        origin_url: String,
        error: String,
        /// Interrupted by shutdown rather than a real failure.
        cancelled: bool,
        at: DateTime<Utc>,
    },
}

impl DownloadEvent {
    pub fn origin_url(&self) -> &str {
        match self {
            Self::Queued { origin_url, .. }
            | Self::Started { origin_url, .. }
            | Self::Completed { origin_url, .. }
            | Self::Failed { origin_url, .. } => origin_url,
        }
    }
}

/// Fan-out of [`DownloadEvent`]s to any number of subscribers.
///
/// Slow receivers observe `RecvError::Lagged` once the buffer is full.
#[derive(Debug)]
pub struct DownloadEvents {
    sender: broadcast::Sender<DownloadEvent>,
}

impl DownloadEvents {
    pub fn new(capacity: usize) -> Self {
        let (sender, _) = broadcast::channel(capacity);
        Self { sender }
    }

    pub fn publish(&self, event: DownloadEvent) {
        // Zero receivers is not an error.
        let _ = self.sender.send(event);
    }

    pub fn subscribe(&self) -> broadcast::Receiver<DownloadEvent> {
        self.sender.subscribe()
    }

    pub fn queued(&self, origin_url: &str) {
        self.publish(DownloadEvent::Queued {
            origin_url: origin_url.to_string(),
            at: Utc::now(),
        });
    }

    pub fn started(&self, worker_id: usize, origin_url: &str) {
        self.publish(DownloadEvent::Started {
            worker_id,
            origin_url: origin_url.to_string(),
            at: Utc::now(),
        });
    }

    pub fn completed(&self, origin_url: &str, file: PathBuf) {
        self.publish(DownloadEvent::Completed {
            origin_url: origin_url.to_string(),
            file,
            at: Utc::now(),
        });
    }

    pub fn failed(&self, origin_url: &str, error: &crate::DownloadError) {
        self.publish(DownloadEvent::Failed {
            origin_url: origin_url.to_string(),
            error: error.to_string(),
            cancelled: error.is_cancellation(),
            at: Utc::now(),
        });
    }
}

impl Default for DownloadEvents {
    fn default() -> Self {
        Self::new(DEFAULT_CAPACITY)
    }
}
