//! Download queue and worker pool.
//!
//! [`manager::DownloadManager`] owns a FIFO queue of [`task::DownloadTask`]s
//! and a fixed pool of workers. Each worker resolves a task to direct URLs,
//! streams every part to disk, post-processes the parts into one file and
//! hands the result to the task's completion handler. Failed tasks move to a
//! problematic list from which they can be retried or removed.

pub mod config;
pub mod decoder;
pub mod downloader;
pub mod error;
pub mod events;
pub mod manager;
pub mod post_process;
pub mod progress;
pub mod queue;
pub mod rate_limit;
pub mod task;
pub mod worker;

pub use config::DownloaderConfig;
pub use error::DownloadError;
pub use manager::{DownloadManager, DownloadType, EnqueueOutcome, RejectReason};
pub use task::{CompletedDownload, DownloadTask, ProblematicTask};
