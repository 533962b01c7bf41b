use std::path::PathBuf;
use std::time::Duration;

use crate::downloader::DEFAULT_USER_AGENT;

/// Runtime settings of a [`DownloadManager`](crate::DownloadManager).
#[derive(Debug, Clone)]
pub struct DownloaderConfig {
    /// Number of concurrent workers. Zero starts a paused manager that only
    /// queues.
    pub workers: usize,
    /// Where part files and post-processed outputs are written.
    pub work_dir: PathBuf,
    /// JSON file holding the queue between runs.
    pub queue_file: PathBuf,
    /// How many finished downloads to remember.
    pub finished_history: usize,
    /// Upper bound on waiting for workers during shutdown.
    pub shutdown_timeout: Duration,
    pub user_agent: String,
    pub connect_timeout: Duration,
}

impl Default for DownloaderConfig {
    fn default() -> Self {
        Self {
            workers: 1,
            work_dir: PathBuf::from("./downloads"),
            queue_file: PathBuf::from("./userConfig/queue.json"),
            finished_history: 100,
            shutdown_timeout: Duration::from_secs(30),
            user_agent: DEFAULT_USER_AGENT.to_string(),
            connect_timeout: Duration::from_secs(30),
        }
    }
}
