use std::path::PathBuf;
use std::time::Duration;

use mediavault_downloader::DownloaderConfig;

/// Worker configuration loaded from environment variables.
///
/// All fields have defaults suitable for running from a checkout.
#[derive(Debug, Clone)]
pub struct AppConfig {
    /// Root of the media library (default: `./mediaLibrary`).
    pub media_library_path: PathBuf,
    /// Directory for user state such as the persisted queue
    /// (default: `./userConfig`).
    pub user_config_path: PathBuf,
    /// Work directory for in-progress downloads (default: `./downloads`).
    pub downloads_path: PathBuf,
    pub download_workers: usize,
    pub finished_history: usize,
    pub shutdown_timeout_secs: u64,
    /// Minimum spacing of URL decoder requests.
    pub request_token_interval_ms: u64,
    /// Base URLs of URL decoder services, tried in order.
    pub url_decoder_endpoints: Vec<String>,
    /// Generate missing hash files before accepting downloads.
    pub ensure_hashes_on_start: bool,
}

impl AppConfig {
    /// Load configuration from environment variables with defaults.
    ///
    /// | Env Var                     | Default          |
    /// |-----------------------------|------------------|
    /// | `MEDIA_LIBRARY_PATH`        | `./mediaLibrary` |
    /// | `USER_CONFIG_PATH`          | `./userConfig`   |
    /// | `DOWNLOADS_PATH`            | `./downloads`    |
    /// | `DOWNLOAD_WORKERS`          | `1`              |
    /// | `FINISHED_HISTORY`          | `100`            |
    /// | `SHUTDOWN_TIMEOUT_SECS`     | `30`             |
    /// | `REQUEST_TOKEN_INTERVAL_MS` | `5000`           |
    /// | `URL_DECODER_ENDPOINTS`     | empty            |
    /// | `ENSURE_HASHES_ON_START`    | `false`          |
    ///
    /// Panics on values that do not parse, so misconfiguration fails at
    /// startup.
    pub fn from_env() -> Self {
        Self::from_lookup(|key| std::env::var(key).ok())
    }

    /// Like [`from_env`](Self::from_env), reading variables through `lookup`.
    pub fn from_lookup(lookup: impl Fn(&str) -> Option<String>) -> Self {
        let var = |key: &str, default: &str| lookup(key).unwrap_or_else(|| default.into());

        let download_workers: usize = var("DOWNLOAD_WORKERS", "1")
            .parse()
            .expect("DOWNLOAD_WORKERS must be a valid usize");

        let finished_history: usize = var("FINISHED_HISTORY", "100")
            .parse()
            .expect("FINISHED_HISTORY must be a valid usize");

        let shutdown_timeout_secs: u64 = var("SHUTDOWN_TIMEOUT_SECS", "30")
            .parse()
            .expect("SHUTDOWN_TIMEOUT_SECS must be a valid u64");

        let request_token_interval_ms: u64 = var("REQUEST_TOKEN_INTERVAL_MS", "5000")
            .parse()
            .expect("REQUEST_TOKEN_INTERVAL_MS must be a valid u64");

        let url_decoder_endpoints: Vec<String> = var("URL_DECODER_ENDPOINTS", "")
            .split(',')
            .map(|s| s.trim().to_string())
            .filter(|s| !s.is_empty())
            .collect();

        let ensure_hashes_on_start = matches!(
            var("ENSURE_HASHES_ON_START", "false").to_ascii_lowercase().as_str(),
            "1" | "true" | "yes"
        );

        Self {
            media_library_path: var("MEDIA_LIBRARY_PATH", "./mediaLibrary").into(),
            user_config_path: var("USER_CONFIG_PATH", "./userConfig").into(),
            downloads_path: var("DOWNLOADS_PATH", "./downloads").into(),
            download_workers,
            finished_history,
            shutdown_timeout_secs,
            request_token_interval_ms,
            url_decoder_endpoints,
            ensure_hashes_on_start,
        }
    }

    pub fn queue_file(&self) -> PathBuf {
        self.user_config_path.join("queue.json")
    }

    pub fn request_token_interval(&self) -> Duration {
        Duration::from_millis(self.request_token_interval_ms)
    }

    pub fn downloader(&self) -> DownloaderConfig {
        DownloaderConfig {
            workers: self.download_workers,
            work_dir: self.downloads_path.clone(),
            queue_file: self.queue_file(),
            finished_history: self.finished_history,
            shutdown_timeout: Duration::from_secs(self.shutdown_timeout_secs),
            ..DownloaderConfig::default()
        }
    }
}
