//! Streaming HTTP download of a single direct URL to a file.

use std::path::Path;
use std::time::Duration;

use tokio::io::AsyncWriteExt;

use crate::error::DownloadError;

/// Browser user agent; some hosts refuse unknown clients.
pub const DEFAULT_USER_AGENT: &str =
    "Mozilla/5.0 (Windows NT 10.0; Win64; x64) AppleWebKit/537.36 (KHTML, like Gecko) Chrome/87.0.4280.88 Safari/537.36";

#[derive(Debug, Clone)]
pub struct HttpDownloader {
    client: reqwest::Client,
}

impl HttpDownloader {
    pub fn new(user_agent: &str, connect_timeout: Duration) -> Result<Self, DownloadError> {
        let client = reqwest::Client::builder()
            .user_agent(user_agent)
            .connect_timeout(connect_timeout)
            .build()?;
        Ok(Self { client })
    }

    pub fn with_client(client: reqwest::Client) -> Self {
        Self { client }
    }

    /// Stream `url` into `target`, truncating it first.
    ///
    /// `on_progress` is called after every received chunk with the bytes
    /// written so far and the total from `Content-Length`, if known.
    /// Returns the number of bytes written.
    pub async fn download_to<F>(&self, url: &str, target: &Path, mut on_progress: F) -> Result<u64, DownloadError>
    where
        F: FnMut(u64, Option<u64>),
    {
        let mut response = self.client.get(url).send().await?;

        let status = response.status();
        if !status.is_success() {
            return Err(DownloadError::Http {
                status: status.as_u16(),
                url: url.to_string(),
            });
        }

        let total = response.content_length();
        let mut file = tokio::fs::File::create(target).await?;
        let mut received = 0u64;
        on_progress(received, total);

        while let Some(chunk) = response.chunk().await? {
            file.write_all(&chunk).await?;
            received += chunk.len() as u64;
            on_progress(received, total);
        }
        file.flush().await?;

        tracing::debug!(url = %url, bytes = received, "Finished streaming part");
        Ok(received)
    }
}
