//! URL decoders: external services that turn an origin page URL into direct
//! media URLs and descriptive metadata.

use std::sync::Arc;
use std::time::Duration;

use async_trait::async_trait;
use serde::{Deserialize, Serialize};

use crate::error::DownloadError;
use crate::rate_limit::RateLimiter;
use crate::task::{CompletionHandler, DownloadTask, ResolvedMedia, Resolver};

/// Title and tags a decoder found for an origin URL.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct MediaMetadata {
    pub title: String,
    #[serde(default)]
    pub tags: Vec<String>,
}

#[async_trait]
pub trait UrlDecoder: Send + Sync {
    /// Direct URLs for `origin_url`, or `None` if no decoder understands it.
    async fn decode(&self, origin_url: &str) -> Result<Option<ResolvedMedia>, DownloadError>;

    /// Metadata for `origin_url`, or `None` if no decoder has any.
    async fn metadata(&self, origin_url: &str) -> Result<Option<MediaMetadata>, DownloadError>;
}

// ---------------------------------------------------------------------------
// HTTP decoder
// ---------------------------------------------------------------------------

#[derive(Debug, Serialize)]
struct DecodeRequest<'a> {
    url: &'a str,
}

/// Decoder backed by one or more HTTP endpoints.
///
/// Each endpoint exposes `POST /decrypt` and `POST /metadata`, both taking
/// `{"url": ...}`. Endpoints are tried in configuration order and the first
/// useful answer wins.
pub struct HttpUrlDecoder {
    client: reqwest::Client,
    endpoints: Vec<String>,
    limiter: Arc<dyn RateLimiter>,
}

impl HttpUrlDecoder {
    pub fn new(endpoints: Vec<String>, limiter: Arc<dyn RateLimiter>) -> Result<Self, DownloadError> {
        let client = reqwest::Client::builder()
            .connect_timeout(Duration::from_secs(20))
            .timeout(Duration::from_secs(60))
            .build()?;
        Ok(Self::with_client(client, endpoints, limiter))
    }

    pub fn with_client(client: reqwest::Client, endpoints: Vec<String>, limiter: Arc<dyn RateLimiter>) -> Self {
        let endpoints = endpoints
            .into_iter()
            .map(|e| e.trim_end_matches('/').to_string())
            .filter(|e| !e.is_empty())
            .collect();
        Self {
            client,
            endpoints,
            limiter,
        }
    }

    pub fn endpoints(&self) -> &[String] {
        &self.endpoints
    }

    /// POST `origin_url` to `<endpoint>/<path>`.
    ///
    /// Non-success statuses and transport errors count as "this endpoint has
    /// nothing" and are logged, so the next endpoint gets its turn.
    async fn post<T>(&self, endpoint: &str, path: &str, origin_url: &str) -> Option<T>
    where
        T: serde::de::DeserializeOwned,
    {
        self.limiter.take_token().await;

        let url = format!("{endpoint}/{path}");
        let response = match self
            .client
            .post(&url)
            .json(&DecodeRequest { url: origin_url })
            .send()
            .await
        {
            Ok(response) => response,
            Err(e) => {
                tracing::warn!(endpoint = %endpoint, error = %e, "URL decoder request failed");
                return None;
            }
        };

        if !response.status().is_success() {
            tracing::info!(
                endpoint = %endpoint,
                status = response.status().as_u16(),
                "URL decoder had no answer",
            );
            return None;
        }

        match response.json::<T>().await {
            Ok(body) => Some(body),
            Err(e) => {
                tracing::warn!(endpoint = %endpoint, error = %e, "URL decoder sent malformed body");
                None
            }
        }
    }
}

#[async_trait]
impl UrlDecoder for HttpUrlDecoder {
    async fn decode(&self, origin_url: &str) -> Result<Option<ResolvedMedia>, DownloadError> {
        for endpoint in &self.endpoints {
            tracing::debug!(endpoint = %endpoint, origin_url = %origin_url, "Trying URL decoder");
            if let Some(media) = self.post::<ResolvedMedia>(endpoint, "decrypt", origin_url).await {
                if !media.urls.is_empty() {
                    return Ok(Some(media));
                }
            }
        }
        Ok(None)
    }

    async fn metadata(&self, origin_url: &str) -> Result<Option<MediaMetadata>, DownloadError> {
        for endpoint in &self.endpoints {
            if let Some(meta) = self.post::<MediaMetadata>(endpoint, "metadata", origin_url).await {
                return Ok(Some(meta));
            }
        }
        Ok(None)
    }
}

// ---------------------------------------------------------------------------
// Task construction
// ---------------------------------------------------------------------------

/// [`Resolver`] asking a [`UrlDecoder`] on every call.
pub struct DecoderResolver {
    decoder: Arc<dyn UrlDecoder>,
}

impl DecoderResolver {
    pub fn new(decoder: Arc<dyn UrlDecoder>) -> Self {
        Self { decoder }
    }
}

#[async_trait]
impl Resolver for DecoderResolver {
    async fn resolve(&self, origin_url: &str) -> Result<ResolvedMedia, DownloadError> {
        self.decoder
            .decode(origin_url)
            .await?
            .ok_or_else(|| DownloadError::NoDecoderMatched(origin_url.to_string()))
    }
}

/// Build a task whose direct URLs come from `decoder`.
pub fn make_download_task(
    decoder: Arc<dyn UrlDecoder>,
    origin_url: impl Into<String>,
    on_complete: Arc<dyn CompletionHandler>,
) -> DownloadTask {
    DownloadTask::new(origin_url, Arc::new(DecoderResolver::new(decoder)), on_complete)
}

/// Decoder that treats every origin URL as a direct single-file link.
///
/// Used when no decoder endpoints are configured.
#[derive(Debug, Clone, Copy, Default)]
pub struct DirectUrlDecoder;

#[async_trait]
impl UrlDecoder for DirectUrlDecoder {
    async fn decode(&self, origin_url: &str) -> Result<Option<ResolvedMedia>, DownloadError> {
        Ok(Some(ResolvedMedia {
            urls: vec![origin_url.to_string()],
            kind: crate::task::MediaKind::SingleFile,
        }))
    }

    async fn metadata(&self, _origin_url: &str) -> Result<Option<MediaMetadata>, DownloadError> {
        Ok(None)
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::rate_limit::Unlimited;
    use crate::task::{KeepFile, MediaKind};
    use assert_matches::assert_matches;

    struct NoMatch;

    #[async_trait]
    impl UrlDecoder for NoMatch {
        async fn decode(&self, _: &str) -> Result<Option<ResolvedMedia>, DownloadError> {
            Ok(None)
        }

        async fn metadata(&self, _: &str) -> Result<Option<MediaMetadata>, DownloadError> {
            Ok(None)
        }
    }

    #[tokio::test]
    async fn resolver_without_match_fails() {
        let resolver = DecoderResolver::new(Arc::new(NoMatch));
        let result = resolver.resolve("http://page").await;
        assert_matches!(result, Err(DownloadError::NoDecoderMatched(url)) if url == "http://page");
    }

    #[tokio::test]
    async fn direct_decoder_passes_url_through() {
        let task = make_download_task(Arc::new(DirectUrlDecoder), "http://x/a.mp4", Arc::new(KeepFile));
        let resolved = task.resolve().await.unwrap();
        assert_eq!(resolved.urls, vec!["http://x/a.mp4"]);
        assert_eq!(resolved.kind, MediaKind::SingleFile);
    }

    #[test]
    fn endpoints_are_normalized() {
        let decoder = HttpUrlDecoder::with_client(
            reqwest::Client::new(),
            vec!["http://a/".into(), "".into(), "http://b".into()],
            Arc::new(Unlimited),
        );
        assert_eq!(decoder.endpoints(), ["http://a", "http://b"]);
    }

    #[tokio::test]
    async fn no_endpoints_means_no_match() {
        let decoder = HttpUrlDecoder::with_client(reqwest::Client::new(), Vec::new(), Arc::new(Unlimited));
        assert!(decoder.decode("http://page").await.unwrap().is_none());
        assert!(decoder.metadata("http://page").await.unwrap().is_none());
    }
}
