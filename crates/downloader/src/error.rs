use mediavault_core::ffmpeg::FfmpegError;
use mediavault_library::StoreError;

use crate::task::MediaKind;

/// Errors raised while resolving, downloading or finishing a task.
#[derive(Debug, thiserror::Error)]
pub enum DownloadError {
    /// The server answered with a non-success status.
    #[error("HTTP {status} for {url}")]
    Http { status: u16, url: String },

    #[error("Network error: {0}")]
    Network(#[from] reqwest::Error),

    #[error("I/O error: {0}")]
    Io(#[from] std::io::Error),

    #[error("No URL decoder produced direct URLs for {0}")]
    NoDecoderMatched(String),

    /// A fresh resolution returned a different number of parts.
    #[error("Resolving {url} again returned {got} part(s) instead of {expected}")]
    ResolutionChanged { url: String, expected: usize, got: usize },

    #[error("No post-processor for media kind {0:?}")]
    NoPostProcessor(MediaKind),

    #[error("Post-processing failed: {0}")]
    PostProcess(String),

    #[error(transparent)]
    Ffmpeg(#[from] FfmpegError),

    #[error(transparent)]
    Store(#[from] StoreError),

    #[error("Completion handler failed: {0}")]
    Completion(String),

    #[error("Download cancelled")]
    Cancelled,
}

impl DownloadError {
    /// Whether a fresh resolution of the origin URL may fix the failure.
    ///
    /// Direct URLs handed out by decoders expire; an expired URL answers 403.
    pub fn is_transient(&self) -> bool {
        matches!(self, Self::Http { status: 403, .. })
    }

    pub fn is_cancellation(&self) -> bool {
        matches!(self, Self::Cancelled)
    }
}
