use mediavault_core::error::CoreError;
use mediavault_core::ffmpeg::FfmpegError;

/// Errors raised by metadata stores and the media library.
#[derive(Debug, thiserror::Error)]
pub enum StoreError {
    #[error("I/O error: {0}")]
    Io(#[from] std::io::Error),

    #[error("Malformed metadata: {0}")]
    Json(#[from] serde_json::Error),

    #[error(transparent)]
    Core(#[from] CoreError),

    #[error(transparent)]
    Ffmpeg(#[from] FfmpegError),

    #[error("Background task failed: {0}")]
    Join(#[from] tokio::task::JoinError),
}
