//! Reducing downloaded parts to the single output file.

use std::path::{Path, PathBuf};

use mediavault_core::ffmpeg;

use crate::error::DownloadError;
use crate::task::MediaKind;

#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum PostProcessor {
    /// Exactly one part, used as is.
    SingleFile,
    /// Transport stream segments: concatenated, then remuxed to MP4.
    TransportStream,
    /// Exactly two parts, video then audio, merged without re-encoding.
    DashAv,
}

impl PostProcessor {
    /// `None` for media kinds that cannot be downloaded.
    pub fn for_kind(kind: MediaKind) -> Option<Self> {
        match kind {
            MediaKind::SingleFile => Some(Self::SingleFile),
            MediaKind::TransportStream => Some(Self::TransportStream),
            MediaKind::Dash => Some(Self::DashAv),
            MediaKind::None => None,
        }
    }

    /// Produce the output file from `parts` inside `work_dir`.
    ///
    /// Intermediate files are removed; the caller owns `parts` and the
    /// returned path.
    pub async fn run(self, parts: &[PathBuf], work_dir: &Path) -> Result<PathBuf, DownloadError> {
        match self {
            Self::SingleFile => match parts {
                [only] => Ok(only.clone()),
                _ => Err(part_count_error("single file", 1, parts.len())),
            },
            Self::TransportStream => {
                if parts.is_empty() {
                    return Err(DownloadError::PostProcess(
                        "transport stream without segments".into(),
                    ));
                }
                let stem = uuid::Uuid::now_v7();
                let joined = work_dir.join(format!("{stem}.ts"));
                let output = work_dir.join(format!("{stem}.mp4"));

                let remuxed = match ffmpeg::concat_files(parts, &joined).await {
                    Ok(()) => ffmpeg::remux_to_mp4(&joined, &output).await,
                    Err(e) => Err(e),
                };
                match tokio::fs::remove_file(&joined).await {
                    Ok(()) => {}
                    Err(e) if e.kind() == std::io::ErrorKind::NotFound => {}
                    Err(e) => {
                        tracing::warn!(file = %joined.display(), error = %e, "Failed to remove joined stream");
                    }
                }
                remuxed?;
                Ok(output)
            }
            Self::DashAv => match parts {
                [video, audio] => {
                    let output = work_dir.join(format!("{}.mp4", uuid::Uuid::now_v7()));
                    ffmpeg::merge_audio_video(video, audio, &output).await?;
                    Ok(output)
                }
                _ => Err(part_count_error("DASH", 2, parts.len())),
            },
        }
    }
}

fn part_count_error(what: &str, expected: usize, got: usize) -> DownloadError {
    DownloadError::PostProcess(format!("{what} expects {expected} part(s), got {got}"))
}
