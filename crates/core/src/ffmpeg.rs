//! Shared `ffmpeg` command utilities.
//!
//! Every invocation goes through [`run_ffmpeg`], which captures stdout and
//! stderr concurrently and maps process failures onto [`FfmpegError`].
//! Frame hashing streams stdout instead and lives in [`crate::frames`].

use std::ffi::OsStr;
use std::path::{Path, PathBuf};
use std::process::Stdio;
use std::time::Duration;

use tokio::io::AsyncWriteExt;

/// Name of the external binary, resolved through `PATH`.
pub const FFMPEG_BIN: &str = "ffmpeg";

/// Upper bound for a thumbnail generation run.
pub const THUMBNAIL_TIMEOUT: Duration = Duration::from_secs(120);

/// Error type for ffmpeg operations.
#[derive(Debug, thiserror::Error)]
pub enum FfmpegError {
    #[error("ffmpeg binary not found: {0}")]
    NotFound(std::io::Error),

    #[error("ffmpeg execution failed (exit code {exit_code:?}): {stderr}")]
    ExecutionFailed {
        exit_code: Option<i32>,
        stderr: String,
    },

    #[error("ffmpeg finished but did not produce {0}")]
    MissingOutput(String),

    #[error("video file not found: {0}")]
    VideoNotFound(String),

    #[error("ffmpeg did not finish within {0:?}")]
    Timeout(Duration),

    #[error("I/O error: {0}")]
    IoError(#[from] std::io::Error),

    #[error("failed to decode frame {index}: {message}")]
    Decode { index: usize, message: String },
}

/// Captured output of a finished ffmpeg process.
#[derive(Debug, Clone)]
pub struct FfmpegOutput {
    pub stdout: Vec<u8>,
    pub stderr: String,
}

// ---------------------------------------------------------------------------
// Process plumbing
// ---------------------------------------------------------------------------

/// Build an ffmpeg command with piped stdio, optionally rooted in `dir`.
pub fn command<I, S>(args: I, dir: Option<&Path>) -> tokio::process::Command
where
    I: IntoIterator<Item = S>,
    S: AsRef<OsStr>,
{
    let mut cmd = tokio::process::Command::new(FFMPEG_BIN);
    cmd.args(args)
        .stdin(Stdio::null())
        .stdout(Stdio::piped())
        .stderr(Stdio::piped())
        .kill_on_drop(true);
    if let Some(dir) = dir {
        cmd.current_dir(dir);
    }
    cmd
}

/// Map a spawn failure onto [`FfmpegError`].
pub fn spawn_error(e: std::io::Error) -> FfmpegError {
    if e.kind() == std::io::ErrorKind::NotFound {
        FfmpegError::NotFound(e)
    } else {
        FfmpegError::IoError(e)
    }
}

/// Run ffmpeg to completion and return its output.
///
/// A non-zero exit status is reported as [`FfmpegError::ExecutionFailed`]
/// carrying the captured stderr.
pub async fn run_ffmpeg<I, S>(args: I, dir: Option<&Path>) -> Result<FfmpegOutput, FfmpegError>
where
    I: IntoIterator<Item = S>,
    S: AsRef<OsStr>,
{
    let output = command(args, dir).output().await.map_err(spawn_error)?;
    let stderr = String::from_utf8_lossy(&output.stderr).to_string();

    if !output.status.success() {
        return Err(FfmpegError::ExecutionFailed {
            exit_code: output.status.code(),
            stderr,
        });
    }

    Ok(FfmpegOutput {
        stdout: output.stdout,
        stderr,
    })
}

fn ensure_input(path: &Path) -> Result<(), FfmpegError> {
    if path.exists() {
        Ok(())
    } else {
        Err(FfmpegError::VideoNotFound(path.to_string_lossy().to_string()))
    }
}

fn ensure_output(path: &Path) -> Result<(), FfmpegError> {
    if path.exists() {
        Ok(())
    } else {
        Err(FfmpegError::MissingOutput(path.to_string_lossy().to_string()))
    }
}

// ---------------------------------------------------------------------------
// Post-processing
// ---------------------------------------------------------------------------

/// Concatenate `parts` byte for byte into `output`.
///
/// MPEG transport stream segments can be joined this way without touching
/// the container; the result is remuxed afterwards.
pub async fn concat_files(parts: &[PathBuf], output: &Path) -> Result<(), FfmpegError> {
    let mut out = tokio::fs::File::create(output).await?;
    for part in parts {
        ensure_input(part)?;
        let mut input = tokio::fs::File::open(part).await?;
        tokio::io::copy(&mut input, &mut out).await?;
    }
    out.flush().await?;
    Ok(())
}

/// Remux a transport stream into an MP4 container without re-encoding video.
pub async fn remux_to_mp4(input: &Path, output: &Path) -> Result<(), FfmpegError> {
    ensure_input(input)?;
    let args: [&OsStr; 7] = [
        OsStr::new("-y"),
        OsStr::new("-i"),
        input.as_os_str(),
        OsStr::new("-c:v"),
        OsStr::new("copy"),
        OsStr::new("-f"),
        OsStr::new("mp4"),
    ];
    run_ffmpeg(args.into_iter().chain([output.as_os_str()]), None).await?;
    ensure_output(output)
}

/// Merge a video-only and an audio-only stream into one MP4.
pub async fn merge_audio_video(video: &Path, audio: &Path, output: &Path) -> Result<(), FfmpegError> {
    ensure_input(video)?;
    ensure_input(audio)?;
    let args: [&OsStr; 9] = [
        OsStr::new("-y"),
        OsStr::new("-i"),
        video.as_os_str(),
        OsStr::new("-i"),
        audio.as_os_str(),
        OsStr::new("-c"),
        OsStr::new("copy"),
        OsStr::new("-f"),
        OsStr::new("mp4"),
    ];
    run_ffmpeg(args.into_iter().chain([output.as_os_str()]), None).await?;
    ensure_output(output)
}

// ---------------------------------------------------------------------------
// Thumbnails
// ---------------------------------------------------------------------------

/// Arguments for one thumbnail per minute, written as `thumbNNNN.jpg` into
/// the working directory.
pub fn thumbnail_args(video_file_name: &OsStr) -> Vec<&OsStr> {
    vec![
        OsStr::new("-y"),
        OsStr::new("-i"),
        video_file_name,
        OsStr::new("-q:v"),
        OsStr::new("5"),
        OsStr::new("-vf"),
        OsStr::new("fps=1/60"),
        OsStr::new("thumb%04d.jpg"),
    ]
}

/// Write one thumbnail per minute of video next to `video`.
///
/// Callers serialize this with other media tool work through
/// [`crate::media_tool::MediaToolLock`].
pub async fn generate_thumbnails(video: &Path, timeout: Duration) -> Result<(), FfmpegError> {
    ensure_input(video)?;
    let dir = video.parent().unwrap_or_else(|| Path::new("."));
    let file_name = video
        .file_name()
        .ok_or_else(|| FfmpegError::VideoNotFound(video.to_string_lossy().to_string()))?;

    match tokio::time::timeout(timeout, run_ffmpeg(thumbnail_args(file_name), Some(dir))).await {
        Ok(result) => {
            let output = result?;
            if !output.stderr.is_empty() {
                tracing::debug!(video = %video.display(), "ffmpeg thumbnail output: {}", output.stderr);
            }
            Ok(())
        }
        Err(_) => Err(FfmpegError::Timeout(timeout)),
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[tokio::test]
    async fn concat_joins_parts_in_order() {
        let dir = tempfile::tempdir().unwrap();
        let a = dir.path().join("a.part");
        let b = dir.path().join("b.part");
        tokio::fs::write(&a, b"first-").await.unwrap();
        tokio::fs::write(&b, b"second").await.unwrap();
        let out = dir.path().join("joined.ts");

        concat_files(&[a, b], &out).await.unwrap();

        assert_eq!(tokio::fs::read(&out).await.unwrap(), b"first-second");
    }

    #[tokio::test]
    async fn concat_rejects_missing_part() {
        let dir = tempfile::tempdir().unwrap();
        let out = dir.path().join("joined.ts");
        let result = concat_files(&[dir.path().join("missing.part")], &out).await;
        assert!(matches!(result, Err(FfmpegError::VideoNotFound(_))));
    }

    #[tokio::test]
    async fn remux_of_missing_input_fails_before_spawning() {
        let dir = tempfile::tempdir().unwrap();
        let result = remux_to_mp4(&dir.path().join("nope.ts"), &dir.path().join("out.mp4")).await;
        assert!(matches!(result, Err(FfmpegError::VideoNotFound(_))));
    }

    #[tokio::test]
    async fn thumbnails_of_missing_video_fail() {
        let dir = tempfile::tempdir().unwrap();
        let result = generate_thumbnails(&dir.path().join("nope.mp4"), THUMBNAIL_TIMEOUT).await;
        assert!(matches!(result, Err(FfmpegError::VideoNotFound(_))));
    }

    #[test]
    fn thumbnail_args_sample_once_per_minute() {
        let args = thumbnail_args(OsStr::new("abc.mp4"));
        assert!(args.contains(&OsStr::new("fps=1/60")));
        assert_eq!(args.last(), Some(&OsStr::new("thumb%04d.jpg")));
    }

    #[test]
    fn spawn_not_found_maps_to_not_found() {
        let e = std::io::Error::new(std::io::ErrorKind::NotFound, "no such file");
        assert!(matches!(spawn_error(e), FfmpegError::NotFound(_)));
        let e = std::io::Error::new(std::io::ErrorKind::PermissionDenied, "denied");
        assert!(matches!(spawn_error(e), FfmpegError::IoError(_)));
    }
}
