//! Per-second frame hashing of a video file.
//!
//! ffmpeg decodes the video at 1 fps and writes JPEG frames to stdout. The
//! byte stream is cut into frames by [`JpegSplitter`] as it arrives and each
//! frame is decoded and hashed on a blocking thread. The queue between the
//! two is bounded, so a slow hasher throttles ffmpeg instead of piling
//! frames up in memory.

use std::ffi::OsStr;
use std::path::Path;

use tokio::io::{AsyncRead, AsyncReadExt};

use crate::dhash::DHash;
use crate::error::CoreError;
use crate::ffmpeg::{self, FfmpegError};
use crate::hash_store;
use crate::jpeg_splitter::JpegSplitter;
use crate::media_tool::MediaToolLock;

/// Read size for the ffmpeg stdout pipe.
const READ_CHUNK: usize = 64 * 1024;

/// Arguments that make ffmpeg emit one JPEG per second on stdout.
fn frame_args(video_file_name: &OsStr) -> Vec<&OsStr> {
    vec![
        OsStr::new("-y"),
        OsStr::new("-i"),
        video_file_name,
        OsStr::new("-q:v"),
        OsStr::new("5"),
        OsStr::new("-vf"),
        OsStr::new("fps=1"),
        OsStr::new("-f"),
        OsStr::new("image2pipe"),
        OsStr::new("-"),
    ]
}

/// Frames queued between the pipe reader and the hasher. Once full the
/// reader stops pulling from ffmpeg until the hasher catches up.
const FRAME_BUFFER: usize = 8;

/// Hash every JPEG frame found in `reader`, in stream order.
///
/// Fails on the first frame that cannot be decoded.
pub async fn hash_jpeg_stream<R>(reader: R) -> Result<Vec<DHash>, FfmpegError>
where
    R: AsyncRead + Unpin,
{
    hash_frames_with(reader, |index, frame| {
        DHash::from_jpeg(frame).map_err(|e| FfmpegError::Decode {
            index,
            message: e.to_string(),
        })
    })
    .await
}

async fn hash_frames_with<R, H>(mut reader: R, mut hash: H) -> Result<Vec<DHash>, FfmpegError>
where
    R: AsyncRead + Unpin,
    H: FnMut(usize, &[u8]) -> Result<DHash, FfmpegError> + Send + 'static,
{
    let (tx, mut rx) = tokio::sync::mpsc::channel::<Vec<u8>>(FRAME_BUFFER);
    let hasher = tokio::task::spawn_blocking(move || {
        let mut hashes = Vec::new();
        while let Some(frame) = rx.blocking_recv() {
            hashes.push(hash(hashes.len(), &frame)?);
        }
        Ok::<_, FfmpegError>(hashes)
    });

    let mut splitter = JpegSplitter::new();
    let mut buf = vec![0u8; READ_CHUNK];
    let mut ready = Vec::new();
    let mut hasher_gone = false;
    loop {
        let n = reader.read(&mut buf).await?;
        if n == 0 {
            break;
        }
        splitter.push(&buf[..n], |frame| ready.push(frame));
        for frame in ready.drain(..) {
            // Keep draining after a decode failure so the writer never blocks.
            if !hasher_gone && tx.send(frame).await.is_err() {
                hasher_gone = true;
            }
        }
    }
    drop(tx);

    if splitter.pending_len() > 0 {
        tracing::debug!(
            bytes = splitter.pending_len(),
            "Discarding unterminated trailing frame",
        );
    }

    hasher
        .await
        .map_err(|e| FfmpegError::IoError(std::io::Error::other(e)))?
}

/// Extract one frame per second from `video` and hash each frame.
///
/// Holds `lock` for the whole ffmpeg run. stderr is drained concurrently
/// with stdout; a non-zero exit status fails the call.
pub async fn generate_hashes(video: &Path, lock: &MediaToolLock) -> Result<Vec<DHash>, FfmpegError> {
    if !video.exists() {
        return Err(FfmpegError::VideoNotFound(video.to_string_lossy().to_string()));
    }
    let dir = video.parent().unwrap_or_else(|| Path::new("."));
    let file_name = video
        .file_name()
        .ok_or_else(|| FfmpegError::VideoNotFound(video.to_string_lossy().to_string()))?;

    lock.run(|| async {
        let started = std::time::Instant::now();
        let mut child = ffmpeg::command(frame_args(file_name), Some(dir))
            .spawn()
            .map_err(ffmpeg::spawn_error)?;

        let stdout = child
            .stdout
            .take()
            .ok_or_else(|| FfmpegError::MissingOutput("stdout pipe".to_string()))?;
        let mut stderr = child
            .stderr
            .take()
            .ok_or_else(|| FfmpegError::MissingOutput("stderr pipe".to_string()))?;

        let stderr_task = tokio::spawn(async move {
            let mut text = String::new();
            let _ = stderr.read_to_string(&mut text).await;
            text
        });

        let hashed = hash_jpeg_stream(stdout).await;
        let status = child.wait().await?;
        let stderr_text = stderr_task.await.unwrap_or_default();

        if !status.success() {
            return Err(FfmpegError::ExecutionFailed {
                exit_code: status.code(),
                stderr: stderr_text,
            });
        }
        let hashes = hashed?;

        tracing::info!(
            video = %video.display(),
            frames = hashes.len(),
            elapsed_ms = started.elapsed().as_millis() as u64,
            "Generated frame hashes",
        );
        Ok::<_, FfmpegError>(hashes)
    })
    .await
}

/// Generate hashes for `video` and store them as `dhashes.bin` beside it.
///
/// Returns the number of hashes written.
pub async fn generate_and_store_hashes(video: &Path, lock: &MediaToolLock) -> Result<usize, FfmpegError> {
    let hashes = generate_hashes(video, lock).await?;
    let path = hash_store::hash_file_for(video);
    hash_store::write_hashes(&path, &hashes)
        .await
        .map_err(|e| match e {
            CoreError::Io(io) => FfmpegError::IoError(io),
            other => FfmpegError::IoError(std::io::Error::other(other.to_string())),
        })?;
    Ok(hashes.len())
}
