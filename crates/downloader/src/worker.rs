//! Worker slots and the execution of a single download task.

use std::path::{Path, PathBuf};
use std::sync::{Arc, Mutex, MutexGuard};

use serde::Serialize;

use crate::downloader::HttpDownloader;
use crate::error::DownloadError;
use crate::post_process::PostProcessor;
use crate::task::{CompletedDownload, DownloadTask};

// ---------------------------------------------------------------------------
// Worker slots
// ---------------------------------------------------------------------------

/// Lifecycle state of a worker.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize)]
#[serde(rename_all = "snake_case")]
pub enum WorkerStatus {
    Created,
    /// Waiting for the queue.
    Awaiting,
    Downloading,
    /// Last task finished successfully.
    Downloaded,
    /// Last task failed.
    Failed,
    /// Stopped by shutdown.
    Cancelled,
}

/// State shared between a worker loop and the manager's observers.
#[derive(Debug)]
pub struct WorkerSlot {
    id: usize,
    status: Mutex<WorkerStatus>,
    current: Mutex<Option<Arc<DownloadTask>>>,
}

fn lock<T>(m: &Mutex<T>) -> MutexGuard<'_, T> {
    m.lock().unwrap_or_else(|poisoned| poisoned.into_inner())
}

impl WorkerSlot {
    pub fn new(id: usize) -> Self {
        Self {
            id,
            status: Mutex::new(WorkerStatus::Created),
            current: Mutex::new(None),
        }
    }

    pub fn id(&self) -> usize {
        self.id
    }

    pub fn status(&self) -> WorkerStatus {
        *lock(&self.status)
    }

    pub fn set_status(&self, status: WorkerStatus) {
        *lock(&self.status) = status;
    }

    pub fn current(&self) -> Option<Arc<DownloadTask>> {
        lock(&self.current).clone()
    }

    pub fn set_current(&self, task: Arc<DownloadTask>) {
        *lock(&self.current) = Some(task);
    }

    pub fn clear_current(&self) -> Option<Arc<DownloadTask>> {
        lock(&self.current).take()
    }
}

// ---------------------------------------------------------------------------
// Part files
// ---------------------------------------------------------------------------

/// Files written while executing one task.
///
/// Dropping the guard removes every file except the one marked with
/// [`keep`](Self::keep), whether the task succeeded, failed or was cancelled
/// mid-await.
#[derive(Debug, Default)]
struct PartFiles {
    parts: Vec<PathBuf>,
    keep: Option<PathBuf>,
}

impl PartFiles {
    fn push(&mut self, path: PathBuf) {
        self.parts.push(path);
    }

    fn paths(&self) -> &[PathBuf] {
        &self.parts
    }

    /// Track a post-processing output so it is cleaned up on failure.
    fn track_output(&mut self, output: &Path) {
        if !self.parts.iter().any(|p| p == output) {
            self.parts.push(output.to_path_buf());
        }
    }

    fn keep(&mut self, path: PathBuf) {
        self.keep = Some(path);
    }
}

impl Drop for PartFiles {
    fn drop(&mut self) {
        for part in &self.parts {
            if self.keep.as_ref() == Some(part) {
                continue;
            }
            match std::fs::remove_file(part) {
                Ok(()) => {}
                Err(e) if e.kind() == std::io::ErrorKind::NotFound => {}
                Err(e) => {
                    tracing::warn!(file = %part.display(), error = %e, "Failed to remove part file");
                }
            }
        }
    }
}

// ---------------------------------------------------------------------------
// Execution
// ---------------------------------------------------------------------------

/// Run `task` to completion: resolve, download every part, post-process and
/// hand the output to the task's completion handler.
///
/// A part answering HTTP 403 gets one retry after resolving the origin URL
/// again; a second failure is fatal.
pub async fn execute(
    task: &DownloadTask,
    downloader: &HttpDownloader,
    work_dir: &Path,
) -> Result<CompletedDownload, DownloadError> {
    tokio::fs::create_dir_all(work_dir).await?;

    let mut media = task.resolve().await?;
    let processor = PostProcessor::for_kind(media.kind).ok_or(DownloadError::NoPostProcessor(media.kind))?;
    let count = media.urls.len();
    let mut files = PartFiles::default();

    tracing::debug!(origin_url = %task.origin_url(), parts = count, kind = ?media.kind, "Resolved download");

    for index in 0..count {
        let path = work_dir.join(format!("part-{}.tmp", uuid::Uuid::now_v7()));
        files.push(path.clone());
        if count > 1 {
            task.progress().set_part(index, count);
        }

        let fetched = fetch_part(task, downloader, &media.urls[index], &path, count).await;
        match fetched {
            Ok(()) => {}
            Err(e) if e.is_transient() => {
                tracing::info!(
                    origin_url = %task.origin_url(),
                    part = index,
                    error = %e,
                    "Direct URL rejected, resolving again",
                );
                media = task.resolve().await?;
                if media.urls.len() != count {
                    return Err(DownloadError::ResolutionChanged {
                        url: task.origin_url().to_string(),
                        expected: count,
                        got: media.urls.len(),
                    });
                }
                fetch_part(task, downloader, &media.urls[index], &path, count).await?;
            }
            Err(e) => return Err(e),
        }
    }

    let output = processor.run(files.paths(), work_dir).await?;
    files.track_output(&output);
    task.progress().set(1.0);

    let completed = CompletedDownload {
        origin_url: task.origin_url().to_string(),
        file: output.clone(),
    };
    task.completion().on_complete(&completed).await?;

    files.keep(output);
    Ok(completed)
}

async fn fetch_part(
    task: &DownloadTask,
    downloader: &HttpDownloader,
    url: &str,
    path: &Path,
    count: usize,
) -> Result<(), DownloadError> {
    downloader
        .download_to(url, path, |received, total| {
            if count == 1 {
                task.progress().set_bytes(received, total);
            }
        })
        .await?;
    Ok(())
}
