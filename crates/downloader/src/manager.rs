//! Download manager: the queue, the worker pool and everything observers can
//! ask about them.

use std::collections::{HashSet, VecDeque};
use std::path::Path;
use std::sync::atomic::{AtomicBool, Ordering};
use std::sync::{Arc, Mutex, MutexGuard};

use mediavault_library::{MetadataLookup, MetadataStore};
use tokio::task::JoinHandle;
use tokio_util::sync::CancellationToken;

use crate::config::DownloaderConfig;
use crate::decoder::{make_download_task, UrlDecoder};
use crate::downloader::HttpDownloader;
use crate::error::DownloadError;
use crate::events::{DownloadEvent, DownloadEvents};
use crate::queue::SuspendingQueue;
use crate::task::{
    CompletedDownload, CompletionHandler, DownloadSnapshot, DownloadTask, DownloadTaskDto, ProblematicTask,
};
use crate::worker::{self, WorkerSlot, WorkerStatus};

// ---------------------------------------------------------------------------
// Public types
// ---------------------------------------------------------------------------

/// Which tasks [`DownloadManager::downloads`] reports.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash)]
pub enum DownloadType {
    Queued,
    Current,
}

/// Why a task was not queued.
#[derive(Debug, Clone, PartialEq, Eq)]
pub enum RejectReason {
    AlreadyQueued,
    InProgress,
    Problematic,
    /// The library already holds the content.
    InLibrary,
    /// The content was deleted from the library.
    Tombstoned,
    /// The metadata store could not be asked.
    StoreUnavailable(String),
    /// Retry of a URL that is not in the problematic list.
    NotProblematic,
    ShuttingDown,
}

#[derive(Debug, Clone, PartialEq, Eq)]
pub enum EnqueueOutcome {
    Queued,
    Rejected(RejectReason),
}

impl EnqueueOutcome {
    pub fn is_queued(&self) -> bool {
        matches!(self, Self::Queued)
    }
}

fn lock<T>(m: &Mutex<T>) -> MutexGuard<'_, T> {
    m.lock().unwrap_or_else(|poisoned| poisoned.into_inner())
}

// ---------------------------------------------------------------------------
// DownloadManager
// ---------------------------------------------------------------------------

/// Owns the download queue and a fixed pool of workers.
///
/// Every URL is tracked in at most one place at a time: the queue, a worker
/// slot, the problematic list or the library.
pub struct DownloadManager {
    config: DownloaderConfig,
    store: Arc<dyn MetadataStore>,
    decoder: Arc<dyn UrlDecoder>,
    default_completion: Arc<dyn CompletionHandler>,
    downloader: HttpDownloader,
    queue: SuspendingQueue<Arc<DownloadTask>>,
    slots: Vec<Arc<WorkerSlot>>,
    finished: Mutex<VecDeque<CompletedDownload>>,
    problematic: Mutex<Vec<ProblematicTask>>,
    /// Serializes the duplicate check with the push.
    enqueue_lock: tokio::sync::Mutex<()>,
    cancel: CancellationToken,
    shut_down: AtomicBool,
    handles: Mutex<Vec<JoinHandle<()>>>,
    events: DownloadEvents,
}

impl DownloadManager {
    /// Build the manager and spawn `config.workers` workers.
    ///
    /// Must be called from within a Tokio runtime.
    pub fn start(
        config: DownloaderConfig,
        store: Arc<dyn MetadataStore>,
        decoder: Arc<dyn UrlDecoder>,
        default_completion: Arc<dyn CompletionHandler>,
    ) -> Result<Arc<Self>, DownloadError> {
        let downloader = HttpDownloader::new(&config.user_agent, config.connect_timeout)?;
        let slots = (0..config.workers).map(|id| Arc::new(WorkerSlot::new(id))).collect();

        let manager = Arc::new(Self {
            config,
            store,
            decoder,
            default_completion,
            downloader,
            queue: SuspendingQueue::new(),
            slots,
            finished: Mutex::new(VecDeque::new()),
            problematic: Mutex::new(Vec::new()),
            enqueue_lock: tokio::sync::Mutex::new(()),
            cancel: CancellationToken::new(),
            shut_down: AtomicBool::new(false),
            handles: Mutex::new(Vec::new()),
            events: DownloadEvents::default(),
        });

        let handles = manager
            .slots
            .iter()
            .map(|slot| tokio::spawn(Arc::clone(&manager).run_worker(Arc::clone(slot))))
            .collect();
        *lock(&manager.handles) = handles;

        tracing::info!(
            workers = manager.slots.len(),
            work_dir = %manager.config.work_dir.display(),
            "Download manager started",
        );
        Ok(manager)
    }

    pub fn config(&self) -> &DownloaderConfig {
        &self.config
    }

    pub fn decoder(&self) -> &Arc<dyn UrlDecoder> {
        &self.decoder
    }

    // -- Enqueueing --------------------------------------------------------

    /// Queue `task` unless its URL is already tracked or known to the
    /// library. `skip_duplicate_check` bypasses the check entirely.
    pub async fn enqueue(&self, task: DownloadTask, skip_duplicate_check: bool) -> EnqueueOutcome {
        if self.shut_down.load(Ordering::SeqCst) {
            tracing::warn!(origin_url = %task.origin_url(), "Download manager is shut down, not queueing");
            return EnqueueOutcome::Rejected(RejectReason::ShuttingDown);
        }

        let _guard = self.enqueue_lock.lock().await;

        if !skip_duplicate_check {
            if let Some(reason) = self.duplicate_reason(&task).await {
                tracing::info!(
                    origin_url = %task.origin_url(),
                    reason = ?reason,
                    "Download job rejected",
                );
                return EnqueueOutcome::Rejected(reason);
            }
        }

        let origin_url = task.origin_url().to_string();
        self.queue.push_back(Arc::new(task));
        self.events.queued(&origin_url);
        tracing::info!(origin_url = %origin_url, queued = self.queue.len(), "Download job queued");
        EnqueueOutcome::Queued
    }

    /// Queue `url` using the URL decoder and the default completion handler.
    pub async fn enqueue_url(&self, url: &str) -> EnqueueOutcome {
        let task = make_download_task(
            Arc::clone(&self.decoder),
            url,
            Arc::clone(&self.default_completion),
        );
        self.enqueue(task, false).await
    }

    /// Checked in the order a task moves through the manager, so a task
    /// moving concurrently is seen in at least one place.
    async fn duplicate_reason(&self, task: &DownloadTask) -> Option<RejectReason> {
        let url = task.origin_url();

        if self.queue.any(|t| t.origin_url() == url) {
            return Some(RejectReason::AlreadyQueued);
        }
        if self
            .slots
            .iter()
            .any(|slot| slot.current().is_some_and(|t| t.origin_url() == url))
        {
            return Some(RejectReason::InProgress);
        }
        if lock(&self.problematic).iter().any(|p| p.origin_url == url) {
            return Some(RejectReason::Problematic);
        }

        match self.store.get(task.content_id()).await {
            Ok(MetadataLookup::Found(_)) => Some(RejectReason::InLibrary),
            Ok(MetadataLookup::Tombstone) => Some(RejectReason::Tombstoned),
            Ok(MetadataLookup::NotFound) => None,
            Err(e) => {
                tracing::warn!(origin_url = %url, error = %e, "Metadata lookup failed");
                Some(RejectReason::StoreUnavailable(e.to_string()))
            }
        }
    }

    // -- Observation -------------------------------------------------------

    /// Snapshots of the requested kinds of tasks, each kind reported once.
    pub fn downloads(&self, types: &[DownloadType]) -> Vec<DownloadSnapshot> {
        let mut seen = HashSet::new();
        let mut snapshots = Vec::new();
        for kind in types {
            if !seen.insert(*kind) {
                continue;
            }
            match kind {
                DownloadType::Queued => {
                    snapshots.extend(self.queue.snapshot().iter().map(|t| t.snapshot()));
                }
                DownloadType::Current => {
                    snapshots.extend(self.slots.iter().filter_map(|s| s.current()).map(|t| t.snapshot()));
                }
            }
        }
        snapshots
    }

    /// Queued, current and problematic tasks.
    pub fn all_downloads(&self) -> Vec<DownloadSnapshot> {
        let mut snapshots = self.downloads(&[DownloadType::Queued, DownloadType::Current]);
        snapshots.extend(lock(&self.problematic).iter().map(|p| p.snapshot()));
        snapshots
    }

    /// Progress of the task that will produce `content_id`; 1.0 once it is
    /// in the finished history, `None` if untracked.
    pub fn progress_for_id(&self, content_id: &str) -> Option<f64> {
        if let Some(progress) = self
            .queue
            .find_map(|t| (t.content_id() == content_id).then(|| t.progress().get()))
        {
            return Some(progress);
        }
        if let Some(task) = self
            .slots
            .iter()
            .filter_map(|s| s.current())
            .find(|t| t.content_id() == content_id)
        {
            return Some(task.progress().get());
        }
        lock(&self.finished)
            .iter()
            .any(|f| mediavault_core::hashing::content_id(&f.origin_url) == content_id)
            .then_some(1.0)
    }

    /// Most recently finished downloads, oldest first.
    pub fn finished(&self) -> Vec<CompletedDownload> {
        lock(&self.finished).iter().cloned().collect()
    }

    pub fn problematic(&self) -> Vec<ProblematicTask> {
        lock(&self.problematic).clone()
    }

    pub fn worker_status(&self) -> Vec<WorkerStatus> {
        self.slots.iter().map(|s| s.status()).collect()
    }

    pub fn subscribe(&self) -> tokio::sync::broadcast::Receiver<DownloadEvent> {
        self.events.subscribe()
    }

    // -- Problematic tasks -------------------------------------------------

    /// Forget a failed task. Returns whether it was there.
    pub fn remove_problematic(&self, url: &str) -> bool {
        let mut problematic = lock(&self.problematic);
        let before = problematic.len();
        problematic.retain(|p| p.origin_url != url);
        let removed = problematic.len() != before;
        if removed {
            tracing::info!(origin_url = %url, "Problematic download removed");
        }
        removed
    }

    /// Move a failed task back into the queue.
    ///
    /// If the task cannot be queued it stays problematic.
    pub async fn retry_problematic(&self, url: &str) -> EnqueueOutcome {
        let taken = {
            let mut problematic = lock(&self.problematic);
            problematic
                .iter()
                .position(|p| p.origin_url == url)
                .map(|index| problematic.remove(index))
        };
        let Some(task) = taken else {
            return EnqueueOutcome::Rejected(RejectReason::NotProblematic);
        };

        let outcome = self.enqueue_url(url).await;
        if !outcome.is_queued() {
            lock(&self.problematic).push(task);
        }
        outcome
    }

    // -- Persistence -------------------------------------------------------

    /// Write queued and problematic tasks to the queue file. Returns the
    /// number of records written.
    pub async fn persist_queue(&self) -> Result<usize, DownloadError> {
        let mut records: Vec<DownloadTaskDto> = self.queue.snapshot().iter().map(|t| t.to_dto()).collect();
        records.extend(lock(&self.problematic).iter().map(|p| p.to_dto()));

        let json = serde_json::to_vec_pretty(&records)
            .map_err(|e| DownloadError::Io(std::io::Error::new(std::io::ErrorKind::InvalidData, e)))?;
        write_atomic(&self.config.queue_file, &json).await?;

        tracing::info!(
            file = %self.config.queue_file.display(),
            records = records.len(),
            "Download queue persisted",
        );
        Ok(records.len())
    }

    /// Queue every URL of the queue file, in file order. Returns the number
    /// of tasks queued.
    pub async fn restore_queue(&self) -> usize {
        let path = &self.config.queue_file;
        let bytes = match tokio::fs::read(path).await {
            Ok(bytes) => bytes,
            Err(e) if e.kind() == std::io::ErrorKind::NotFound => {
                tracing::info!(file = %path.display(), "No persisted download queue");
                return 0;
            }
            Err(e) => {
                tracing::error!(file = %path.display(), error = %e, "Failed to read download queue");
                return 0;
            }
        };

        let records: Vec<DownloadTaskDto> = match serde_json::from_slice(&bytes) {
            Ok(records) => records,
            Err(e) => {
                tracing::error!(file = %path.display(), error = %e, "Failed to parse download queue");
                return 0;
            }
        };

        let mut seen = HashSet::new();
        let mut restored = 0;
        for record in records {
            if !seen.insert(record.origin_url.clone()) {
                continue;
            }
            if self.enqueue_url(&record.origin_url).await.is_queued() {
                restored += 1;
            }
        }

        tracing::info!(file = %path.display(), restored, "Download queue restored");
        restored
    }

    // -- Shutdown ----------------------------------------------------------

    /// Stop every worker, wait for them (bounded by the configured timeout)
    /// and persist the queue. Later calls do nothing.
    pub async fn shutdown(&self) -> Result<(), DownloadError> {
        if self.shut_down.swap(true, Ordering::SeqCst) {
            return Ok(());
        }

        tracing::info!("Shutting down download manager");
        self.cancel.cancel();

        let handles = std::mem::take(&mut *lock(&self.handles));
        let joined = tokio::time::timeout(self.config.shutdown_timeout, futures::future::join_all(handles)).await;
        match joined {
            Ok(results) => {
                for result in results {
                    if let Err(e) = result {
                        tracing::error!(error = %e, "Download worker panicked");
                    }
                }
            }
            Err(_) => {
                tracing::warn!(
                    timeout_secs = self.config.shutdown_timeout.as_secs(),
                    "Download workers did not stop in time",
                );
                // Keep the stragglers' tasks so they are persisted.
                for slot in &self.slots {
                    if let Some(task) = slot.clear_current() {
                        self.push_problematic(ProblematicTask::new(task.origin_url(), DownloadError::Cancelled));
                    }
                }
            }
        }

        self.persist_queue().await?;
        Ok(())
    }

    // -- Workers -----------------------------------------------------------

    async fn run_worker(self: Arc<Self>, slot: Arc<WorkerSlot>) {
        let worker_id = slot.id();
        tracing::debug!(worker_id, "Download worker started");

        loop {
            slot.set_status(WorkerStatus::Awaiting);

            let task = tokio::select! {
                biased;
                _ = self.cancel.cancelled() => {
                    slot.set_status(WorkerStatus::Cancelled);
                    break;
                }
                task = self.queue.pop_with(|t| slot.set_current(Arc::clone(t))) => task,
            };

            slot.set_status(WorkerStatus::Downloading);
            self.events.started(worker_id, task.origin_url());
            tracing::info!(worker_id, origin_url = %task.origin_url(), "Download started");

            let result = tokio::select! {
                biased;
                _ = self.cancel.cancelled() => Err(DownloadError::Cancelled),
                result = worker::execute(&task, &self.downloader, &self.config.work_dir) => result,
            };

            match result {
                Ok(completed) => {
                    self.record_finished(completed.clone());
                    slot.clear_current();
                    slot.set_status(WorkerStatus::Downloaded);
                    tracing::info!(
                        worker_id,
                        origin_url = %completed.origin_url,
                        file = %completed.file.display(),
                        "Download completed",
                    );
                    self.events.completed(&completed.origin_url, completed.file);
                }
                Err(e) => {
                    let cancelled = e.is_cancellation();
                    if cancelled {
                        tracing::info!(worker_id, origin_url = %task.origin_url(), "Download interrupted by shutdown");
                    } else {
                        tracing::warn!(worker_id, origin_url = %task.origin_url(), error = %e, "Download failed");
                    }
                    let problematic = ProblematicTask::new(task.origin_url(), e);
                    let error = Arc::clone(&problematic.error);
                    // Problematic before the slot empties.
                    self.push_problematic(problematic);
                    slot.clear_current();
                    slot.set_status(if cancelled {
                        WorkerStatus::Cancelled
                    } else {
                        WorkerStatus::Failed
                    });
                    self.events.failed(task.origin_url(), &error);

                    if cancelled {
                        break;
                    }
                }
            }
        }

        tracing::debug!(worker_id, "Download worker stopped");
    }

    fn record_finished(&self, completed: CompletedDownload) {
        let mut finished = lock(&self.finished);
        finished.push_back(completed);
        while finished.len() > self.config.finished_history {
            finished.pop_front();
        }
    }

    fn push_problematic(&self, task: ProblematicTask) {
        let mut problematic = lock(&self.problematic);
        if !problematic.iter().any(|p| p.origin_url == task.origin_url) {
            problematic.push(task);
        }
    }
}

/// Write `bytes` to a temporary sibling of `path`, then rename it over
/// `path`.
async fn write_atomic(path: &Path, bytes: &[u8]) -> Result<(), std::io::Error> {
    if let Some(parent) = path.parent().filter(|p| !p.as_os_str().is_empty()) {
        tokio::fs::create_dir_all(parent).await?;
    }
    let mut tmp = path.as_os_str().to_owned();
    tmp.push(".tmp");
    let tmp = std::path::PathBuf::from(tmp);

    tokio::fs::write(&tmp, bytes).await?;
    tokio::fs::rename(&tmp, path).await
}
