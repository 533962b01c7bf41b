//! Exclusive access to the external media tool.
//!
//! Frame extraction and thumbnail generation are CPU heavy; running several
//! ffmpeg processes side by side only slows each of them down. A single
//! [`MediaToolLock`] is created at startup and passed to every caller.

use std::future::Future;
use std::sync::Arc;
use std::time::Instant;

use tokio::sync::Mutex;

/// Named async mutex serializing media tool invocations.
///
/// Cloning yields another handle to the same lock.
#[derive(Debug, Clone)]
pub struct MediaToolLock {
    name: Arc<str>,
    inner: Arc<Mutex<()>>,
}

impl MediaToolLock {
    pub fn new(name: impl Into<Arc<str>>) -> Self {
        Self {
            name: name.into(),
            inner: Arc::new(Mutex::new(())),
        }
    }

    pub fn name(&self) -> &str {
        &self.name
    }

    /// Run `f` while holding the lock.
    ///
    /// The guard is dropped on every exit path of the future, including
    /// errors and cancellation of the caller.
    pub async fn run<F, Fut, T>(&self, f: F) -> T
    where
        F: FnOnce() -> Fut,
        Fut: Future<Output = T>,
    {
        let waiting = Instant::now();
        let _guard = self.inner.lock().await;
        let acquired = Instant::now();
        tracing::debug!(
            lock = %self.name,
            waited_ms = waiting.elapsed().as_millis() as u64,
            "Media tool lock acquired",
        );

        let result = f().await;

        tracing::debug!(
            lock = %self.name,
            held_ms = acquired.elapsed().as_millis() as u64,
            "Media tool lock released",
        );
        result
    }

    /// Whether another caller currently holds the lock.
    pub fn is_held(&self) -> bool {
        self.inner.try_lock().is_err()
    }
}

impl Default for MediaToolLock {
    fn default() -> Self {
        Self::new("ffmpeg")
    }
}
