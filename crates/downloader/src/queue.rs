//! FIFO queue whose `pop` suspends until an item is available.

use std::collections::VecDeque;
use std::sync::{Mutex, MutexGuard};

use tokio::sync::Notify;

#[derive(Debug)]
pub struct SuspendingQueue<T> {
    items: Mutex<VecDeque<T>>,
    available: Notify,
}

impl<T> SuspendingQueue<T> {
    pub fn new() -> Self {
        Self {
            items: Mutex::new(VecDeque::new()),
            available: Notify::new(),
        }
    }

    fn lock(&self) -> MutexGuard<'_, VecDeque<T>> {
        self.items.lock().unwrap_or_else(|poisoned| poisoned.into_inner())
    }

    /// Append an item and wake one waiting consumer.
    pub fn push_back(&self, item: T) {
        self.lock().push_back(item);
        self.available.notify_one();
    }

    pub fn try_pop(&self) -> Option<T> {
        self.lock().pop_front()
    }

    /// Wait for the front item and remove it.
    ///
    /// Cancel-safe: dropping the future before it completes never loses an
    /// item.
    pub async fn pop(&self) -> T {
        self.pop_with(|_| ()).await
    }

    /// Like [`pop`](Self::pop), but runs `claim` on the item before the queue
    /// lock is released. Observers that scan the queue and then the claim
    /// target never miss the item in between.
    pub async fn pop_with<F>(&self, claim: F) -> T
    where
        F: Fn(&T),
    {
        loop {
            let notified = self.available.notified();
            {
                let mut items = self.lock();
                if let Some(item) = items.pop_front() {
                    claim(&item);
                    let more = !items.is_empty();
                    drop(items);
                    if more {
                        // Pass the wake-up on in case it was consumed by us.
                        self.available.notify_one();
                    }
                    return item;
                }
            }
            notified.await;
        }
    }

    pub fn len(&self) -> usize {
        self.lock().len()
    }

    pub fn is_empty(&self) -> bool {
        self.lock().is_empty()
    }

    pub fn any(&self, mut predicate: impl FnMut(&T) -> bool) -> bool {
        self.lock().iter().any(|item| predicate(item))
    }

    pub fn find_map<R>(&self, f: impl FnMut(&T) -> Option<R>) -> Option<R> {
        self.lock().iter().find_map(f)
    }
}

impl<T: Clone> SuspendingQueue<T> {
    /// Copy of the current contents, front first.
    pub fn snapshot(&self) -> Vec<T> {
        self.lock().iter().cloned().collect()
    }
}

impl<T> Default for SuspendingQueue<T> {
    fn default() -> Self {
        Self::new()
    }
}
