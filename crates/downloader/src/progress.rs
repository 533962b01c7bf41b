//! Lock-free progress value.

use std::sync::atomic::{AtomicU64, Ordering};

/// A fraction in `[0.0, 1.0]` stored as the bits of an `f64`.
///
/// Written by the worker owning the task, read by snapshots. Reads are for
/// display only, so relaxed ordering is enough.
#[derive(Debug)]
pub struct Progress(AtomicU64);

impl Progress {
    pub fn new(value: f64) -> Self {
        Self(AtomicU64::new(clamp(value).to_bits()))
    }

    pub fn get(&self) -> f64 {
        f64::from_bits(self.0.load(Ordering::Relaxed))
    }

    /// Store `value`, clamped to `[0.0, 1.0]`. NaN is stored as 0.
    pub fn set(&self, value: f64) {
        self.0.store(clamp(value).to_bits(), Ordering::Relaxed);
    }

    /// Progress of a single stream of known or unknown length.
    pub fn set_bytes(&self, received: u64, total: Option<u64>) {
        match total {
            Some(total) if total > 0 => self.set(received as f64 / total as f64),
            _ => self.set(0.0),
        }
    }

    /// Progress of a multi-part download about to start part `index`.
    pub fn set_part(&self, index: usize, count: usize) {
        if count > 0 {
            self.set(index as f64 / count as f64);
        }
    }
}

impl Default for Progress {
    fn default() -> Self {
        Self::new(0.0)
    }
}

fn clamp(value: f64) -> f64 {
    if value.is_nan() {
        0.0
    } else {
        value.clamp(0.0, 1.0)
    }
}
