//! Request rate limiting for URL decoder calls.
//!
//! Decoder endpoints scrape third-party sites and must not be hammered. Every
//! request first takes a token from a [`RateLimiter`]; the production limiter
//! is a single-token bucket refilled on a fixed interval.

use std::sync::Arc;
use std::time::Duration;

use async_trait::async_trait;
use tokio::sync::Semaphore;
use tokio_util::sync::CancellationToken;

/// Default refill interval of [`IntervalTokenBucket`].
pub const DEFAULT_TOKEN_INTERVAL: Duration = Duration::from_secs(5);

#[async_trait]
pub trait RateLimiter: Send + Sync {
    /// Wait until a request may be made.
    async fn take_token(&self);
}

/// Never waits.
#[derive(Debug, Clone, Copy, Default)]
pub struct Unlimited;

#[async_trait]
impl RateLimiter for Unlimited {
    async fn take_token(&self) {}
}

/// Token bucket with capacity 1, refilled once per interval by a background
/// task.
///
/// The refill task stops when the cancellation token passed to
/// [`spawn`](Self::spawn) is cancelled; waiting callers then block until
/// dropped.
#[derive(Debug)]
pub struct IntervalTokenBucket {
    tokens: Semaphore,
    interval: Duration,
}

impl IntervalTokenBucket {
    /// Create a bucket holding one token and start refilling it.
    pub fn spawn(interval: Duration, cancel: CancellationToken) -> Arc<Self> {
        let bucket = Arc::new(Self {
            tokens: Semaphore::new(1),
            interval,
        });

        let refill = Arc::clone(&bucket);
        tokio::spawn(async move {
            let mut ticker = tokio::time::interval(refill.interval);
            // The first tick completes immediately; the bucket starts full.
            ticker.tick().await;
            loop {
                tokio::select! {
                    biased;
                    _ = cancel.cancelled() => {
                        tracing::debug!("Request token refill stopped");
                        break;
                    }
                    _ = ticker.tick() => refill.refill(),
                }
            }
        });

        bucket
    }

    fn refill(&self) {
        if self.tokens.available_permits() == 0 {
            self.tokens.add_permits(1);
        }
    }

    pub fn interval(&self) -> Duration {
        self.interval
    }

    pub fn available(&self) -> usize {
        self.tokens.available_permits()
    }
}

#[async_trait]
impl RateLimiter for IntervalTokenBucket {
    async fn take_token(&self) {
        // The semaphore is never closed, so acquire cannot fail.
        if let Ok(permit) = self.tokens.acquire().await {
            permit.forget();
        }
    }
}
