//! Client-side request budget shared by every call to the remote API

use std::sync::atomic::{AtomicU64, Ordering};
use std::sync::Arc;
use std::time::Duration;

use tokio::sync::Mutex;
use tokio::time::Instant;

/// Notion's documented average rate limit
pub const DEFAULT_REQUESTS_PER_SECOND: u32 = 3;

/// Fixed-window request budget. Clones share the same window.
#[derive(Clone)]
pub struct RateBudget {
    state: Arc<Mutex<RateWindow>>,
    window: Duration,
    limit: u32,
    metrics: Arc<BudgetMetrics>,
}

#[derive(Default)]
struct BudgetMetrics {
    granted: AtomicU64,
    delayed: AtomicU64,
}

#[derive(Debug, Clone, Copy, serde::Serialize)]
pub struct RateBudgetSnapshot {
    pub granted: u64,
    pub delayed: u64,
}

#[derive(Debug, Clone, Copy)]
struct RateWindow {
    started_at: Instant,
    count: u32,
}

impl RateBudget {
    pub fn new(limit: u32, window: Duration) -> Self {
        Self {
            state: Arc::new(Mutex::new(RateWindow {
                started_at: Instant::now(),
                count: 0,
            })),
            window,
            limit: limit.max(1),
            metrics: Arc::new(BudgetMetrics::default()),
        }
    }

    pub fn per_second(limit: u32) -> Self {
        Self::new(limit, Duration::from_secs(1))
    }

    /// Wait until the current window has room, then take one slot.
    pub async fn acquire(&self) {
        let mut delayed = false;
        loop {
            let wait = {
                let now = Instant::now();
                let mut window = self.state.lock().await;
                if now.duration_since(window.started_at) >= self.window {
                    window.started_at = now;
                    window.count = 0;
                }
                if window.count < self.limit {
                    window.count += 1;
                    self.metrics.granted.fetch_add(1, Ordering::Relaxed);
                    if delayed {
                        self.metrics.delayed.fetch_add(1, Ordering::Relaxed);
                    }
                    return;
                }
                self.window
                    .saturating_sub(now.duration_since(window.started_at))
            };
            delayed = true;
            tracing::trace!(wait_ms = wait.as_millis(), "Request budget exhausted");
            tokio::time::sleep(wait).await;
        }
    }

    /// Push the current window out after the remote told us to back off.
    pub async fn back_off(&self, delay: Duration) {
        let mut window = self.state.lock().await;
        window.started_at = Instant::now() + delay;
        window.count = self.limit;
    }

    pub fn snapshot(&self) -> RateBudgetSnapshot {
        RateBudgetSnapshot {
            granted: self.metrics.granted.load(Ordering::Relaxed),
            delayed: self.metrics.delayed.load(Ordering::Relaxed),
        }
    }
}

impl Default for RateBudget {
    fn default() -> Self {
        Self::per_second(DEFAULT_REQUESTS_PER_SECOND)
    }
}
