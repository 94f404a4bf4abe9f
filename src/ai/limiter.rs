//! Sliding-Window Rate Limiter
//!
//! Caps outbound model requests to a fixed count per rolling window.
//! Admission is strictly serialized: `acquire` owns the window state for
//! its whole prune/check/record-or-wait sequence, and the fair mutex queues
//! later callers behind an in-progress wait instead of letting them take
//! the freed slot first.

use std::collections::VecDeque;
use std::time::Duration;

use tokio::sync::Mutex;
use tokio::time::{self, Instant};

use crate::config::RateLimitConfig;
use crate::constants::rate_limit as limit_constants;

/// Request throttle shared by every caller that talks to the model endpoint
#[derive(Debug)]
pub struct RateLimiter {
    max_requests: usize,
    window: Duration,
    admissions: Mutex<VecDeque<Instant>>,
}

impl RateLimiter {
    /// Create a limiter admitting `max_requests` per `window`
    pub fn new(max_requests: usize, window: Duration) -> Self {
        Self {
            // a zero-slot limiter would deadlock every caller
            max_requests: max_requests.max(1),
            window,
            admissions: Mutex::new(VecDeque::new()),
        }
    }

    /// Create a limiter with the built-in defaults
    pub fn with_defaults() -> Self {
        Self::new(
            limit_constants::MAX_REQUESTS,
            Duration::from_secs(limit_constants::WINDOW_SECS),
        )
    }

    /// Create a limiter from loaded configuration
    pub fn from_config(config: &RateLimitConfig) -> Self {
        Self::new(config.max_requests, Duration::from_secs(config.window_secs))
    }

    /// Wait until a request may be issued, then consume a slot.
    ///
    /// Never fails; the only cost is time. Callers queue in arrival order.
    /// Dropping the future mid-wait consumes nothing; once this returns,
    /// the slot stays consumed even if the request it was for is cancelled.
    pub async fn acquire(&self) {
        let mut admissions = self.admissions.lock().await;
        loop {
            let now = Instant::now();
            Self::prune(&mut admissions, now, self.window);
            if admissions.len() < self.max_requests {
                admissions.push_back(now);
                return;
            }
            // Window full. Sleep until the oldest admission expires, then
            // re-evaluate instead of assuming the slot is still free.
            let Some(oldest) = admissions.front().copied() else {
                continue;
            };
            let wake = oldest + self.window;
            tracing::debug!(
                wait_ms = (wake - now).as_millis() as u64,
                in_window = admissions.len(),
                "rate limit reached, waiting for a slot"
            );
            time::sleep_until(wake).await;
        }
    }

    /// Record a request issued outside `acquire`, without waiting for a slot.
    ///
    /// Keeps accounting honest when a caller ships a request through some
    /// side path that still counts against the shared budget. May push the
    /// window over its cap; `acquire` absorbs that by waiting longer.
    pub async fn record_external(&self) {
        let mut admissions = self.admissions.lock().await;
        let now = Instant::now();
        Self::prune(&mut admissions, now, self.window);
        admissions.push_back(now);
    }

    /// Slots currently free in the window (diagnostic)
    pub async fn available(&self) -> usize {
        let mut admissions = self.admissions.lock().await;
        Self::prune(&mut admissions, Instant::now(), self.window);
        self.max_requests.saturating_sub(admissions.len())
    }

    fn prune(admissions: &mut VecDeque<Instant>, now: Instant, window: Duration) {
        while let Some(oldest) = admissions.front() {
            if now.duration_since(*oldest) >= window {
                admissions.pop_front();
            } else {
                break;
            }
        }
    }
}

// =============================================================================
// Tests
// =============================================================================
