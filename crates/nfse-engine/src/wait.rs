//! Bounded condition polling.
//!
//! Callers check their condition, then call [`Poller::wait`]; a `false`
//! return means the deadline passed and the condition should be treated as
//! not met:
//!
//! ```ignore
//! let mut poller = Poller::new(timeout, Backoff::from(&timing));
//! loop {
//!     if condition().await {
//!         return true;
//!     }
//!     if !poller.wait().await {
//!         return false;
//!     }
//! }
//! ```

use crate::config::TimingConfig;
use std::time::Duration;
use tokio::time::Instant;

#[derive(Debug, Clone, Copy)]
pub struct Backoff {
    pub initial: Duration,
    pub max: Duration,
    pub factor: f64,
}

impl Default for Backoff {
    fn default() -> Self {
        Self {
            initial: Duration::from_millis(100),
            max: Duration::from_secs(2),
            factor: 2.0,
        }
    }
}

impl From<&TimingConfig> for Backoff {
    fn from(timing: &TimingConfig) -> Self {
        Self {
            initial: Duration::from_millis(timing.poll_initial_ms),
            max: Duration::from_millis(timing.poll_max_ms),
            factor: timing.poll_factor.max(1.0),
        }
    }
}

#[derive(Debug)]
pub struct Poller {
    deadline: Instant,
    delay: Duration,
    backoff: Backoff,
    polls: u32,
}

impl Poller {
    pub fn new(timeout: Duration, backoff: Backoff) -> Self {
        Self {
            deadline: Instant::now() + timeout,
            delay: backoff.initial,
            backoff,
            polls: 0,
        }
    }

    /// Sleep until the next poll. Returns `false` once the deadline has
    /// passed; the last sleep is cut short at the deadline.
    pub async fn wait(&mut self) -> bool {
        let now = Instant::now();
        if now >= self.deadline {
            return false;
        }
        let sleep = self.delay.min(self.deadline - now);
        tokio::time::sleep(sleep).await;
        self.polls += 1;
        self.delay = self.delay.mul_f64(self.backoff.factor).min(self.backoff.max);
        true
    }

    pub fn expired(&self) -> bool {
        Instant::now() >= self.deadline
    }

    pub fn polls(&self) -> u32 {
        self.polls
    }
}

/// Whether a `document.readyState` value means the page finished loading.
pub fn is_complete(ready_state: &str) -> bool {
    ready_state.eq_ignore_ascii_case("complete")
}
