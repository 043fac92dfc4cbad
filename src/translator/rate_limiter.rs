use std::collections::VecDeque;
use std::sync::Mutex;
use std::thread;
use std::time::{Duration, Instant};

use crate::error::Result;
use crate::progress::CancellationToken;

const WINDOW: Duration = Duration::from_secs(1);

/// Longest uninterrupted sleep; cancellation is re-checked between slices.
pub const POLL_INTERVAL: Duration = Duration::from_millis(50);

/// Sliding one-second window shared by all translation workers.
///
/// The lock is held while sleeping, so waiting callers are released one at
/// a time in arrival order.
#[derive(Debug)]
pub struct RateLimiter {
    max_qps: usize,
    requests: Mutex<VecDeque<Instant>>,
}

impl RateLimiter {
    pub fn new(max_qps: usize) -> Self {
        let max_qps = max_qps.max(1);
        Self {
            max_qps,
            requests: Mutex::new(VecDeque::with_capacity(max_qps)),
        }
    }

    pub fn max_qps(&self) -> usize {
        self.max_qps
    }

    /// Block until one more request fits in the window.
    pub fn wait(&self) {
        // a fresh token is never cancelled
        let _ = self.wait_cancellable(&CancellationToken::new());
    }

    /// Like [`RateLimiter::wait`], but gives up with `Error::Cancelled`
    /// within one [`POLL_INTERVAL`] of `cancel` being set. A cancelled
    /// caller does not take a slot in the window.
    pub fn wait_cancellable(&self, cancel: &CancellationToken) -> Result<()> {
        let mut requests = match self.requests.lock() {
            Ok(guard) => guard,
            Err(poisoned) => poisoned.into_inner(),
        };
        cancel.check()?;
        let now = Instant::now();
        while requests
            .front()
            .is_some_and(|first| now.duration_since(*first) > WINDOW)
        {
            requests.pop_front();
        }

        if requests.len() < self.max_qps {
            requests.push_back(now);
            return Ok(());
        }

        let Some(&first) = requests.front() else {
            requests.push_back(now);
            return Ok(());
        };
        let next = first + WINDOW;
        loop {
            cancel.check()?;
            let now = Instant::now();
            if now >= next {
                break;
            }
            thread::sleep((next - now).min(POLL_INTERVAL));
        }
        requests.pop_front();
        requests.push_back(next);
        Ok(())
    }
}
