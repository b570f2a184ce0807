use std::{
    sync::atomic::{AtomicBool, Ordering},
    thread,
    time::{Duration, Instant},
};

use tracing::warn;

use crate::error::{DownloadError, Result};

const SLEEP_SLICE: Duration = Duration::from_millis(50);

/// Retry with exponential backoff.
///
/// The delay starts at `backoff` and doubles after each failure, capped at
/// eight times the initial value.
#[derive(Clone, Copy, Debug)]
pub struct RetryPolicy {
    pub retries: u32,
    pub backoff: Duration,
}

impl Default for RetryPolicy {
    fn default() -> Self {
        Self {
            retries: 3,
            backoff: Duration::from_secs(1),
        }
    }
}

impl RetryPolicy {
    pub fn new(retries: u32, backoff: Duration) -> Self {
        Self { retries, backoff }
    }

    fn max_backoff(&self) -> Duration {
        self.backoff.saturating_mul(8)
    }

    /// Runs `op` until it succeeds, fails with a non-retryable error, or runs out
    /// of attempts.
    ///
    /// `cancel` is checked before each attempt and while waiting between attempts.
    pub fn run<T>(
        &self,
        url: &str,
        cancel: &AtomicBool,
        mut op: impl FnMut() -> Result<T>,
    ) -> Result<T> {
        let mut attempt = 0;
        let mut delay = self.backoff;

        loop {
            if cancel.load(Ordering::Relaxed) {
                return Err(DownloadError::Cancelled {
                    url: url.to_string(),
                });
            }

            attempt += 1;
            let err = match op() {
                Ok(value) => return Ok(value),
                Err(err) => err,
            };

            if !err.is_retryable() {
                return Err(err);
            }

            if attempt > self.retries {
                return Err(DownloadError::Exhausted {
                    url: url.to_string(),
                    attempts: attempt,
                    source: Box::new(err),
                });
            }

            warn!(url, attempt, error = %err, "request failed, retrying in {:?}", delay);
            sleep_unless_cancelled(delay, cancel);
            delay = delay.saturating_mul(2).min(self.max_backoff());
        }
    }
}

fn sleep_unless_cancelled(delay: Duration, cancel: &AtomicBool) {
    let until = Instant::now() + delay;
    while !cancel.load(Ordering::Relaxed) {
        let now = Instant::now();
        if now >= until {
            break;
        }
        thread::sleep((until - now).min(SLEEP_SLICE));
    }
}
