use std::time::Duration;
use tokio::sync::Mutex;
use tokio::time::{sleep, Instant};
use tracing::debug;

/// Spaces out calls to a rate-limited backend.
///
/// Every caller goes through `acquire` before issuing a request. Calls are
/// released at least `min_interval` apart, in the order they arrived.
#[derive(Debug)]
pub struct RateLimiter {
    /// Minimum gap between two consecutive calls
    min_interval: Duration,
    last_call: Mutex<Option<Instant>>,
}

impl RateLimiter {
    pub fn new(min_interval: Duration) -> Self {
        Self {
            min_interval,
            last_call: Mutex::new(None),
        }
    }

    /// A limiter that never waits
    pub fn unlimited() -> Self {
        Self::new(Duration::ZERO)
    }

    pub fn min_interval(&self) -> Duration {
        self.min_interval
    }

    /// How long a call made at `now` has to wait after a call made at `last`.
    /// An interval too large to add to `last` waits the full interval.
    fn delay_after(&self, last: Option<Instant>, now: Instant) -> Duration {
        match last {
            Some(last) => last
                .checked_add(self.min_interval)
                .map_or(self.min_interval, |next| next.saturating_duration_since(now)),
            None => Duration::ZERO,
        }
    }

    /// Wait until the next call is allowed. The lock is held while sleeping
    /// so concurrent callers queue up instead of bursting together.
    pub async fn acquire(&self, operation_name: &str) {
        let mut last_call = self.last_call.lock().await;

        let delay = self.delay_after(*last_call, Instant::now());
        if !delay.is_zero() {
            debug!("{}: waiting {:?} for rate limit", operation_name, delay);
            sleep(delay).await;
        }

        *last_call = Some(Instant::now());
    }
}
