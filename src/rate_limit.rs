//! Randomized delays between requests.

use rand::Rng;
use std::time::Duration;
use tracing::debug;

/// Sleeps for a uniformly random duration in `[min, max)`.
#[derive(Debug, Clone, Copy)]
pub struct RateLimiter {
    min: Duration,
    max: Duration,
}

fn secs(value: f64) -> Duration {
    Duration::try_from_secs_f64(value.max(0.0)).unwrap_or(Duration::ZERO)
}

impl RateLimiter {
    /// Bounds are in seconds; `min > max` is clamped to `min`.
    pub fn new(min: f64, max: f64) -> Self {
        let min = secs(min);
        Self {
            min,
            max: secs(max).max(min),
        }
    }

    /// A limiter that never waits.
    pub fn disabled() -> Self {
        Self::new(0.0, 0.0)
    }

    /// Draw the next delay without sleeping.
    pub fn next_delay(&self) -> Duration {
        if self.max <= self.min {
            return self.min;
        }
        let nanos = rand::thread_rng().gen_range(self.min.as_nanos()..self.max.as_nanos());
        Duration::from_nanos(nanos as u64)
    }

    /// Sleep for one drawn delay.
    pub async fn wait(&self) {
        let delay = self.next_delay();
        if delay.is_zero() {
            return;
        }
        debug!(delay_ms = delay.as_millis() as u64, "Delaying");
        tokio::time::sleep(delay).await;
    }
}
