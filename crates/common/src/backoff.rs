use rand::Rng;
use std::time::Duration;

/// Exponential backoff with jitter for reconnection attempts.
///
/// Formula: min(max_delay, base * 2^attempt) + random_jitter
#[derive(Debug, Clone)]
pub struct ExponentialBackoff {
    base: Duration,
    max_delay: Duration,
    jitter_factor: f64,
    attempt: u32,
}

impl Default for ExponentialBackoff {
    fn default() -> Self {
        Self {
            base: Duration::from_secs(1),
            max_delay: Duration::from_secs(60),
            jitter_factor: 0.1,
            attempt: 0,
        }
    }
}

impl ExponentialBackoff {
    /// Create a new backoff schedule.
    ///
    /// `jitter_factor` is a fraction of the delay in `[0.0, 1.0]`; negative
    /// values are clamped to 0.
    pub fn new(base: Duration, max_delay: Duration, jitter_factor: f64) -> Self {
        Self {
            base,
            max_delay,
            jitter_factor: jitter_factor.max(0.0),
            attempt: 0,
        }
    }

    /// Calculate the next delay and increment the attempt counter.
    pub fn next_delay(&mut self) -> Duration {
        let exp_delay = self.base.saturating_mul(2u32.saturating_pow(self.attempt));
        let capped_delay = exp_delay.min(self.max_delay);

        let jitter_range = capped_delay.as_secs_f64() * self.jitter_factor;
        let jitter = if jitter_range > 0.0 {
            rand::thread_rng().gen_range(-jitter_range..=jitter_range)
        } else {
            0.0
        };
        let final_secs = (capped_delay.as_secs_f64() + jitter).max(0.0);

        self.attempt = self.attempt.saturating_add(1);

        Duration::from_secs_f64(final_secs)
    }

    /// Reset the attempt counter (call after a successful connection).
    pub fn reset(&mut self) {
        self.attempt = 0;
    }

    /// Get current attempt number.
    pub fn attempt(&self) -> u32 {
        self.attempt
    }
}
