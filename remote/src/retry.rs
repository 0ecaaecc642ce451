use config::RetryConfig;
use std::time::Duration;

/// Explicit retry-policy value threaded through the client's attempt loop.
///
/// A budget of `max_retries` allows `max_retries + 1` total attempts. Delays
/// grow geometrically from `base_delay`; a rate-limit response overrides the
/// computed delay with the server-supplied one.
#[derive(Debug, Clone)]
pub struct RetryPolicy {
    pub max_retries: u32,
    pub base_delay: Duration,
    pub multiplier: f64,
    pub rate_limit_fallback: Duration
}

impl RetryPolicy {
    pub fn from_config(config: &RetryConfig) -> Self {
        Self {
            max_retries: config.max_retries,
            base_delay: Duration::from_millis(config.base_delay_ms),
            multiplier: config.multiplier,
            rate_limit_fallback: Duration::from_secs(config.rate_limit_fallback_secs)
        }
    }

    /// Backoff before retry number `attempt` (zero-based).
    pub fn delay_for(&self, attempt: u32) -> Duration {
        let factor = self.multiplier.powi(attempt as i32);
        self.base_delay.mul_f64(factor)
    }
}

impl Default for RetryPolicy {
    fn default() -> Self {
        Self::from_config(&RetryConfig::default())
    }
}
