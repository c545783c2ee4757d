//! Reconnect delay: exponential growth, capped, with uniform jitter.

use std::time::Duration;

use rand::Rng;

use crate::config::ReconnectConfig;

#[derive(Debug, Clone)]
pub struct Backoff {
    base: Duration,
    max: Duration,
    jitter: f64,
}

impl Backoff {
    pub fn new(base: Duration, max: Duration, jitter: f64) -> Self {
        Self {
            base,
            max: max.max(base),
            jitter: jitter.clamp(0.0, 1.0),
        }
    }

    pub fn from_config(config: &ReconnectConfig) -> Self {
        Self::new(config.base_delay(), config.max_delay(), config.jitter)
    }

    /// `min(base * 2^retry_count, max)` before jitter.
    pub fn nominal(&self, retry_count: u32) -> Duration {
        let factor = 1u128.checked_shl(retry_count.min(64)).unwrap_or(u128::MAX);
        let millis = self.base.as_millis().saturating_mul(factor);
        let capped = millis.min(self.max.as_millis());
        Duration::from_millis(u64::try_from(capped).unwrap_or(u64::MAX))
    }

    /// Delay before the reconnect attempt that follows `retry_count`
    /// previous attempts.
    pub fn delay(&self, retry_count: u32) -> Duration {
        let sample = rand::thread_rng().gen_range(-1.0..=1.0);
        self.jittered(retry_count, sample)
    }

    /// `sample` in `[-1, 1]` scales the jitter band.
    fn jittered(&self, retry_count: u32, sample: f64) -> Duration {
        let nominal = self.nominal(retry_count).as_secs_f64();
        let scaled = nominal * (1.0 + self.jitter * sample.clamp(-1.0, 1.0));
        Duration::from_secs_f64(scaled.max(0.0)).min(self.max)
    }
}

impl Default for Backoff {
    fn default() -> Self {
        Self::from_config(&ReconnectConfig::default())
    }
}
