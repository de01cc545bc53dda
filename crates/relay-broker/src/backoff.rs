//! Reconnect pacing for broker listeners.
//!
//! Delay for attempt `n` is `min(max, base * 2^n)` scaled by a symmetric
//! jitter of `±jitter_factor`.

use std::time::Duration;

use serde::{Deserialize, Serialize};

/// Default base delay in milliseconds.
pub const DEFAULT_BASE_DELAY_MS: u64 = 500;
/// Default maximum delay in milliseconds.
pub const DEFAULT_MAX_DELAY_MS: u64 = 30_000;
/// Default jitter factor (0.0–1.0).
pub const DEFAULT_JITTER_FACTOR: f64 = 0.2;

/// Reconnect parameters.
#[derive(Clone, Debug, PartialEq, Serialize, Deserialize)]
#[serde(rename_all = "camelCase", default)]
pub struct ReconnectConfig {
    /// First retry delay in ms.
    pub base_delay_ms: u64,
    /// Upper bound for a single delay in ms.
    pub max_delay_ms: u64,
    /// Jitter range, clamped to 0.0–1.0.
    pub jitter_factor: f64,
}

impl Default for ReconnectConfig {
    fn default() -> Self {
        Self {
            base_delay_ms: DEFAULT_BASE_DELAY_MS,
            max_delay_ms: DEFAULT_MAX_DELAY_MS,
            jitter_factor: DEFAULT_JITTER_FACTOR,
        }
    }
}

/// Stateful exponential backoff.
#[derive(Clone, Debug)]
pub struct ExponentialBackoff {
    config: ReconnectConfig,
    attempt: u32,
}

impl ExponentialBackoff {
    /// Backoff starting at attempt zero.
    pub fn new(config: ReconnectConfig) -> Self {
        Self { config, attempt: 0 }
    }

    /// Number of delays handed out since the last reset.
    pub fn attempt(&self) -> u32 {
        self.attempt
    }

    /// Next delay, with jitter, advancing the attempt counter.
    pub fn next_delay(&mut self) -> Duration {
        let delay = self.delay_with_random(rand::random::<f64>());
        self.attempt = self.attempt.saturating_add(1);
        delay
    }

    /// Back to the first delay after a successful reconnect.
    pub fn reset(&mut self) {
        self.attempt = 0;
    }

    /// Delay for the current attempt given `random` in `[0.0, 1.0)`.
    #[allow(
        clippy::cast_precision_loss,
        clippy::cast_possible_truncation,
        clippy::cast_sign_loss
    )]
    pub fn delay_with_random(&self, random: f64) -> Duration {
        let exponential = self
            .config
            .base_delay_ms
            .saturating_mul(1u64 << self.attempt.min(31));
        let capped = exponential.min(self.config.max_delay_ms);

        let jitter_factor = self.config.jitter_factor.clamp(0.0, 1.0);
        let jitter = 1.0 + (random * 2.0 - 1.0) * jitter_factor;
        let millis = ((capped as f64) * jitter).round().max(0.0) as u64;

        Duration::from_millis(millis)
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    fn no_jitter() -> ReconnectConfig {
        ReconnectConfig {
            base_delay_ms: 100,
            max_delay_ms: 1_000,
            jitter_factor: 0.0,
        }
    }

    #[test]
    fn grows_exponentially() {
        let mut backoff = ExponentialBackoff::new(no_jitter());
        let delays: Vec<u64> = (0..4)
            .map(|_| u64::try_from(backoff.next_delay().as_millis()).unwrap())
            .collect();
        assert_eq!(delays, vec![100, 200, 400, 800]);
        assert_eq!(backoff.attempt(), 4);
    }

    #[test]
    fn caps_at_max() {
        let mut backoff = ExponentialBackoff::new(no_jitter());
        for _ in 0..10 {
            let _ = backoff.next_delay();
        }
        assert_eq!(backoff.next_delay(), Duration::from_millis(1_000));
    }

    #[test]
    fn huge_attempt_counts_do_not_overflow() {
        let mut backoff = ExponentialBackoff::new(no_jitter());
        backoff.attempt = u32::MAX;
        assert_eq!(backoff.next_delay(), Duration::from_millis(1_000));
        assert_eq!(backoff.attempt(), u32::MAX);
    }

    #[test]
    fn reset_restarts_sequence() {
        let mut backoff = ExponentialBackoff::new(no_jitter());
        let _ = backoff.next_delay();
        let _ = backoff.next_delay();
        backoff.reset();
        assert_eq!(backoff.next_delay(), Duration::from_millis(100));
    }

    #[test]
    fn jitter_is_symmetric() {
        let backoff = ExponentialBackoff::new(ReconnectConfig {
            jitter_factor: 0.2,
            ..no_jitter()
        });
        assert_eq!(backoff.delay_with_random(0.0), Duration::from_millis(80));
        assert_eq!(backoff.delay_with_random(0.5), Duration::from_millis(100));
        assert_eq!(backoff.delay_with_random(1.0), Duration::from_millis(120));
    }

    #[test]
    fn config_deserializes_with_defaults() {
        let config: ReconnectConfig =
            serde_json::from_str(r#"{"baseDelayMs": 250}"#).unwrap();
        assert_eq!(config.base_delay_ms, 250);
        assert_eq!(config.max_delay_ms, DEFAULT_MAX_DELAY_MS);
    }
}
