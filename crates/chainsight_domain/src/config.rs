use std::time::Duration;

use derive_setters::Setters;
use serde::{Deserialize, Serialize};

#[derive(Debug, Clone, Serialize, Deserialize, Setters, PartialEq)]
#[serde(rename_all = "camelCase")]
#[setters(into)]
pub struct RetryConfig {
    /// Minimum delay in milliseconds between retry attempts
    pub min_delay_ms: u64,

    /// Backoff multiplication factor for each retry attempt
    pub backoff_factor: u64,

    /// Maximum number of additional attempts after the first failure
    pub max_retry_attempts: usize,

    /// Cap on the delay between retries, in milliseconds
    pub max_delay_ms: u64,

    /// HTTP status codes that should trigger retries
    pub retry_status_codes: Vec<u16>,
}

impl Default for RetryConfig {
    fn default() -> Self {
        Self {
            min_delay_ms: 200,
            backoff_factor: 2,
            max_retry_attempts: 3,
            max_delay_ms: 10_000,
            retry_status_codes: vec![408, 429, 500, 502, 503, 504],
        }
    }
}

impl RetryConfig {
    /// Backoff delay before the given zero-based attempt:
    /// `min(min_delay * factor^attempt, max_delay)`.
    pub fn delay_for_attempt(&self, attempt: usize) -> Duration {
        let factor = self.backoff_factor.saturating_pow(attempt as u32);
        let delay = self.min_delay_ms.saturating_mul(factor);
        Duration::from_millis(delay.min(self.max_delay_ms))
    }
}

#[derive(Debug, Clone, Serialize, Deserialize, Setters, PartialEq)]
#[serde(rename_all = "camelCase")]
#[setters(into)]
pub struct HttpConfig {
    /// Connection timeout in seconds
    pub connect_timeout: u64,

    /// Per-invocation timeout in milliseconds, distinct from retry backoff
    pub request_timeout_ms: u64,
}

impl Default for HttpConfig {
    fn default() -> Self {
        Self { connect_timeout: 10, request_timeout_ms: 30_000 }
    }
}

#[derive(Debug, Clone, Serialize, Deserialize, Setters, PartialEq)]
#[serde(rename_all = "camelCase")]
#[setters(into)]
pub struct CacheConfig {
    /// Default time-to-live for cached results, in milliseconds
    pub default_ttl_ms: u64,

    /// Interval between background sweeps of expired entries, in
    /// milliseconds
    pub sweep_interval_ms: u64,
}

impl CacheConfig {
    pub fn default_ttl(&self) -> Duration {
        Duration::from_millis(self.default_ttl_ms)
    }

    pub fn sweep_interval(&self) -> Duration {
        Duration::from_millis(self.sweep_interval_ms)
    }
}

impl Default for CacheConfig {
    fn default() -> Self {
        Self { default_ttl_ms: 60_000, sweep_interval_ms: 300_000 }
    }
}

/// Thresholds for the admission-control strategies. Window-based limiters
/// read `max_requests` and `window_ms`; the token bucket reads `capacity`
/// and `refill_per_sec`.
#[derive(Debug, Clone, Serialize, Deserialize, Setters, PartialEq)]
#[serde(rename_all = "camelCase")]
#[setters(into)]
pub struct RateLimitConfig {
    pub max_requests: u32,
    pub window_ms: u64,
    pub capacity: f64,
    pub refill_per_sec: f64,
}

impl RateLimitConfig {
    pub fn window(&self) -> Duration {
        Duration::from_millis(self.window_ms)
    }
}

impl Default for RateLimitConfig {
    fn default() -> Self {
        Self {
            max_requests: 60,
            window_ms: 60_000,
            capacity: 10.0,
            refill_per_sec: 1.0,
        }
    }
}

#[derive(Debug, Clone, Serialize, Deserialize, Setters, PartialEq)]
#[serde(rename_all = "camelCase")]
#[setters(into)]
pub struct CircuitConfig {
    /// Number of failures of one kind that opens the circuit
    pub failure_threshold: u32,

    /// Cool-down after which an open circuit closes again, in milliseconds
    pub cooldown_ms: u64,

    /// Grace period granted to in-flight work during shutdown, in
    /// milliseconds
    pub shutdown_grace_ms: u64,
}

impl CircuitConfig {
    pub fn cooldown(&self) -> Duration {
        Duration::from_millis(self.cooldown_ms)
    }

    pub fn shutdown_grace(&self) -> Duration {
        Duration::from_millis(self.shutdown_grace_ms)
    }
}

impl Default for CircuitConfig {
    fn default() -> Self {
        Self {
            failure_threshold: 5,
            cooldown_ms: 30_000,
            shutdown_grace_ms: 5_000,
        }
    }
}

#[cfg(test)]
mod tests {
    use pretty_assertions::assert_eq;

    use super::*;

    #[test]
    fn test_retry_config_default() {
        // Fixture: Create default retry config
        let config = RetryConfig::default();

        // Expected: Should have expected default values
        assert_eq!(config.min_delay_ms, 200);
        assert_eq!(config.backoff_factor, 2);
        assert_eq!(config.max_retry_attempts, 3);
        assert_eq!(config.retry_status_codes, vec![408, 429, 500, 502, 503, 504]);
    }

    #[test]
    fn test_retry_config_setters() {
        let config = RetryConfig::default()
            .min_delay_ms(100u64)
            .backoff_factor(3u64)
            .max_retry_attempts(5usize)
            .retry_status_codes(vec![429, 503]);

        assert_eq!(config.min_delay_ms, 100);
        assert_eq!(config.backoff_factor, 3);
        assert_eq!(config.max_retry_attempts, 5);
        assert_eq!(config.retry_status_codes, vec![429, 503]);
    }

    #[test]
    fn test_backoff_delay_is_exponential_and_capped() {
        let fixture = RetryConfig::default()
            .min_delay_ms(100u64)
            .backoff_factor(2u64)
            .max_delay_ms(500u64);

        assert_eq!(fixture.delay_for_attempt(0), Duration::from_millis(100));
        assert_eq!(fixture.delay_for_attempt(1), Duration::from_millis(200));
        assert_eq!(fixture.delay_for_attempt(2), Duration::from_millis(400));
        // attempt 3 would be 800ms, capped at 500ms
        assert_eq!(fixture.delay_for_attempt(3), Duration::from_millis(500));
    }

    #[test]
    fn test_cache_config_default_ttl() {
        let fixture = CacheConfig::default();
        assert_eq!(fixture.default_ttl(), Duration::from_secs(60));
    }

    #[test]
    fn test_rate_limit_config_round_trip() {
        let fixture = RateLimitConfig::default().max_requests(3u32).window_ms(1000u64);
        let json = serde_json::to_string(&fixture).unwrap();
        let actual: RateLimitConfig = serde_json::from_str(&json).unwrap();
        assert_eq!(actual, fixture);
    }
}
