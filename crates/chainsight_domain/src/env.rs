use std::str::FromStr;

use derive_setters::Setters;
use serde::{Deserialize, Serialize};
use url::Url;

use crate::{CacheConfig, CircuitConfig, Error, HttpConfig, RateLimitConfig, RetryConfig};

/// Represents the environment in which the invocation core is running.
/// Resolved once from process env vars; multiple clients with different
/// environments can coexist in one process.
#[derive(Debug, Clone, Serialize, Deserialize, Setters)]
#[serde(rename_all = "camelCase")]
#[setters(into, strip_option)]
pub struct Environment {
    /// Base URL of the remote JSON-RPC endpoint
    pub base_url: Url,

    /// Optional API key, sent as a bearer token when present
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub api_key: Option<String>,

    /// When set, the protocol client short-circuits to a deterministic
    /// local substitute instead of performing network I/O
    #[serde(default)]
    pub offline: bool,

    #[serde(default)]
    pub http: HttpConfig,

    #[serde(default)]
    pub retry: RetryConfig,

    #[serde(default)]
    pub cache: CacheConfig,

    #[serde(default)]
    pub rate_limit: RateLimitConfig,

    #[serde(default)]
    pub circuit: CircuitConfig,
}

impl Environment {
    pub fn new(base_url: Url) -> Self {
        Self {
            base_url,
            api_key: None,
            offline: false,
            http: HttpConfig::default(),
            retry: RetryConfig::default(),
            cache: CacheConfig::default(),
            rate_limit: RateLimitConfig::default(),
            circuit: CircuitConfig::default(),
        }
    }

    /// Reads the recognized `CHAINSIGHT_*` variables from the process
    /// environment. Only `CHAINSIGHT_BASE_URL` is required.
    pub fn from_env() -> anyhow::Result<Self> {
        let base_url = std::env::var("CHAINSIGHT_BASE_URL")
            .map_err(|_| Error::Configuration("CHAINSIGHT_BASE_URL is not set".to_string()))?;
        let base_url = Url::parse(&base_url)
            .map_err(|err| Error::Configuration(format!("invalid base URL: {err}")))?;

        let mut env = Environment::new(base_url);
        env.api_key = std::env::var("CHAINSIGHT_API_KEY").ok();
        env.offline = env_flag("CHAINSIGHT_OFFLINE");

        if let Some(timeout) = env_parse::<u64>("CHAINSIGHT_TIMEOUT_MS") {
            env.http.request_timeout_ms = timeout;
        }
        if let Some(attempts) = env_parse::<usize>("CHAINSIGHT_MAX_RETRIES") {
            env.retry.max_retry_attempts = attempts;
        }
        if let Some(ttl) = env_parse::<u64>("CHAINSIGHT_CACHE_TTL_MS") {
            env.cache.default_ttl_ms = ttl;
        }
        if let Some(max) = env_parse::<u32>("CHAINSIGHT_RATE_MAX_REQUESTS") {
            env.rate_limit.max_requests = max;
        }
        if let Some(window) = env_parse::<u64>("CHAINSIGHT_RATE_WINDOW_MS") {
            env.rate_limit.window_ms = window;
        }
        if let Some(capacity) = env_parse::<f64>("CHAINSIGHT_RATE_CAPACITY") {
            env.rate_limit.capacity = capacity;
        }
        if let Some(refill) = env_parse::<f64>("CHAINSIGHT_RATE_REFILL_PER_SEC") {
            env.rate_limit.refill_per_sec = refill;
        }

        Ok(env)
    }
}

fn env_parse<T: FromStr>(name: &str) -> Option<T> {
    std::env::var(name).ok().and_then(|value| value.parse().ok())
}

fn env_flag(name: &str) -> bool {
    std::env::var(name)
        .map(|value| matches!(value.as_str(), "1" | "true" | "yes"))
        .unwrap_or(false)
}
