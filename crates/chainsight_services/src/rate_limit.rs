use std::collections::{HashMap, VecDeque};
use std::sync::Mutex;
use std::time::{Duration, Instant};

use chainsight_domain::Error;

/// Admission control for outbound calls, keyed by caller identity. The
/// check-then-increment sequence is atomic under each strategy's lock, so
/// two concurrent callers can never both pass a check that should have
/// rejected the second one.
pub trait RateLimiter: Send + Sync {
    fn check_at(&self, key: &str, now: Instant) -> Result<(), Error>;

    fn check(&self, key: &str) -> Result<(), Error> {
        self.check_at(key, Instant::now())
    }
}

struct FixedWindow {
    count: u32,
    reset_at: Instant,
}

/// Per key: a counter and a reset timestamp. Once the reset time passes the
/// window starts over from zero.
pub struct FixedWindowLimiter {
    max_requests: u32,
    window: Duration,
    state: Mutex<HashMap<String, FixedWindow>>,
}

impl FixedWindowLimiter {
    pub fn new(max_requests: u32, window: Duration) -> Self {
        Self { max_requests, window, state: Mutex::new(HashMap::new()) }
    }
}

impl RateLimiter for FixedWindowLimiter {
    fn check_at(&self, key: &str, now: Instant) -> Result<(), Error> {
        let mut state = self.state.lock().unwrap_or_else(|e| e.into_inner());
        let window = state
            .entry(key.to_string())
            .or_insert_with(|| FixedWindow { count: 0, reset_at: now + self.window });

        if now >= window.reset_at {
            window.count = 0;
            window.reset_at = now + self.window;
        }

        if window.count >= self.max_requests {
            return Err(Error::RateLimitExceeded { retry_after: window.reset_at - now });
        }

        window.count += 1;
        Ok(())
    }
}

/// Per key: the timestamps of recent requests. Entries older than the
/// window are discarded on every check before the count is compared.
pub struct SlidingWindowLimiter {
    max_requests: usize,
    window: Duration,
    state: Mutex<HashMap<String, VecDeque<Instant>>>,
}

impl SlidingWindowLimiter {
    pub fn new(max_requests: usize, window: Duration) -> Self {
        Self { max_requests, window, state: Mutex::new(HashMap::new()) }
    }
}

impl RateLimiter for SlidingWindowLimiter {
    fn check_at(&self, key: &str, now: Instant) -> Result<(), Error> {
        let mut state = self.state.lock().unwrap_or_else(|e| e.into_inner());
        let timestamps = state.entry(key.to_string()).or_default();

        while timestamps
            .front()
            .is_some_and(|oldest| now.duration_since(*oldest) >= self.window)
        {
            timestamps.pop_front();
        }

        if timestamps.len() >= self.max_requests {
            // Admission opens when the oldest timestamp ages out.
            let oldest = *timestamps.front().unwrap_or(&now);
            let retry_after = self.window.saturating_sub(now.duration_since(oldest));
            return Err(Error::RateLimitExceeded { retry_after });
        }

        timestamps.push_back(now);
        Ok(())
    }
}

struct Bucket {
    tokens: f64,
    last_refill: Instant,
}

/// Token bucket with lazy refill: tokens accrue from elapsed wall-clock
/// time at each access, never via a background timer.
pub struct TokenBucketLimiter {
    capacity: f64,
    refill_per_sec: f64,
    state: Mutex<HashMap<String, Bucket>>,
}

impl TokenBucketLimiter {
    pub fn new(capacity: f64, refill_per_sec: f64) -> Self {
        Self { capacity, refill_per_sec, state: Mutex::new(HashMap::new()) }
    }

    pub fn try_consume(&self, key: &str, tokens: f64) -> Result<(), Error> {
        self.try_consume_at(key, tokens, Instant::now())
    }

    pub fn try_consume_at(&self, key: &str, tokens: f64, now: Instant) -> Result<(), Error> {
        let mut state = self.state.lock().unwrap_or_else(|e| e.into_inner());
        let bucket = state
            .entry(key.to_string())
            .or_insert_with(|| Bucket { tokens: self.capacity, last_refill: now });

        let elapsed = now.duration_since(bucket.last_refill).as_secs_f64();
        bucket.tokens = (bucket.tokens + elapsed * self.refill_per_sec).min(self.capacity);
        bucket.last_refill = now;

        if bucket.tokens >= tokens {
            bucket.tokens -= tokens;
            return Ok(());
        }

        // Rounded up to a whole millisecond so a caller sleeping the hint
        // is guaranteed admission.
        let wait_secs = (tokens - bucket.tokens) / self.refill_per_sec;
        let retry_after = Duration::from_millis((wait_secs * 1000.0).ceil() as u64);
        Err(Error::RateLimitExceeded { retry_after })
    }
}

impl RateLimiter for TokenBucketLimiter {
    fn check_at(&self, key: &str, now: Instant) -> Result<(), Error> {
        self.try_consume_at(key, 1.0, now)
    }
}

/// Chains independent limiters; every sub-limiter must allow the request
/// and the first to reject determines the raised error.
#[derive(Default)]
pub struct CompositeLimiter {
    limiters: Vec<Box<dyn RateLimiter>>,
}

impl CompositeLimiter {
    pub fn new() -> Self {
        Self::default()
    }

    pub fn with(mut self, limiter: impl RateLimiter + 'static) -> Self {
        self.limiters.push(Box::new(limiter));
        self
    }
}

impl RateLimiter for CompositeLimiter {
    fn check_at(&self, key: &str, now: Instant) -> Result<(), Error> {
        for limiter in &self.limiters {
            limiter.check_at(key, now)?;
        }
        Ok(())
    }
}
