use std::collections::HashMap;
use std::sync::{Arc, Mutex};
use std::time::{Duration, Instant};

use chainsight_domain::{
    ClassifiedError, ClientEvent, Error, ErrorKind, EventSink, RetryConfig, Severity,
};
use serde_json::Value;
use strum::IntoEnumIterator;
use tokio_util::sync::CancellationToken;
use tracing::{debug, error, warn};

/// What a recovery strategy wants done with a failure: wait and try once
/// more, or substitute a fallback value.
#[derive(Debug, Clone, PartialEq)]
pub enum Directive {
    Retry { delay: Duration },
    Fallback { value: Value },
}

/// A pluggable per-kind recovery step. Strategies registered for a kind run
/// in order; the first one producing a directive short-circuits the rest.
pub trait RecoveryStrategy: Send + Sync {
    fn attempt(&self, error: &ClassifiedError) -> Option<Directive>;
}

/// Retries transient failures with the executor's backoff formula.
pub struct BackoffRetryStrategy {
    config: RetryConfig,
}

impl BackoffRetryStrategy {
    pub fn new(config: RetryConfig) -> Self {
        Self { config }
    }
}

impl RecoveryStrategy for BackoffRetryStrategy {
    fn attempt(&self, error: &ClassifiedError) -> Option<Directive> {
        if !error.retryable {
            return None;
        }
        Some(Directive::Retry { delay: self.config.delay_for_attempt(error.retry_count) })
    }
}

/// Waits exactly the `retry_after` the limiter or remote reported, when the
/// failure carries one.
pub struct RateLimitWaitStrategy;

impl RecoveryStrategy for RateLimitWaitStrategy {
    fn attempt(&self, error: &ClassifiedError) -> Option<Directive> {
        error
            .context
            .get("retry_after_ms")
            .and_then(Value::as_u64)
            .map(|ms| Directive::Retry { delay: Duration::from_millis(ms) })
    }
}

/// Substitutes a registered alternate-data-path value.
pub struct FallbackValueStrategy {
    value: Value,
}

impl FallbackValueStrategy {
    pub fn new(value: Value) -> Self {
        Self { value }
    }
}

impl RecoveryStrategy for FallbackValueStrategy {
    fn attempt(&self, _error: &ClassifiedError) -> Option<Directive> {
        Some(Directive::Fallback { value: self.value.clone() })
    }
}

struct BreakerState {
    failures: u32,
    opened_at: Option<Instant>,
}

/// Per-error-kind circuit breaker:
/// Closed -> (failures exceed threshold) -> Open -> (cool-down elapses) ->
/// Closed with the counter reset. State for a kind is created lazily on its
/// first failure.
pub struct CircuitBreaker {
    failure_threshold: u32,
    cooldown: Duration,
    state: Mutex<HashMap<ErrorKind, BreakerState>>,
}

impl CircuitBreaker {
    pub fn new(failure_threshold: u32, cooldown: Duration) -> Self {
        Self { failure_threshold, cooldown, state: Mutex::new(HashMap::new()) }
    }

    /// Rejects immediately while the kind's circuit is open. An elapsed
    /// cool-down closes the circuit and clears the counter; the return
    /// value reports whether that reset just happened.
    pub fn guard(&self, kind: ErrorKind) -> Result<bool, Error> {
        self.guard_at(kind, Instant::now())
    }

    pub fn guard_at(&self, kind: ErrorKind, now: Instant) -> Result<bool, Error> {
        let mut state = self.state.lock().unwrap_or_else(|e| e.into_inner());
        let Some(breaker) = state.get_mut(&kind) else {
            return Ok(false);
        };
        let Some(opened_at) = breaker.opened_at else {
            return Ok(false);
        };

        let open_for = now.duration_since(opened_at);
        if open_for < self.cooldown {
            return Err(Error::CircuitOpen { kind, retry_after: self.cooldown - open_for });
        }

        breaker.opened_at = None;
        breaker.failures = 0;
        Ok(true)
    }

    /// Counts a failure of the kind; returns true when this failure opened
    /// the circuit.
    pub fn record_failure(&self, kind: ErrorKind) -> bool {
        self.record_failure_at(kind, Instant::now())
    }

    pub fn record_failure_at(&self, kind: ErrorKind, now: Instant) -> bool {
        let mut state = self.state.lock().unwrap_or_else(|e| e.into_inner());
        let breaker = state
            .entry(kind)
            .or_insert_with(|| BreakerState { failures: 0, opened_at: None });
        breaker.failures += 1;
        if breaker.opened_at.is_none() && breaker.failures > self.failure_threshold {
            breaker.opened_at = Some(now);
            return true;
        }
        false
    }

    pub fn record_success(&self, kind: ErrorKind) {
        let mut state = self.state.lock().unwrap_or_else(|e| e.into_inner());
        if let Some(breaker) = state.get_mut(&kind) {
            breaker.failures = 0;
        }
    }

    /// Clears the failure counter of every tracked kind. A successful
    /// invocation proves the remote path healthy regardless of which kind
    /// the preceding failures were classified as.
    pub fn record_success_all(&self) {
        let mut state = self.state.lock().unwrap_or_else(|e| e.into_inner());
        for breaker in state.values_mut() {
            breaker.failures = 0;
        }
    }

    pub fn failures(&self, kind: ErrorKind) -> u32 {
        let state = self.state.lock().unwrap_or_else(|e| e.into_inner());
        state.get(&kind).map(|breaker| breaker.failures).unwrap_or(0)
    }
}

/// Process-wide graceful shutdown: new work stops immediately, in-flight
/// work gets a bounded grace period before the hard token trips.
#[derive(Clone)]
pub struct ShutdownController {
    work: CancellationToken,
    hard: CancellationToken,
    grace: Duration,
}

impl ShutdownController {
    pub fn new(grace: Duration) -> Self {
        Self {
            work: CancellationToken::new(),
            hard: CancellationToken::new(),
            grace,
        }
    }

    /// Token that trips as soon as shutdown begins; gates new work and
    /// in-flight retries.
    pub fn work_token(&self) -> CancellationToken {
        self.work.clone()
    }

    /// Token that trips once the grace period has elapsed; hosts await this
    /// before terminating.
    pub fn hard_token(&self) -> CancellationToken {
        self.hard.clone()
    }

    pub fn is_shutting_down(&self) -> bool {
        self.work.is_cancelled()
    }

    pub fn grace(&self) -> Duration {
        self.grace
    }

    pub fn initiate(&self) {
        if self.work.is_cancelled() {
            return;
        }
        self.work.cancel();
        let hard = self.hard.clone();
        let grace = self.grace;
        tokio::spawn(async move {
            tokio::time::sleep(grace).await;
            hard.cancel();
        });
    }
}

/// Classifies a pipeline failure for the recovery framework, mapping typed
/// errors onto the taxonomy and attaching whatever context they carry.
pub fn classify(error: &anyhow::Error, max_retries: usize) -> ClassifiedError {
    let classified = match error.downcast_ref::<Error>() {
        None => ClassifiedError::new(ErrorKind::Unknown, format!("{error:#}")),
        Some(Error::Retryable(inner)) => classify_transient(inner).retryable(true),
        Some(Error::RateLimitExceeded { retry_after }) => {
            ClassifiedError::new(ErrorKind::RateLimit, error.to_string())
                .context("retry_after_ms", Value::from(retry_after.as_millis() as u64))
        }
        Some(Error::CircuitOpen { kind, .. }) => {
            ClassifiedError::new(*kind, error.to_string()).retryable(false)
        }
        Some(Error::Auth(message)) => {
            ClassifiedError::new(ErrorKind::RemoteApi, message.clone())
                .severity(Severity::High)
                .retryable(false)
        }
        Some(Error::NotFound(message)) => {
            ClassifiedError::new(ErrorKind::RemoteApi, message.clone()).retryable(false)
        }
        Some(Error::InvalidStatusCode(code)) => {
            ClassifiedError::new(ErrorKind::RemoteApi, error.to_string())
                .context("status", Value::from(*code))
        }
        Some(Error::ProtocolFormat(_)) => {
            ClassifiedError::new(ErrorKind::RemoteApi, error.to_string())
        }
        Some(Error::Timeout(_)) => ClassifiedError::new(ErrorKind::Timeout, error.to_string()),
        Some(Error::Cancelled) => {
            ClassifiedError::new(ErrorKind::Internal, error.to_string()).retryable(false)
        }
        Some(Error::Critical(message)) => {
            ClassifiedError::new(ErrorKind::Internal, message.clone()).severity(Severity::Critical)
        }
        Some(Error::Configuration(message)) => {
            ClassifiedError::new(ErrorKind::Configuration, message.clone())
        }
    };
    classified.max_retries(max_retries)
}

/// A retryable wrapper may hold a more specific typed error underneath.
fn classify_transient(inner: &anyhow::Error) -> ClassifiedError {
    match inner.downcast_ref::<Error>() {
        Some(Error::Timeout(_)) => ClassifiedError::new(ErrorKind::Timeout, format!("{inner:#}")),
        Some(Error::InvalidStatusCode(429)) => {
            ClassifiedError::new(ErrorKind::RateLimit, format!("{inner:#}"))
        }
        Some(Error::InvalidStatusCode(code)) => {
            ClassifiedError::new(ErrorKind::RemoteApi, format!("{inner:#}"))
                .context("status", Value::from(*code))
        }
        _ => ClassifiedError::new(ErrorKind::Network, format!("{inner:#}")),
    }
}

/// Global error handler: severity-derived logging, per-kind circuit
/// breaking, and the ordered strategy map.
pub struct ErrorHandler {
    breaker: CircuitBreaker,
    strategies: HashMap<ErrorKind, Vec<Box<dyn RecoveryStrategy>>>,
    sink: Arc<dyn EventSink>,
    shutdown: ShutdownController,
}

impl ErrorHandler {
    pub fn new(
        breaker: CircuitBreaker,
        sink: Arc<dyn EventSink>,
        shutdown: ShutdownController,
    ) -> Self {
        Self { breaker, strategies: HashMap::new(), sink, shutdown }
    }

    /// Installs the default strategy set: backoff retry for network and
    /// timeout failures, reported-wait for rate limits.
    pub fn with_default_strategies(mut self, retry: &RetryConfig) -> Self {
        self.register(ErrorKind::Network, BackoffRetryStrategy::new(retry.clone()));
        self.register(ErrorKind::Timeout, BackoffRetryStrategy::new(retry.clone()));
        self.register(ErrorKind::RateLimit, RateLimitWaitStrategy);
        self
    }

    pub fn set_sink(&mut self, sink: Arc<dyn EventSink>) {
        self.sink = sink;
    }

    pub fn register(&mut self, kind: ErrorKind, strategy: impl RecoveryStrategy + 'static) {
        self.strategies.entry(kind).or_default().push(Box::new(strategy));
    }

    /// Registers an alternate data path for remote-API failures.
    pub fn register_fallback(&mut self, value: Value) {
        self.register(ErrorKind::RemoteApi, FallbackValueStrategy::new(value));
    }

    pub fn breaker(&self) -> &CircuitBreaker {
        &self.breaker
    }

    /// Pre-flight gate for new invocations: rejects while any kind's
    /// circuit is open. An elapsed cool-down closes that circuit on the way
    /// through.
    pub fn check_circuits(&self) -> Result<(), Error> {
        for kind in ErrorKind::iter() {
            if self.breaker.guard(kind)? {
                self.sink.emit(ClientEvent::CircuitClosed { kind });
            }
        }
        Ok(())
    }

    /// Runs the recovery pipeline for one classified failure. An open
    /// circuit rejects immediately without touching the counter or any
    /// strategy; a critical failure re-raises and initiates shutdown.
    pub fn handle(&self, error: &ClassifiedError) -> Result<Option<Directive>, Error> {
        self.log(error);

        let just_closed = self.breaker.guard(error.kind)?;
        if just_closed {
            self.sink.emit(ClientEvent::CircuitClosed { kind: error.kind });
        }
        if self.breaker.record_failure(error.kind) {
            self.sink.emit(ClientEvent::CircuitOpened { kind: error.kind });
        }

        if error.recoverable {
            for strategy in self.strategies.get(&error.kind).into_iter().flatten() {
                match strategy.attempt(error) {
                    Some(Directive::Retry { .. }) if !error.can_retry() => continue,
                    Some(directive) => return Ok(Some(directive)),
                    None => continue,
                }
            }
        }

        self.sink.emit(ClientEvent::UnrecoverableError {
            kind: error.kind,
            message: error.message.clone(),
        });

        if error.severity == Severity::Critical {
            self.sink.emit(ClientEvent::CriticalError {
                kind: error.kind,
                message: error.message.clone(),
            });
            self.sink
                .emit(ClientEvent::ShutdownInitiated { grace: self.shutdown.grace() });
            self.shutdown.initiate();
            return Err(Error::Critical(error.message.clone()));
        }

        Ok(None)
    }

    fn log(&self, error: &ClassifiedError) {
        match error.severity {
            Severity::Low => debug!(kind = %error.kind, "{}", error.message),
            Severity::Medium => warn!(kind = %error.kind, "{}", error.message),
            Severity::High | Severity::Critical => {
                error!(kind = %error.kind, severity = %error.severity, "{}", error.message)
            }
        }
    }
}
