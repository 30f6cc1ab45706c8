use std::sync::atomic::{AtomicUsize, Ordering};
use std::sync::Arc;

use anyhow::{Context as _, Result};
use async_trait::async_trait;
use chainsight_domain::{
    Arguments, ClassifiedError, ClientEvent, Environment, Error, ErrorKind, EventSink,
    RetryConfig, ToolName, ToolOutcome, ToolResponse, TracingSink,
};
use chainsight_provider::ProtocolClient;
use tracing::debug;

use crate::cache::ResponseCache;
use crate::rate_limit::{RateLimiter, TokenBucketLimiter};
use crate::recovery::{classify, CircuitBreaker, Directive, ErrorHandler, ShutdownController};
use crate::retry::retry_with_config;

/// Seam between the pipeline and the wire. Lets tests substitute the
/// protocol client with a scripted invoker.
#[async_trait]
pub trait ToolInvoker: Send + Sync {
    async fn invoke(&self, name: &ToolName, arguments: Arguments) -> Result<ToolResponse>;
}

#[async_trait]
impl ToolInvoker for ProtocolClient {
    async fn invoke(&self, name: &ToolName, arguments: Arguments) -> Result<ToolResponse> {
        ProtocolClient::invoke(self, name, arguments).await
    }
}

pub type KeyFn = Box<dyn Fn(&ToolName, &Arguments) -> String + Send + Sync>;

const GLOBAL_KEY: &str = "global";

/// The resilient invocation pipeline: rate limiter, then cache, then the
/// retry-wrapped remote call, with the error/recovery framework around the
/// terminal failure path. This is the only entry point analysis modules
/// call; they see final outcomes, never the resilience machinery.
pub struct ToolService {
    invoker: Arc<dyn ToolInvoker>,
    cache: Arc<ResponseCache>,
    limiter: Arc<dyn RateLimiter>,
    retry: RetryConfig,
    handler: ErrorHandler,
    sink: Arc<dyn EventSink>,
    key_fn: KeyFn,
    shutdown: ShutdownController,
}

impl ToolService {
    /// Builds the default pipeline for an environment: token-bucket
    /// admission, an in-memory cache with the configured TTL, and the
    /// default recovery strategy set. Spawns the background cache sweeper,
    /// so the service must be built inside a tokio runtime; the sweeper
    /// stops when shutdown begins.
    pub fn new(env: &Environment, invoker: Arc<dyn ToolInvoker>) -> Self {
        let sink: Arc<dyn EventSink> = Arc::new(TracingSink);
        let shutdown = ShutdownController::new(env.circuit.shutdown_grace());
        let handler = ErrorHandler::new(
            CircuitBreaker::new(env.circuit.failure_threshold, env.circuit.cooldown()),
            sink.clone(),
            shutdown.clone(),
        )
        .with_default_strategies(&env.retry);

        let cache = Arc::new(ResponseCache::new(env.cache.default_ttl()));
        cache.spawn_sweeper(env.cache.sweep_interval(), shutdown.work_token());

        Self {
            invoker,
            cache,
            limiter: Arc::new(TokenBucketLimiter::new(
                env.rate_limit.capacity,
                env.rate_limit.refill_per_sec,
            )),
            retry: env.retry.clone(),
            handler,
            sink,
            key_fn: Box::new(|_, _| GLOBAL_KEY.to_string()),
            shutdown,
        }
    }

    pub fn with_limiter(mut self, limiter: impl RateLimiter + 'static) -> Self {
        self.limiter = Arc::new(limiter);
        self
    }

    pub fn with_sink(mut self, sink: Arc<dyn EventSink>) -> Self {
        self.handler.set_sink(sink.clone());
        self.sink = sink;
        self
    }

    pub fn with_handler(mut self, handler: ErrorHandler) -> Self {
        self.handler = handler;
        self
    }

    /// Replaces the caller-identity derivation used for rate limiting.
    /// The default throttles every caller against one global key.
    pub fn with_key_fn(
        mut self,
        key_fn: impl Fn(&ToolName, &Arguments) -> String + Send + Sync + 'static,
    ) -> Self {
        self.key_fn = Box::new(key_fn);
        self
    }

    pub fn cache(&self) -> &Arc<ResponseCache> {
        &self.cache
    }

    pub fn handler(&self) -> &ErrorHandler {
        &self.handler
    }

    pub fn handler_mut(&mut self) -> &mut ErrorHandler {
        &mut self.handler
    }

    pub fn shutdown(&self) -> &ShutdownController {
        &self.shutdown
    }

    /// Invokes a named remote tool. Ordinary remote failures come back as
    /// an unsuccessful [`ToolOutcome`]; rate-limit, circuit-open and
    /// critical conditions are raised as typed errors the caller is
    /// expected to catch.
    pub async fn invoke(&self, name: &ToolName, arguments: Arguments) -> Result<ToolOutcome> {
        if self.shutdown.is_shutting_down() {
            return Err(Error::Cancelled).context("service is shutting down");
        }

        // Admission first: a rejected call must not also pay retry backoff.
        let key = (self.key_fn)(name, &arguments);
        if let Err(error) = self.limiter.check(&key) {
            if let Error::RateLimitExceeded { retry_after } = &error {
                self.sink.emit(ClientEvent::RateLimitExceeded {
                    key: key.clone(),
                    retry_after: *retry_after,
                });
            }
            return Err(error.into());
        }
        self.sink.emit(ClientEvent::RequestAllowed { key: key.clone() });

        if let Some(data) = self.cache.get(name, &arguments) {
            self.sink.emit(ClientEvent::CacheHit { key });
            return Ok(ToolOutcome::ok(data).cached(true));
        }

        // Cached results are served even while a circuit is open; only
        // fresh remote work is gated.
        self.handler.check_circuits()?;

        let attempt_counter = Arc::new(AtomicUsize::new(0));
        let notify_sink = self.sink.clone();
        let notify = move |error: &anyhow::Error, delay: std::time::Duration| {
            let attempt = attempt_counter.fetch_add(1, Ordering::SeqCst) + 1;
            notify_sink.emit(ClientEvent::RetryAttempted {
                attempt,
                delay,
                error: format!("{error:#}"),
            });
        };

        let result = retry_with_config(
            &self.retry,
            || self.invoker.invoke(name, arguments.clone()),
            self.shutdown.work_token(),
            Some(notify),
        )
        .await;

        match result {
            Ok(response) => self.complete(name, &arguments, response),
            Err(error) => self.recover(name, &arguments, error).await,
        }
    }

    /// A transport-level success may still carry a remote error payload;
    /// only genuine results are cached.
    fn complete(
        &self,
        name: &ToolName,
        arguments: &Arguments,
        response: ToolResponse,
    ) -> Result<ToolOutcome> {
        match response.result {
            Some(data) => {
                self.cache.put(name, arguments, data.clone(), None);
                self.handler.breaker().record_success_all();
                Ok(ToolOutcome::ok(data))
            }
            None => {
                let remote = response
                    .error
                    .map(|error| error.to_string())
                    .unwrap_or_else(|| "remote returned an empty reply".to_string());
                let classified = ClassifiedError::new(ErrorKind::RemoteApi, remote.clone())
                    .max_retries(self.retry.max_retry_attempts);
                match self.handler.handle(&classified)? {
                    Some(Directive::Fallback { value }) => {
                        debug!(tool = %name, "Serving registered fallback value");
                        Ok(ToolOutcome::ok(value))
                    }
                    _ => Ok(ToolOutcome::err(remote)),
                }
            }
        }
    }

    /// Terminal failure path: classify, run the recovery framework, and
    /// either honor its directive or hand the caller a readable failure.
    async fn recover(
        &self,
        name: &ToolName,
        arguments: &Arguments,
        error: anyhow::Error,
    ) -> Result<ToolOutcome> {
        let mut classified = classify(&error, self.retry.max_retry_attempts);
        if crate::retry::should_retry(&error) {
            // The executor already spent the whole retry budget on this
            // failure; a Retry directive must not restart it.
            classified.retry_count = self.retry.max_retry_attempts;
        }

        match self.handler.handle(&classified)? {
            Some(Directive::Fallback { value }) => {
                debug!(tool = %name, "Serving registered fallback value");
                Ok(ToolOutcome::ok(value))
            }
            Some(Directive::Retry { delay }) => {
                // One supplementary attempt after the directed wait; the
                // executor's budget is already spent.
                tokio::time::sleep(delay).await;
                match self.invoker.invoke(name, arguments.clone()).await {
                    Ok(response) => self.complete(name, arguments, response),
                    Err(last) => Ok(ToolOutcome::err(format!("{last:#}"))),
                }
            }
            None => Ok(ToolOutcome::err(format!("{error:#}"))),
        }
    }
}
