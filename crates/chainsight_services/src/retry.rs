use std::time::Duration;

use backon::{ExponentialBuilder, Retryable};
use chainsight_domain::{Error, RetryConfig};
use tokio_util::sync::CancellationToken;

/// Wraps an asynchronous operation with bounded exponential-backoff retry.
/// Only errors wrapped in [`Error::Retryable`] are retried; terminal
/// failures (authentication, not-found, validation) are rethrown with their
/// original message and never consume an attempt. The cancellation token is
/// checked before each attempt so an abandoned invocation stops promptly.
pub async fn retry_with_config<F, Fut, T, C>(
    config: &RetryConfig,
    operation: F,
    cancel: CancellationToken,
    notify: Option<C>,
) -> anyhow::Result<T>
where
    F: Fn() -> Fut,
    Fut: std::future::Future<Output = anyhow::Result<T>>,
    C: Fn(&anyhow::Error, Duration) + Send + Sync + 'static,
{
    let strategy = ExponentialBuilder::default()
        .with_min_delay(Duration::from_millis(config.min_delay_ms))
        .with_factor(config.backoff_factor as f32)
        .with_max_times(config.max_retry_attempts)
        .with_max_delay(Duration::from_millis(config.max_delay_ms));

    let guarded = || {
        let cancel = cancel.clone();
        let attempt = operation();
        async move {
            if cancel.is_cancelled() {
                return Err(anyhow::Error::from(Error::Cancelled));
            }
            attempt.await
        }
    };

    let retryable = guarded.retry(&strategy).when(should_retry);

    match notify {
        Some(callback) => retryable.notify(callback).await,
        None => retryable.await,
    }
}

/// Determines if an error should trigger a retry attempt.
pub fn should_retry(error: &anyhow::Error) -> bool {
    error
        .downcast_ref::<Error>()
        .is_some_and(|error| matches!(error, Error::Retryable(_)))
}
