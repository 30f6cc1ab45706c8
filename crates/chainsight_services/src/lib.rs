mod cache;
mod rate_limit;
mod recovery;
mod retry;
mod service;

pub use cache::{cache_key, ResponseCache};
pub use rate_limit::{
    CompositeLimiter, FixedWindowLimiter, RateLimiter, SlidingWindowLimiter, TokenBucketLimiter,
};
pub use recovery::{
    classify, BackoffRetryStrategy, CircuitBreaker, Directive, ErrorHandler, FallbackValueStrategy,
    RateLimitWaitStrategy, RecoveryStrategy, ShutdownController,
};
pub use retry::{retry_with_config, should_retry};
pub use service::{ToolInvoker, ToolService};
