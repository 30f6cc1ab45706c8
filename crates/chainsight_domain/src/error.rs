use std::collections::BTreeMap;
use std::time::Duration;

use serde_json::Value;
use strum_macros::{Display, EnumIter};

/// Classification of everything that can go wrong while talking to the
/// remote data provider. Each kind carries a default severity and a default
/// retryability; both can be overridden at the failure site.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Display, EnumIter)]
pub enum ErrorKind {
    Network,
    RemoteApi,
    Validation,
    ChainData,
    RateLimit,
    Timeout,
    Configuration,
    Internal,
    Unknown,
}

impl ErrorKind {
    pub fn default_severity(&self) -> Severity {
        match self {
            ErrorKind::Network | ErrorKind::Timeout | ErrorKind::RateLimit => Severity::Medium,
            ErrorKind::RemoteApi | ErrorKind::ChainData | ErrorKind::Unknown => Severity::Medium,
            ErrorKind::Validation => Severity::Low,
            ErrorKind::Configuration => Severity::High,
            ErrorKind::Internal => Severity::Critical,
        }
    }

    /// Validation and configuration failures are deterministic; repeating
    /// them can never succeed.
    pub fn default_retryable(&self) -> bool {
        match self {
            ErrorKind::Network | ErrorKind::Timeout | ErrorKind::RateLimit => true,
            ErrorKind::Validation | ErrorKind::Configuration => false,
            ErrorKind::RemoteApi
            | ErrorKind::ChainData
            | ErrorKind::Internal
            | ErrorKind::Unknown => false,
        }
    }
}

#[derive(Debug, Clone, Copy, PartialEq, Eq, PartialOrd, Ord, Display)]
pub enum Severity {
    Low,
    Medium,
    High,
    Critical,
}

/// A failure that has been classified for the recovery pipeline. Created at
/// the failure site and passed through by value; only `retry_count` changes
/// after creation, incremented once per retry attempt.
#[derive(Debug, Clone)]
pub struct ClassifiedError {
    pub kind: ErrorKind,
    pub severity: Severity,
    pub recoverable: bool,
    pub retryable: bool,
    pub retry_count: usize,
    pub max_retries: usize,
    pub message: String,
    pub context: BTreeMap<String, Value>,
}

impl ClassifiedError {
    pub fn new(kind: ErrorKind, message: impl ToString) -> Self {
        Self {
            kind,
            severity: kind.default_severity(),
            recoverable: true,
            retryable: kind.default_retryable(),
            retry_count: 0,
            max_retries: 0,
            message: message.to_string(),
            context: BTreeMap::new(),
        }
    }

    pub fn severity(mut self, severity: Severity) -> Self {
        self.severity = severity;
        self
    }

    pub fn recoverable(mut self, recoverable: bool) -> Self {
        self.recoverable = recoverable;
        self
    }

    pub fn retryable(mut self, retryable: bool) -> Self {
        self.retryable = retryable;
        self
    }

    pub fn max_retries(mut self, max_retries: usize) -> Self {
        self.max_retries = max_retries;
        self
    }

    pub fn context(mut self, key: impl ToString, value: Value) -> Self {
        self.context.insert(key.to_string(), value);
        self
    }

    pub fn record_attempt(&mut self) {
        self.retry_count += 1;
    }

    pub fn can_retry(&self) -> bool {
        self.retryable && self.retry_count < self.max_retries
    }
}

impl std::fmt::Display for ClassifiedError {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        write!(f, "[{}/{}] {}", self.kind, self.severity, self.message)
    }
}

/// Typed failures of the invocation core. `Retryable` wraps any transient
/// error so the retry executor can recognize it with a downcast.
#[derive(Debug, thiserror::Error)]
pub enum Error {
    #[error("Failed with a retryable error: {0}")]
    Retryable(#[source] anyhow::Error),

    #[error("Rate limit exceeded, retry after {}ms", retry_after.as_millis())]
    RateLimitExceeded { retry_after: Duration },

    #[error("Circuit open for {kind} errors, retry after {}ms", retry_after.as_millis())]
    CircuitOpen {
        kind: ErrorKind,
        retry_after: Duration,
    },

    #[error("Authentication with the remote service failed: {0}")]
    Auth(String),

    #[error("Remote tool or resource not found: {0}")]
    NotFound(String),

    #[error("Upstream returned status code {0}")]
    InvalidStatusCode(u16),

    #[error("Response body is neither a JSON object nor an SSE stream: {0}")]
    ProtocolFormat(String),

    #[error("Request timed out after {}ms", .0.as_millis())]
    Timeout(Duration),

    #[error("Operation was cancelled")]
    Cancelled,

    #[error("Critical failure, shutting down: {0}")]
    Critical(String),

    #[error("Invalid configuration: {0}")]
    Configuration(String),
}

impl Error {
    /// Maps each typed failure onto the taxonomy used by the recovery
    /// framework.
    pub fn kind(&self) -> ErrorKind {
        match self {
            Error::Retryable(_) => ErrorKind::Network,
            Error::RateLimitExceeded { .. } => ErrorKind::RateLimit,
            Error::CircuitOpen { kind, .. } => *kind,
            Error::Auth(_) | Error::NotFound(_) => ErrorKind::RemoteApi,
            Error::InvalidStatusCode(_) | Error::ProtocolFormat(_) => ErrorKind::RemoteApi,
            Error::Timeout(_) => ErrorKind::Timeout,
            Error::Cancelled | Error::Critical(_) => ErrorKind::Internal,
            Error::Configuration(_) => ErrorKind::Configuration,
        }
    }
}

#[cfg(test)]
mod tests {
    use pretty_assertions::assert_eq;
    use strum::IntoEnumIterator;

    use super::*;

    #[test]
    fn test_validation_and_configuration_are_never_retryable() {
        assert!(!ErrorKind::Validation.default_retryable());
        assert!(!ErrorKind::Configuration.default_retryable());
    }

    #[test]
    fn test_transient_kinds_are_retryable_by_default() {
        assert!(ErrorKind::Network.default_retryable());
        assert!(ErrorKind::Timeout.default_retryable());
        assert!(ErrorKind::RateLimit.default_retryable());
    }

    #[test]
    fn test_every_kind_has_a_severity() {
        // Exercises the whole taxonomy so a new kind cannot be added
        // without a severity mapping.
        for kind in ErrorKind::iter() {
            let _ = kind.default_severity();
        }
    }

    #[test]
    fn test_classified_error_retry_budget() {
        let mut fixture =
            ClassifiedError::new(ErrorKind::Network, "connection reset").max_retries(2usize);

        assert!(fixture.can_retry());
        fixture.record_attempt();
        fixture.record_attempt();
        assert!(!fixture.can_retry());
        assert_eq!(fixture.retry_count, 2);
    }

    #[test]
    fn test_classified_error_defaults_follow_kind() {
        let actual = ClassifiedError::new(ErrorKind::Validation, "bad symbol");
        assert_eq!(actual.severity, Severity::Low);
        assert_eq!(actual.retryable, false);
    }

    #[test]
    fn test_error_kind_mapping() {
        let fixture = Error::RateLimitExceeded { retry_after: Duration::from_millis(250) };
        assert_eq!(fixture.kind(), ErrorKind::RateLimit);

        let fixture = Error::Timeout(Duration::from_secs(30));
        assert_eq!(fixture.kind(), ErrorKind::Timeout);
    }

    #[test]
    fn test_severity_ordering() {
        assert!(Severity::Critical > Severity::High);
        assert!(Severity::High > Severity::Medium);
        assert!(Severity::Medium > Severity::Low);
    }
}
