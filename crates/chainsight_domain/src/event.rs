use std::time::Duration;

use tracing::{debug, error, warn};

use crate::ErrorKind;

/// Observability events emitted by the invocation core. The core never
/// persists or displays these; collaborators subscribe through an
/// [`EventSink`].
#[derive(Debug, Clone, PartialEq)]
pub enum ClientEvent {
    RequestAllowed {
        key: String,
    },
    RateLimitExceeded {
        key: String,
        retry_after: Duration,
    },
    CacheHit {
        key: String,
    },
    RetryAttempted {
        attempt: usize,
        delay: Duration,
        error: String,
    },
    CircuitOpened {
        kind: ErrorKind,
    },
    CircuitClosed {
        kind: ErrorKind,
    },
    UnrecoverableError {
        kind: ErrorKind,
        message: String,
    },
    CriticalError {
        kind: ErrorKind,
        message: String,
    },
    ShutdownInitiated {
        grace: Duration,
    },
}

pub trait EventSink: Send + Sync {
    fn emit(&self, event: ClientEvent);
}

/// Default sink that forwards every event to `tracing` at a level matching
/// its weight.
#[derive(Debug, Default, Clone)]
pub struct TracingSink;

impl EventSink for TracingSink {
    fn emit(&self, event: ClientEvent) {
        match &event {
            ClientEvent::RequestAllowed { key } => debug!(key = %key, "Request allowed"),
            ClientEvent::CacheHit { key } => debug!(key = %key, "Cache hit"),
            ClientEvent::RateLimitExceeded { key, retry_after } => {
                warn!(key = %key, retry_after_ms = %retry_after.as_millis(), "Rate limit exceeded")
            }
            ClientEvent::RetryAttempted { attempt, delay, error } => {
                warn!(attempt = %attempt, delay_ms = %delay.as_millis(), error = %error, "Retrying")
            }
            ClientEvent::CircuitOpened { kind } => warn!(kind = %kind, "Circuit opened"),
            ClientEvent::CircuitClosed { kind } => debug!(kind = %kind, "Circuit closed"),
            ClientEvent::UnrecoverableError { kind, message } => {
                error!(kind = %kind, message = %message, "Unrecoverable error")
            }
            ClientEvent::CriticalError { kind, message } => {
                error!(kind = %kind, message = %message, "Critical error")
            }
            ClientEvent::ShutdownInitiated { grace } => {
                error!(grace_ms = %grace.as_millis(), "Shutdown initiated")
            }
        }
    }
}

#[cfg(test)]
mod tests {
    use std::sync::{Arc, Mutex};

    use pretty_assertions::assert_eq;

    use super::*;

    /// Sink that records events for assertions.
    #[derive(Default, Clone)]
    pub struct RecordingSink {
        events: Arc<Mutex<Vec<ClientEvent>>>,
    }

    impl EventSink for RecordingSink {
        fn emit(&self, event: ClientEvent) {
            self.events.lock().unwrap().push(event);
        }
    }

    #[test]
    fn test_recording_sink_preserves_order() {
        let fixture = RecordingSink::default();
        fixture.emit(ClientEvent::RequestAllowed { key: "global".to_string() });
        fixture.emit(ClientEvent::CacheHit { key: "global".to_string() });

        let actual = fixture.events.lock().unwrap().clone();
        let expected = vec![
            ClientEvent::RequestAllowed { key: "global".to_string() },
            ClientEvent::CacheHit { key: "global".to_string() },
        ];
        assert_eq!(actual, expected);
    }
}
