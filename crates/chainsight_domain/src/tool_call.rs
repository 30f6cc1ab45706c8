use derive_setters::Setters;
use serde::{Deserialize, Serialize};
use serde_json::Value;

pub type Arguments = serde_json::Map<String, Value>;

/// Error payload returned by the remote service inside an otherwise valid
/// JSON-RPC reply.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct RemoteError {
    pub code: i64,
    pub message: String,
}

impl std::fmt::Display for RemoteError {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        write!(f, "remote error {}: {}", self.code, self.message)
    }
}

/// Decoded reply to a tool invocation. Exactly one of `result` or `error`
/// is present; the decoder rejects replies that violate this.
#[derive(Debug, Clone, PartialEq)]
pub struct ToolResponse {
    pub request_id: u64,
    pub result: Option<Value>,
    pub error: Option<RemoteError>,
}

impl ToolResponse {
    pub fn success(request_id: u64, result: Value) -> Self {
        Self { request_id, result: Some(result), error: None }
    }

    pub fn failure(request_id: u64, error: RemoteError) -> Self {
        Self { request_id, result: None, error: Some(error) }
    }

    pub fn is_success(&self) -> bool {
        self.result.is_some()
    }
}

/// Caller-facing outcome of an invocation. Retries, rate limiting and
/// circuit state never show up here; only the final result and whether it
/// was served from cache.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize, Setters)]
#[setters(into, strip_option)]
pub struct ToolOutcome {
    pub success: bool,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub data: Option<Value>,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub error: Option<String>,
    pub cached: bool,
}

impl ToolOutcome {
    pub fn ok(data: Value) -> Self {
        Self { success: true, data: Some(data), error: None, cached: false }
    }

    pub fn err(message: impl ToString) -> Self {
        Self {
            success: false,
            data: None,
            error: Some(message.to_string()),
            cached: false,
        }
    }
}

#[cfg(test)]
mod tests {
    use pretty_assertions::assert_eq;
    use serde_json::json;

    use super::*;

    #[test]
    fn test_outcome_ok_is_not_cached_by_default() {
        let actual = ToolOutcome::ok(json!({"price": 42}));
        let expected = ToolOutcome {
            success: true,
            data: Some(json!({"price": 42})),
            error: None,
            cached: false,
        };
        assert_eq!(actual, expected);
    }

    #[test]
    fn test_outcome_serialization_skips_absent_fields() {
        let fixture = ToolOutcome::err("upstream offline");
        let actual = serde_json::to_value(&fixture).unwrap();
        let expected = json!({
            "success": false,
            "error": "upstream offline",
            "cached": false
        });
        assert_eq!(actual, expected);
    }

    #[test]
    fn test_response_success_holds_result_only() {
        let fixture = ToolResponse::success(7, json!({"ok": true}));
        assert!(fixture.is_success());
        assert_eq!(fixture.error, None);
    }
}
