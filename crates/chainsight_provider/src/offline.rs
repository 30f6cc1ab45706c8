use chainsight_domain::{Arguments, ToolName, ToolResponse};
use serde_json::json;

/// Deterministic local substitute used when the client runs in offline
/// mode. The result is a pure function of the request so repeated calls
/// (and their cache entries) stay stable.
pub fn respond(request_id: u64, name: &ToolName, arguments: &Arguments) -> ToolResponse {
    ToolResponse::success(
        request_id,
        json!({
            "offline": true,
            "tool": name.as_str(),
            "arguments": arguments,
        }),
    )
}
