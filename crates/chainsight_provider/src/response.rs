use chainsight_domain::{Error, RemoteError, ToolResponse};
use serde::Deserialize;
use serde_json::Value;

/// Raw JSON-RPC reply as found on the wire, before the exactly-one-of
/// invariant between `result` and `error` has been checked.
#[derive(Debug, Clone, Deserialize)]
pub struct JsonRpcReply {
    #[serde(default)]
    pub id: Option<Value>,
    #[serde(default)]
    pub result: Option<Value>,
    #[serde(default)]
    pub error: Option<RemoteError>,
}

impl JsonRpcReply {
    /// True when the payload carries either a result or an error; used by
    /// the decoder to tell an RPC reply apart from arbitrary JSON.
    pub fn is_recognizable(&self) -> bool {
        self.result.is_some() || self.error.is_some()
    }

    pub fn into_response(self, request_id: u64) -> Result<ToolResponse, Error> {
        match (self.result, self.error) {
            (Some(result), None) => Ok(ToolResponse::success(request_id, result)),
            (None, Some(error)) => Ok(ToolResponse::failure(request_id, error)),
            (Some(_), Some(_)) => Err(Error::ProtocolFormat(
                "reply carries both a result and an error".to_string(),
            )),
            (None, None) => Err(Error::ProtocolFormat(
                "reply carries neither a result nor an error".to_string(),
            )),
        }
    }
}
