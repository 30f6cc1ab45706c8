use chainsight_domain::{Arguments, ToolName};
use serde::Serialize;

pub const JSONRPC_VERSION: &str = "2.0";
pub const METHOD_TOOLS_CALL: &str = "tools/call";

/// JSON-RPC 2.0 envelope for a tool invocation.
#[derive(Debug, Clone, Serialize)]
pub struct JsonRpcRequest {
    pub jsonrpc: &'static str,
    pub id: u64,
    pub method: &'static str,
    pub params: CallParams,
}

#[derive(Debug, Clone, Serialize)]
pub struct CallParams {
    pub name: ToolName,
    pub arguments: Arguments,
}

impl JsonRpcRequest {
    pub fn call(id: u64, name: ToolName, arguments: Arguments) -> Self {
        Self {
            jsonrpc: JSONRPC_VERSION,
            id,
            method: METHOD_TOOLS_CALL,
            params: CallParams { name, arguments },
        }
    }
}
