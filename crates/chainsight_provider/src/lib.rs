mod client;
mod decode;
mod offline;
mod request;
mod response;

pub use client::ProtocolClient;
pub use request::{JsonRpcRequest, METHOD_TOOLS_CALL};
pub use response::JsonRpcReply;
