use chainsight_domain::Error;

use crate::response::JsonRpcReply;

/// Outcome of trying one decoding strategy against a response body.
enum Decoded {
    Parsed(JsonRpcReply),
    NotRecognized,
}

/// Decodes a response body that may be either a single JSON object or a
/// sequence of SSE `data:` frames wrapping the same payload. Strategies are
/// tried in sequence; the first one that recognizes the body wins.
pub fn decode_reply(body: &str) -> Result<JsonRpcReply, Error> {
    for strategy in [try_plain_json, try_event_stream] {
        if let Decoded::Parsed(reply) = strategy(body) {
            return Ok(reply);
        }
    }

    let preview: String = body.chars().take(120).collect();
    Err(Error::ProtocolFormat(preview))
}

fn try_plain_json(body: &str) -> Decoded {
    match serde_json::from_str::<JsonRpcReply>(body) {
        Ok(reply) if reply.is_recognizable() => Decoded::Parsed(reply),
        _ => Decoded::NotRecognized,
    }
}

/// Scans newline-delimited event blocks in order and returns the first
/// block whose `data:` payload parses as a JSON-RPC reply.
fn try_event_stream(body: &str) -> Decoded {
    for block in body.split("\n\n") {
        let data = block
            .lines()
            .filter_map(|line| line.strip_prefix("data:"))
            .map(str::trim_start)
            .collect::<Vec<_>>()
            .join("\n");

        if data.is_empty() || data == "[DONE]" {
            continue;
        }

        if let Ok(reply) = serde_json::from_str::<JsonRpcReply>(&data) {
            if reply.is_recognizable() {
                return Decoded::Parsed(reply);
            }
        }
    }

    Decoded::NotRecognized
}

#[cfg(test)]
mod tests {
    use pretty_assertions::assert_eq;
    use serde_json::json;

    use super::*;

    #[test]
    fn test_decode_plain_json() {
        let fixture = r#"{"jsonrpc":"2.0","id":1,"result":{"price":42}}"#;
        let actual = decode_reply(fixture).unwrap();
        assert_eq!(actual.result, Some(json!({"price": 42})));
    }

    #[test]
    fn test_decode_single_sse_frame() {
        let fixture = "event: message\ndata: {\"jsonrpc\":\"2.0\",\"id\":1,\"result\":{\"price\":42}}\n\n";
        let actual = decode_reply(fixture).unwrap();
        assert_eq!(actual.result, Some(json!({"price": 42})));
    }

    #[test]
    fn test_decode_returns_first_parsable_block() {
        // First block is noise, second carries the payload
        let fixture = concat!(
            "data: not-json\n\n",
            "data: {\"jsonrpc\":\"2.0\",\"id\":2,\"result\":{\"ok\":true}}\n\n",
            "data: {\"jsonrpc\":\"2.0\",\"id\":3,\"result\":{\"ok\":false}}\n\n",
        );
        let actual = decode_reply(fixture).unwrap();
        assert_eq!(actual.result, Some(json!({"ok": true})));
    }

    #[test]
    fn test_decode_multiline_data_block() {
        let fixture = "data: {\"jsonrpc\":\"2.0\",\ndata: \"id\":1,\"result\":{}}\n\n";
        let actual = decode_reply(fixture).unwrap();
        assert_eq!(actual.result, Some(json!({})));
    }

    #[test]
    fn test_decode_skips_done_markers() {
        let fixture = "data: [DONE]\n\ndata: {\"jsonrpc\":\"2.0\",\"id\":1,\"result\":{\"v\":1}}\n\n";
        let actual = decode_reply(fixture).unwrap();
        assert_eq!(actual.result, Some(json!({"v": 1})));
    }

    #[test]
    fn test_decode_error_payload_in_sse() {
        let fixture =
            "data: {\"jsonrpc\":\"2.0\",\"id\":1,\"error\":{\"code\":-1,\"message\":\"bad\"}}\n\n";
        let actual = decode_reply(fixture).unwrap();
        assert!(actual.error.is_some());
    }

    #[test]
    fn test_decode_unrecognizable_body_fails() {
        let fixture = "<html>502 Bad Gateway</html>";
        let actual = decode_reply(fixture);
        assert!(matches!(actual, Err(Error::ProtocolFormat(_))));
    }

    #[test]
    fn test_decode_json_without_result_or_error_fails() {
        // Valid JSON, but not a recognizable RPC reply
        let fixture = r#"{"status":"ok"}"#;
        let actual = decode_reply(fixture);
        assert!(matches!(actual, Err(Error::ProtocolFormat(_))));
    }
}
