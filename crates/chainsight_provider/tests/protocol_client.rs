use chainsight_domain::{Arguments, Environment, Error, ToolName};
use chainsight_provider::ProtocolClient;
use pretty_assertions::assert_eq;
use serde_json::json;
use url::Url;

async fn setup() -> (ProtocolClient, mockito::ServerGuard) {
    let server = mockito::Server::new_async().await;
    let env = Environment::new(Url::parse(&server.url()).unwrap());
    let client = ProtocolClient::new(&env).unwrap();
    (client, server)
}

fn price_arguments() -> Arguments {
    let mut arguments = Arguments::new();
    arguments.insert("symbol".to_string(), json!("BTC"));
    arguments
}

#[tokio::test]
async fn test_invoke_decodes_plain_json_reply() {
    let (client, mut server) = setup().await;

    let mock = server
        .mock("POST", "/")
        .with_status(200)
        .with_header("content-type", "application/json")
        .with_body(r#"{"jsonrpc":"2.0","id":1,"result":{"price":42}}"#)
        .create_async()
        .await;

    let actual = client
        .invoke(&ToolName::new("price_lookup"), price_arguments())
        .await
        .unwrap();

    mock.assert_async().await;
    assert!(actual.is_success());
    assert_eq!(actual.result, Some(json!({"price": 42})));
}

#[tokio::test]
async fn test_invoke_decodes_sse_framed_reply() {
    let (client, mut server) = setup().await;

    server
        .mock("POST", "/")
        .with_status(200)
        .with_header("content-type", "text/event-stream")
        .with_body("event: message\ndata: {\"jsonrpc\":\"2.0\",\"id\":1,\"result\":{\"price\":42}}\n\n")
        .create_async()
        .await;

    let actual = client
        .invoke(&ToolName::new("price_lookup"), price_arguments())
        .await
        .unwrap();

    assert_eq!(actual.result, Some(json!({"price": 42})));
}

#[tokio::test]
async fn test_invoke_surfaces_remote_error_payload() {
    let (client, mut server) = setup().await;

    server
        .mock("POST", "/")
        .with_status(200)
        .with_body(r#"{"jsonrpc":"2.0","id":1,"error":{"code":-32001,"message":"unknown symbol"}}"#)
        .create_async()
        .await;

    let actual = client
        .invoke(&ToolName::new("price_lookup"), price_arguments())
        .await
        .unwrap();

    assert!(!actual.is_success());
    let error = actual.error.unwrap();
    assert_eq!(error.code, -32001);
    assert_eq!(error.message, "unknown symbol");
}

#[tokio::test]
async fn test_invoke_rejects_unparsable_body() {
    let (client, mut server) = setup().await;

    server
        .mock("POST", "/")
        .with_status(200)
        .with_body("<html>ok</html>")
        .create_async()
        .await;

    let actual = client
        .invoke(&ToolName::new("price_lookup"), price_arguments())
        .await;

    let error = actual.unwrap_err();
    assert!(matches!(
        error.downcast_ref::<Error>(),
        Some(Error::ProtocolFormat(_))
    ));
}

#[tokio::test]
async fn test_invoke_401_is_terminal() {
    let (client, mut server) = setup().await;

    server
        .mock("POST", "/")
        .with_status(401)
        .with_body("invalid key")
        .create_async()
        .await;

    let actual = client
        .invoke(&ToolName::new("price_lookup"), price_arguments())
        .await;

    let error = actual.unwrap_err();
    assert!(matches!(error.downcast_ref::<Error>(), Some(Error::Auth(_))));
}

#[tokio::test]
async fn test_invoke_503_is_retryable() {
    let (client, mut server) = setup().await;

    server
        .mock("POST", "/")
        .with_status(503)
        .with_body("overloaded")
        .create_async()
        .await;

    let actual = client
        .invoke(&ToolName::new("price_lookup"), price_arguments())
        .await;

    let error = actual.unwrap_err();
    assert!(matches!(
        error.downcast_ref::<Error>(),
        Some(Error::Retryable(_))
    ));
}

#[tokio::test]
async fn test_invoke_sends_api_key_and_accept_headers() {
    let mut server = mockito::Server::new_async().await;
    let env = Environment::new(Url::parse(&server.url()).unwrap()).api_key("secret-key");
    let client = ProtocolClient::new(&env).unwrap();

    let mock = server
        .mock("POST", "/")
        .match_header("authorization", "Bearer secret-key")
        .match_header("accept", "application/json, text/event-stream")
        .match_header("content-type", "application/json")
        .with_status(200)
        .with_body(r#"{"jsonrpc":"2.0","id":1,"result":{}}"#)
        .create_async()
        .await;

    client
        .invoke(&ToolName::new("price_lookup"), price_arguments())
        .await
        .unwrap();

    mock.assert_async().await;
}

#[tokio::test]
async fn test_offline_mode_never_touches_the_network() {
    let mut server = mockito::Server::new_async().await;
    let env = Environment::new(Url::parse(&server.url()).unwrap()).offline(true);
    let client = ProtocolClient::new(&env).unwrap();

    // No mock registered: any request would fail with 501 from mockito.
    let mock = server.mock("POST", "/").expect(0).create_async().await;

    let actual = client
        .invoke(&ToolName::new("price_lookup"), price_arguments())
        .await
        .unwrap();

    mock.assert_async().await;
    assert!(actual.is_success());
    assert_eq!(
        actual.result.as_ref().and_then(|v| v.get("offline")),
        Some(&json!(true))
    );
}
