//! Integration tests for the responder dispatch loop.
//!
//! These tests feed raw JSON-RPC streams to the mock and proxy responders and
//! check the responses they write, including error codes and lifecycle
//! handling.

use serde_json::{json, Value};

use mcp_bridge::error::ServerError;
use mcp_bridge::mcp::connection::Connection;
use mcp_bridge::mcp::log::ProtocolLog;
use mcp_bridge::mcp::mock::MockResponder;
use mcp_bridge::mcp::model::{Prompt, Resource, Tool};
use mcp_bridge::mcp::protocol::{RequestId, Response, METHOD_NOT_FOUND, SERVER_ERROR};
use mcp_bridge::mcp::proxy::{ProxyResponder, ProxyToolSpec};
use mcp_bridge::mcp::server::{Handler, McpServer, ServerState};

fn mock() -> MockResponder {
    let mut mock = MockResponder::new();
    mock.add_tool(Tool::new("hello", "Says hello")).unwrap();
    mock.add_prompt(Prompt::new(
        "review",
        "Code review prompt",
        "Review {{file}} for {{ concern }}, focusing on {{file}}",
    ))
    .unwrap();
    mock.add_resource(Resource::new("docs://guide", "Guide", "Be nice."))
        .unwrap();
    mock
}

/// Runs `input` through a server and returns the decoded responses.
async fn exchange<H: Handler>(handler: H, input: &str) -> Vec<Response> {
    let mut server = McpServer::new(handler, ProtocolLog::disabled());
    let mut connection = Connection::new(input.as_bytes(), Vec::new());
    server.serve(&mut connection).await.unwrap();
    assert_eq!(server.state(), ServerState::ShuttingDown);

    let (_, output) = connection.into_parts();
    String::from_utf8(output)
        .unwrap()
        .lines()
        .map(|line| serde_json::from_str(line).unwrap())
        .collect()
}

fn lines(messages: &[Value]) -> String {
    messages
        .iter()
        .map(|m| format!("{m}\n"))
        .collect::<String>()
}

fn result(response: &Response) -> &Value {
    response.result.as_ref().expect("success response")
}

fn error_code(response: &Response) -> i64 {
    response.error.as_ref().expect("error response").code
}

// =============================================================================
// Lifecycle Tests
// =============================================================================

#[tokio::test]
async fn test_full_session_with_mock() {
    let input = lines(&[
        json!({"jsonrpc": "2.0", "id": 1, "method": "initialize", "params": {
            "protocolVersion": "2024-11-05",
            "capabilities": {},
            "clientInfo": {"name": "test-client", "version": "1.0.0"}
        }}),
        json!({"jsonrpc": "2.0", "method": "notifications/initialized"}),
        json!({"jsonrpc": "2.0", "id": 2, "method": "tools/list"}),
        json!({"jsonrpc": "2.0", "id": 3, "method": "tools/call",
               "params": {"name": "hello", "arguments": {}}}),
    ]);

    let responses = exchange(mock(), &input).await;
    assert_eq!(responses.len(), 3);

    let init = result(&responses[0]);
    assert_eq!(init["protocolVersion"], "2024-11-05");
    assert_eq!(
        init["capabilities"],
        json!({"tools": {}, "prompts": {}, "resources": {}})
    );
    assert!(init["serverInfo"]["name"].as_str().unwrap().contains("mock"));

    assert_eq!(result(&responses[1])["tools"][0]["name"], "hello");
    assert_eq!(
        result(&responses[2])["content"][0]["text"],
        "hello i am hello mock tool and i confirm it's working"
    );
}

#[tokio::test]
async fn test_empty_registry_advertises_no_capabilities() {
    let input = lines(&[json!({"jsonrpc": "2.0", "id": 1, "method": "initialize"})]);
    let responses = exchange(MockResponder::new(), &input).await;
    assert_eq!(result(&responses[0])["capabilities"], json!({}));
}

#[tokio::test]
async fn test_concatenated_and_split_messages() {
    // Two objects on one line, one object across two lines
    let input = concat!(
        r#"{"jsonrpc":"2.0","id":1,"method":"ping"}{"jsonrpc":"2.0","id":2,"method":"ping"}"#,
        "\n{\"jsonrpc\":\"2.0\",\n\"id\":3,\"method\":\"ping\"}\n",
    );
    let responses = exchange(mock(), input).await;
    let ids: Vec<_> = responses.iter().map(|r| r.id.clone()).collect();
    assert_eq!(
        ids,
        vec![
            Some(RequestId::Number(1)),
            Some(RequestId::Number(2)),
            Some(RequestId::Number(3))
        ]
    );
}

#[tokio::test]
async fn test_string_ids_are_echoed() {
    let input = lines(&[json!({"jsonrpc": "2.0", "id": "req-7", "method": "ping"})]);
    let responses = exchange(mock(), &input).await;
    assert_eq!(responses[0].id, Some(RequestId::String("req-7".to_string())));
}

#[tokio::test]
async fn test_invalid_json_stops_the_loop() {
    let mut server = McpServer::new(mock(), ProtocolLog::disabled());
    let input = "{\"jsonrpc\":\"2.0\",\"id\":1,\"method\":\"ping\"}\n{\"broken\": }\n";
    let mut connection = Connection::new(input.as_bytes(), Vec::new());
    let err = server.serve(&mut connection).await.unwrap_err();
    assert!(matches!(err, ServerError::Decode(_)));
}

// =============================================================================
// Error Response Tests
// =============================================================================

#[tokio::test]
async fn test_each_request_gets_exactly_one_outcome() {
    let input = lines(&[
        json!({"jsonrpc": "2.0", "id": 1, "method": "unknown/method"}),
        json!({"jsonrpc": "2.0", "id": 2, "method": "tools/call", "params": {"name": "nope"}}),
        json!({"jsonrpc": "2.0", "id": 3, "method": "tools/call", "params": {}}),
        json!({"jsonrpc": "2.0", "id": 4, "method": "resources/read", "params": {"uri": "docs://nope"}}),
        json!({"jsonrpc": "2.0", "id": 5, "method": "prompts/get", "params": {"name": "nope"}}),
        json!({"jsonrpc": "2.0", "id": 6, "method": "resources/read", "params": {"uri": "docs://guide"}}),
    ]);

    let responses = exchange(mock(), &input).await;
    assert_eq!(responses.len(), 6);
    for response in &responses {
        assert!(response.result.is_some() != response.error.is_some());
    }

    assert_eq!(error_code(&responses[0]), METHOD_NOT_FOUND);
    for response in &responses[1..5] {
        assert_eq!(error_code(response), SERVER_ERROR);
    }
    assert_eq!(
        result(&responses[5])["contents"][0]["text"],
        "Be nice."
    );
}

#[tokio::test]
async fn test_notifications_are_never_answered() {
    let input = lines(&[
        json!({"jsonrpc": "2.0", "method": "notifications/initialized"}),
        json!({"jsonrpc": "2.0", "method": "unknown/notification"}),
        json!({"jsonrpc": "2.0", "id": 9, "method": "ping"}),
    ]);
    let responses = exchange(mock(), &input).await;
    assert_eq!(responses.len(), 1);
    assert_eq!(responses[0].id, Some(RequestId::Number(9)));
}

// =============================================================================
// Prompt Tests
// =============================================================================

#[tokio::test]
async fn test_prompt_listing_and_rendering() {
    let input = lines(&[
        json!({"jsonrpc": "2.0", "id": 1, "method": "prompts/list"}),
        json!({"jsonrpc": "2.0", "id": 2, "method": "prompts/get", "params": {
            "name": "review",
            "arguments": {"file": "main.rs", "concern": "safety"}
        }}),
    ]);
    let responses = exchange(mock(), &input).await;

    assert_eq!(
        result(&responses[0])["prompts"][0]["arguments"],
        json!([
            {"name": "file", "required": true},
            {"name": "concern", "required": true}
        ])
    );
    assert_eq!(
        result(&responses[1])["messages"][0]["content"]["text"],
        "Review main.rs for safety, focusing on main.rs"
    );
}

// =============================================================================
// Proxy Tests
// =============================================================================

#[cfg(unix)]
#[tokio::test]
async fn test_proxy_tool_call_through_dispatch() {
    let mut proxy = ProxyResponder::new();
    proxy
        .register(ProxyToolSpec {
            name: "shout".to_string(),
            description: "Upper-cases text".to_string(),
            parameters: "text:string".to_string(),
            script: None,
            command: Some("printf '%s' \"$text\" | tr a-z A-Z".to_string()),
        })
        .unwrap();

    let input = lines(&[
        json!({"jsonrpc": "2.0", "id": 1, "method": "tools/call",
               "params": {"name": "shout", "arguments": {"text": "quiet please"}}}),
        json!({"jsonrpc": "2.0", "id": 2, "method": "tools/call",
               "params": {"name": "shout", "arguments": {}}}),
        json!({"jsonrpc": "2.0", "id": 3, "method": "prompts/list"}),
    ]);
    let responses = exchange(proxy, &input).await;

    assert_eq!(
        result(&responses[0])["content"][0]["text"],
        "QUIET PLEASE"
    );
    assert_eq!(error_code(&responses[1]), SERVER_ERROR);
    assert_eq!(result(&responses[2]), &json!({"prompts": []}));
}
