//! End-to-end stdio sessions against the built-in sample data.

use std::collections::HashMap;
use std::sync::Arc;
use std::time::Duration;

use serde_json::Value;
use tokio::io::AsyncReadExt;

use pricecatcher_mcp::config::RateLimitConfig;
use pricecatcher_mcp::mcp::{McpServer, StdioTransport};
use pricecatcher_mcp::pricing::SampleProvider;
use pricecatcher_mcp::ratelimit::RateLimiter;
use pricecatcher_mcp::tools::{ToolExecutor, ToolRegistry};

async fn run_session(input: &str) -> Vec<Value> {
    run_session_bytes(input.as_bytes()).await
}

async fn run_session_bytes(input: &[u8]) -> Vec<Value> {
    let executor = ToolExecutor::new(
        Arc::new(SampleProvider::new()),
        Arc::new(RateLimiter::new(RateLimitConfig::default())),
        Duration::from_secs(1),
    );
    let server = Arc::new(McpServer::new(ToolRegistry::builtin(), executor));

    let reader = tokio_test::io::Builder::new().read(input).build();
    let (mut client, writer) = tokio::io::duplex(64 * 1024);

    StdioTransport::new(reader, writer)
        .run(server, std::future::pending())
        .await
        .unwrap();

    let mut output = String::new();
    client.read_to_string(&mut output).await.unwrap();
    output
        .lines()
        .map(|line| serde_json::from_str(line).unwrap())
        .collect()
}

fn by_id(replies: Vec<Value>) -> HashMap<String, Value> {
    replies
        .into_iter()
        .map(|reply| (reply["id"].to_string(), reply))
        .collect()
}

#[tokio::test]
async fn test_typical_session() {
    let input = concat!(
        r#"{"jsonrpc":"2.0","id":1,"method":"initialize","params":{"protocolVersion":"2024-11-05","capabilities":{},"clientInfo":{"name":"test","version":"0.1"}}}"#,
        "\n",
        r#"{"jsonrpc":"2.0","method":"notifications/initialized"}"#,
        "\n",
        r#"{"jsonrpc":"2.0","id":2,"method":"tools/list"}"#,
        "\n",
        r#"{"jsonrpc":"2.0","id":3,"method":"tools/call","params":{"name":"get_malaysian_prices","arguments":{"query":"cheapest ayam in johor"}}}"#,
        "\n",
    );

    let replies = by_id(run_session(input).await);
    assert_eq!(replies.len(), 3, "the notification must not be answered");

    assert!(replies["1"]["result"]["protocolVersion"].is_string());
    assert_eq!(replies["2"]["result"]["tools"].as_array().unwrap().len(), 4);

    let text = replies["3"]["result"]["content"][0]["text"].as_str().unwrap();
    assert!(text.contains("location: johor"), "{text}");
    assert!(text.contains("- Records: 2"), "{text}");
    assert!(text.contains("- Lowest: RM9.20"), "{text}");
}

#[tokio::test]
async fn test_garbage_line_does_not_end_session() {
    let input = concat!(
        "this is not json\n",
        r#"{"jsonrpc":"2.0","id":"after","method":"ping"}"#,
        "\n",
    );

    let replies = run_session(input).await;
    assert_eq!(replies.len(), 2);

    let parse_error = replies
        .iter()
        .find(|r| r["id"].is_null())
        .expect("parse error reply");
    assert_eq!(parse_error["error"]["code"], -32700);

    let pong = replies.iter().find(|r| r["id"] == "after").expect("ping reply");
    assert!(pong["result"].is_object());
}

#[tokio::test]
async fn test_non_utf8_line_does_not_end_session() {
    let mut input = vec![0xff, 0xfe, b'\n'];
    input.extend_from_slice(br#"{"jsonrpc":"2.0","id":"after","method":"ping"}"#);
    input.push(b'\n');

    let replies = run_session_bytes(&input).await;
    assert_eq!(replies.len(), 2);

    let parse_error = replies
        .iter()
        .find(|r| r["id"].is_null())
        .expect("parse error reply");
    assert_eq!(parse_error["error"]["code"], -32700);
    assert!(replies.iter().any(|r| r["id"] == "after"));
}

#[tokio::test]
async fn test_no_results_guidance() {
    let input = concat!(
        r#"{"jsonrpc":"2.0","id":1,"method":"tools/call","params":{"name":"get_malaysian_prices","arguments":{"item":"durian"}}}"#,
        "\n",
    );

    let replies = run_session(input).await;
    let text = replies[0]["result"]["content"][0]["text"].as_str().unwrap();
    assert!(text.contains("No prices found"));
    assert!(text.contains("chicken (ayam)"));
}
