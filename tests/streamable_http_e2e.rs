//! Streamable HTTP transport over a real socket: direct replies, batches, live streams and
//! resumption with Last-Event-ID

use reqwest::StatusCode;
use serde_json::json;

use cms_e2e_shared::{McpTestClient, TestServer, content_server, init_tracing};

async fn start() -> (TestServer, McpTestClient) {
    init_tracing();
    let server = TestServer::start(content_server())
        .await
        .expect("failed to bind test server");
    let client = McpTestClient::new(server.base_url());
    (server, client)
}

#[tokio::test]
async fn test_initialize_then_unknown_method() {
    let (_server, mut client) = start().await;

    let init = client.initialize().await.unwrap();
    assert_eq!(init["id"], 1);
    assert_eq!(init["result"]["protocolVersion"], "2025-06-18");
    assert_eq!(init["result"]["serverInfo"]["name"], "cms-e2e");
    assert!(client.session_id().is_some());

    let reply = client.request(2, "unknownTool", json!({})).await.unwrap();
    assert_eq!(reply["id"], 2);
    assert_eq!(reply["error"]["code"], -32601);
    assert_eq!(reply["error"]["message"], "Method not found");
    assert_eq!(reply["error"]["data"]["method"], "unknownTool");
}

#[tokio::test]
async fn test_tool_results_and_failures() {
    let (_server, mut client) = start().await;
    client.initialize().await.unwrap();

    let listed = client.request(2, "tools/list", json!({})).await.unwrap();
    let names: Vec<&str> = listed["result"]["tools"]
        .as_array()
        .unwrap()
        .iter()
        .filter_map(|t| t["name"].as_str())
        .collect();
    assert_eq!(names, vec!["create_entry", "get_entry", "publish_entry"]);

    let found = client.call_tool(3, "get_entry", json!({"id": 1})).await.unwrap();
    assert!(found["result"].get("isError").is_none());
    assert_eq!(found["result"]["structuredContent"]["title"], "Welcome");

    // domain failures inside tools/call are results, not protocol errors
    let missing = client.call_tool(4, "get_entry", json!({"id": 99})).await.unwrap();
    assert_eq!(missing["result"]["isError"], true);

    // the same failure through the tool's own method keeps its error code
    let direct = client.request(5, "get_entry", json!({"id": 99})).await.unwrap();
    assert_eq!(direct["error"]["code"], -32004);
    assert_eq!(direct["error"]["data"]["kind"], "Entry");
    assert_eq!(direct["error"]["data"]["id"], "99");

    let invalid = client.call_tool(6, "get_entry", json!({"id": "one"})).await.unwrap();
    assert_eq!(invalid["error"]["code"], -32602);
    assert_eq!(invalid["error"]["data"]["details"], "id: expected integer");
}

#[tokio::test]
async fn test_batch_replies_in_request_order() {
    let (_server, mut client) = start().await;
    client.initialize().await.unwrap();

    let response = client
        .post(&json!([
            {"jsonrpc": "2.0", "id": "c", "method": "create_entry", "params": {"title": "Batch"}},
            {"jsonrpc": "2.0", "method": "notifications/initialized"},
            {"jsonrpc": "2.0", "id": "a", "method": "ping"},
            {"jsonrpc": "2.0", "id": "b", "method": "get_entry", "params": {"id": 1}}
        ]))
        .await
        .unwrap();
    assert_eq!(response.status(), StatusCode::OK);

    let replies: serde_json::Value = response.json().await.unwrap();
    let ids: Vec<&str> = replies
        .as_array()
        .unwrap()
        .iter()
        .filter_map(|r| r["id"].as_str())
        .collect();
    assert_eq!(ids, vec!["c", "a", "b"]);
    assert_eq!(replies[0]["result"]["title"], "Batch");
    assert_eq!(replies[2]["result"]["title"], "Welcome");
}

#[tokio::test]
async fn test_parse_error_has_null_id() {
    let (server, client) = start().await;

    let response = reqwest::Client::new()
        .post(server.url("/mcp"))
        .header("Content-Type", "application/json")
        .body("{\"jsonrpc\": \"2.0\", \"id\": 1,")
        .send()
        .await
        .unwrap();
    assert_eq!(response.status(), StatusCode::OK);
    let body: serde_json::Value = response.json().await.unwrap();
    assert_eq!(body["error"]["code"], -32700);
    assert!(body["id"].is_null());
    assert!(client.session_id().is_none());
}

#[tokio::test]
async fn test_request_without_session_is_rejected() {
    let (_server, client) = start().await;

    let response = client
        .post(&json!({"jsonrpc": "2.0", "id": 7, "method": "tools/list"}))
        .await
        .unwrap();
    assert_eq!(response.status(), StatusCode::BAD_REQUEST);
    let body: serde_json::Value = response.json().await.unwrap();
    assert_eq!(body["id"], 7);
    assert_eq!(body["error"]["code"], -32600);
}

#[tokio::test]
async fn test_progress_precedes_reply_on_stream() {
    let (_server, mut client) = start().await;
    client.initialize().await.unwrap();
    let mut events = client.open_stream(None).await.unwrap();

    let response = client
        .post(&json!({
            "jsonrpc": "2.0",
            "id": 9,
            "method": "tools/call",
            "params": {
                "name": "publish_entry",
                "arguments": {"id": 1, "_meta": {"progressToken": "pub-1"}}
            }
        }))
        .await
        .unwrap();
    // with a live stream the reply travels there instead
    assert_eq!(response.status(), StatusCode::ACCEPTED);

    let first = events.next_event().await.unwrap();
    assert_eq!(first.id, Some(1));
    let first = first.json().unwrap();
    assert_eq!(first["method"], "notifications/progress");
    assert_eq!(first["params"]["progressToken"], "pub-1");
    assert_eq!(first["params"]["progress"], 1.0);

    let second = events.next_json().await.unwrap();
    assert_eq!(second["params"]["progress"], 2.0);

    let reply = events.next_event().await.unwrap();
    assert_eq!(reply.id, Some(3));
    let reply = reply.json().unwrap();
    assert_eq!(reply["id"], 9);
    assert_eq!(reply["result"]["structuredContent"]["published"], 1);
}

#[tokio::test]
async fn test_resume_after_last_event_id() {
    let (_server, mut client) = start().await;
    client.initialize().await.unwrap();

    let mut events = client.open_stream(None).await.unwrap();
    for n in 1..=3 {
        let status = client
            .post(&json!({"jsonrpc": "2.0", "id": n, "method": "ping"}))
            .await
            .unwrap()
            .status();
        assert_eq!(status, StatusCode::ACCEPTED);
    }
    for expected in 1..=3u64 {
        assert_eq!(events.next_event().await.unwrap().id, Some(expected));
    }
    drop(events);

    let mut resumed = client.open_stream(Some(1)).await.unwrap();
    let replayed = resumed.next_event().await.unwrap();
    assert_eq!(replayed.id, Some(2));
    assert_eq!(replayed.json().unwrap()["id"], 2);
    let replayed = resumed.next_event().await.unwrap();
    assert_eq!(replayed.id, Some(3));

    // new events continue the same sequence
    client
        .post(&json!({"jsonrpc": "2.0", "id": 4, "method": "ping"}))
        .await
        .unwrap();
    assert_eq!(resumed.next_event().await.unwrap().id, Some(4));
}

#[tokio::test]
async fn test_split_endpoints() {
    let (server, mut client) = start().await;
    client.initialize().await.unwrap();
    let session_id = client.session_id().unwrap().to_string();
    let http = reqwest::Client::new();

    let reply: serde_json::Value = http
        .post(server.url("/message"))
        .header("Content-Type", "application/json")
        .header("Mcp-Session-Id", &session_id)
        .body(json!({"jsonrpc": "2.0", "id": 2, "method": "ping"}).to_string())
        .send()
        .await
        .unwrap()
        .json()
        .await
        .unwrap();
    assert_eq!(reply["result"], json!({}));

    let listen = http
        .get(format!("{}?sessionId={}", server.url("/listen"), session_id))
        .header("Accept", "text/event-stream")
        .send()
        .await
        .unwrap();
    assert_eq!(listen.status(), StatusCode::OK);
    drop(listen);

    let status = http
        .delete(format!("{}?sessionId={}", server.url("/disconnect"), session_id))
        .send()
        .await
        .unwrap()
        .status();
    assert_eq!(status, StatusCode::OK);
    assert!(server.server().registry().resolve(&session_id).await.is_err());
}
