//! Shared fixtures: a minimal handshake handler and request builders

use std::sync::Arc;
use std::time::Duration;

use async_trait::async_trait;
use bytes::Bytes;
use http_body_util::{BodyExt, Full};
use hyper::header::{ACCEPT, CONTENT_TYPE};
use hyper::{Method, Request, Response};
use serde_json::{Value, json};

use cms_mcp_json_rpc_server::{JsonRpcHandler, JsonRpcNotification, RequestParams, SessionContext};
use cms_mcp_protocol::{ClientCapabilities, Implementation, McpError, McpVersion};
use cms_mcp_session_storage::{NegotiatedProtocol, SessionRegistry};

use crate::protocol::{LAST_EVENT_ID_HEADER, SESSION_ID_HEADER};
use crate::{HttpMcpServer, McpBody};

/// Answers `initialize`, `echo` and `announce` (which notifies before replying)
pub struct TestHandler {
    registry: Arc<SessionRegistry>,
}

#[async_trait]
impl JsonRpcHandler for TestHandler {
    type Error = McpError;

    async fn handle(
        &self,
        method: &str,
        params: Option<RequestParams>,
        session_context: Option<SessionContext>,
    ) -> Result<Value, McpError> {
        let ctx = session_context.ok_or_else(|| McpError::internal("no session"))?;
        match method {
            "initialize" => {
                let requested = params
                    .as_ref()
                    .and_then(|p| p.get("protocolVersion"))
                    .and_then(Value::as_str)
                    .unwrap_or_default()
                    .to_string();
                let version = McpVersion::negotiate(&requested)?;
                self.registry
                    .activate(
                        &ctx.session_id,
                        NegotiatedProtocol {
                            protocol_version: version,
                            client_info: Implementation::new("test-client", "1.0"),
                            client_capabilities: ClientCapabilities::default(),
                        },
                    )
                    .await
                    .map_err(|_| McpError::SessionNotFound(ctx.session_id.clone()))?;
                Ok(json!({ "protocolVersion": version.as_str() }))
            }
            "echo" => Ok(params.map(RequestParams::into_value).unwrap_or(Value::Null)),
            "announce" => {
                let _ = ctx
                    .notify(JsonRpcNotification::with_value(
                        "notifications/message",
                        json!({ "level": "info", "data": "announced" }),
                    ))
                    .await;
                Ok(json!("done"))
            }
            other => Err(McpError::ToolNotFound(other.to_string())),
        }
    }

    fn supported_methods(&self) -> Vec<String> {
        vec!["initialize".into(), "echo".into(), "announce".into()]
    }
}

pub fn test_server() -> HttpMcpServer {
    let registry = Arc::new(SessionRegistry::default());
    HttpMcpServer::builder_with_registry(Arc::clone(&registry))
        .register_shared(Arc::new(TestHandler { registry }))
        .max_body_size(4096)
        .build()
}

pub fn post(path: &str, session_id: Option<&str>, body: &Value) -> Request<Full<Bytes>> {
    let mut builder = Request::builder()
        .method(Method::POST)
        .uri(path)
        .header(CONTENT_TYPE, "application/json");
    if let Some(id) = session_id {
        builder = builder.header(SESSION_ID_HEADER, id);
    }
    builder
        .body(Full::new(Bytes::from(body.to_string())))
        .unwrap()
}

pub fn get_stream(path: &str, session_id: Option<&str>, last_event_id: Option<u64>) -> Request<Full<Bytes>> {
    let mut builder = Request::builder()
        .method(Method::GET)
        .uri(path)
        .header(ACCEPT, "text/event-stream");
    if let Some(id) = session_id {
        builder = builder.header(SESSION_ID_HEADER, id);
    }
    if let Some(cursor) = last_event_id {
        builder = builder.header(LAST_EVENT_ID_HEADER, cursor.to_string());
    }
    builder.body(Full::new(Bytes::new())).unwrap()
}

pub fn request(method: Method, path: &str, session_id: Option<&str>) -> Request<Full<Bytes>> {
    let mut builder = Request::builder().method(method).uri(path);
    if let Some(id) = session_id {
        builder = builder.header(SESSION_ID_HEADER, id);
    }
    builder.body(Full::new(Bytes::new())).unwrap()
}

pub fn initialize_body(id: i64) -> Value {
    json!({
        "jsonrpc": "2.0",
        "id": id,
        "method": "initialize",
        "params": {
            "protocolVersion": "2025-06-18",
            "capabilities": {},
            "clientInfo": { "name": "test-client", "version": "1.0" }
        }
    })
}

pub fn session_header(response: &Response<McpBody>) -> Option<String> {
    response
        .headers()
        .get(SESSION_ID_HEADER)
        .and_then(|v| v.to_str().ok())
        .map(str::to_string)
}

pub async fn body_json(response: Response<McpBody>) -> Value {
    let bytes = response.into_body().collect().await.unwrap().to_bytes();
    serde_json::from_slice(&bytes).unwrap()
}

pub async fn body_text(response: Response<McpBody>) -> String {
    let bytes = response.into_body().collect().await.unwrap().to_bytes();
    String::from_utf8(bytes.to_vec()).unwrap()
}

/// Initialize a session and return its id
pub async fn initialized_session(server: &HttpMcpServer) -> String {
    let response = server
        .handler()
        .handle(post("/mcp", None, &initialize_body(1)))
        .await;
    session_header(&response).expect("initialize must return a session id")
}

/// Next SSE frame from a streaming body, as text
pub async fn next_frame(body: &mut McpBody) -> String {
    let frame = tokio::time::timeout(Duration::from_secs(2), body.frame())
        .await
        .expect("timed out waiting for an SSE frame")
        .expect("stream ended")
        .unwrap();
    let data = frame.into_data().unwrap_or_default();
    String::from_utf8(data.to_vec()).unwrap()
}

/// The JSON carried on a frame's `data:` line
pub fn frame_data(frame: &str) -> Value {
    let line = frame
        .lines()
        .find_map(|l| l.strip_prefix("data: "))
        .expect("frame has no data line");
    serde_json::from_str(line).unwrap_or_else(|_| Value::String(line.to_string()))
}

pub fn frame_id(frame: &str) -> Option<u64> {
    frame
        .lines()
        .find_map(|l| l.strip_prefix("id: "))
        .and_then(|id| id.parse().ok())
}
