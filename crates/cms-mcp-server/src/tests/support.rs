//! A small content tool set and request helpers

use std::time::Duration;

use async_trait::async_trait;
use bytes::Bytes;
use http_body_util::{BodyExt, Full};
use hyper::header::{ACCEPT, CONTENT_TYPE};
use hyper::{Method, Request, Response};
use serde::Deserialize;
use serde_json::{Value, json};

use cms_http_mcp_server::McpBody;

use crate::{
    FieldSchema, LoggingLevel, McpError, McpResult, McpServer, NoParams, ParamSchema,
    ToolContext, ToolParams, TypedTool,
};

const SESSION_HEADER: &str = "Mcp-Session-Id";

#[derive(Deserialize)]
pub struct GetEntryParams {
    pub id: i64,
}

impl ToolParams for GetEntryParams {
    fn schema() -> ParamSchema {
        ParamSchema::new().field(
            FieldSchema::integer("id")
                .required()
                .minimum(1)
                .description("Entry id"),
        )
    }
}

/// Entry 1 exists, everything else is not found
pub struct GetEntry;

#[async_trait]
impl TypedTool for GetEntry {
    type Params = GetEntryParams;

    fn name(&self) -> &str {
        "get_entry"
    }

    fn description(&self) -> &str {
        "Fetch an entry by id"
    }

    async fn execute(&self, params: GetEntryParams, _ctx: &ToolContext) -> McpResult<Value> {
        match params.id {
            1 => Ok(json!({"id": 1, "title": "Welcome"})),
            id => Err(McpError::not_found("Entry", id)),
        }
    }
}

/// Reports progress and a log line before answering
pub struct PublishDraft;

#[async_trait]
impl TypedTool for PublishDraft {
    type Params = GetEntryParams;

    fn name(&self) -> &str {
        "publish_draft"
    }

    fn description(&self) -> &str {
        "Publish a draft"
    }

    async fn execute(&self, params: GetEntryParams, ctx: &ToolContext) -> McpResult<Value> {
        ctx.notify_progress(1.0, Some(2.0), Some("validating")).await;
        ctx.log(LoggingLevel::Info, json!({"publishing": params.id})).await;
        ctx.notify_progress(2.0, Some(2.0), Some("published")).await;
        Ok(json!({"published": params.id}))
    }
}

pub struct Explode;

#[async_trait]
impl TypedTool for Explode {
    type Params = NoParams;

    fn name(&self) -> &str {
        "explode"
    }

    fn description(&self) -> &str {
        "Always panics"
    }

    async fn execute(&self, _params: NoParams, _ctx: &ToolContext) -> McpResult<Value> {
        panic!("index out of bounds in formatter");
    }
}

pub fn test_server() -> McpServer {
    McpServer::builder()
        .name("cms-test")
        .version("0.0.1")
        .typed_tool(GetEntry)
        .typed_tool(PublishDraft)
        .typed_tool(Explode)
        .build()
        .unwrap()
}

pub fn rpc(id: i64, method: &str, params: Value) -> Value {
    json!({"jsonrpc": "2.0", "id": id, "method": method, "params": params})
}

pub fn initialize(id: i64) -> Value {
    rpc(
        id,
        "initialize",
        json!({
            "protocolVersion": "2025-06-18",
            "capabilities": {},
            "clientInfo": {"name": "agent", "version": "0.1"}
        }),
    )
}

pub async fn post(server: &McpServer, session_id: Option<&str>, body: &Value) -> Response<McpBody> {
    let mut builder = Request::builder()
        .method(Method::POST)
        .uri("/mcp")
        .header(CONTENT_TYPE, "application/json");
    if let Some(id) = session_id {
        builder = builder.header(SESSION_HEADER, id);
    }
    let request = builder
        .body(Full::new(Bytes::from(body.to_string())))
        .unwrap();
    server.http().handler().handle(request).await
}

pub async fn open_stream(server: &McpServer, session_id: &str) -> McpBody {
    let request = Request::builder()
        .method(Method::GET)
        .uri("/mcp")
        .header(ACCEPT, "text/event-stream")
        .header(SESSION_HEADER, session_id)
        .body(Full::new(Bytes::new()))
        .unwrap();
    let response = server.http().handler().handle(request).await;
    assert_eq!(response.status(), 200);
    response.into_body()
}

pub fn session_id(response: &Response<McpBody>) -> String {
    response
        .headers()
        .get(SESSION_HEADER)
        .and_then(|v| v.to_str().ok())
        .expect("missing Mcp-Session-Id")
        .to_string()
}

pub async fn body_json(response: Response<McpBody>) -> Value {
    let bytes = response.into_body().collect().await.unwrap().to_bytes();
    serde_json::from_slice(&bytes).unwrap()
}

/// Initialize and return the session id
pub async fn handshake(server: &McpServer) -> String {
    let response = post(server, None, &initialize(1)).await;
    assert_eq!(response.status(), 200);
    session_id(&response)
}

/// `data:` payload of the next SSE frame
pub async fn next_event(body: &mut McpBody) -> Value {
    let frame = tokio::time::timeout(Duration::from_secs(2), body.frame())
        .await
        .expect("timed out waiting for an event")
        .expect("stream ended")
        .unwrap();
    let bytes = frame.into_data().unwrap_or_default();
    let text = String::from_utf8(bytes.to_vec()).unwrap();
    let data = text
        .lines()
        .find_map(|l| l.strip_prefix("data: "))
        .expect("frame has no data line");
    serde_json::from_str(data).unwrap()
}
