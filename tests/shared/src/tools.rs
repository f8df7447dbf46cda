//! A small in-memory tool set that exercises results, domain failures and notifications

use std::collections::BTreeMap;
use std::sync::Arc;
use std::time::Duration;

use async_trait::async_trait;
use serde::Deserialize;
use serde_json::{Value, json};
use tokio::sync::Mutex;

use cms_mcp_server::{
    FieldSchema, LoggingLevel, McpError, McpResult, McpServer, ParamSchema, SessionConfig,
    StreamConfig, ToolContext, ToolParams, TypedTool,
};

type Entries = Arc<Mutex<BTreeMap<i64, String>>>;

#[derive(Deserialize)]
pub struct IdParams {
    id: i64,
}

impl ToolParams for IdParams {
    fn schema() -> ParamSchema {
        ParamSchema::new().field(FieldSchema::integer("id").required().minimum(1))
    }
}

#[derive(Deserialize)]
pub struct TitleParams {
    title: String,
}

impl ToolParams for TitleParams {
    fn schema() -> ParamSchema {
        ParamSchema::new().field(FieldSchema::string("title").required().min_length(1))
    }
}

struct GetEntry(Entries);

#[async_trait]
impl TypedTool for GetEntry {
    type Params = IdParams;

    fn name(&self) -> &str {
        "get_entry"
    }

    fn description(&self) -> &str {
        "Fetch an entry title by id"
    }

    async fn execute(&self, params: IdParams, _ctx: &ToolContext) -> McpResult<Value> {
        let entries = self.0.lock().await;
        entries
            .get(&params.id)
            .map(|title| json!({"id": params.id, "title": title}))
            .ok_or_else(|| McpError::not_found("Entry", params.id))
    }
}

struct CreateEntry(Entries);

#[async_trait]
impl TypedTool for CreateEntry {
    type Params = TitleParams;

    fn name(&self) -> &str {
        "create_entry"
    }

    fn description(&self) -> &str {
        "Create an entry"
    }

    async fn execute(&self, params: TitleParams, ctx: &ToolContext) -> McpResult<Value> {
        let mut entries = self.0.lock().await;
        if entries.values().any(|t| *t == params.title) {
            return Err(McpError::validation(format!(
                "An entry titled '{}' already exists",
                params.title
            )));
        }
        let id = entries.keys().next_back().copied().unwrap_or(0) + 1;
        entries.insert(id, params.title.clone());
        drop(entries);

        ctx.log(LoggingLevel::Info, json!({"created": id})).await;
        Ok(json!({"id": id, "title": params.title}))
    }
}

/// Reports two progress steps, pausing between them
struct PublishEntry(Entries);

#[async_trait]
impl TypedTool for PublishEntry {
    type Params = IdParams;

    fn name(&self) -> &str {
        "publish_entry"
    }

    fn description(&self) -> &str {
        "Publish an entry"
    }

    async fn execute(&self, params: IdParams, ctx: &ToolContext) -> McpResult<Value> {
        if !self.0.lock().await.contains_key(&params.id) {
            return Err(McpError::not_found("Entry", params.id));
        }
        ctx.notify_progress(1.0, Some(2.0), Some("validating")).await;
        tokio::time::sleep(Duration::from_millis(20)).await;
        ctx.notify_progress(2.0, Some(2.0), Some("published")).await;
        Ok(json!({"published": params.id, "session": ctx.session_id()}))
    }
}

/// Server with entry 1 "Welcome" and a long keepalive so streams carry only real events
pub fn content_server() -> McpServer {
    let entries: Entries = Arc::new(Mutex::new(BTreeMap::from([(1, "Welcome".to_string())])));
    McpServer::builder()
        .name("cms-e2e")
        .version("1.0.0")
        .typed_tool(GetEntry(Arc::clone(&entries)))
        .typed_tool(CreateEntry(Arc::clone(&entries)))
        .typed_tool(PublishEntry(entries))
        .session_config(SessionConfig {
            max_buffered_events: 16,
            ..SessionConfig::default()
        })
        .stream_config(StreamConfig {
            keepalive_interval: Duration::from_secs(300),
            ..StreamConfig::default()
        })
        .build()
        .expect("test tool set is valid")
}
