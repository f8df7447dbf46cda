//! JSON-RPC handlers for the handshake, liveness and the tool surface

use std::sync::Arc;

use async_trait::async_trait;
use serde_json::{Map, Value, json};
use tracing::{debug, error, info, warn};

use cms_mcp_json_rpc_server::{JsonRpcHandler, RequestParams, SessionContext};
use cms_mcp_protocol::notifications::methods as notification_methods;
use cms_mcp_protocol::{
    CallToolRequest, CallToolResult, Implementation, InitializeRequest, InitializeResult,
    ListToolsResult, McpError, McpResult, McpVersion, ServerCapabilities, methods,
};
use cms_mcp_session_storage::{NegotiatedProtocol, SessionRegistry};

use crate::registry::ToolRegistry;
use crate::tool::ToolContext;

fn require_context(session_context: Option<SessionContext>) -> McpResult<SessionContext> {
    session_context.ok_or_else(|| McpError::internal("request dispatched without a session"))
}

/// Split MCP's `_meta` out of tool arguments, returning the progress token it carries
fn split_meta(args: Option<Value>) -> (Option<Value>, Option<Value>) {
    match args {
        Some(Value::Object(mut object)) => {
            let token = object
                .remove("_meta")
                .and_then(|meta| meta.get("progressToken").cloned());
            (Some(Value::Object(object)), token)
        }
        other => (other, None),
    }
}

/// `initialize`: negotiate the protocol version and activate the session
pub struct InitializeHandler {
    registry: Arc<SessionRegistry>,
    server_info: Implementation,
    capabilities: ServerCapabilities,
    instructions: Option<String>,
}

impl InitializeHandler {
    pub fn new(registry: Arc<SessionRegistry>, server_info: Implementation) -> Self {
        Self {
            registry,
            server_info,
            capabilities: ServerCapabilities::tools_and_logging(),
            instructions: None,
        }
    }

    pub fn with_instructions(mut self, instructions: Option<String>) -> Self {
        self.instructions = instructions;
        self
    }
}

#[async_trait]
impl JsonRpcHandler for InitializeHandler {
    type Error = McpError;

    async fn handle(
        &self,
        _method: &str,
        params: Option<RequestParams>,
        session_context: Option<SessionContext>,
    ) -> McpResult<Value> {
        let ctx = require_context(session_context)?;
        let params = params
            .ok_or_else(|| McpError::InvalidParameters("(params): is required".to_string()))?;
        let request: InitializeRequest = serde_json::from_value(params.into_value())
            .map_err(|e| McpError::InvalidParameters(format!("(params): {}", e)))?;

        let version = McpVersion::negotiate(&request.protocol_version).inspect_err(|e| {
            warn!("Session {}: {}", ctx.session_id, e);
        })?;
        debug!(
            "Session {}: client {} {} requested {}, negotiated {}",
            ctx.session_id,
            request.client_info.name,
            request.client_info.version,
            request.protocol_version,
            version
        );

        self.registry
            .activate(
                &ctx.session_id,
                NegotiatedProtocol {
                    protocol_version: version,
                    client_info: request.client_info,
                    client_capabilities: request.capabilities,
                },
            )
            .await
            .map_err(|_| McpError::SessionNotFound(ctx.session_id.clone()))?;

        let mut result =
            InitializeResult::new(version, self.capabilities.clone(), self.server_info.clone());
        if let Some(instructions) = &self.instructions {
            result = result.with_instructions(instructions.clone());
        }
        Ok(serde_json::to_value(result)?)
    }

    fn supported_methods(&self) -> Vec<String> {
        vec![methods::INITIALIZE.to_string()]
    }
}

/// `ping`: `{}` on any session that is not closed
pub struct PingHandler;

#[async_trait]
impl JsonRpcHandler for PingHandler {
    type Error = McpError;

    async fn handle(
        &self,
        _method: &str,
        _params: Option<RequestParams>,
        _session_context: Option<SessionContext>,
    ) -> McpResult<Value> {
        Ok(Value::Object(Map::new()))
    }

    fn supported_methods(&self) -> Vec<String> {
        vec![methods::PING.to_string()]
    }
}

/// `tools/list`
pub struct ToolsListHandler {
    tools: Arc<ToolRegistry>,
}

impl ToolsListHandler {
    pub fn new(tools: Arc<ToolRegistry>) -> Self {
        Self { tools }
    }
}

#[async_trait]
impl JsonRpcHandler for ToolsListHandler {
    type Error = McpError;

    async fn handle(
        &self,
        _method: &str,
        _params: Option<RequestParams>,
        _session_context: Option<SessionContext>,
    ) -> McpResult<Value> {
        let result = ListToolsResult {
            tools: self.tools.descriptors(),
            next_cursor: None,
        };
        Ok(serde_json::to_value(result)?)
    }

    fn supported_methods(&self) -> Vec<String> {
        vec![methods::TOOLS_LIST.to_string()]
    }
}

/// `tools/call`. Domain failures come back as a result with `isError`; argument and internal
/// failures stay JSON-RPC errors.
pub struct ToolsCallHandler {
    tools: Arc<ToolRegistry>,
}

impl ToolsCallHandler {
    pub fn new(tools: Arc<ToolRegistry>) -> Self {
        Self { tools }
    }
}

#[async_trait]
impl JsonRpcHandler for ToolsCallHandler {
    type Error = McpError;

    async fn handle(
        &self,
        _method: &str,
        params: Option<RequestParams>,
        session_context: Option<SessionContext>,
    ) -> McpResult<Value> {
        let ctx = require_context(session_context)?;
        let params = params
            .ok_or_else(|| McpError::InvalidParameters("name: is required".to_string()))?;
        let request: CallToolRequest = serde_json::from_value(params.into_value())
            .map_err(|e| McpError::InvalidParameters(format!("(params): {}", e)))?;

        let tool = self
            .tools
            .get(&request.name)
            .ok_or_else(|| McpError::ToolNotFound(request.name.clone()))?;

        let (args, progress_token) = split_meta(request.arguments);
        let tool_ctx = ToolContext::new(ctx, &request.name).with_progress_token(progress_token);

        match tool.call(args, tool_ctx).await {
            Ok(payload) => Ok(serde_json::to_value(CallToolResult::success(payload))?),
            Err(e) if e.is_tool_failure() => {
                info!("Tool {} reported failure: {}", request.name, e);
                Ok(serde_json::to_value(CallToolResult::error(e.to_string()))?)
            }
            Err(e) => Err(e),
        }
    }

    fn supported_methods(&self) -> Vec<String> {
        vec![methods::TOOLS_CALL.to_string()]
    }
}

/// Every tool also answers under its own name; the result is the raw payload and every failure
/// is a JSON-RPC error
pub struct DirectToolHandler {
    tools: Arc<ToolRegistry>,
}

impl DirectToolHandler {
    pub fn new(tools: Arc<ToolRegistry>) -> Self {
        Self { tools }
    }
}

#[async_trait]
impl JsonRpcHandler for DirectToolHandler {
    type Error = McpError;

    async fn handle(
        &self,
        method: &str,
        params: Option<RequestParams>,
        session_context: Option<SessionContext>,
    ) -> McpResult<Value> {
        let ctx = require_context(session_context)?;
        let tool = self
            .tools
            .get(method)
            .ok_or_else(|| McpError::ToolNotFound(method.to_string()))?;

        let (args, progress_token) = split_meta(params.map(RequestParams::into_value));
        let tool_ctx = ToolContext::new(ctx, method).with_progress_token(progress_token);

        tool.call(args, tool_ctx).await.inspect_err(|e| {
            if matches!(e, McpError::Internal(_)) {
                error!("Tool {} failed: {}", method, e);
            }
        })
    }

    fn supported_methods(&self) -> Vec<String> {
        self.tools.names()
    }
}

/// Client notifications: accepted and logged
pub struct ClientNotificationHandler;

#[async_trait]
impl JsonRpcHandler for ClientNotificationHandler {
    type Error = McpError;

    async fn handle(
        &self,
        method: &str,
        _params: Option<RequestParams>,
        _session_context: Option<SessionContext>,
    ) -> McpResult<Value> {
        // sent with an id, so it was not a notification
        Err(McpError::ToolNotFound(method.to_string()))
    }

    async fn handle_notification(
        &self,
        method: &str,
        params: Option<RequestParams>,
        session_context: Option<SessionContext>,
    ) -> McpResult<()> {
        let session_id = session_context
            .map(|ctx| ctx.session_id)
            .unwrap_or_default();
        match method {
            notification_methods::INITIALIZED => {
                info!("Session {}: client reported initialized", session_id);
            }
            notification_methods::CANCELLED => {
                let params = params.map(RequestParams::into_value).unwrap_or(json!({}));
                // tool executions are never interrupted; the reply is still produced
                info!(
                    "Session {}: client cancelled request {} ({})",
                    session_id,
                    params["requestId"],
                    params["reason"].as_str().unwrap_or("no reason")
                );
            }
            other => debug!("Session {}: notification {}", session_id, other),
        }
        Ok(())
    }

    fn supported_methods(&self) -> Vec<String> {
        vec![
            notification_methods::INITIALIZED.to_string(),
            notification_methods::CANCELLED.to_string(),
        ]
    }
}
