//! MCP Tool Traits
//!
//! [`McpTool`] is the object-safe form the registry stores. Most tools implement [`TypedTool`]
//! instead and are registered through [`TypedToolAdapter`], which validates and decodes the
//! arguments before `execute` runs.

use std::marker::PhantomData;

use async_trait::async_trait;
use serde_json::Value;
use tracing::{debug, warn};

use cms_mcp_json_rpc_server::{JsonRpcNotification, SessionContext};
use cms_mcp_protocol::{
    LoggingLevel, LoggingMessageNotification, McpResult, ProgressNotification, Tool,
};

use crate::params::{ToolParams, decode_params};

/// What a running tool knows about the call it serves
#[derive(Clone)]
pub struct ToolContext {
    session: SessionContext,
    tool_name: String,
    progress_token: Option<Value>,
}

impl ToolContext {
    pub fn new(session: SessionContext, tool_name: impl Into<String>) -> Self {
        Self {
            session,
            tool_name: tool_name.into(),
            progress_token: None,
        }
    }

    /// Token from the caller's `_meta.progressToken`
    pub fn with_progress_token(mut self, token: Option<Value>) -> Self {
        self.progress_token = token;
        self
    }

    pub fn session_id(&self) -> &str {
        &self.session.session_id
    }

    pub fn tool_name(&self) -> &str {
        &self.tool_name
    }

    pub fn progress_token(&self) -> Option<&Value> {
        self.progress_token.as_ref()
    }

    pub fn session(&self) -> &SessionContext {
        &self.session
    }

    /// Emit `notifications/progress`. Without a progress token from the caller nothing is sent.
    pub async fn notify_progress(&self, progress: f64, total: Option<f64>, message: Option<&str>) {
        let Some(token) = self.progress_token.clone() else {
            debug!(
                "Tool {} reported progress without a progress token",
                self.tool_name
            );
            return;
        };
        let mut notification = ProgressNotification::new(token, progress);
        if let Some(total) = total {
            notification = notification.with_total(total);
        }
        if let Some(message) = message {
            notification = notification.with_message(message);
        }
        self.send(notification.into()).await;
    }

    /// Emit `notifications/message` with this tool as the logger
    pub async fn log(&self, level: LoggingLevel, data: impl Into<Value>) {
        let notification = LoggingMessageNotification::new(level, data).with_logger(&self.tool_name);
        self.send(notification.into()).await;
    }

    async fn send(&self, notification: JsonRpcNotification) {
        if let Err(err) = self.session.notify(notification).await {
            // the session went away mid-call; the tool still completes
            warn!(
                "Tool {} could not notify session {}: {}",
                self.tool_name,
                self.session_id(),
                err
            );
        }
    }
}

/// Object-safe tool interface stored in the [`crate::ToolRegistry`]
#[async_trait]
pub trait McpTool: Send + Sync {
    fn name(&self) -> &str;

    fn title(&self) -> Option<&str> {
        None
    }

    fn description(&self) -> Option<&str>;

    /// JSON Schema of the arguments object
    fn input_schema(&self) -> Value;

    /// Run with raw arguments. Domain failures are returned as [`cms_mcp_protocol::McpError`].
    async fn call(&self, args: Option<Value>, ctx: ToolContext) -> McpResult<Value>;

    /// Descriptor advertised by `tools/list`
    fn to_descriptor(&self) -> Tool {
        Tool {
            name: self.name().to_string(),
            title: self.title().map(str::to_string),
            description: self.description().map(str::to_string),
            input_schema: self.input_schema(),
        }
    }
}

/// A tool with a typed parameter struct
#[async_trait]
pub trait TypedTool: Send + Sync + 'static {
    type Params: ToolParams;

    fn name(&self) -> &str;

    fn title(&self) -> Option<&str> {
        None
    }

    fn description(&self) -> &str;

    async fn execute(&self, params: Self::Params, ctx: &ToolContext) -> McpResult<Value>;
}

/// Presents a [`TypedTool`] as an [`McpTool`]
pub struct TypedToolAdapter<T: TypedTool> {
    tool: T,
    _params: PhantomData<fn() -> T::Params>,
}

impl<T: TypedTool> TypedToolAdapter<T> {
    pub fn new(tool: T) -> Self {
        Self {
            tool,
            _params: PhantomData,
        }
    }

    pub fn inner(&self) -> &T {
        &self.tool
    }
}

#[async_trait]
impl<T: TypedTool> McpTool for TypedToolAdapter<T> {
    fn name(&self) -> &str {
        self.tool.name()
    }

    fn title(&self) -> Option<&str> {
        self.tool.title()
    }

    fn description(&self) -> Option<&str> {
        Some(self.tool.description())
    }

    fn input_schema(&self) -> Value {
        T::Params::schema().to_json_schema()
    }

    async fn call(&self, args: Option<Value>, ctx: ToolContext) -> McpResult<Value> {
        let params = decode_params::<T::Params>(args)?;
        self.tool.execute(params, &ctx).await
    }
}
