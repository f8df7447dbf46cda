//! # CMS MCP Server
//!
//! Builds an MCP server from an explicit tool registry. Tools declare typed parameters whose
//! schema both validates incoming arguments and renders the advertised `inputSchema`.
//!
//! ```rust,no_run
//! use async_trait::async_trait;
//! use cms_mcp_server::{
//!     FieldSchema, McpResult, McpServer, ParamSchema, ToolContext, ToolParams, TypedTool,
//! };
//! use serde::Deserialize;
//! use serde_json::{Value, json};
//!
//! #[derive(Deserialize)]
//! struct GetEntryParams {
//!     id: i64,
//! }
//!
//! impl ToolParams for GetEntryParams {
//!     fn schema() -> ParamSchema {
//!         ParamSchema::new().field(FieldSchema::integer("id").required().minimum(1))
//!     }
//! }
//!
//! struct GetEntry;
//!
//! #[async_trait]
//! impl TypedTool for GetEntry {
//!     type Params = GetEntryParams;
//!
//!     fn name(&self) -> &str { "get_entry" }
//!     fn description(&self) -> &str { "Fetch one entry" }
//!
//!     async fn execute(&self, params: GetEntryParams, _ctx: &ToolContext) -> McpResult<Value> {
//!         Ok(json!({ "id": params.id }))
//!     }
//! }
//!
//! #[tokio::main]
//! async fn main() -> Result<(), Box<dyn std::error::Error>> {
//!     let server = McpServer::builder()
//!         .name("cms")
//!         .version("1.0.0")
//!         .typed_tool(GetEntry)
//!         .build()?;
//!     server.run().await?;
//!     Ok(())
//! }
//! ```

pub mod builder;
pub mod handlers;
pub mod lifecycle;
pub mod params;
pub mod registry;
pub mod server;
pub mod tool;

#[cfg(test)]
mod tests;

pub use handlers::{
    ClientNotificationHandler, DirectToolHandler, InitializeHandler, PingHandler,
    ToolsCallHandler, ToolsListHandler,
};
pub use lifecycle::LifecycleGuard;
pub use params::{FieldKind, FieldSchema, NoParams, ParamSchema, ToolParams, Violation, decode_params};
pub use registry::ToolRegistry;
pub use builder::McpServerBuilder;
pub use server::McpServer;
pub use tool::{McpTool, ToolContext, TypedTool, TypedToolAdapter};

pub use cms_http_mcp_server::{ServerConfig, StreamConfig};
pub use cms_mcp_protocol::{LoggingLevel, McpError, McpResult, McpVersion};
pub use cms_mcp_session_storage::SessionConfig;

/// Result type for framework operations
pub type Result<T> = std::result::Result<T, McpFrameworkError>;

/// Framework-level errors
#[derive(Debug, thiserror::Error)]
pub enum McpFrameworkError {
    #[error("MCP protocol error: {0}")]
    Mcp(#[from] McpError),

    #[error("HTTP transport error: {0}")]
    Http(#[from] cms_http_mcp_server::HttpMcpError),
}
