//! MCP Server
//!
//! Owns the tool registry and the HTTP server that carries both transports.

use std::sync::Arc;

use tokio::net::TcpListener;
use tracing::info;

use cms_http_mcp_server::{HttpMcpServer, ServerStats};
use cms_mcp_protocol::Implementation;
use cms_mcp_session_storage::SessionRegistry;

use crate::builder::McpServerBuilder;
use crate::registry::ToolRegistry;
use crate::Result;

/// Main MCP server
#[derive(Clone)]
pub struct McpServer {
    implementation: Implementation,
    tools: Arc<ToolRegistry>,
    http: HttpMcpServer,
}

impl McpServer {
    pub(crate) fn new(
        implementation: Implementation,
        tools: Arc<ToolRegistry>,
        http: HttpMcpServer,
    ) -> Self {
        Self {
            implementation,
            tools,
            http,
        }
    }

    pub fn builder() -> McpServerBuilder {
        McpServerBuilder::new()
    }

    pub fn implementation(&self) -> &Implementation {
        &self.implementation
    }

    pub fn tools(&self) -> &ToolRegistry {
        &self.tools
    }

    pub fn http(&self) -> &HttpMcpServer {
        &self.http
    }

    pub fn registry(&self) -> Arc<SessionRegistry> {
        self.http.registry()
    }

    /// Bind the configured address and serve
    pub async fn run(&self) -> Result<()> {
        self.log_startup();
        self.http.run().await?;
        Ok(())
    }

    /// Serve on an already bound listener
    pub async fn serve(&self, listener: TcpListener) -> Result<()> {
        self.log_startup();
        self.http.serve(listener).await?;
        Ok(())
    }

    pub async fn stats(&self) -> ServerStats {
        self.http.stats().await
    }

    fn log_startup(&self) {
        info!(
            "Starting MCP server: {} v{} with {} tools",
            self.implementation.name,
            self.implementation.version,
            self.tools.len()
        );
    }
}
