//! MCP Server Builder

use std::net::SocketAddr;
use std::sync::Arc;

use tracing::debug;

use cms_http_mcp_server::{HttpMcpServer, ServerConfig, StreamConfig};
use cms_mcp_protocol::{Implementation, McpError, McpResult, methods};
use cms_mcp_session_storage::{SessionConfig, SessionRegistry};

use crate::handlers::{
    ClientNotificationHandler, DirectToolHandler, InitializeHandler, PingHandler,
    ToolsCallHandler, ToolsListHandler,
};
use crate::lifecycle::LifecycleGuard;
use crate::registry::ToolRegistry;
use crate::server::McpServer;
use crate::tool::{McpTool, TypedTool};

/// Builder for MCP servers
pub struct McpServerBuilder {
    name: String,
    version: String,
    title: Option<String>,
    instructions: Option<String>,
    tools: ToolRegistry,
    /// Registration failures, reported by `build`
    validation_errors: Vec<String>,
    server_config: ServerConfig,
    session_config: SessionConfig,
    stream_config: StreamConfig,
}

impl McpServerBuilder {
    pub fn new() -> Self {
        Self {
            name: "cms-mcp-server".to_string(),
            version: env!("CARGO_PKG_VERSION").to_string(),
            title: None,
            instructions: None,
            tools: ToolRegistry::new(),
            validation_errors: Vec::new(),
            server_config: ServerConfig::default(),
            session_config: SessionConfig::default(),
            stream_config: StreamConfig::default(),
        }
    }

    pub fn name(mut self, name: impl Into<String>) -> Self {
        self.name = name.into();
        self
    }

    pub fn version(mut self, version: impl Into<String>) -> Self {
        self.version = version.into();
        self
    }

    pub fn title(mut self, title: impl Into<String>) -> Self {
        self.title = Some(title.into());
        self
    }

    /// Returned to clients in the `initialize` result
    pub fn instructions(mut self, instructions: impl Into<String>) -> Self {
        self.instructions = Some(instructions.into());
        self
    }

    pub fn tool<T: McpTool + 'static>(mut self, tool: T) -> Self {
        if let Err(e) = self.tools.register(tool) {
            self.validation_errors.push(e.to_string());
        }
        self
    }

    pub fn typed_tool<T: TypedTool>(mut self, tool: T) -> Self {
        if let Err(e) = self.tools.register_typed(tool) {
            self.validation_errors.push(e.to_string());
        }
        self
    }

    pub fn tools<T: McpTool + 'static, I: IntoIterator<Item = T>>(mut self, tools: I) -> Self {
        for tool in tools {
            self = self.tool(tool);
        }
        self
    }

    pub fn server_config(mut self, config: ServerConfig) -> Self {
        self.server_config = config;
        self
    }

    pub fn bind_address(mut self, addr: SocketAddr) -> Self {
        self.server_config.bind_address = addr;
        self
    }

    pub fn mcp_path(mut self, path: impl Into<String>) -> Self {
        self.server_config.mcp_path = path.into();
        self
    }

    pub fn cors(mut self, enable: bool) -> Self {
        self.server_config.enable_cors = enable;
        self
    }

    /// Serve the legacy `GET /sse` + `POST /messages` endpoints
    pub fn sse(mut self, enable: bool) -> Self {
        self.server_config.enable_legacy_sse = enable;
        self
    }

    pub fn max_body_size(mut self, size: usize) -> Self {
        self.server_config.max_body_size = size;
        self
    }

    pub fn session_config(mut self, config: SessionConfig) -> Self {
        self.session_config = config;
        self
    }

    pub fn stream_config(mut self, config: StreamConfig) -> Self {
        self.stream_config = config;
        self
    }

    /// Wire the registry, handlers and lifecycle guard into an HTTP server
    pub fn build(self) -> McpResult<McpServer> {
        if self.name.is_empty() {
            return Err(McpError::ConfigurationError(
                "Server name cannot be empty".to_string(),
            ));
        }
        if self.version.is_empty() {
            return Err(McpError::ConfigurationError(
                "Server version cannot be empty".to_string(),
            ));
        }
        if !self.validation_errors.is_empty() {
            return Err(McpError::ConfigurationError(format!(
                "Tool registration errors:\n{}",
                self.validation_errors.join("\n")
            )));
        }

        let mut implementation = Implementation::new(&self.name, &self.version);
        if let Some(title) = &self.title {
            implementation = implementation.with_title(title);
        }

        let registry = Arc::new(SessionRegistry::new(self.session_config));
        let tools = Arc::new(self.tools);
        debug!("Building server {} with tools {:?}", self.name, tools.names());

        let initialize = InitializeHandler::new(Arc::clone(&registry), implementation.clone())
            .with_instructions(self.instructions);

        let mut http = HttpMcpServer::builder_with_registry(Arc::clone(&registry))
            .config(self.server_config)
            .stream_config(self.stream_config)
            .register_handler(methods::INITIALIZE, initialize)
            .register_handler(methods::PING, PingHandler)
            .register_handler(methods::TOOLS_LIST, ToolsListHandler::new(Arc::clone(&tools)))
            .register_handler(methods::TOOLS_CALL, ToolsCallHandler::new(Arc::clone(&tools)))
            .register_shared(Arc::new(ClientNotificationHandler))
            .middleware(Arc::new(LifecycleGuard::new(Arc::clone(&registry))));
        if !tools.is_empty() {
            http = http.register_shared(Arc::new(DirectToolHandler::new(Arc::clone(&tools))));
        }

        Ok(McpServer::new(implementation, tools, http.build()))
    }
}

impl Default for McpServerBuilder {
    fn default() -> Self {
        Self::new()
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::tool::ToolContext;
    use async_trait::async_trait;
    use serde_json::{Value, json};

    struct Noop(&'static str);

    #[async_trait]
    impl McpTool for Noop {
        fn name(&self) -> &str {
            self.0
        }

        fn description(&self) -> Option<&str> {
            Some("does nothing")
        }

        fn input_schema(&self) -> Value {
            json!({"type": "object", "properties": {}})
        }

        async fn call(&self, _args: Option<Value>, _ctx: ToolContext) -> McpResult<Value> {
            Ok(Value::Null)
        }
    }

    #[test]
    fn test_build_registers_tools() {
        let server = McpServerBuilder::new()
            .name("cms")
            .version("2.0.0")
            .title("CMS")
            .tool(Noop("list_sections"))
            .build()
            .unwrap();

        assert_eq!(server.implementation().name, "cms");
        assert_eq!(server.implementation().title.as_deref(), Some("CMS"));
        assert_eq!(server.tools().names(), vec!["list_sections"]);
    }

    #[test]
    fn test_duplicate_tool_fails_build() {
        let result = McpServerBuilder::new()
            .tools([Noop("get_entry"), Noop("get_entry")])
            .build();
        let Err(McpError::ConfigurationError(message)) = result else {
            panic!("expected a configuration error");
        };
        assert!(message.contains("get_entry"));
    }

    #[test]
    fn test_empty_name_fails_build() {
        assert!(McpServerBuilder::new().name("").build().is_err());
    }

    #[test]
    fn test_http_settings_pass_through() {
        let server = McpServerBuilder::new()
            .mcp_path("/cms/mcp")
            .cors(false)
            .sse(false)
            .max_body_size(512)
            .build()
            .unwrap();
        let config = server.http().config();
        assert_eq!(config.mcp_path, "/cms/mcp");
        assert!(!config.enable_cors);
        assert!(!config.enable_legacy_sse);
        assert_eq!(config.max_body_size, 512);
    }
}
