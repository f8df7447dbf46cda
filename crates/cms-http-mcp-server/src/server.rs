//! HTTP MCP Server
//!
//! Owns the session registry, the JSON-RPC dispatcher and the stream manager, and serves both
//! transports over hyper's HTTP/1 connection handling.

use std::net::SocketAddr;
use std::sync::Arc;

use hyper::server::conn::http1;
use hyper::service::service_fn;
use hyper_util::rt::TokioIo;
use tokio::net::TcpListener;
use tracing::{debug, error, info};

use cms_mcp_json_rpc_server::{DispatchMiddleware, JsonRpcDispatcher, JsonRpcHandler};
use cms_mcp_protocol::McpError;
use cms_mcp_session_storage::{RegistryStats, SessionConfig, SessionRegistry};

use crate::{McpHttpHandler, Result, StreamConfig, StreamManager};

/// Configuration for the HTTP MCP server
#[derive(Debug, Clone)]
pub struct ServerConfig {
    /// Address to bind to
    pub bind_address: SocketAddr,
    /// Single endpoint serving POST, GET and DELETE
    pub mcp_path: String,
    pub message_path: String,
    pub listen_path: String,
    pub disconnect_path: String,
    pub legacy_sse_path: String,
    pub legacy_messages_path: String,
    /// Serve the two-endpoint HTTP+SSE transport
    pub enable_legacy_sse: bool,
    /// Enable CORS
    pub enable_cors: bool,
    /// Maximum request body size
    pub max_body_size: usize,
}

impl Default for ServerConfig {
    fn default() -> Self {
        Self {
            bind_address: SocketAddr::from(([127, 0, 0, 1], 8000)),
            mcp_path: "/mcp".to_string(),
            message_path: "/message".to_string(),
            listen_path: "/listen".to_string(),
            disconnect_path: "/disconnect".to_string(),
            legacy_sse_path: "/sse".to_string(),
            legacy_messages_path: "/messages".to_string(),
            enable_legacy_sse: cfg!(feature = "sse"),
            enable_cors: true,
            max_body_size: 1024 * 1024, // 1MB
        }
    }
}

/// Builder for HTTP MCP server
pub struct HttpMcpServerBuilder {
    config: ServerConfig,
    dispatcher: JsonRpcDispatcher<McpError>,
    registry: Option<Arc<SessionRegistry>>,
    session_config: SessionConfig,
    stream_config: StreamConfig,
}

impl HttpMcpServerBuilder {
    /// Create a new builder with a fresh in-memory registry
    pub fn new() -> Self {
        Self {
            config: ServerConfig::default(),
            dispatcher: JsonRpcDispatcher::<McpError>::new(),
            registry: None,
            session_config: SessionConfig::default(),
            stream_config: StreamConfig::default(),
        }
    }

    /// Share an existing registry, e.g. one the method handlers already hold
    pub fn with_registry(registry: Arc<SessionRegistry>) -> Self {
        Self {
            registry: Some(registry),
            ..Self::new()
        }
    }

    /// Replace the whole server configuration
    pub fn config(mut self, config: ServerConfig) -> Self {
        self.config = config;
        self
    }

    /// Set the bind address
    pub fn bind_address(mut self, addr: SocketAddr) -> Self {
        self.config.bind_address = addr;
        self
    }

    /// Set the combined MCP endpoint path
    pub fn mcp_path(mut self, path: impl Into<String>) -> Self {
        self.config.mcp_path = path.into();
        self
    }

    /// Enable or disable CORS
    pub fn cors(mut self, enable: bool) -> Self {
        self.config.enable_cors = enable;
        self
    }

    /// Set maximum request body size
    pub fn max_body_size(mut self, size: usize) -> Self {
        self.config.max_body_size = size;
        self
    }

    /// Enable or disable the legacy HTTP+SSE endpoints
    pub fn legacy_sse(mut self, enable: bool) -> Self {
        self.config.enable_legacy_sse = enable;
        self
    }

    /// Session settings; ignored when an existing registry was supplied
    pub fn session_config(mut self, config: SessionConfig) -> Self {
        self.session_config = config;
        self
    }

    /// Configure SSE streaming settings
    pub fn stream_config(mut self, config: StreamConfig) -> Self {
        self.stream_config = config;
        self
    }

    /// Register a JSON-RPC handler for one method
    pub fn register_handler<H>(mut self, method: impl Into<String>, handler: H) -> Self
    where
        H: JsonRpcHandler<Error = McpError> + 'static,
    {
        self.dispatcher.register_method(method, handler);
        self
    }

    /// Register a handler under every method it reports as supported
    pub fn register_shared(mut self, handler: Arc<dyn JsonRpcHandler<Error = McpError>>) -> Self {
        self.dispatcher.register_shared(handler);
        self
    }

    /// Register a default handler for unhandled methods
    pub fn default_handler<H>(mut self, handler: H) -> Self
    where
        H: JsonRpcHandler<Error = McpError> + 'static,
    {
        self.dispatcher.set_default_handler(handler);
        self
    }

    /// Add a check that runs before every handler
    pub fn middleware(mut self, middleware: Arc<dyn DispatchMiddleware<Error = McpError>>) -> Self {
        self.dispatcher.add_middleware(middleware);
        self
    }

    /// Build the HTTP MCP server
    pub fn build(self) -> HttpMcpServer {
        let registry = self
            .registry
            .unwrap_or_else(|| Arc::new(SessionRegistry::new(self.session_config)));
        let stream_manager = Arc::new(StreamManager::with_config(
            Arc::clone(&registry),
            self.stream_config,
        ));
        let config = Arc::new(self.config);
        let handler = McpHttpHandler::new(
            Arc::clone(&config),
            Arc::new(self.dispatcher),
            Arc::clone(&stream_manager),
        );

        HttpMcpServer {
            config,
            registry,
            stream_manager,
            handler,
        }
    }
}

impl Default for HttpMcpServerBuilder {
    fn default() -> Self {
        Self::new()
    }
}

/// Server statistics
#[derive(Debug, Clone)]
pub struct ServerStats {
    pub sessions: RegistryStats,
    pub legacy_sse_enabled: bool,
}

/// HTTP MCP Server
#[derive(Clone)]
pub struct HttpMcpServer {
    config: Arc<ServerConfig>,
    registry: Arc<SessionRegistry>,
    stream_manager: Arc<StreamManager>,
    handler: McpHttpHandler,
}

impl HttpMcpServer {
    pub fn builder() -> HttpMcpServerBuilder {
        HttpMcpServerBuilder::new()
    }

    pub fn builder_with_registry(registry: Arc<SessionRegistry>) -> HttpMcpServerBuilder {
        HttpMcpServerBuilder::with_registry(registry)
    }

    pub fn config(&self) -> &ServerConfig {
        &self.config
    }

    pub fn registry(&self) -> Arc<SessionRegistry> {
        Arc::clone(&self.registry)
    }

    pub fn stream_manager(&self) -> Arc<StreamManager> {
        Arc::clone(&self.stream_manager)
    }

    /// The router, for driving requests without a socket
    pub fn handler(&self) -> &McpHttpHandler {
        &self.handler
    }

    /// Bind the configured address and serve until the listener fails
    pub async fn run(&self) -> Result<()> {
        let listener = TcpListener::bind(&self.config.bind_address).await?;
        self.serve(listener).await
    }

    /// Serve on an already bound listener
    pub async fn serve(&self, listener: TcpListener) -> Result<()> {
        let local_addr = listener.local_addr()?;
        info!("HTTP MCP server listening on {}", local_addr);
        info!(
            "Streamable endpoints: {} (POST {}, GET {}, DELETE {})",
            self.config.mcp_path,
            self.config.message_path,
            self.config.listen_path,
            self.config.disconnect_path
        );
        if self.config.enable_legacy_sse {
            info!(
                "Legacy SSE endpoints: GET {}, POST {}",
                self.config.legacy_sse_path, self.config.legacy_messages_path
            );
        }

        let reaper = self.registry.spawn_reaper();

        let result: Result<()> = loop {
            let (stream, peer_addr) = match listener.accept().await {
                Ok(accepted) => accepted,
                Err(err) => break Err(err.into()),
            };
            debug!("New connection from {}", peer_addr);

            let handler = self.handler.clone();
            tokio::spawn(async move {
                let io = TokioIo::new(stream);
                let service = service_fn(move |req| {
                    let handler = handler.clone();
                    async move { Ok::<_, hyper::Error>(handler.handle(req).await) }
                });

                if let Err(err) = http1::Builder::new().serve_connection(io, service).await {
                    // Filter out common client disconnection errors that aren't actual problems
                    if err.is_incomplete_message() || err.is_canceled() {
                        debug!("Client disconnected: {}", err);
                    } else {
                        error!("Error serving connection: {}", err);
                    }
                }
            });
        };

        reaper.abort();
        result
    }

    pub async fn stats(&self) -> ServerStats {
        ServerStats {
            sessions: self.registry.stats().await,
            legacy_sse_enabled: self.config.enable_legacy_sse,
        }
    }
}
