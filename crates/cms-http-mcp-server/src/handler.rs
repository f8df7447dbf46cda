//! Request routing for both transports

use std::sync::Arc;

use bytes::Bytes;
use http_body::Body;
use hyper::header::{ALLOW, HeaderValue};
use hyper::{Method, Request, Response, StatusCode};
use tracing::{debug, warn};

use cms_mcp_json_rpc_server::JsonRpcDispatcher;
use cms_mcp_protocol::McpError;

use crate::cors::CorsLayer;
use crate::legacy_sse::LegacySseHandler;
use crate::protocol::extract_protocol_version;
use crate::responses::{McpBody, no_content, text_response};
use crate::server::ServerConfig;
use crate::stream_manager::StreamManager;
use crate::streamable_http::StreamableHttpHandler;

/// Which operation a path serves
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
enum Route {
    /// `/mcp`: POST, GET and DELETE
    Combined,
    Message,
    Listen,
    Disconnect,
    LegacySse,
    LegacyMessages,
}

/// HTTP handler for MCP requests
#[derive(Clone)]
pub struct McpHttpHandler {
    config: Arc<ServerConfig>,
    streamable: StreamableHttpHandler,
    legacy: LegacySseHandler,
}

impl McpHttpHandler {
    pub fn new(
        config: Arc<ServerConfig>,
        dispatcher: Arc<JsonRpcDispatcher<McpError>>,
        stream_manager: Arc<StreamManager>,
    ) -> Self {
        Self {
            streamable: StreamableHttpHandler::new(
                Arc::clone(&config),
                Arc::clone(&dispatcher),
                Arc::clone(&stream_manager),
            ),
            legacy: LegacySseHandler::new(Arc::clone(&config), dispatcher, stream_manager),
            config,
        }
    }

    fn route(&self, path: &str) -> Option<Route> {
        let config = &self.config;
        if path == config.mcp_path {
            Some(Route::Combined)
        } else if path == config.message_path {
            Some(Route::Message)
        } else if path == config.listen_path {
            Some(Route::Listen)
        } else if path == config.disconnect_path {
            Some(Route::Disconnect)
        } else if config.enable_legacy_sse && path == config.legacy_sse_path {
            Some(Route::LegacySse)
        } else if config.enable_legacy_sse && path == config.legacy_messages_path {
            Some(Route::LegacyMessages)
        } else {
            None
        }
    }

    /// Route one request and apply CORS headers
    pub async fn handle<B>(&self, req: Request<B>) -> Response<McpBody>
    where
        B: Body<Data = Bytes>,
        B::Error: Into<Box<dyn std::error::Error + Send + Sync>>,
    {
        let mut response = self.dispatch(req).await;
        if self.config.enable_cors {
            CorsLayer::apply_cors_headers(response.headers_mut());
        }
        response
    }

    async fn dispatch<B>(&self, req: Request<B>) -> Response<McpBody>
    where
        B: Body<Data = Bytes>,
        B::Error: Into<Box<dyn std::error::Error + Send + Sync>>,
    {
        let method = req.method().clone();
        let path = req.uri().path().to_string();
        debug!("Handling {} {}", method, path);

        let Some(route) = self.route(&path) else {
            return text_response(StatusCode::NOT_FOUND, "Not Found");
        };

        if method == Method::OPTIONS {
            return preflight();
        }

        if let Err(version) = extract_protocol_version(req.headers()) {
            warn!("Rejecting unsupported MCP-Protocol-Version: {}", version);
            return text_response(
                StatusCode::BAD_REQUEST,
                format!("Unsupported MCP-Protocol-Version: {}", version),
            );
        }

        match (route, method) {
            (Route::Combined | Route::Message, Method::POST) => {
                self.streamable.handle_post(req).await
            }
            (Route::Combined | Route::Listen, Method::GET) => self.streamable.handle_get(req).await,
            (Route::Combined | Route::Disconnect, Method::DELETE) => {
                self.streamable.handle_delete(req).await
            }
            (Route::LegacySse, Method::GET) => self.legacy.handle_sse(req).await,
            (Route::LegacyMessages, Method::POST) => self.legacy.handle_message(req).await,
            (route, method) => {
                debug!("{} not allowed on {}", method, path);
                method_not_allowed(allowed_methods(route))
            }
        }
    }
}

fn allowed_methods(route: Route) -> &'static str {
    match route {
        Route::Combined => "GET, POST, DELETE, OPTIONS",
        Route::Message | Route::LegacyMessages => "POST, OPTIONS",
        Route::Listen | Route::LegacySse => "GET, OPTIONS",
        Route::Disconnect => "DELETE, OPTIONS",
    }
}

fn method_not_allowed(allow: &'static str) -> Response<McpBody> {
    let mut response = text_response(StatusCode::METHOD_NOT_ALLOWED, "Method Not Allowed");
    response
        .headers_mut()
        .insert(ALLOW, HeaderValue::from_static(allow));
    response
}

/// OPTIONS preflight; the CORS headers are added by [`McpHttpHandler::handle`]
fn preflight() -> Response<McpBody> {
    no_content()
}
