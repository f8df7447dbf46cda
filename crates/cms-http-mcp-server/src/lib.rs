//! # CMS HTTP MCP Server
//!
//! HTTP transport for the CMS MCP engine. Both transports share one
//! [`SessionRegistry`](cms_mcp_session_storage::SessionRegistry) and one JSON-RPC dispatcher.
//!
//! ## Supported Transports
//! - **Streamable HTTP**: `POST /message`, `GET /listen`, `DELETE /disconnect` (or all three on `/mcp`)
//! - **HTTP+SSE**: legacy `GET /sse` plus `POST /messages?sessionId=`
//!
//! ## Features
//! - One live SSE stream per session; a reconnect replaces the previous stream
//! - `Last-Event-ID` resumption from the per-session replay buffer
//! - CORS support for browser-based clients
//! - JSON-RPC 2.0 error bodies alongside transport status codes

pub mod cors;
pub mod handler;
pub mod legacy_sse;
pub mod protocol;
pub mod responses;
pub mod server;
pub mod sse;
pub mod stream_manager;
pub mod streamable_http;

#[cfg(test)]
mod tests;

pub use cors::CorsLayer;
pub use handler::McpHttpHandler;
pub use protocol::{
    extract_last_event_id, extract_protocol_version, extract_session_id, wants_event_stream,
};
pub use responses::McpBody;
pub use server::{HttpMcpServer, HttpMcpServerBuilder, ServerConfig, ServerStats};
pub use sse::SseFrame;
pub use stream_manager::{StreamConfig, StreamError, StreamManager};

pub use cms_mcp_json_rpc_server::{JsonRpcDispatcher, JsonRpcHandler};

/// Result type for HTTP MCP operations
pub type Result<T> = std::result::Result<T, HttpMcpError>;

/// HTTP MCP specific errors
#[derive(Debug, thiserror::Error)]
pub enum HttpMcpError {
    #[error("HTTP error: {0}")]
    Http(#[from] hyper::Error),

    #[error("Session error: {0}")]
    Session(#[from] cms_mcp_session_storage::SessionError),

    #[error("Stream error: {0}")]
    Stream(#[from] StreamError),

    #[error("Serialization error: {0}")]
    Serialization(#[from] serde_json::Error),

    #[error("IO error: {0}")]
    Io(#[from] std::io::Error),
}
