//! CORS (Cross-Origin Resource Sharing) support

use hyper::HeaderMap;
use hyper::header::HeaderValue;

use crate::protocol::{
    LAST_EVENT_ID_HEADER, PROTOCOL_VERSION_HEADER, SESSION_ID_HEADER,
};

/// CORS layer for adding appropriate headers
pub struct CorsLayer;

impl CorsLayer {
    /// Apply permissive CORS headers to a response
    pub fn apply_cors_headers(headers: &mut HeaderMap) {
        headers.insert("Access-Control-Allow-Origin", HeaderValue::from_static("*"));
        headers.insert(
            "Access-Control-Allow-Methods",
            HeaderValue::from_static("GET, POST, DELETE, OPTIONS"),
        );
        headers.insert(
            "Access-Control-Allow-Headers",
            HeaderValue::from_static(
                "Content-Type, Accept, Authorization, Mcp-Session-Id, MCP-Protocol-Version, Last-Event-ID",
            ),
        );
        // Browsers hide non-safelisted response headers unless exposed
        headers.insert(
            "Access-Control-Expose-Headers",
            HeaderValue::from_static("Mcp-Session-Id, MCP-Protocol-Version"),
        );
        headers.insert("Access-Control-Max-Age", HeaderValue::from_static("86400"));
    }

    /// Header names a preflight must allow for MCP clients to work
    pub fn required_request_headers() -> [&'static str; 3] {
        [SESSION_ID_HEADER, PROTOCOL_VERSION_HEADER, LAST_EVENT_ID_HEADER]
    }
}
