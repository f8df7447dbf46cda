//! MCP header and query parameter extraction

use hyper::header::{ACCEPT, CONTENT_TYPE};
use hyper::{HeaderMap, Uri};

use cms_mcp_protocol::McpVersion;

pub const SESSION_ID_HEADER: &str = "Mcp-Session-Id";
pub const PROTOCOL_VERSION_HEADER: &str = "MCP-Protocol-Version";
pub const LAST_EVENT_ID_HEADER: &str = "Last-Event-ID";

/// Query fallback for clients that cannot set headers (legacy `POST /messages`)
pub const SESSION_ID_QUERY: &str = "sessionId";
pub const LAST_EVENT_ID_QUERY: &str = "lastEventId";

/// Raw value of the first `name=` pair in the query string
pub fn query_param<'a>(uri: &'a Uri, name: &str) -> Option<&'a str> {
    uri.query()?
        .split('&')
        .filter_map(|pair| pair.split_once('='))
        .find(|(key, _)| *key == name)
        .map(|(_, value)| value)
        .filter(|value| !value.is_empty())
}

/// Session id from the `Mcp-Session-Id` header, else the `sessionId` query parameter
pub fn extract_session_id(headers: &HeaderMap, uri: &Uri) -> Option<String> {
    headers
        .get(SESSION_ID_HEADER)
        .and_then(|h| h.to_str().ok())
        .map(str::trim)
        .filter(|s| !s.is_empty())
        .or_else(|| query_param(uri, SESSION_ID_QUERY))
        .map(|s| s.to_string())
}

/// Resumption cursor from `Last-Event-ID`, else the `lastEventId` query parameter.
/// Unparseable values are ignored.
pub fn extract_last_event_id(headers: &HeaderMap, uri: &Uri) -> Option<u64> {
    headers
        .get(LAST_EVENT_ID_HEADER)
        .and_then(|h| h.to_str().ok())
        .or_else(|| query_param(uri, LAST_EVENT_ID_QUERY))
        .and_then(|s| s.trim().parse::<u64>().ok())
}

/// `Ok(None)` when the header is absent; `Err` carries the unsupported value
pub fn extract_protocol_version(
    headers: &HeaderMap,
) -> std::result::Result<Option<McpVersion>, String> {
    match headers.get(PROTOCOL_VERSION_HEADER) {
        None => Ok(None),
        Some(value) => {
            let raw = value.to_str().unwrap_or_default().trim();
            McpVersion::parse(raw)
                .map(Some)
                .ok_or_else(|| raw.to_string())
        }
    }
}

pub fn wants_event_stream(headers: &HeaderMap) -> bool {
    headers
        .get(ACCEPT)
        .and_then(|h| h.to_str().ok())
        .is_some_and(|accept| accept.to_ascii_lowercase().contains("text/event-stream"))
}

pub fn is_json_content(headers: &HeaderMap) -> bool {
    headers
        .get(CONTENT_TYPE)
        .and_then(|h| h.to_str().ok())
        .is_some_and(|ct| ct.to_ascii_lowercase().starts_with("application/json"))
}
