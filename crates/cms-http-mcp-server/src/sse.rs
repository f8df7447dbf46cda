//! Server-Sent Events framing

use bytes::Bytes;
use serde_json::json;

use cms_mcp_session_storage::OutboundEvent;

pub const ENDPOINT_EVENT: &str = "endpoint";
pub const REPLAY_UNAVAILABLE_EVENT: &str = "replay-unavailable";

/// One unit written to an SSE response body
#[derive(Debug, Clone, PartialEq)]
pub enum SseFrame {
    /// A sequenced JSON-RPC message
    Event(OutboundEvent),
    /// Legacy transport: where to POST messages for this session
    Endpoint(String),
    /// Comment line; keeps intermediaries from timing out the connection
    KeepAlive,
    /// The resume cursor predates the buffer window. Always the last frame.
    ReplayUnavailable {
        session_id: String,
        requested: u64,
        oldest_available: Option<u64>,
    },
}

impl SseFrame {
    pub fn format(&self) -> String {
        match self {
            SseFrame::Event(event) => format!(
                "id: {}\nevent: {}\ndata: {}\n\n",
                event.id, event.event_type, event.data
            ),
            SseFrame::Endpoint(uri) => format!("event: {}\ndata: {}\n\n", ENDPOINT_EVENT, uri),
            SseFrame::KeepAlive => ": keepalive\n\n".to_string(),
            SseFrame::ReplayUnavailable {
                session_id,
                requested,
                oldest_available,
            } => {
                let data = json!({
                    "sessionId": session_id,
                    "requested": requested,
                    "oldestAvailable": oldest_available,
                    "message": "Replay unavailable; start a new session",
                });
                format!("event: {}\ndata: {}\n\n", REPLAY_UNAVAILABLE_EVENT, data)
            }
        }
    }

    pub fn into_bytes(self) -> Bytes {
        Bytes::from(self.format())
    }
}
