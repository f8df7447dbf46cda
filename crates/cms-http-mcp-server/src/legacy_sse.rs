//! Legacy HTTP+SSE transport (protocol revision 2024-11-05)
//!
//! `GET /sse` creates a session and holds its event stream open; the first frame names the
//! endpoint to POST to. Every reply to `POST /messages?sessionId=` travels over that stream and
//! the POST itself is answered with `202 Accepted`.

use std::sync::Arc;

use bytes::Bytes;
use http_body::Body;
use hyper::{Request, Response, StatusCode};
use tracing::{debug, error, warn};

use cms_mcp_json_rpc_server::{DispatchReply, JsonRpcDispatcher, JsonRpcMessage, parse_payload};
use cms_mcp_protocol::McpError;
use cms_mcp_session_storage::{SessionRegistry, TransportKind};

use crate::ServerConfig;
use crate::protocol::{SESSION_ID_QUERY, extract_session_id, is_json_content};
use crate::responses::{McpBody, accepted, set_session_header, text_response};
use crate::stream_manager::StreamManager;
use crate::streamable_http::{
    missing_session, read_body, session_context, session_not_found, unsupported_media_type,
};

#[derive(Clone)]
pub struct LegacySseHandler {
    config: Arc<ServerConfig>,
    dispatcher: Arc<JsonRpcDispatcher<McpError>>,
    stream_manager: Arc<StreamManager>,
}

impl LegacySseHandler {
    pub fn new(
        config: Arc<ServerConfig>,
        dispatcher: Arc<JsonRpcDispatcher<McpError>>,
        stream_manager: Arc<StreamManager>,
    ) -> Self {
        Self {
            config,
            dispatcher,
            stream_manager,
        }
    }

    fn registry(&self) -> &Arc<SessionRegistry> {
        self.stream_manager.registry()
    }

    /// The `endpoint` event payload for a session
    pub fn endpoint_uri(&self, session_id: &str) -> String {
        format!(
            "{}?{}={}",
            self.config.legacy_messages_path, SESSION_ID_QUERY, session_id
        )
    }

    /// `GET /sse`
    pub async fn handle_sse<B>(&self, _req: Request<B>) -> Response<McpBody> {
        let session = match self.registry().create(TransportKind::LegacySse).await {
            Ok(session) => session,
            Err(err) => {
                error!("Legacy SSE session creation failed: {}", err);
                return text_response(
                    StatusCode::SERVICE_UNAVAILABLE,
                    "Session could not be created",
                );
            }
        };
        let session_id = session.id().to_string();
        let endpoint = self.endpoint_uri(&session_id);

        match self.stream_manager.open_legacy_stream(session, endpoint) {
            Ok(mut response) => {
                set_session_header(&mut response, &session_id);
                response
            }
            Err(err) => {
                error!("Failed to open legacy stream for {}: {}", session_id, err);
                self.registry().terminate(&session_id).await;
                text_response(StatusCode::INTERNAL_SERVER_ERROR, "Internal error")
            }
        }
    }

    /// `POST /messages?sessionId=`
    pub async fn handle_message<B>(&self, req: Request<B>) -> Response<McpBody>
    where
        B: Body<Data = Bytes>,
        B::Error: Into<Box<dyn std::error::Error + Send + Sync>>,
    {
        if !is_json_content(req.headers()) {
            return unsupported_media_type();
        }
        let Some(session_id) = extract_session_id(req.headers(), req.uri()) else {
            return missing_session(None);
        };
        let session = match self.registry().touch(&session_id).await {
            Ok(session) if session.transport() == TransportKind::LegacySse => session,
            Ok(_) => {
                warn!("Session {} is not a legacy SSE session", session_id);
                return session_not_found(&session_id, None);
            }
            Err(_) => return session_not_found(&session_id, None),
        };

        let body = match read_body(req.into_body(), self.config.max_body_size).await {
            Ok(body) => body,
            Err(response) => return response,
        };

        let reply = match parse_payload(&body) {
            Ok(payload) => {
                let context = session_context(&self.stream_manager, &session);
                self.dispatcher.handle_payload(payload, context).await
            }
            Err(rpc_error) => DispatchReply::from(rpc_error),
        };

        let replies: Vec<JsonRpcMessage> = reply.into_messages();
        if !replies.is_empty()
            && let Err(err) = self.stream_manager.push_replies(&session, replies)
        {
            // the stream closed while the request was in flight
            debug!("Session {}: replies discarded: {}", session_id, err);
            return session_not_found(&session_id, None);
        }
        accepted()
    }
}
