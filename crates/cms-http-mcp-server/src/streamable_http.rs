//! Streamable HTTP transport
//!
//! - `POST` carries a JSON-RPC request, notification or batch. `initialize` without a session
//!   creates one and always answers in the body with `Mcp-Session-Id`. Other replies go to the
//!   session's live stream when one is attached (the POST gets `202`), otherwise in the body.
//! - `GET` opens the session's event stream, resuming after `Last-Event-ID` when given.
//! - `DELETE` terminates the session. Repeating it is harmless.

use std::sync::Arc;

use bytes::Bytes;
use http_body::Body;
use http_body_util::{BodyExt, Limited};
use hyper::{Request, Response, StatusCode};
use serde_json::json;
use tracing::{debug, error, info, warn};

use cms_mcp_json_rpc_server::{
    DispatchReply, IncomingPayload, JsonRpcDispatcher, JsonRpcErrorObject, NotificationSink,
    RequestId, SessionContext, parse_payload,
};
use cms_mcp_protocol::{McpError, methods};
use cms_mcp_session_storage::{Session, SessionError, SessionRegistry, SessionState, TransportKind};

use crate::ServerConfig;
use crate::protocol::{extract_last_event_id, extract_session_id, is_json_content, wants_event_stream};
use crate::responses::{
    McpBody, accepted, json_response, ok_empty, set_session_header, text_response,
    transport_error,
};
use crate::stream_manager::{StreamError, StreamManager};

/// Read a request body, enforcing `limit`. The error is the response to send.
pub(crate) async fn read_body<B>(body: B, limit: usize) -> Result<Bytes, Response<McpBody>>
where
    B: Body<Data = Bytes>,
    B::Error: Into<Box<dyn std::error::Error + Send + Sync>>,
{
    match Limited::new(body, limit).collect().await {
        Ok(collected) => Ok(collected.to_bytes()),
        Err(err) if err.downcast_ref::<http_body_util::LengthLimitError>().is_some() => {
            warn!("Request body exceeds {} bytes", limit);
            Err(text_response(
                StatusCode::PAYLOAD_TOO_LARGE,
                "Request body too large",
            ))
        }
        Err(err) => {
            error!("Failed to read request body: {}", err);
            Err(text_response(
                StatusCode::BAD_REQUEST,
                "Failed to read request body",
            ))
        }
    }
}

pub(crate) fn unsupported_media_type() -> Response<McpBody> {
    text_response(
        StatusCode::UNSUPPORTED_MEDIA_TYPE,
        "Content-Type must be application/json",
    )
}

/// Status and JSON-RPC error for a session that cannot be resolved
pub(crate) fn session_not_found(session_id: &str, id: Option<RequestId>) -> Response<McpBody> {
    debug!("Rejecting request for unknown session {}", session_id);
    transport_error(
        StatusCode::NOT_FOUND,
        id,
        McpError::SessionNotFound(session_id.to_string()).to_error_object(),
    )
}

pub(crate) fn missing_session(id: Option<RequestId>) -> Response<McpBody> {
    transport_error(
        StatusCode::BAD_REQUEST,
        id,
        JsonRpcErrorObject::invalid_request(Some(json!({
            "reason": "Missing Mcp-Session-Id"
        }))),
    )
}

/// Per-message context: the session id plus the stream manager as notification sink
pub(crate) fn session_context(stream_manager: &Arc<StreamManager>, session: &Session) -> SessionContext {
    let notifier: Arc<dyn NotificationSink> = stream_manager.clone();
    let transport = match session.transport() {
        TransportKind::Streamable => "streamable",
        TransportKind::LegacySse => "legacy_sse",
    };
    SessionContext::new(session.id())
        .with_notifier(notifier)
        .with_metadata("transport", json!(transport))
}

/// Handles the three streamable-transport methods
#[derive(Clone)]
pub struct StreamableHttpHandler {
    config: Arc<ServerConfig>,
    dispatcher: Arc<JsonRpcDispatcher<McpError>>,
    stream_manager: Arc<StreamManager>,
}

impl StreamableHttpHandler {
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

    /// `POST`: dispatch a JSON-RPC payload
    pub async fn handle_post<B>(&self, req: Request<B>) -> Response<McpBody>
    where
        B: Body<Data = Bytes>,
        B::Error: Into<Box<dyn std::error::Error + Send + Sync>>,
    {
        if !is_json_content(req.headers()) {
            return unsupported_media_type();
        }
        let session_id = extract_session_id(req.headers(), req.uri());

        let body = match read_body(req.into_body(), self.config.max_body_size).await {
            Ok(body) => body,
            Err(response) => return response,
        };

        let payload = match parse_payload(&body) {
            Ok(payload) => payload,
            Err(rpc_error) => {
                debug!("Unparseable payload: {}", rpc_error);
                // JSON-RPC parse errors still use 200 OK
                let value = serde_json::to_value(&rpc_error).unwrap_or_default();
                return json_response(StatusCode::OK, &value);
            }
        };

        let is_handshake = payload.contains_method(methods::INITIALIZE);
        let (session, created) = match session_id {
            Some(session_id) => match self.registry().touch(&session_id).await {
                Ok(session) if session.transport() == TransportKind::Streamable => {
                    (session, false)
                }
                Ok(_) => {
                    warn!("Session {} is not a streamable HTTP session", session_id);
                    return session_not_found(&session_id, payload.first_request_id());
                }
                Err(_) => return session_not_found(&session_id, payload.first_request_id()),
            },
            None if is_handshake => match self.registry().create(TransportKind::Streamable).await
            {
                Ok(session) => (session, true),
                Err(err) => return self.creation_failed(err, payload.first_request_id()),
            },
            None => return missing_session(payload.first_request_id()),
        };

        self.dispatch_and_reply(session, payload, created, is_handshake)
            .await
    }

    async fn dispatch_and_reply(
        &self,
        session: Arc<Session>,
        payload: IncomingPayload,
        created: bool,
        is_handshake: bool,
    ) -> Response<McpBody> {
        let context = session_context(&self.stream_manager, &session);
        let reply = self.dispatcher.handle_payload(payload, context).await;

        if created && session.state() == SessionState::Pending {
            // the handshake failed; do not leave an orphan behind
            info!(
                "Discarding session {} after failed initialize",
                session.id()
            );
            self.registry().terminate(session.id()).await;
            return direct_reply(reply);
        }

        if is_handshake {
            let mut response = direct_reply(reply);
            set_session_header(&mut response, session.id());
            return response;
        }

        if reply.is_empty() {
            return accepted();
        }

        if session.has_stream() {
            let replies = reply.clone().into_messages();
            match self.stream_manager.push_replies(&session, replies) {
                Ok(ids) => {
                    debug!(
                        "Session {}: replies queued on stream as events {:?}",
                        session.id(),
                        ids
                    );
                    return accepted();
                }
                Err(err) => warn!(
                    "Session {}: could not queue replies ({}); answering in body",
                    session.id(),
                    err
                ),
            }
        }

        let mut response = direct_reply(reply);
        set_session_header(&mut response, session.id());
        response
    }

    fn creation_failed(&self, err: SessionError, id: Option<RequestId>) -> Response<McpBody> {
        error!("Session creation failed: {}", err);
        let status = match err {
            SessionError::CapacityExceeded(_) => StatusCode::SERVICE_UNAVAILABLE,
            _ => StatusCode::INTERNAL_SERVER_ERROR,
        };
        transport_error(
            status,
            id,
            JsonRpcErrorObject::server_error(-32000, "Session could not be created", None),
        )
    }

    /// `GET`: open the session's event stream
    pub async fn handle_get<B>(&self, req: Request<B>) -> Response<McpBody> {
        if !wants_event_stream(req.headers()) {
            return text_response(
                StatusCode::NOT_ACCEPTABLE,
                "Accept must include text/event-stream",
            );
        }
        let Some(session_id) = extract_session_id(req.headers(), req.uri()) else {
            return missing_session(None);
        };
        let resume_from = extract_last_event_id(req.headers(), req.uri());

        let session = match self.registry().touch(&session_id).await {
            Ok(session) if session.transport() == TransportKind::Streamable => session,
            Ok(_) => {
                warn!("Session {} is not a streamable HTTP session", session_id);
                return session_not_found(&session_id, None);
            }
            Err(_) => return session_not_found(&session_id, None),
        };

        match self.stream_manager.open_stream(session, resume_from).await {
            Ok(mut response) => {
                set_session_header(&mut response, &session_id);
                response
            }
            Err(StreamError::SessionNotInitialized(_)) => text_response(
                StatusCode::BAD_REQUEST,
                "Session not initialized",
            ),
            Err(StreamError::SessionNotFound(id)) => session_not_found(&id, None),
            Err(err) => {
                error!("Failed to open stream for session {}: {}", session_id, err);
                text_response(StatusCode::INTERNAL_SERVER_ERROR, "Internal error")
            }
        }
    }

    /// `DELETE`: terminate the session; `200` whether or not it still existed
    pub async fn handle_delete<B>(&self, req: Request<B>) -> Response<McpBody> {
        let Some(session_id) = extract_session_id(req.headers(), req.uri()) else {
            return missing_session(None);
        };
        if self.registry().terminate(&session_id).await {
            info!("Session {} terminated by client", session_id);
        } else {
            debug!("Disconnect for already-closed session {}", session_id);
        }
        ok_empty()
    }
}

fn direct_reply(reply: DispatchReply) -> Response<McpBody> {
    match reply.to_value() {
        Some(value) => json_response(StatusCode::OK, &value),
        None => accepted(),
    }
}
