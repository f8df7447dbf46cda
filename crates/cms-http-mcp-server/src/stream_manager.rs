//! Per-session SSE streams with resumability
//!
//! This module turns a session's [`StreamAttachment`] into a long-lived `text/event-stream`
//! response:
//! - Replayed events first, then live events, each with its sequence id
//! - `Last-Event-ID` resumption; a cursor outside the buffer window ends the session
//! - Keep-alive comments on an interval
//! - Detach on drop of the response body, so a closed connection frees the slot
//!
//! It is also the [`NotificationSink`] tools use to push notifications into a session.

use std::sync::Arc;
use std::time::Duration;

use async_trait::async_trait;
use futures::Stream;
use hyper::Response;
use serde_json::Value;
use tokio::time::{Instant, MissedTickBehavior};
use tracing::{debug, info, warn};

use cms_mcp_json_rpc_server::{
    JsonRpcMessage, JsonRpcNotification, JsonRpcTransportError, NotificationSink,
};
use cms_mcp_session_storage::{
    OutboundEvent, Session, SessionError, SessionRegistry, SessionState, StreamAttachment,
};

use crate::responses::{McpBody, sse_response};
use crate::sse::SseFrame;

/// Configuration for stream management
#[derive(Debug, Clone)]
pub struct StreamConfig {
    /// Capacity of each live stream's channel; a stream that falls this far behind is detached
    pub channel_buffer_size: usize,
    pub keepalive_interval: Duration,
}

impl Default for StreamConfig {
    fn default() -> Self {
        Self {
            channel_buffer_size: 256,
            keepalive_interval: Duration::from_secs(15),
        }
    }
}

/// Error type for stream management
#[derive(Debug, thiserror::Error)]
pub enum StreamError {
    #[error("Session not found: {0}")]
    SessionNotFound(String),
    #[error("Session not initialized: {0}")]
    SessionNotInitialized(String),
    #[error("Session error: {0}")]
    Session(SessionError),
}

impl From<SessionError> for StreamError {
    fn from(error: SessionError) -> Self {
        match error {
            SessionError::NotFound(id) | SessionError::Closed(id) => {
                StreamError::SessionNotFound(id)
            }
            other => StreamError::Session(other),
        }
    }
}

/// What happens to the session when its stream ends
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
enum StreamEnd {
    /// Streamable transport: keep the session and its buffer for a later resume
    Detach,
    /// Legacy transport: the session lives exactly as long as its SSE response
    Terminate,
}

/// Releases the session's stream slot when the response body is dropped
struct StreamGuard {
    registry: Arc<SessionRegistry>,
    session: Arc<Session>,
    connection_id: String,
    end: StreamEnd,
}

impl Drop for StreamGuard {
    fn drop(&mut self) {
        let detached = self.session.detach(&self.connection_id);
        debug!(
            "Stream {} for session {} closed (detached={})",
            self.connection_id,
            self.session.id(),
            detached
        );

        // a displaced stream no longer owns the session
        if detached && self.end == StreamEnd::Terminate {
            let registry = Arc::clone(&self.registry);
            let session_id = self.session.id().to_string();
            match tokio::runtime::Handle::try_current() {
                Ok(handle) => {
                    handle.spawn(async move {
                        if registry.terminate(&session_id).await {
                            info!("Legacy SSE session {} ended with its stream", session_id);
                        }
                    });
                }
                Err(_) => warn!(
                    "No runtime to terminate legacy session {}; the reaper will collect it",
                    session_id
                ),
            }
        }
    }
}

/// Stream manager shared by both transports
pub struct StreamManager {
    registry: Arc<SessionRegistry>,
    config: StreamConfig,
}

impl StreamManager {
    pub fn new(registry: Arc<SessionRegistry>) -> Self {
        Self::with_config(registry, StreamConfig::default())
    }

    pub fn with_config(registry: Arc<SessionRegistry>, config: StreamConfig) -> Self {
        Self { registry, config }
    }

    pub fn config(&self) -> &StreamConfig {
        &self.config
    }

    pub fn registry(&self) -> &Arc<SessionRegistry> {
        &self.registry
    }

    /// Open the streamable-transport event stream of an active session.
    ///
    /// A resume cursor that predates the replay window yields a response carrying a single
    /// `replay-unavailable` frame, and the session is terminated.
    pub async fn open_stream(
        &self,
        session: Arc<Session>,
        resume_from: Option<u64>,
    ) -> Result<Response<McpBody>, StreamError> {
        match session.state() {
            SessionState::Pending => {
                return Err(StreamError::SessionNotInitialized(session.id().to_string()));
            }
            SessionState::Closed => {
                return Err(StreamError::SessionNotFound(session.id().to_string()));
            }
            SessionState::Active => {}
        }

        let attachment = match session.attach(resume_from, self.config.channel_buffer_size) {
            Ok(attachment) => attachment,
            Err(SessionError::ReplayUnavailable {
                session_id,
                requested,
                oldest_available,
            }) => {
                warn!(
                    "Session {}: cannot resume after event {} (oldest buffered: {:?}); terminating",
                    session_id, requested, oldest_available
                );
                self.registry.terminate(&session_id).await;
                let frame = SseFrame::ReplayUnavailable {
                    session_id,
                    requested,
                    oldest_available,
                };
                return Ok(sse_response(futures::stream::once(async move {
                    frame.into_bytes()
                })));
            }
            Err(other) => return Err(other.into()),
        };

        info!(
            "Opened stream {} for session {} (resume_from={:?}, replaying {})",
            attachment.connection_id,
            session.id(),
            resume_from,
            attachment.replay.len()
        );
        Ok(sse_response(self.event_stream(
            session,
            attachment,
            None,
            StreamEnd::Detach,
        )))
    }

    /// Open a legacy HTTP+SSE stream. The first frame announces `endpoint_uri`; the session is
    /// terminated when the response ends.
    pub fn open_legacy_stream(
        &self,
        session: Arc<Session>,
        endpoint_uri: String,
    ) -> Result<Response<McpBody>, StreamError> {
        let attachment = session.attach(None, self.config.channel_buffer_size)?;
        info!(
            "Opened legacy stream {} for session {}",
            attachment.connection_id,
            session.id()
        );
        Ok(sse_response(self.event_stream(
            session,
            attachment,
            Some(SseFrame::Endpoint(endpoint_uri)),
            StreamEnd::Terminate,
        )))
    }

    fn event_stream(
        &self,
        session: Arc<Session>,
        attachment: StreamAttachment,
        preamble: Option<SseFrame>,
        end: StreamEnd,
    ) -> impl Stream<Item = bytes::Bytes> + Send + 'static {
        let StreamAttachment {
            connection_id,
            replay,
            mut receiver,
            ..
        } = attachment;
        let guard = StreamGuard {
            registry: Arc::clone(&self.registry),
            session,
            connection_id,
            end,
        };
        let period = self.config.keepalive_interval;

        async_stream::stream! {
            let guard = guard;

            if let Some(frame) = preamble {
                yield frame.into_bytes();
            }

            for event in replay {
                guard.session.mark_delivered(event.id);
                yield SseFrame::Event(event).into_bytes();
            }

            let mut keepalive = tokio::time::interval_at(Instant::now() + period, period);
            keepalive.set_missed_tick_behavior(MissedTickBehavior::Delay);

            loop {
                tokio::select! {
                    event = receiver.recv() => {
                        match event {
                            Some(event) => {
                                guard.session.mark_delivered(event.id);
                                yield SseFrame::Event(event).into_bytes();
                            }
                            None => {
                                debug!(
                                    "Stream {} for session {} released by the session",
                                    guard.connection_id,
                                    guard.session.id()
                                );
                                break;
                            }
                        }
                    }
                    _ = keepalive.tick() => {
                        yield SseFrame::KeepAlive.into_bytes();
                    }
                }
            }
        }
    }

    /// Sequence and deliver one message on a session's outbound stream
    pub async fn push(&self, session_id: &str, message: Value) -> Result<OutboundEvent, StreamError> {
        let session = self.registry.resolve(session_id).await?;
        Ok(session.push(message)?)
    }

    /// Sequence a dispatch result contiguously, in reply order
    pub fn push_replies(
        &self,
        session: &Session,
        replies: Vec<JsonRpcMessage>,
    ) -> Result<Vec<u64>, StreamError> {
        let values = replies.iter().map(JsonRpcMessage::to_value).collect();
        Ok(session.push_all(values)?)
    }
}

#[async_trait]
impl NotificationSink for StreamManager {
    async fn send_notification(
        &self,
        session_id: &str,
        notification: JsonRpcNotification,
    ) -> Result<(), JsonRpcTransportError> {
        let method = notification.method.clone();
        match self.push(session_id, notification.to_value()).await {
            Ok(event) => {
                debug!(
                    "Queued {} for session {} as event {}",
                    method, session_id, event.id
                );
                Ok(())
            }
            Err(e) => {
                debug!("Dropping {} for session {}: {}", method, session_id, e);
                Err(JsonRpcTransportError::SessionUnavailable(e.to_string()))
            }
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use cms_mcp_protocol::{ClientCapabilities, Implementation, McpVersion};
    use cms_mcp_session_storage::{NegotiatedProtocol, SessionConfig, TransportKind};
    use futures::StreamExt;
    use http_body_util::BodyExt;
    use serde_json::json;

    fn manager(buffer: usize) -> StreamManager {
        let registry = Arc::new(SessionRegistry::new(SessionConfig {
            max_buffered_events: buffer,
            ..Default::default()
        }));
        StreamManager::with_config(
            registry,
            StreamConfig {
                channel_buffer_size: 8,
                keepalive_interval: Duration::from_secs(15),
            },
        )
    }

    async fn active_session(manager: &StreamManager) -> Arc<Session> {
        let session = manager
            .registry()
            .create(TransportKind::Streamable)
            .await
            .unwrap();
        manager
            .registry()
            .activate(
                session.id(),
                NegotiatedProtocol {
                    protocol_version: McpVersion::LATEST,
                    client_info: Implementation::new("test", "1"),
                    client_capabilities: ClientCapabilities::default(),
                },
            )
            .await
            .unwrap();
        session
    }

    async fn next_chunk(body: &mut McpBody) -> String {
        let frame = body.frame().await.unwrap().unwrap();
        String::from_utf8(frame.into_data().unwrap().to_vec()).unwrap()
    }

    #[tokio::test]
    async fn test_pending_session_cannot_stream() {
        let manager = manager(8);
        let session = manager
            .registry()
            .create(TransportKind::Streamable)
            .await
            .unwrap();
        let err = manager.open_stream(session, None).await.unwrap_err();
        assert!(matches!(err, StreamError::SessionNotInitialized(_)));
    }

    #[tokio::test]
    async fn test_stream_delivers_replay_then_live() {
        let manager = manager(8);
        let session = active_session(&manager).await;
        session.push(json!({"n": 1})).unwrap();

        let mut body = manager
            .open_stream(session.clone(), None)
            .await
            .unwrap()
            .into_body();
        assert!(next_chunk(&mut body).await.starts_with("id: 1\n"));

        manager.push(session.id(), json!({"n": 2})).await.unwrap();
        assert!(next_chunk(&mut body).await.starts_with("id: 2\n"));
    }

    #[tokio::test]
    async fn test_dropping_body_detaches() {
        let manager = manager(8);
        let session = active_session(&manager).await;
        let response = manager.open_stream(session.clone(), None).await.unwrap();
        assert!(session.has_stream());

        drop(response);
        assert!(!session.has_stream());
        assert_eq!(manager.registry().count().await, 1);
    }

    #[tokio::test]
    async fn test_replay_unavailable_terminates_session() {
        let manager = manager(2);
        let session = active_session(&manager).await;
        for n in 0..5 {
            session.push(json!(n)).unwrap();
        }

        let response = manager.open_stream(session.clone(), Some(1)).await.unwrap();
        let body = response.into_body().collect().await.unwrap().to_bytes();
        let text = String::from_utf8(body.to_vec()).unwrap();
        assert!(text.starts_with("event: replay-unavailable\n"));
        assert!(manager.registry().resolve(session.id()).await.is_err());
    }

    #[tokio::test(start_paused = true)]
    async fn test_keepalive_after_idle_interval() {
        let manager = manager(8);
        let session = active_session(&manager).await;
        let mut body = manager.open_stream(session, None).await.unwrap().into_body();

        let chunk = tokio::time::timeout(Duration::from_secs(20), next_chunk(&mut body))
            .await
            .unwrap();
        assert_eq!(chunk, ": keepalive\n\n");
    }

    #[tokio::test]
    async fn test_notifications_reach_stream() {
        let manager = Arc::new(manager(8));
        let session = active_session(&manager).await;
        let mut body = manager
            .open_stream(session.clone(), None)
            .await
            .unwrap()
            .into_body();

        let sink: Arc<dyn NotificationSink> = manager.clone();
        sink.send_notification(
            session.id(),
            JsonRpcNotification::with_value("notifications/message", json!({"level": "info"})),
        )
        .await
        .unwrap();

        let chunk = next_chunk(&mut body).await;
        assert!(chunk.contains("notifications/message"));
        assert!(
            sink.send_notification("nope", JsonRpcNotification::new("x", None))
                .await
                .is_err()
        );
    }

    #[tokio::test]
    async fn test_legacy_stream_announces_endpoint_and_terminates() {
        let manager = manager(8);
        let session = manager
            .registry()
            .create(TransportKind::LegacySse)
            .await
            .unwrap();
        let id = session.id().to_string();
        let response = manager
            .open_legacy_stream(session, format!("/messages?sessionId={id}"))
            .unwrap();

        let mut stream = response.into_body().into_data_stream();
        let first = stream.next().await.unwrap().unwrap();
        assert!(
            String::from_utf8(first.to_vec())
                .unwrap()
                .starts_with("event: endpoint\ndata: /messages?sessionId=")
        );

        drop(stream);
        tokio::task::yield_now().await;
        for _ in 0..10 {
            if manager.registry().resolve(&id).await.is_err() {
                break;
            }
            tokio::task::yield_now().await;
        }
        assert!(manager.registry().resolve(&id).await.is_err());
    }

    #[tokio::test]
    async fn test_displaced_legacy_stream_keeps_session() {
        let manager = manager(8);
        let session = manager
            .registry()
            .create(TransportKind::LegacySse)
            .await
            .unwrap();
        let id = session.id().to_string();
        let endpoint = format!("/messages?sessionId={id}");

        let mut first = manager
            .open_legacy_stream(session.clone(), endpoint.clone())
            .unwrap()
            .into_body();
        assert!(next_chunk(&mut first).await.starts_with("event: endpoint\n"));

        let mut second = manager
            .open_legacy_stream(session.clone(), endpoint)
            .unwrap()
            .into_body();
        assert!(next_chunk(&mut second).await.starts_with("event: endpoint\n"));

        // the displaced body ends and drops its guard
        assert!(first.frame().await.is_none());
        drop(first);
        for _ in 0..10 {
            tokio::task::yield_now().await;
        }
        assert!(manager.registry().resolve(&id).await.is_ok());
        assert!(session.has_stream());

        manager.push(&id, json!({"n": 1})).await.unwrap();
        assert!(next_chunk(&mut second).await.starts_with("id: 1\n"));
    }
}
