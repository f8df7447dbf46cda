//! A single client session.
//!
//! Every piece of mutable session state sits behind one per-session mutex. Sequence
//! assignment and the hand-off to the live stream happen under that lock, so a stream observes
//! events in id order and two sessions never contend with each other.

use parking_lot::Mutex;
use serde::{Deserialize, Serialize};
use serde_json::Value;
use tokio::sync::mpsc::{self, error::TrySendError};
use tracing::{debug, info, warn};
use uuid::Uuid;

use cms_mcp_protocol::{ClientCapabilities, Implementation, McpVersion};

use crate::event::{EventBuffer, OutboundEvent};
use crate::{SessionError, now_millis};

#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "lowercase")]
pub enum SessionState {
    /// Created, handshake not yet completed
    Pending,
    Active,
    /// Terminal
    Closed,
}

/// Which HTTP transport created the session
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum TransportKind {
    Streamable,
    /// Two-endpoint HTTP+SSE; the session lives exactly as long as its SSE response
    LegacySse,
}

/// What `initialize` settled on
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct NegotiatedProtocol {
    pub protocol_version: McpVersion,
    pub client_info: Implementation,
    pub client_capabilities: ClientCapabilities,
}

/// Receiving half of a live stream plus everything that must be written before it
#[derive(Debug)]
pub struct StreamAttachment {
    pub connection_id: String,
    /// Buffered events to write first, in id order
    pub replay: Vec<OutboundEvent>,
    pub receiver: mpsc::Receiver<OutboundEvent>,
    /// Whether an earlier stream was displaced
    pub replaced: bool,
}

#[derive(Debug)]
struct LiveStream {
    connection_id: String,
    sender: mpsc::Sender<OutboundEvent>,
}

#[derive(Debug)]
struct SessionInner {
    state: SessionState,
    last_activity: u64,
    protocol: Option<NegotiatedProtocol>,
    events: EventBuffer,
    /// Highest event id handed to a stream writer
    delivered_through: u64,
    stream: Option<LiveStream>,
    detached_at: Option<u64>,
}

/// Read-only snapshot for diagnostics
#[derive(Debug, Clone, Serialize)]
#[serde(rename_all = "camelCase")]
pub struct SessionInfo {
    pub session_id: String,
    pub state: SessionState,
    pub transport: TransportKind,
    pub created_at: u64,
    pub last_activity: u64,
    #[serde(skip_serializing_if = "Option::is_none")]
    pub protocol_version: Option<McpVersion>,
    #[serde(skip_serializing_if = "Option::is_none")]
    pub client_name: Option<String>,
    pub buffered_events: usize,
    pub last_event_id: u64,
    pub stream_attached: bool,
}

#[derive(Debug)]
pub struct Session {
    id: String,
    transport: TransportKind,
    created_at: u64,
    inner: Mutex<SessionInner>,
}

impl Session {
    pub(crate) fn new(id: String, transport: TransportKind, buffer_capacity: usize) -> Self {
        let now = now_millis();
        Self {
            id,
            transport,
            created_at: now,
            inner: Mutex::new(SessionInner {
                state: SessionState::Pending,
                last_activity: now,
                protocol: None,
                events: EventBuffer::new(buffer_capacity),
                delivered_through: 0,
                stream: None,
                detached_at: None,
            }),
        }
    }

    pub fn id(&self) -> &str {
        &self.id
    }

    pub fn transport(&self) -> TransportKind {
        self.transport
    }

    pub fn created_at(&self) -> u64 {
        self.created_at
    }

    pub fn state(&self) -> SessionState {
        self.inner.lock().state
    }

    pub fn is_closed(&self) -> bool {
        self.state() == SessionState::Closed
    }

    pub fn last_activity(&self) -> u64 {
        self.inner.lock().last_activity
    }

    pub fn protocol(&self) -> Option<NegotiatedProtocol> {
        self.inner.lock().protocol.clone()
    }

    pub fn has_stream(&self) -> bool {
        self.inner.lock().stream.is_some()
    }

    pub fn last_event_id(&self) -> u64 {
        self.inner.lock().events.last_id()
    }

    pub fn buffered_events(&self) -> usize {
        self.inner.lock().events.len()
    }

    pub fn info(&self) -> SessionInfo {
        let inner = self.inner.lock();
        SessionInfo {
            session_id: self.id.clone(),
            state: inner.state,
            transport: self.transport,
            created_at: self.created_at,
            last_activity: inner.last_activity,
            protocol_version: inner.protocol.as_ref().map(|p| p.protocol_version),
            client_name: inner.protocol.as_ref().map(|p| p.client_info.name.clone()),
            buffered_events: inner.events.len(),
            last_event_id: inner.events.last_id(),
            stream_attached: inner.stream.is_some(),
        }
    }

    pub(crate) fn touch_at(&self, now: u64) {
        let mut inner = self.inner.lock();
        if inner.state != SessionState::Closed {
            inner.last_activity = inner.last_activity.max(now);
        }
    }

    /// `Pending -> Active`, or re-negotiation of an `Active` session. Returns `true` when the
    /// session was already active.
    pub(crate) fn activate(&self, protocol: NegotiatedProtocol) -> Result<bool, SessionError> {
        let mut inner = self.inner.lock();
        let renegotiated = match inner.state {
            SessionState::Closed => return Err(SessionError::Closed(self.id.clone())),
            SessionState::Pending => false,
            SessionState::Active => true,
        };
        inner.state = SessionState::Active;
        inner.protocol = Some(protocol);
        Ok(renegotiated)
    }

    /// Returns `false` when the session was already closed
    pub(crate) fn close(&self) -> bool {
        let mut inner = self.inner.lock();
        if inner.state == SessionState::Closed {
            return false;
        }
        inner.state = SessionState::Closed;
        // dropping the sender ends the live response
        inner.stream = None;
        let dropped = inner.events.clear();
        if dropped > 0 {
            debug!("Session {} closed with {} undelivered events", self.id, dropped);
        }
        true
    }

    /// Bind a new live stream, displacing any current one.
    ///
    /// With `resume_from`, every buffered event after the cursor is returned for replay and
    /// everything up to it is treated as acknowledged. A cursor that predates the buffer window
    /// fails with [`SessionError::ReplayUnavailable`]. Without a cursor, events not yet handed
    /// to any stream are returned.
    pub fn attach(
        &self,
        resume_from: Option<u64>,
        channel_capacity: usize,
    ) -> Result<StreamAttachment, SessionError> {
        let mut inner = self.inner.lock();
        if inner.state == SessionState::Closed {
            return Err(SessionError::Closed(self.id.clone()));
        }

        let replay = match resume_from {
            Some(cursor) => {
                let replay = inner.events.replay_after(cursor).map_err(|gap| {
                    SessionError::ReplayUnavailable {
                        session_id: self.id.clone(),
                        requested: gap.requested,
                        oldest_available: gap.oldest_available,
                    }
                })?;
                inner.events.acknowledge(cursor);
                inner.delivered_through = inner.delivered_through.max(cursor);
                replay
            }
            None => inner.events.retained_after(inner.delivered_through),
        };

        let (sender, receiver) = mpsc::channel(channel_capacity.max(1));
        let connection_id = Uuid::now_v7().to_string();
        let replaced = inner
            .stream
            .replace(LiveStream {
                connection_id: connection_id.clone(),
                sender,
            })
            .is_some();
        inner.detached_at = None;

        if replaced {
            info!(
                "Session {}: stream {} replaced an existing stream",
                self.id, connection_id
            );
        } else {
            debug!("Session {}: stream {} attached", self.id, connection_id);
        }

        Ok(StreamAttachment {
            connection_id,
            replay,
            receiver,
            replaced,
        })
    }

    /// Release the live stream if it is still `connection_id`. A displaced stream's late
    /// detach leaves its successor alone.
    pub fn detach(&self, connection_id: &str) -> bool {
        let mut inner = self.inner.lock();
        let current = inner
            .stream
            .as_ref()
            .is_some_and(|s| s.connection_id == connection_id);
        if current {
            inner.stream = None;
            inner.detached_at = Some(now_millis());
            debug!("Session {}: stream {} detached", self.id, connection_id);
        }
        current
    }

    /// Append one message and write it to the live stream if there is one
    pub fn push(&self, message: Value) -> Result<OutboundEvent, SessionError> {
        let mut inner = self.inner.lock();
        self.push_locked(&mut inner, message)
    }

    /// Append several messages contiguously; no other push can interleave
    pub fn push_all(&self, messages: Vec<Value>) -> Result<Vec<u64>, SessionError> {
        let mut inner = self.inner.lock();
        messages
            .into_iter()
            .map(|message| self.push_locked(&mut inner, message).map(|e| e.id))
            .collect()
    }

    fn push_locked(
        &self,
        inner: &mut SessionInner,
        message: Value,
    ) -> Result<OutboundEvent, SessionError> {
        if inner.state == SessionState::Closed {
            return Err(SessionError::Closed(self.id.clone()));
        }

        let event = inner.events.append(message, now_millis());

        let sent = inner
            .stream
            .as_ref()
            .map(|stream| stream.sender.try_send(event.clone()));
        match sent {
            None | Some(Ok(())) => {}
            Some(Err(TrySendError::Full(_))) => {
                warn!(
                    "Session {}: stream cannot keep up, detaching at event {}",
                    self.id, event.id
                );
                inner.stream = None;
                inner.detached_at = Some(now_millis());
            }
            Some(Err(TrySendError::Closed(_))) => {
                debug!("Session {}: stream already gone at event {}", self.id, event.id);
                inner.stream = None;
                inner.detached_at = Some(now_millis());
            }
        }
        Ok(event)
    }

    /// Record that a stream writer emitted `event_id`
    pub fn mark_delivered(&self, event_id: u64) {
        let mut inner = self.inner.lock();
        inner.delivered_through = inner.delivered_through.max(event_id);
    }

    /// Drop buffered events of a stream that has been gone longer than `grace_ms`
    pub(crate) fn expire_replay(&self, now: u64, grace_ms: u64) -> usize {
        let mut inner = self.inner.lock();
        let expired = inner.stream.is_none()
            && inner
                .detached_at
                .is_some_and(|at| now.saturating_sub(at) >= grace_ms);
        if expired { inner.events.clear() } else { 0 }
    }

    /// No live stream and no activity for `idle_ms`
    pub(crate) fn is_idle(&self, now: u64, idle_ms: u64) -> bool {
        let inner = self.inner.lock();
        inner.state != SessionState::Closed
            && inner.stream.is_none()
            && now.saturating_sub(inner.last_activity) >= idle_ms
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use serde_json::json;

    fn session() -> Session {
        Session::new("s-1".to_string(), TransportKind::Streamable, 4)
    }

    fn negotiated() -> NegotiatedProtocol {
        NegotiatedProtocol {
            protocol_version: McpVersion::LATEST,
            client_info: Implementation::new("agent", "1.0"),
            client_capabilities: ClientCapabilities::default(),
        }
    }

    #[test]
    fn test_activation_transitions() {
        let session = session();
        assert_eq!(session.state(), SessionState::Pending);
        assert!(!session.activate(negotiated()).unwrap());
        assert_eq!(session.state(), SessionState::Active);
        assert!(session.activate(negotiated()).unwrap());

        assert!(session.close());
        assert!(!session.close());
        assert!(matches!(
            session.activate(negotiated()),
            Err(SessionError::Closed(_))
        ));
        assert_eq!(session.state(), SessionState::Closed);
    }

    #[tokio::test]
    async fn test_live_push_reaches_stream_in_order() {
        let session = session();
        let mut attachment = session.attach(None, 8).unwrap();
        assert!(attachment.replay.is_empty());

        session.push(json!({"n": 1})).unwrap();
        session.push_all(vec![json!({"n": 2}), json!({"n": 3})]).unwrap();

        for expected in 1..=3 {
            let event = attachment.receiver.recv().await.unwrap();
            assert_eq!(event.id, expected);
            assert_eq!(event.data["n"], expected);
        }
    }

    #[tokio::test]
    async fn test_reattach_displaces_previous_stream() {
        let session = session();
        let mut first = session.attach(None, 8).unwrap();
        let second = session.attach(None, 8).unwrap();
        assert!(second.replaced);

        // the displaced receiver sees its channel close
        assert!(first.receiver.recv().await.is_none());
        // and its late detach does not touch the new stream
        assert!(!session.detach(&first.connection_id));
        assert!(session.has_stream());
        assert!(session.detach(&second.connection_id));
        assert!(!session.has_stream());
    }

    #[test]
    fn test_undelivered_events_replay_on_plain_attach() {
        let session = session();
        session.push(json!("a")).unwrap();
        session.push(json!("b")).unwrap();

        let attachment = session.attach(None, 8).unwrap();
        let ids: Vec<u64> = attachment.replay.iter().map(|e| e.id).collect();
        assert_eq!(ids, vec![1, 2]);

        session.mark_delivered(2);
        session.detach(&attachment.connection_id);
        assert!(session.attach(None, 8).unwrap().replay.is_empty());
    }

    #[test]
    fn test_resume_cursor_replays_and_acknowledges() {
        let session = session();
        for n in 0..3 {
            session.push(json!(n)).unwrap();
        }
        let attachment = session.attach(Some(1), 8).unwrap();
        let ids: Vec<u64> = attachment.replay.iter().map(|e| e.id).collect();
        assert_eq!(ids, vec![2, 3]);
        assert_eq!(session.buffered_events(), 2);
    }

    #[test]
    fn test_resume_before_window_is_unavailable() {
        let session = session();
        for n in 0..6 {
            session.push(json!(n)).unwrap();
        }
        let err = session.attach(Some(1), 8).unwrap_err();
        assert!(matches!(
            err,
            SessionError::ReplayUnavailable {
                requested: 1,
                oldest_available: Some(3),
                ..
            }
        ));
        // a failed resume does not bind anything
        assert!(!session.has_stream());
    }

    #[test]
    fn test_full_channel_detaches_but_keeps_event() {
        let session = session();
        let attachment = session.attach(None, 1).unwrap();
        session.push(json!(1)).unwrap();
        session.push(json!(2)).unwrap();

        assert!(!session.has_stream());
        assert_eq!(session.last_event_id(), 2);
        let resumed = session.attach(Some(1), 4).unwrap();
        assert_eq!(resumed.replay.len(), 1);
        assert_eq!(resumed.replay[0].id, 2);
        drop(attachment);
    }

    #[test]
    fn test_push_after_close_fails() {
        let session = session();
        session.close();
        assert!(matches!(session.push(json!(1)), Err(SessionError::Closed(_))));
        assert!(session.attach(None, 1).is_err());
    }

    #[test]
    fn test_replay_grace_expiry() {
        let session = session();
        let attachment = session.attach(None, 4).unwrap();
        session.push(json!(1)).unwrap();
        session.detach(&attachment.connection_id);

        let now = now_millis();
        assert_eq!(session.expire_replay(now, 60_000), 0);
        assert_eq!(session.expire_replay(now + 60_000, 60_000), 1);
        assert!(matches!(
            session.attach(Some(0), 4),
            Err(SessionError::ReplayUnavailable { .. })
        ));
    }
}
