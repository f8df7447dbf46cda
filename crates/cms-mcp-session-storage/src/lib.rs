//! # CMS MCP session storage
//!
//! Sessions live in process memory only. [`SessionRegistry`] owns every [`Session`]; request
//! handlers borrow `Arc<Session>` for the duration of one exchange.

pub mod event;
pub mod registry;
pub mod session;

pub use event::{EventBuffer, OutboundEvent, ReplayGap};
pub use registry::{ReapReport, RegistryStats, SessionConfig, SessionRegistry};
pub use session::{
    NegotiatedProtocol, Session, SessionInfo, SessionState, StreamAttachment, TransportKind,
};

#[derive(Debug, Clone, PartialEq, thiserror::Error)]
pub enum SessionError {
    #[error("Session not found: {0}")]
    NotFound(String),

    #[error("Session closed: {0}")]
    Closed(String),

    #[error("Maximum sessions limit reached: {0}")]
    CapacityExceeded(usize),

    #[error("Could not allocate a unique session identifier")]
    IdentifierExhausted,

    #[error("Replay unavailable for session {session_id}: requested events after {requested}")]
    ReplayUnavailable {
        session_id: String,
        requested: u64,
        oldest_available: Option<u64>,
    },
}

pub type SessionResult<T> = Result<T, SessionError>;

pub(crate) fn now_millis() -> u64 {
    chrono::Utc::now().timestamp_millis().max(0) as u64
}
