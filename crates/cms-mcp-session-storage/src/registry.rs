//! The session map and its idle reaper.

use std::collections::HashMap;
use std::sync::{Arc, Weak};
use std::time::Duration;

use serde::Serialize;
use tokio::sync::RwLock;
use tokio::task::JoinHandle;
use tracing::{debug, info};
use uuid::Uuid;

use crate::session::{NegotiatedProtocol, Session, SessionState, TransportKind};
use crate::{SessionError, SessionResult, now_millis};

const MAX_ID_ATTEMPTS: usize = 4;

#[derive(Debug, Clone)]
pub struct SessionConfig {
    /// Sessions with no live stream and no activity for this long are terminated
    pub idle_timeout: Duration,
    /// How long buffered events outlive a detached stream
    pub replay_grace: Duration,
    pub max_buffered_events: usize,
    pub max_sessions: Option<usize>,
    pub reaper_interval: Duration,
}

impl Default for SessionConfig {
    fn default() -> Self {
        Self {
            idle_timeout: Duration::from_secs(30 * 60),
            replay_grace: Duration::from_secs(5 * 60),
            max_buffered_events: 256,
            max_sessions: None,
            reaper_interval: Duration::from_secs(5),
        }
    }
}

#[derive(Debug, Clone, Default, PartialEq, Eq, Serialize)]
#[serde(rename_all = "camelCase")]
pub struct RegistryStats {
    pub total: usize,
    pub pending: usize,
    pub active: usize,
    pub streams_attached: usize,
    pub buffered_events: usize,
}

/// Outcome of one reaper sweep
#[derive(Debug, Default)]
pub struct ReapReport {
    pub terminated: Vec<String>,
    pub replay_events_dropped: usize,
}

/// Owns every live session.
///
/// The map lock covers lookup, insert and remove only. Per-session work goes through the
/// session's own lock.
#[derive(Debug, Default)]
pub struct SessionRegistry {
    sessions: RwLock<HashMap<String, Arc<Session>>>,
    config: SessionConfig,
}

impl SessionRegistry {
    pub fn new(config: SessionConfig) -> Self {
        Self {
            sessions: RwLock::new(HashMap::new()),
            config,
        }
    }

    pub fn config(&self) -> &SessionConfig {
        &self.config
    }

    /// Allocate a `Pending` session
    pub async fn create(&self, transport: TransportKind) -> SessionResult<Arc<Session>> {
        let mut sessions = self.sessions.write().await;
        if let Some(max) = self.config.max_sessions
            && sessions.len() >= max
        {
            return Err(SessionError::CapacityExceeded(max));
        }

        for _ in 0..MAX_ID_ATTEMPTS {
            let id = Uuid::now_v7().to_string();
            if sessions.contains_key(&id) {
                continue;
            }
            let session = Arc::new(Session::new(
                id.clone(),
                transport,
                self.config.max_buffered_events,
            ));
            sessions.insert(id.clone(), session.clone());
            info!("Created session {} ({:?})", id, transport);
            return Ok(session);
        }
        Err(SessionError::IdentifierExhausted)
    }

    /// Lookup only; closed or unknown ids are `NotFound`
    pub async fn resolve(&self, session_id: &str) -> SessionResult<Arc<Session>> {
        let session = self
            .sessions
            .read()
            .await
            .get(session_id)
            .cloned()
            .ok_or_else(|| SessionError::NotFound(session_id.to_string()))?;
        if session.is_closed() {
            return Err(SessionError::NotFound(session_id.to_string()));
        }
        Ok(session)
    }

    /// Resolve and bump last activity. The bump happens under the map lock so a sweep that
    /// holds the write lock sees it.
    pub async fn touch(&self, session_id: &str) -> SessionResult<Arc<Session>> {
        let sessions = self.sessions.read().await;
        let session = sessions
            .get(session_id)
            .filter(|session| !session.is_closed())
            .cloned()
            .ok_or_else(|| SessionError::NotFound(session_id.to_string()))?;
        session.touch_at(now_millis());
        Ok(session)
    }

    /// Complete the handshake. Returns `true` when this re-negotiated an active session.
    pub async fn activate(
        &self,
        session_id: &str,
        protocol: NegotiatedProtocol,
    ) -> SessionResult<bool> {
        let session = self.touch(session_id).await?;
        let version = protocol.protocol_version;
        let renegotiated = session.activate(protocol).map_err(|e| match e {
            SessionError::Closed(id) => SessionError::NotFound(id),
            other => other,
        })?;
        if renegotiated {
            info!("Session {} re-negotiated protocol {}", session_id, version);
        } else {
            info!("Session {} active with protocol {}", session_id, version);
        }
        Ok(renegotiated)
    }

    /// Close and forget a session. Idempotent; returns whether anything was closed.
    pub async fn terminate(&self, session_id: &str) -> bool {
        let removed = self.sessions.write().await.remove(session_id);
        match removed {
            Some(session) => {
                let closed = session.close();
                if closed {
                    info!("Terminated session {}", session_id);
                }
                closed
            }
            None => {
                debug!("Terminate for unknown session {}", session_id);
                false
            }
        }
    }

    /// Like [`terminate`](Self::terminate), but only while `predicate` still holds. The check
    /// runs under the map's write lock.
    pub async fn terminate_if<F>(&self, session_id: &str, predicate: F) -> bool
    where
        F: FnOnce(&Session) -> bool,
    {
        let mut sessions = self.sessions.write().await;
        match sessions.get(session_id) {
            Some(session) if predicate(session.as_ref()) => {}
            Some(_) => {
                debug!("Session {} no longer eligible for termination", session_id);
                return false;
            }
            None => return false,
        }
        let removed = sessions.remove(session_id);
        drop(sessions);

        match removed {
            Some(session) if session.close() => {
                info!("Terminated session {}", session_id);
                true
            }
            _ => false,
        }
    }

    pub async fn count(&self) -> usize {
        self.sessions.read().await.len()
    }

    pub async fn list(&self) -> Vec<String> {
        self.sessions.read().await.keys().cloned().collect()
    }

    pub async fn stats(&self) -> RegistryStats {
        let sessions: Vec<Arc<Session>> = self.sessions.read().await.values().cloned().collect();
        let mut stats = RegistryStats {
            total: sessions.len(),
            ..Default::default()
        };
        for session in sessions {
            let info = session.info();
            match info.state {
                SessionState::Pending => stats.pending += 1,
                SessionState::Active => stats.active += 1,
                SessionState::Closed => {}
            }
            if info.stream_attached {
                stats.streams_attached += 1;
            }
            stats.buffered_events += info.buffered_events;
        }
        stats
    }

    /// One sweep at the current wall-clock time
    pub async fn reap(&self) -> ReapReport {
        self.reap_at(now_millis()).await
    }

    /// One sweep as of `now` (Unix milliseconds)
    pub async fn reap_at(&self, now: u64) -> ReapReport {
        let idle_ms = self.config.idle_timeout.as_millis() as u64;
        let grace_ms = self.config.replay_grace.as_millis() as u64;

        let snapshot: Vec<Arc<Session>> = self.sessions.read().await.values().cloned().collect();
        let mut report = ReapReport::default();
        let mut idle = Vec::new();
        for session in snapshot {
            report.replay_events_dropped += session.expire_replay(now, grace_ms);
            if session.is_idle(now, idle_ms) {
                idle.push(session.id().to_string());
            }
        }

        // activity since the snapshot keeps a session alive
        for session_id in idle {
            if self
                .terminate_if(&session_id, |session| session.is_idle(now, idle_ms))
                .await
            {
                report.terminated.push(session_id);
            }
        }

        if !report.terminated.is_empty() || report.replay_events_dropped > 0 {
            info!(
                "Session reaper: terminated {} idle sessions, dropped {} stale replay events",
                report.terminated.len(),
                report.replay_events_dropped
            );
        }
        report
    }

    /// Sweep on `reaper_interval` until the registry is dropped
    pub fn spawn_reaper(self: &Arc<Self>) -> JoinHandle<()> {
        let registry: Weak<Self> = Arc::downgrade(self);
        let period = self.config.reaper_interval;
        tokio::spawn(async move {
            let mut interval = tokio::time::interval(period);
            interval.set_missed_tick_behavior(tokio::time::MissedTickBehavior::Delay);
            loop {
                interval.tick().await;
                let Some(registry) = registry.upgrade() else {
                    debug!("Session registry dropped; reaper exiting");
                    break;
                };
                registry.reap().await;
            }
        })
    }
}
