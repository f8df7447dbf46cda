//! Session lifecycle gate run before every handler

use std::sync::Arc;

use async_trait::async_trait;
use tracing::debug;

use cms_mcp_json_rpc_server::{DispatchMiddleware, SessionContext};
use cms_mcp_protocol::{McpError, McpResult, methods};
use cms_mcp_session_storage::{SessionRegistry, SessionState};

/// Methods a `Pending` session may call
fn allowed_before_initialize(method: &str) -> bool {
    method == methods::INITIALIZE || method == methods::PING || method.starts_with("notifications/")
}

/// Rejects calls on unknown or closed sessions, and anything but the handshake while `Pending`
pub struct LifecycleGuard {
    registry: Arc<SessionRegistry>,
}

impl LifecycleGuard {
    pub fn new(registry: Arc<SessionRegistry>) -> Self {
        Self { registry }
    }
}

#[async_trait]
impl DispatchMiddleware for LifecycleGuard {
    type Error = McpError;

    async fn before_dispatch(&self, method: &str, session_context: &SessionContext) -> McpResult<()> {
        let session_id = &session_context.session_id;
        let session = self
            .registry
            .resolve(session_id)
            .await
            .map_err(|_| McpError::SessionNotFound(session_id.clone()))?;

        match session.state() {
            SessionState::Active => Ok(()),
            SessionState::Pending if allowed_before_initialize(method) => Ok(()),
            SessionState::Pending => {
                debug!(
                    "Session {}: '{}' rejected before initialize",
                    session_id, method
                );
                Err(McpError::SessionNotInitialized(session_id.clone()))
            }
            SessionState::Closed => Err(McpError::SessionNotFound(session_id.clone())),
        }
    }
}
