//! Shared E2E Test Utilities
//!
//! Runs a [`cms_mcp_server::McpServer`] on an ephemeral port inside the test process and talks to it over real
//! HTTP with reqwest.

mod client;
mod server;
mod sse;
mod tools;

pub use client::{DEFAULT_PROTOCOL_VERSION, LegacyTestClient, McpTestClient};
pub use server::TestServer;
pub use sse::{SseEvent, SseReader};
pub use tools::content_server;

pub const SESSION_HEADER: &str = "Mcp-Session-Id";
pub const LAST_EVENT_ID_HEADER: &str = "Last-Event-ID";

/// Install a test subscriber once; later calls are no-ops
pub fn init_tracing() {
    let _ = tracing_subscriber::fmt()
        .with_env_filter(
            tracing_subscriber::EnvFilter::try_from_default_env()
                .unwrap_or_else(|_| tracing_subscriber::EnvFilter::new("warn")),
        )
        .with_test_writer()
        .try_init();
}
