//! Content management backend over MCP
//!
//! Serves the streamable HTTP transport on `/mcp` (plus `/message`, `/listen`, `/disconnect`) and
//! the legacy `/sse` + `/messages` pair. Every setting has a `CMS_MCP_*` environment fallback.

mod store;
mod tools;

use std::net::SocketAddr;
use std::sync::Arc;
use std::time::Duration;

use clap::Parser;
use tracing::info;
use tracing_subscriber::EnvFilter;

use cms_mcp_server::{McpServer, SessionConfig, StreamConfig};

use crate::store::ContentStore;

#[derive(Parser, Debug)]
#[command(name = "content-server")]
#[command(about = "In-memory CMS exposed as MCP tools over HTTP")]
struct Args {
    /// Address to listen on
    #[arg(long, env = "CMS_MCP_BIND", default_value = "127.0.0.1:8000")]
    bind: SocketAddr,

    #[arg(long, env = "CMS_MCP_PATH", default_value = "/mcp")]
    mcp_path: String,

    /// Disable the legacy GET /sse + POST /messages transport
    #[arg(long, env = "CMS_MCP_NO_LEGACY_SSE")]
    no_legacy_sse: bool,

    #[arg(long, env = "CMS_MCP_NO_CORS")]
    no_cors: bool,

    /// Largest accepted request body, in bytes
    #[arg(long, env = "CMS_MCP_MAX_BODY_SIZE", default_value_t = 1024 * 1024)]
    max_body_size: usize,

    /// Idle sessions without a stream are reaped after this many seconds
    #[arg(long, env = "CMS_MCP_IDLE_TIMEOUT_SECS", default_value_t = 30 * 60)]
    idle_timeout_secs: u64,

    /// How long events stay resumable after a stream disconnects
    #[arg(long, env = "CMS_MCP_REPLAY_GRACE_SECS", default_value_t = 5 * 60)]
    replay_grace_secs: u64,

    #[arg(long, env = "CMS_MCP_MAX_BUFFERED_EVENTS", default_value_t = 256)]
    max_buffered_events: usize,

    /// Cap on concurrent sessions (unlimited when unset)
    #[arg(long, env = "CMS_MCP_MAX_SESSIONS")]
    max_sessions: Option<usize>,

    /// Seconds between idle-session sweeps
    #[arg(long, env = "CMS_MCP_REAPER_INTERVAL_SECS", default_value_t = 5)]
    reaper_interval_secs: u64,

    #[arg(long, env = "CMS_MCP_KEEPALIVE_SECS", default_value_t = 15)]
    keepalive_secs: u64,

    /// Per-stream outbound queue; a stream that falls this far behind is detached
    #[arg(long, env = "CMS_MCP_CHANNEL_BUFFER_SIZE", default_value_t = 256)]
    channel_buffer_size: usize,

    /// Log filter; RUST_LOG takes precedence
    #[arg(long, env = "CMS_MCP_LOG_LEVEL", default_value = "info")]
    log_level: String,
}

impl Args {
    fn session_config(&self) -> SessionConfig {
        SessionConfig {
            idle_timeout: Duration::from_secs(self.idle_timeout_secs),
            replay_grace: Duration::from_secs(self.replay_grace_secs),
            max_buffered_events: self.max_buffered_events,
            max_sessions: self.max_sessions,
            reaper_interval: Duration::from_secs(self.reaper_interval_secs),
        }
    }

    fn stream_config(&self) -> StreamConfig {
        StreamConfig {
            channel_buffer_size: self.channel_buffer_size,
            keepalive_interval: Duration::from_secs(self.keepalive_secs),
        }
    }
}

#[tokio::main]
async fn main() -> anyhow::Result<()> {
    let args = Args::parse();

    let filter = EnvFilter::try_from_default_env().unwrap_or_else(|_| EnvFilter::new(&args.log_level));
    tracing_subscriber::fmt()
        .with_env_filter(filter)
        .with_target(false)
        .init();

    let store = Arc::new(ContentStore::with_sample_content());
    info!(
        "Loaded {} sections and {} entries",
        store.section_count().await,
        store.entry_count().await
    );

    let url = format!("http://{}{}", args.bind, args.mcp_path);
    let session_config = args.session_config();
    let stream_config = args.stream_config();
    let server = McpServer::builder()
        .name("content-server")
        .version(env!("CARGO_PKG_VERSION"))
        .title("CMS Content Server")
        .instructions(
            "Manage sections, entries and drafts. Drafts are published with publish_draft, \
             which reports progress when a progressToken is supplied.",
        )
        .typed_tool(tools::ListSections::new(Arc::clone(&store)))
        .typed_tool(tools::ListEntries::new(Arc::clone(&store)))
        .typed_tool(tools::GetEntry::new(Arc::clone(&store)))
        .typed_tool(tools::CreateEntry::new(Arc::clone(&store)))
        .typed_tool(tools::UpdateEntry::new(Arc::clone(&store)))
        .typed_tool(tools::DeleteEntry::new(Arc::clone(&store)))
        .typed_tool(tools::CreateDraft::new(Arc::clone(&store)))
        .typed_tool(tools::PublishDraft::new(Arc::clone(&store)))
        .bind_address(args.bind)
        .mcp_path(args.mcp_path)
        .sse(!args.no_legacy_sse)
        .cors(!args.no_cors)
        .max_body_size(args.max_body_size)
        .session_config(session_config)
        .stream_config(stream_config)
        .build()?;

    info!("Server URL: {}", url);
    server.run().await?;
    Ok(())
}
