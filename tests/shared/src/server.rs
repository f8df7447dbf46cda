use std::net::SocketAddr;

use tokio::net::TcpListener;
use tokio::task::JoinHandle;
use tracing::{debug, error};

use cms_mcp_server::McpServer;

/// A server bound to `127.0.0.1:0`, stopped when dropped
pub struct TestServer {
    addr: SocketAddr,
    server: McpServer,
    task: JoinHandle<()>,
}

impl TestServer {
    pub async fn start(server: McpServer) -> anyhow::Result<Self> {
        let listener = TcpListener::bind("127.0.0.1:0").await?;
        let addr = listener.local_addr()?;
        debug!("Test server on {}", addr);

        let serving = server.clone();
        let task = tokio::spawn(async move {
            if let Err(e) = serving.serve(listener).await {
                error!("Test server stopped: {}", e);
            }
        });

        Ok(Self { addr, server, task })
    }

    pub fn port(&self) -> u16 {
        self.addr.port()
    }

    pub fn base_url(&self) -> String {
        format!("http://{}", self.addr)
    }

    pub fn url(&self, path: &str) -> String {
        format!("{}{}", self.base_url(), path)
    }

    pub fn server(&self) -> &McpServer {
        &self.server
    }
}

impl Drop for TestServer {
    fn drop(&mut self) {
        self.task.abort();
    }
}
