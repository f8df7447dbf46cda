use anyhow::Context;
use reqwest::header::{ACCEPT, CONTENT_TYPE};
use reqwest::{Client, Response, StatusCode};
use serde_json::{Value, json};
use tracing::debug;

use crate::sse::SseReader;
use crate::{LAST_EVENT_ID_HEADER, SESSION_HEADER};

pub const DEFAULT_PROTOCOL_VERSION: &str = "2025-06-18";

/// Streamable HTTP client that remembers its session id
pub struct McpTestClient {
    client: Client,
    base_url: String,
    mcp_path: String,
    session_id: Option<String>,
}

impl McpTestClient {
    pub fn new(base_url: impl Into<String>) -> Self {
        Self {
            client: Client::new(),
            base_url: base_url.into(),
            mcp_path: "/mcp".to_string(),
            session_id: None,
        }
    }

    pub fn session_id(&self) -> Option<&str> {
        self.session_id.as_deref()
    }

    pub fn with_session(mut self, session_id: impl Into<String>) -> Self {
        self.session_id = Some(session_id.into());
        self
    }

    fn endpoint(&self) -> String {
        format!("{}{}", self.base_url, self.mcp_path)
    }

    /// `initialize` at the default protocol version
    pub async fn initialize(&mut self) -> anyhow::Result<Value> {
        self.initialize_with_version(DEFAULT_PROTOCOL_VERSION).await
    }

    /// Send `initialize` and keep the session id the server assigns
    pub async fn initialize_with_version(&mut self, version: &str) -> anyhow::Result<Value> {
        let response = self
            .post(&json!({
                "jsonrpc": "2.0",
                "id": 1,
                "method": "initialize",
                "params": {
                    "protocolVersion": version,
                    "capabilities": {},
                    "clientInfo": {"name": "cms-e2e", "version": "1.0.0"}
                }
            }))
            .await?;

        if let Some(id) = response
            .headers()
            .get(SESSION_HEADER)
            .and_then(|v| v.to_str().ok())
        {
            debug!("Assigned session {}", id);
            self.session_id = Some(id.to_string());
        }
        Ok(response.json().await?)
    }

    /// POST a raw JSON body on the current session
    pub async fn post(&self, body: &Value) -> reqwest::Result<Response> {
        let mut request = self
            .client
            .post(self.endpoint())
            .header(CONTENT_TYPE, "application/json")
            .header(ACCEPT, "application/json, text/event-stream")
            .body(body.to_string());
        if let Some(id) = &self.session_id {
            request = request.header(SESSION_HEADER, id);
        }
        request.send().await
    }

    /// Send a request and decode the direct reply
    pub async fn request(&self, id: i64, method: &str, params: Value) -> anyhow::Result<Value> {
        let response = self
            .post(&json!({"jsonrpc": "2.0", "id": id, "method": method, "params": params}))
            .await?;
        let status = response.status();
        let text = response.text().await?;
        serde_json::from_str(&text).with_context(|| format!("{} reply ({}): {}", method, status, text))
    }

    pub async fn notify(&self, method: &str, params: Value) -> reqwest::Result<StatusCode> {
        Ok(self
            .post(&json!({"jsonrpc": "2.0", "method": method, "params": params}))
            .await?
            .status())
    }

    pub async fn call_tool(&self, id: i64, name: &str, arguments: Value) -> anyhow::Result<Value> {
        self.request(id, "tools/call", json!({"name": name, "arguments": arguments}))
            .await
    }

    /// Open the session's live stream, optionally resuming after `last_event_id`
    pub async fn open_stream(&self, last_event_id: Option<u64>) -> anyhow::Result<SseReader> {
        let response = self.get_stream(last_event_id).await?;
        anyhow::ensure!(
            response.status() == StatusCode::OK,
            "GET stream answered {}",
            response.status()
        );
        Ok(SseReader::new(response))
    }

    pub async fn get_stream(&self, last_event_id: Option<u64>) -> reqwest::Result<Response> {
        let mut request = self
            .client
            .get(self.endpoint())
            .header(ACCEPT, "text/event-stream");
        if let Some(id) = &self.session_id {
            request = request.header(SESSION_HEADER, id);
        }
        if let Some(cursor) = last_event_id {
            request = request.header(LAST_EVENT_ID_HEADER, cursor.to_string());
        }
        request.send().await
    }

    pub async fn delete(&self) -> reqwest::Result<StatusCode> {
        let mut request = self.client.delete(self.endpoint());
        if let Some(id) = &self.session_id {
            request = request.header(SESSION_HEADER, id);
        }
        Ok(request.send().await?.status())
    }
}

/// Legacy HTTP+SSE client: replies arrive on the `GET /sse` stream only
pub struct LegacyTestClient {
    client: Client,
    base_url: String,
    pub session_id: String,
    pub endpoint: String,
    pub events: SseReader,
}

impl LegacyTestClient {
    /// Open `GET /sse` and read the `endpoint` announcement
    pub async fn connect(base_url: impl Into<String>) -> anyhow::Result<Self> {
        let base_url = base_url.into();
        let client = Client::new();
        let response = client
            .get(format!("{}/sse", base_url))
            .header(ACCEPT, "text/event-stream")
            .send()
            .await?;
        anyhow::ensure!(response.status() == StatusCode::OK, "GET /sse answered {}", response.status());

        let session_id = response
            .headers()
            .get(SESSION_HEADER)
            .and_then(|v| v.to_str().ok())
            .context("GET /sse without a session header")?
            .to_string();
        let mut events = SseReader::new(response);
        let announcement = events.next_event().await?;
        anyhow::ensure!(
            announcement.event == "endpoint",
            "first event was {}",
            announcement.event
        );

        Ok(Self {
            client,
            base_url,
            session_id,
            endpoint: announcement.data,
            events,
        })
    }

    /// POST to the announced endpoint; the status is all the POST carries
    pub async fn send(&self, body: &Value) -> reqwest::Result<StatusCode> {
        Ok(self
            .client
            .post(format!("{}{}", self.base_url, self.endpoint))
            .header(CONTENT_TYPE, "application/json")
            .body(body.to_string())
            .send()
            .await?
            .status())
    }
}
