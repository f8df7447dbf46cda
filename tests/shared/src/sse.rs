use std::pin::Pin;
use std::time::Duration;

use anyhow::{Context, anyhow};
use bytes::Bytes;
use futures::{Stream, StreamExt};
use serde_json::Value;

/// One parsed SSE event
#[derive(Debug, Clone, PartialEq)]
pub struct SseEvent {
    pub id: Option<u64>,
    pub event: String,
    pub data: String,
}

impl SseEvent {
    fn parse(block: &str) -> Option<Self> {
        let mut id = None;
        let mut event = "message".to_string();
        let mut data: Vec<&str> = Vec::new();
        for line in block.lines() {
            if let Some(value) = line.strip_prefix("id: ") {
                id = value.trim().parse().ok();
            } else if let Some(value) = line.strip_prefix("event: ") {
                event = value.trim().to_string();
            } else if let Some(value) = line.strip_prefix("data: ") {
                data.push(value);
            }
        }
        // comment-only blocks are keepalives
        if data.is_empty() && id.is_none() {
            return None;
        }
        Some(Self {
            id,
            event,
            data: data.join("\n"),
        })
    }

    pub fn json(&self) -> anyhow::Result<Value> {
        serde_json::from_str(&self.data).with_context(|| format!("event data: {}", self.data))
    }
}

type ByteStream = Pin<Box<dyn Stream<Item = reqwest::Result<Bytes>> + Send>>;

/// Incremental reader over a `text/event-stream` response
pub struct SseReader {
    stream: ByteStream,
    buffer: String,
    timeout: Duration,
}

impl SseReader {
    pub fn new(response: reqwest::Response) -> Self {
        Self {
            stream: Box::pin(response.bytes_stream()),
            buffer: String::new(),
            timeout: Duration::from_secs(5),
        }
    }

    /// Next non-keepalive event; errors on timeout or end of stream
    pub async fn next_event(&mut self) -> anyhow::Result<SseEvent> {
        let limit = self.timeout;
        tokio::time::timeout(limit, self.read_event())
            .await
            .map_err(|_| anyhow!("no SSE event within {:?}", limit))?
    }

    /// Next event's JSON payload
    pub async fn next_json(&mut self) -> anyhow::Result<Value> {
        self.next_event().await?.json()
    }

    /// True once the server has closed the stream
    pub async fn closed(&mut self) -> bool {
        let limit = self.timeout;
        loop {
            match tokio::time::timeout(limit, self.stream.next()).await {
                Ok(None) | Ok(Some(Err(_))) => return true,
                Ok(Some(Ok(_))) => continue,
                Err(_) => return false,
            }
        }
    }

    async fn read_event(&mut self) -> anyhow::Result<SseEvent> {
        loop {
            while let Some(end) = self.buffer.find("\n\n") {
                let block: String = self.buffer.drain(..end + 2).collect();
                if let Some(event) = SseEvent::parse(&block) {
                    return Ok(event);
                }
            }
            let chunk = self
                .stream
                .next()
                .await
                .ok_or_else(|| anyhow!("event stream ended"))??;
            self.buffer.push_str(std::str::from_utf8(&chunk)?);
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_parse_message_block() {
        let event = SseEvent::parse("id: 4\nevent: message\ndata: {\"id\":1}\n\n").unwrap();
        assert_eq!(event.id, Some(4));
        assert_eq!(event.event, "message");
        assert_eq!(event.json().unwrap()["id"], 1);
    }

    #[test]
    fn test_keepalive_is_skipped() {
        assert!(SseEvent::parse(": keepalive\n\n").is_none());
    }
}
