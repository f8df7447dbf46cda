//! Outbound events and the bounded per-session replay buffer.

use std::collections::VecDeque;

use serde::{Deserialize, Serialize};
use serde_json::Value;
use tracing::debug;

/// A JSON-RPC message stamped with its per-session sequence number
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct OutboundEvent {
    /// Strictly increasing and gap-free within one session, starting at 1
    pub id: u64,
    /// Unix milliseconds
    pub timestamp: u64,
    pub event_type: String,
    pub data: Value,
}

impl OutboundEvent {
    pub const MESSAGE: &'static str = "message";
}

/// The buffer no longer holds every event after the requested cursor
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub struct ReplayGap {
    pub requested: u64,
    pub oldest_available: Option<u64>,
    pub last_id: u64,
}

#[derive(Debug)]
pub struct EventBuffer {
    events: VecDeque<OutboundEvent>,
    next_id: u64,
    capacity: usize,
}

impl EventBuffer {
    pub fn new(capacity: usize) -> Self {
        Self {
            events: VecDeque::new(),
            next_id: 1,
            capacity: capacity.max(1),
        }
    }

    /// Stamp and retain a message, evicting the oldest event past capacity
    pub fn append(&mut self, data: Value, timestamp: u64) -> OutboundEvent {
        let event = OutboundEvent {
            id: self.next_id,
            timestamp,
            event_type: OutboundEvent::MESSAGE.to_string(),
            data,
        };
        self.next_id += 1;
        self.events.push_back(event.clone());

        while self.events.len() > self.capacity {
            if let Some(evicted) = self.events.pop_front() {
                debug!("Replay buffer full, evicted event {}", evicted.id);
            }
        }
        event
    }

    /// 0 when nothing has been appended yet
    pub fn last_id(&self) -> u64 {
        self.next_id - 1
    }

    pub fn oldest_id(&self) -> Option<u64> {
        self.events.front().map(|e| e.id)
    }

    pub fn len(&self) -> usize {
        self.events.len()
    }

    pub fn is_empty(&self) -> bool {
        self.events.is_empty()
    }

    /// Every event after `cursor`, or a gap when some of them are gone.
    ///
    /// A cursor beyond the last issued id belongs to some other session lifetime and is also
    /// reported as a gap.
    pub fn replay_after(&self, cursor: u64) -> Result<Vec<OutboundEvent>, ReplayGap> {
        let earliest_retained = self.oldest_id().unwrap_or(self.next_id);
        if cursor > self.last_id() || cursor + 1 < earliest_retained {
            return Err(ReplayGap {
                requested: cursor,
                oldest_available: self.oldest_id(),
                last_id: self.last_id(),
            });
        }
        Ok(self.retained_after(cursor))
    }

    /// Whatever is still retained after `cursor`, without gap detection
    pub fn retained_after(&self, cursor: u64) -> Vec<OutboundEvent> {
        self.events
            .iter()
            .filter(|e| e.id > cursor)
            .cloned()
            .collect()
    }

    /// Drop events the client has confirmed by resuming past them
    pub fn acknowledge(&mut self, cursor: u64) -> usize {
        let before = self.events.len();
        while self.events.front().is_some_and(|e| e.id <= cursor) {
            self.events.pop_front();
        }
        before - self.events.len()
    }

    /// Release every retained event. Numbering continues from where it was.
    pub fn clear(&mut self) -> usize {
        let dropped = self.events.len();
        self.events.clear();
        dropped
    }
}
