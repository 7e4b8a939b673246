use crate::envelope::Envelope;
use crate::normalize::payload_preview;
use chrono::{DateTime, Local};
use serde::{Deserialize, Serialize};
use std::collections::VecDeque;
use uuid::Uuid;

pub const EVENT_LOG_CAPACITY: usize = 20;
pub const EVENT_TIME_FORMAT: &str = "%H:%M:%S";

#[derive(Debug, Clone, Serialize, Deserialize, PartialEq, Eq)]
#[serde(rename_all = "camelCase")]
pub struct EventLogEntry {
    pub id: String,
    #[serde(rename = "type")]
    pub kind: String,
    pub from: String,
    pub received_at: String,
    pub payload_preview: String,
}

impl EventLogEntry {
    pub fn from_envelope(envelope: &Envelope, received_at: DateTime<Local>) -> Self {
        Self {
            id: Uuid::new_v4().to_string(),
            kind: envelope.kind_or_unknown().to_string(),
            from: envelope.sender().to_string(),
            received_at: received_at.format(EVENT_TIME_FORMAT).to_string(),
            payload_preview: payload_preview(envelope.payload.as_ref()),
        }
    }
}

#[derive(Debug, Clone)]
pub struct EventLog {
    entries: VecDeque<EventLogEntry>,
    capacity: usize,
}

impl Default for EventLog {
    fn default() -> Self {
        Self::new()
    }
}

impl EventLog {
    pub fn new() -> Self {
        Self::with_capacity(EVENT_LOG_CAPACITY)
    }

    pub fn with_capacity(capacity: usize) -> Self {
        Self {
            entries: VecDeque::with_capacity(capacity.min(EVENT_LOG_CAPACITY)),
            capacity,
        }
    }

    pub fn push(&mut self, entry: EventLogEntry) {
        self.entries.push_front(entry);
        self.entries.truncate(self.capacity);
    }

    pub fn len(&self) -> usize {
        self.entries.len()
    }

    pub fn is_empty(&self) -> bool {
        self.entries.is_empty()
    }

    pub fn latest(&self) -> Option<&EventLogEntry> {
        self.entries.front()
    }

    pub fn iter(&self) -> impl Iterator<Item = &EventLogEntry> {
        self.entries.iter()
    }

    pub fn to_vec(&self) -> Vec<EventLogEntry> {
        self.entries.iter().cloned().collect()
    }
}
