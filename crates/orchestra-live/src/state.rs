use crate::config::ConfigError;
use crate::transport::TransportEvent;
use chrono::{DateTime, Local};
use orchestra_core::{
    envelope::parse_envelope, classify, ConnectionState, EventLog, EventLogEntry,
    HighlightCursor, Inbound, RunRecord, RunRegistry, RunSummary,
};
use serde::Serialize;
use tracing::{debug, warn};

pub const PARSE_ERROR_MESSAGE: &str = "Failed to parse daemon payload";
const ACK_TIME_FORMAT: &str = "%H:%M:%S";

/// Read-only view handed to whatever renders the console.
#[derive(Debug, Clone, Serialize, PartialEq, Eq)]
pub struct LiveSnapshot {
    pub connection: ConnectionState,
    pub runs: Vec<RunRecord>,
    pub events: Vec<EventLogEntry>,
    pub highlight: usize,
    pub summary: RunSummary,
    pub last_ack: Option<String>,
    pub last_error: Option<String>,
}

impl Default for LiveSnapshot {
    fn default() -> Self {
        LiveState::new(Vec::new()).snapshot()
    }
}

pub struct LiveState {
    connection: ConnectionState,
    runs: RunRegistry,
    events: EventLog,
    highlight: HighlightCursor,
    last_ack: Option<String>,
    last_error: Option<String>,
}

impl LiveState {
    pub fn new(seed_runs: Vec<RunRecord>) -> Self {
        Self {
            connection: ConnectionState::Idle,
            runs: RunRegistry::with_seed(seed_runs),
            events: EventLog::new(),
            highlight: HighlightCursor::new(),
            last_ack: None,
            last_error: None,
        }
    }

    pub fn disable(&mut self) {
        self.connection = ConnectionState::Disabled;
    }

    pub fn reject_config(&mut self, err: &ConfigError) {
        self.connection = ConnectionState::Error;
        self.last_error = Some(err.to_string());
    }

    pub fn apply_transport_event(&mut self, event: TransportEvent, now: DateTime<Local>) {
        match event {
            TransportEvent::Connecting => {
                self.connection = ConnectionState::Connecting;
                self.last_error = None;
            }
            TransportEvent::Opened => {
                self.connection = ConnectionState::Connected;
            }
            TransportEvent::Message(raw) => self.handle_message(&raw, now),
            TransportEvent::Error(message) => {
                self.connection = ConnectionState::Error;
                self.last_error = Some(message);
            }
            TransportEvent::Closed => {
                self.connection = ConnectionState::Disconnected;
            }
        }
    }

    pub fn handle_message(&mut self, raw: &str, now: DateTime<Local>) {
        let envelope = match parse_envelope(raw) {
            Ok(envelope) => envelope,
            Err(err) => {
                warn!("daemon_payload_error: {err}");
                self.last_error = Some(PARSE_ERROR_MESSAGE.to_string());
                return;
            }
        };
        match classify(&envelope, now) {
            Inbound::Ack => {
                self.last_ack = Some(now.format(ACK_TIME_FORMAT).to_string());
            }
            Inbound::Event { run } => {
                self.events.push(EventLogEntry::from_envelope(&envelope, now));
                if let Some(run) = run {
                    debug!(event = "run_update", run_id = %run.run_id, status = %run.status);
                    self.runs.upsert(run);
                    self.highlight.reset();
                }
            }
        }
    }

    pub fn advance_highlight(&mut self) -> bool {
        self.highlight.advance(self.runs.len())
    }

    pub fn connection(&self) -> ConnectionState {
        self.connection
    }

    pub fn run_count(&self) -> usize {
        self.runs.len()
    }

    pub fn events(&self) -> &EventLog {
        &self.events
    }

    pub fn last_ack(&self) -> Option<&str> {
        self.last_ack.as_deref()
    }

    pub fn last_error(&self) -> Option<&str> {
        self.last_error.as_deref()
    }

    pub fn summary(&self) -> RunSummary {
        RunSummary::from_runs(self.runs.iter())
    }

    pub fn snapshot(&self) -> LiveSnapshot {
        let mut highlight = self.highlight;
        LiveSnapshot {
            connection: self.connection,
            runs: self.runs.to_vec(),
            events: self.events.to_vec(),
            highlight: highlight.observe(self.runs.len()),
            summary: self.summary(),
            last_ack: self.last_ack.clone(),
            last_error: self.last_error.clone(),
        }
    }
}
