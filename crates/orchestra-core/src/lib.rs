use serde::{Deserialize, Serialize};
use std::fmt;

pub mod envelope;
pub mod event_log;
pub mod highlight;
pub mod normalize;
pub mod registry;
pub mod summary;

pub use envelope::{Envelope, EnvelopeError, HelloPayload};
pub use event_log::{EventLog, EventLogEntry, EVENT_LOG_CAPACITY};
pub use highlight::HighlightCursor;
pub use normalize::{classify, extract_run, payload_preview, Inbound};
pub use registry::{RunRegistry, Upsert, RUN_REGISTRY_CAPACITY};
pub use summary::RunSummary;

#[derive(Debug, Clone, Copy, Serialize, Deserialize, PartialEq, Eq, Hash)]
#[serde(rename_all = "lowercase")]
pub enum RunStatus {
    Running,
    Completed,
    Failed,
}

impl Default for RunStatus {
    fn default() -> Self {
        Self::Running
    }
}

impl RunStatus {
    pub fn as_str(&self) -> &'static str {
        match self {
            RunStatus::Running => "running",
            RunStatus::Completed => "completed",
            RunStatus::Failed => "failed",
        }
    }

    /// Maps whatever status word the daemon sent onto the closed set.
    /// Never fails: unrecognised or missing values are treated as still running.
    pub fn from_daemon(raw: Option<&str>) -> Self {
        let normalized = raw.unwrap_or_default().to_lowercase();
        match normalized.as_str() {
            "success" | "completed" => RunStatus::Completed,
            "failed" | "error" => RunStatus::Failed,
            _ => RunStatus::Running,
        }
    }
}

impl fmt::Display for RunStatus {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(self.as_str())
    }
}

#[derive(Debug, Clone, Serialize, Deserialize, PartialEq, Eq)]
#[serde(rename_all = "camelCase")]
pub struct RunRecord {
    pub run_id: String,
    pub agent: String,
    pub task: String,
    pub status: RunStatus,
    pub timestamp: String,
}

impl RunRecord {
    pub fn new(
        run_id: impl Into<String>,
        agent: impl Into<String>,
        task: impl Into<String>,
        status: RunStatus,
        timestamp: impl Into<String>,
    ) -> Self {
        Self {
            run_id: run_id.into(),
            agent: agent.into(),
            task: task.into(),
            status,
            timestamp: timestamp.into(),
        }
    }

    /// Folds a later update for the same run into this record. The key is never touched.
    pub fn merge_from(&mut self, update: RunRecord) {
        let RunRecord {
            run_id: _,
            agent,
            task,
            status,
            timestamp,
        } = update;
        self.agent = agent;
        self.task = task;
        self.status = status;
        self.timestamp = timestamp;
    }
}

#[derive(Debug, Clone, Copy, Serialize, Deserialize, PartialEq, Eq, Hash)]
#[serde(rename_all = "snake_case")]
pub enum ConnectionState {
    Idle,
    Connecting,
    Connected,
    Disconnected,
    Error,
    Disabled,
}

impl Default for ConnectionState {
    fn default() -> Self {
        Self::Idle
    }
}

impl ConnectionState {
    pub fn as_str(self) -> &'static str {
        match self {
            Self::Idle => "idle",
            Self::Connecting => "connecting",
            Self::Connected => "connected",
            Self::Disconnected => "disconnected",
            Self::Error => "error",
            Self::Disabled => "disabled",
        }
    }

    pub fn label(self) -> &'static str {
        match self {
            Self::Idle => "Idle",
            Self::Connecting => "Connecting",
            Self::Connected => "Connected",
            Self::Disconnected => "Disconnected",
            Self::Error => "Error",
            Self::Disabled => "Disabled",
        }
    }
}

impl fmt::Display for ConnectionState {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(self.as_str())
    }
}
