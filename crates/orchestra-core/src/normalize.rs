use crate::envelope::Envelope;
use crate::{RunRecord, RunStatus};
use chrono::{DateTime, Local, NaiveDateTime, TimeZone};
use serde::Serialize;
use serde_json::{Map, Value};

pub const PAYLOAD_PREVIEW_MAX_CHARS: usize = 120;
pub const PAYLOAD_PREVIEW_KEEP_CHARS: usize = 117;
pub const PREVIEW_TRUNCATION_MARKER: &str = "…";
pub const EMPTY_PAYLOAD_PREVIEW: &str = "—";
pub const UNSERIALIZABLE_PAYLOAD_PREVIEW: &str = "[unserializable payload]";
pub const UNKNOWN_TASK: &str = "Unknown task";
pub const RUN_TIME_FORMAT: &str = "%H:%M";

/// Payload keys accepted for each logical run field, tried in order.
/// New daemon payload shapes are supported by extending these lists.
#[derive(Debug, Clone, Copy)]
pub struct RunFieldAliases {
    pub run_id: &'static [&'static str],
    pub agent: &'static [&'static str],
    pub task: &'static [&'static str],
    pub status: &'static [&'static str],
    pub timestamp: &'static [&'static str],
}

pub const RUN_FIELD_ALIASES: RunFieldAliases = RunFieldAliases {
    run_id: &["runId", "id", "run_id"],
    agent: &["agent", "secondary", "tool"],
    task: &["task", "description"],
    status: &["status", "state"],
    timestamp: &["timestamp", "completed_at"],
};

#[derive(Debug, Clone, PartialEq, Eq)]
pub enum Inbound {
    Ack,
    Event { run: Option<RunRecord> },
}

pub fn classify(envelope: &Envelope, now: DateTime<Local>) -> Inbound {
    if envelope.is_ack() {
        return Inbound::Ack;
    }
    Inbound::Event {
        run: extract_run(envelope, now),
    }
}

pub fn extract_run(envelope: &Envelope, now: DateTime<Local>) -> Option<RunRecord> {
    extract_run_with(envelope, &RUN_FIELD_ALIASES, now)
}

pub fn extract_run_with(
    envelope: &Envelope,
    aliases: &RunFieldAliases,
    now: DateTime<Local>,
) -> Option<RunRecord> {
    let payload = envelope.payload_object()?;
    let run_id = truthy_text(value_by_aliases(payload, aliases.run_id))?;
    let agent = truthy_text(value_by_aliases(payload, aliases.agent))?;
    let status = truthy_text(value_by_aliases(payload, aliases.status))?;
    let task = value_by_aliases(payload, aliases.task)
        .map(display_text)
        .or_else(|| envelope.kind.clone())
        .unwrap_or_else(|| UNKNOWN_TASK.to_string());
    let timestamp = format_run_time(value_by_aliases(payload, aliases.timestamp), now);

    Some(RunRecord {
        run_id,
        agent,
        task,
        status: normalize_status(Some(&status)),
        timestamp,
    })
}

pub fn normalize_status(raw: Option<&str>) -> RunStatus {
    RunStatus::from_daemon(raw)
}

/// Renders a payload for the event log. Absent payloads and payloads that refuse to
/// serialize get fixed placeholders; long renderings are cut with a visible marker.
pub fn payload_preview<T: Serialize + ?Sized>(payload: Option<&T>) -> String {
    let Some(payload) = payload else {
        return EMPTY_PAYLOAD_PREVIEW.to_string();
    };
    let serialized = match serde_json::to_string(payload) {
        Ok(value) => value,
        Err(_) => return UNSERIALIZABLE_PAYLOAD_PREVIEW.to_string(),
    };
    if serialized.chars().count() <= PAYLOAD_PREVIEW_MAX_CHARS {
        return serialized;
    }
    let prefix: String = serialized.chars().take(PAYLOAD_PREVIEW_KEEP_CHARS).collect();
    format!("{prefix}{PREVIEW_TRUNCATION_MARKER}")
}

pub fn format_run_time(raw: Option<&Value>, now: DateTime<Local>) -> String {
    raw.and_then(parse_daemon_time)
        .unwrap_or(now)
        .format(RUN_TIME_FORMAT)
        .to_string()
}

fn parse_daemon_time(raw: &Value) -> Option<DateTime<Local>> {
    match raw {
        Value::String(text) => {
            let text = text.trim();
            if let Ok(parsed) = DateTime::parse_from_rfc3339(text) {
                return Some(parsed.with_timezone(&Local));
            }
            // Offset-less ISO strings are read as local wall time.
            NaiveDateTime::parse_from_str(text, "%Y-%m-%dT%H:%M:%S%.f")
                .ok()
                .and_then(|naive| Local.from_local_datetime(&naive).earliest())
        }
        Value::Number(number) => number
            .as_i64()
            .and_then(|millis| Local.timestamp_millis_opt(millis).single()),
        _ => None,
    }
}

fn value_by_aliases<'a>(payload: &'a Map<String, Value>, aliases: &[&str]) -> Option<&'a Value> {
    aliases
        .iter()
        .find_map(|key| payload.get(*key).filter(|value| !value.is_null()))
}

/// A resolved value still counts as missing when it is empty, `false` or zero.
fn truthy_text(value: Option<&Value>) -> Option<String> {
    match value? {
        Value::Null | Value::Bool(false) => None,
        Value::String(text) if text.is_empty() => None,
        Value::Number(number) if number.as_f64() == Some(0.0) => None,
        other => Some(display_text(other)),
    }
}

fn display_text(value: &Value) -> String {
    match value {
        Value::String(text) => text.clone(),
        other => other.to_string(),
    }
}
