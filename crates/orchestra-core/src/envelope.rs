use serde::{Deserialize, Deserializer, Serialize};
use serde_json::{Map, Value};
use thiserror::Error;

pub const ACK_TYPE: &str = "ack";
pub const HELLO_TYPE: &str = "hello";
pub const UNKNOWN_TYPE: &str = "unknown";
pub const DEFAULT_SENDER: &str = "daemon";

/// One message unit on the daemon connection. Every field is optional on the wire.
#[derive(Debug, Clone, Default, Serialize, Deserialize, PartialEq)]
pub struct Envelope {
    #[serde(
        rename = "type",
        default,
        skip_serializing_if = "Option::is_none",
        deserialize_with = "deserialize_lenient_string"
    )]
    pub kind: Option<String>,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub payload: Option<Value>,
    #[serde(
        default,
        skip_serializing_if = "Option::is_none",
        deserialize_with = "deserialize_lenient_string"
    )]
    pub from: Option<String>,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub meta: Option<Value>,
    #[serde(default, flatten)]
    pub extra: Map<String, Value>,
}

impl Envelope {
    pub fn is_ack(&self) -> bool {
        self.kind.as_deref() == Some(ACK_TYPE)
    }

    pub fn kind_or_unknown(&self) -> &str {
        self.kind.as_deref().unwrap_or(UNKNOWN_TYPE)
    }

    pub fn sender(&self) -> &str {
        self.from.as_deref().unwrap_or(DEFAULT_SENDER)
    }

    pub fn payload_object(&self) -> Option<&Map<String, Value>> {
        self.payload.as_ref()?.as_object()
    }
}

#[derive(Debug, Clone, Serialize, Deserialize, PartialEq, Eq)]
pub struct HelloPayload {
    pub client: String,
    pub version: String,
    pub ts: String,
}

#[derive(Debug, Clone, PartialEq, Eq, Error)]
pub enum EnvelopeError {
    #[error("envelope decode failed: {0}")]
    Parse(String),
    #[error("envelope encode failed: {0}")]
    Encode(String),
}

/// Only malformed JSON and a bare `null` are rejected. Any other non-object value is
/// valid but carries no fields, so it reads as an empty envelope.
pub fn parse_envelope(raw: &str) -> Result<Envelope, EnvelopeError> {
    let value: Value =
        serde_json::from_str(raw).map_err(|err| EnvelopeError::Parse(err.to_string()))?;
    match value {
        Value::Null => Err(EnvelopeError::Parse("message is null".to_string())),
        Value::Object(_) => {
            serde_json::from_value(value).map_err(|err| EnvelopeError::Parse(err.to_string()))
        }
        _ => Ok(Envelope::default()),
    }
}

pub fn encode_envelope(envelope: &Envelope) -> Result<String, EnvelopeError> {
    serde_json::to_string(envelope).map_err(|err| EnvelopeError::Encode(err.to_string()))
}

pub fn hello_envelope(payload: &HelloPayload) -> Result<Envelope, EnvelopeError> {
    let payload =
        serde_json::to_value(payload).map_err(|err| EnvelopeError::Encode(err.to_string()))?;
    Ok(Envelope {
        kind: Some(HELLO_TYPE.to_string()),
        payload: Some(payload),
        ..Envelope::default()
    })
}

fn deserialize_lenient_string<'de, D>(deserializer: D) -> Result<Option<String>, D::Error>
where
    D: Deserializer<'de>,
{
    let val = Value::deserialize(deserializer)?;
    match val {
        Value::String(s) => Ok(Some(s)),
        _ => Ok(None),
    }
}
