use orchestra_core::RunRecord;
use std::time::Duration;
use thiserror::Error;
use url::Url;

pub const DEFAULT_CLIENT_ID: &str = "orchestra-live";
pub const CLIENT_VERSION: &str = env!("CARGO_PKG_VERSION");
pub const DEFAULT_RECONNECT_DELAY: Duration = Duration::from_secs(5);
pub const DEFAULT_HIGHLIGHT_INTERVAL: Duration = Duration::from_secs(4);
const TOKEN_PARAM: &str = "token";

/// Everything the connection manager needs, handed over at construction.
#[derive(Clone, Debug)]
pub struct LiveConfig {
    pub daemon_url: Option<String>,
    pub token: Option<String>,
    pub client_id: String,
    pub client_version: String,
    pub reconnect_delay: Duration,
    pub highlight_interval: Duration,
    pub seed_runs: Vec<RunRecord>,
}

impl Default for LiveConfig {
    fn default() -> Self {
        Self {
            daemon_url: None,
            token: None,
            client_id: DEFAULT_CLIENT_ID.to_string(),
            client_version: CLIENT_VERSION.to_string(),
            reconnect_delay: DEFAULT_RECONNECT_DELAY,
            highlight_interval: DEFAULT_HIGHLIGHT_INTERVAL,
            seed_runs: Vec::new(),
        }
    }
}

#[derive(Debug, Clone, PartialEq, Eq, Error)]
pub enum ConfigError {
    #[error("invalid daemon url '{url}': {reason}")]
    InvalidUrl { url: String, reason: String },
}

impl LiveConfig {
    pub fn with_daemon_url(mut self, url: impl Into<String>) -> Self {
        self.daemon_url = Some(url.into());
        self
    }

    pub fn with_token(mut self, token: impl Into<String>) -> Self {
        self.token = Some(token.into());
        self
    }

    /// Resolves the address to dial. `Ok(None)` means the live feed is switched off.
    pub fn endpoint(&self) -> Result<Option<Url>, ConfigError> {
        let Some(raw) = self
            .daemon_url
            .as_deref()
            .map(str::trim)
            .filter(|value| !value.is_empty())
        else {
            return Ok(None);
        };
        let mut url = Url::parse(raw).map_err(|err| ConfigError::InvalidUrl {
            url: raw.to_string(),
            reason: err.to_string(),
        })?;
        if !matches!(url.scheme(), "ws" | "wss") {
            return Err(ConfigError::InvalidUrl {
                url: raw.to_string(),
                reason: format!("unsupported scheme '{}'", url.scheme()),
            });
        }
        if let Some(token) = self
            .token
            .as_deref()
            .map(str::trim)
            .filter(|value| !value.is_empty())
        {
            let pair = format!("{TOKEN_PARAM}={}", encode_query_component(token));
            let query = match url.query().filter(|existing| !existing.is_empty()) {
                Some(existing) => format!("{existing}&{pair}"),
                None => pair,
            };
            url.set_query(Some(&query));
        }
        Ok(Some(url))
    }
}

/// Percent-encodes everything outside `A-Z a-z 0-9 - _ . ! ~ * ' ( )`, so a space
/// becomes `%20` rather than the form-encoded `+`.
fn encode_query_component(value: &str) -> String {
    let mut encoded = String::with_capacity(value.len() * 3);
    for byte in value.bytes() {
        match byte {
            b'A'..=b'Z'
            | b'a'..=b'z'
            | b'0'..=b'9'
            | b'-'
            | b'_'
            | b'.'
            | b'!'
            | b'~'
            | b'*'
            | b'\''
            | b'('
            | b')' => encoded.push(byte as char),
            _ => encoded.push_str(&format!("%{byte:02X}")),
        }
    }
    encoded
}
