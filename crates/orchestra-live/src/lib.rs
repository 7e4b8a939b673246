//! Live view over an agent-orchestration daemon: one WebSocket feed folded into a bounded
//! run registry, a recent-event log and a rotating highlight.

pub mod config;
pub mod manager;
pub mod state;
pub mod transport;

pub use config::{ConfigError, LiveConfig};
pub use manager::{ConnectionManager, LiveHandle};
pub use state::{LiveSnapshot, LiveState};
pub use transport::{TransportEvent, TRANSPORT_ERROR_MESSAGE};
