use chrono::Utc;
use futures_util::{SinkExt, StreamExt};
use orchestra_core::envelope::{encode_envelope, hello_envelope, EnvelopeError, HelloPayload};
use std::time::Duration;
use tokio::{
    net::TcpStream,
    sync::{mpsc, watch},
};
use tokio_tungstenite::{connect_async, tungstenite::Message, MaybeTlsStream, WebSocketStream};
use tracing::{debug, info, warn};
use url::Url;

pub const TRANSPORT_ERROR_MESSAGE: &str = "WebSocket reported an error";

type DaemonSocket = WebSocketStream<MaybeTlsStream<TcpStream>>;

/// What the transport task reports to the owner of the live state, in wire order.
#[derive(Debug, Clone, PartialEq, Eq)]
pub enum TransportEvent {
    Connecting,
    Opened,
    Message(String),
    Error(String),
    Closed,
}

#[derive(Clone, Debug)]
pub struct ClientIdentity {
    pub client_id: String,
    pub version: String,
}

enum SessionEnd {
    Closed,
    Failed(String),
    Shutdown,
}

/// Dials the daemon, forwards every frame, and redials a fixed delay after each close
/// until `shutdown` flips to `true` or its sender goes away.
pub async fn transport_loop(
    url: Url,
    identity: ClientIdentity,
    reconnect_delay: Duration,
    tx: mpsc::Sender<TransportEvent>,
    mut shutdown: watch::Receiver<bool>,
) {
    loop {
        if is_shut_down(&shutdown) {
            break;
        }
        if !forward(&tx, TransportEvent::Connecting, &mut shutdown).await {
            break;
        }

        let connect = tokio::select! {
            _ = wait_for_shutdown(&mut shutdown) => break,
            result = connect_async(url.as_str()) => result,
        };

        match connect {
            Ok((mut ws, _)) => {
                info!(event = "daemon_connected", host = url.host_str().unwrap_or_default());
                if !forward(&tx, TransportEvent::Opened, &mut shutdown).await {
                    let _ = ws.close(None).await;
                    break;
                }
                let end = match send_hello(&mut ws, &identity).await {
                    Ok(()) => read_session(&mut ws, &tx, &mut shutdown).await,
                    Err(err) => SessionEnd::Failed(err),
                };
                match end {
                    SessionEnd::Shutdown => {
                        let _ = ws.close(None).await;
                        break;
                    }
                    SessionEnd::Failed(err) => {
                        warn!("daemon_transport_error: {err}");
                        let error = TransportEvent::Error(TRANSPORT_ERROR_MESSAGE.to_string());
                        if !forward(&tx, error, &mut shutdown).await {
                            break;
                        }
                    }
                    SessionEnd::Closed => {
                        let _ = ws.close(None).await;
                    }
                }
                info!(event = "daemon_disconnected");
            }
            Err(err) => {
                warn!("daemon_connect_error: {err}");
                let error = TransportEvent::Error(TRANSPORT_ERROR_MESSAGE.to_string());
                if !forward(&tx, error, &mut shutdown).await {
                    break;
                }
            }
        }

        if !forward(&tx, TransportEvent::Closed, &mut shutdown).await {
            break;
        }

        tokio::select! {
            _ = wait_for_shutdown(&mut shutdown) => break,
            _ = tokio::time::sleep(reconnect_delay) => {}
        }
        debug!(event = "daemon_reconnect", delay_ms = reconnect_delay.as_millis() as u64);
    }
}

/// Queues one event for the manager. Returns `false` once teardown has been requested or
/// the manager is gone; a full queue never outlives teardown.
async fn forward(
    tx: &mpsc::Sender<TransportEvent>,
    event: TransportEvent,
    shutdown: &mut watch::Receiver<bool>,
) -> bool {
    tokio::select! {
        biased;
        _ = wait_for_shutdown(shutdown) => false,
        sent = tx.send(event) => sent.is_ok(),
    }
}

pub fn build_hello(identity: &ClientIdentity) -> Result<String, EnvelopeError> {
    let envelope = hello_envelope(&HelloPayload {
        client: identity.client_id.clone(),
        version: identity.version.clone(),
        ts: Utc::now().to_rfc3339(),
    })?;
    encode_envelope(&envelope)
}

async fn send_hello(ws: &mut DaemonSocket, identity: &ClientIdentity) -> Result<(), String> {
    let hello = build_hello(identity).map_err(|err| err.to_string())?;
    ws.send(Message::Text(hello))
        .await
        .map_err(|err| format!("hello send failed: {err}"))
}

async fn read_session(
    ws: &mut DaemonSocket,
    tx: &mpsc::Sender<TransportEvent>,
    shutdown: &mut watch::Receiver<bool>,
) -> SessionEnd {
    loop {
        let frame = tokio::select! {
            _ = wait_for_shutdown(shutdown) => return SessionEnd::Shutdown,
            frame = ws.next() => frame,
        };
        let text = match frame {
            Some(Ok(Message::Text(text))) => text,
            Some(Ok(Message::Binary(bytes))) => String::from_utf8_lossy(&bytes).into_owned(),
            Some(Ok(Message::Close(frame))) => {
                debug!(event = "daemon_close_frame", frame = ?frame);
                return SessionEnd::Closed;
            }
            Some(Ok(_)) => continue,
            Some(Err(err)) => return SessionEnd::Failed(err.to_string()),
            None => return SessionEnd::Closed,
        };
        if !forward(tx, TransportEvent::Message(text), shutdown).await {
            return SessionEnd::Shutdown;
        }
    }
}

pub(crate) fn is_shut_down(shutdown: &watch::Receiver<bool>) -> bool {
    *shutdown.borrow()
}

/// Resolves once teardown is requested. A dropped sender counts as teardown.
pub(crate) async fn wait_for_shutdown(shutdown: &mut watch::Receiver<bool>) {
    loop {
        if *shutdown.borrow_and_update() {
            return;
        }
        if shutdown.changed().await.is_err() {
            return;
        }
    }
}
