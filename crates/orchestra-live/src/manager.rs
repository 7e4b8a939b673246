use crate::config::LiveConfig;
use crate::state::{LiveSnapshot, LiveState};
use crate::transport::{is_shut_down, transport_loop, wait_for_shutdown, ClientIdentity, TransportEvent};
use chrono::Local;
use std::time::Duration;
use tokio::{
    sync::{mpsc, watch},
    task::JoinHandle,
    time::{interval_at, Instant, Interval, MissedTickBehavior},
};
use tracing::{debug, info, warn};

pub const EVENT_QUEUE_CAPACITY: usize = 256;

/// Owns the live state for one daemon feed. All mutation happens on a single task.
pub struct ConnectionManager;

impl ConnectionManager {
    /// Spawns the manager (and, when an address is configured, the transport) on the
    /// current tokio runtime. The address is resolved up front so the first snapshot
    /// already reflects `disabled` or a rejected address.
    pub fn start(config: LiveConfig) -> LiveHandle {
        let mut state = LiveState::new(config.seed_runs.clone());
        let endpoint = match config.endpoint() {
            Ok(Some(url)) => Some(url),
            Ok(None) => {
                info!(event = "live_feed_disabled");
                state.disable();
                None
            }
            Err(err) => {
                warn!("daemon_config_error: {err}");
                state.reject_config(&err);
                None
            }
        };

        let (snapshot_tx, snapshot_rx) = watch::channel(state.snapshot());
        let (shutdown_tx, shutdown_rx) = watch::channel(false);
        let (event_tx, event_rx) = mpsc::channel(EVENT_QUEUE_CAPACITY);

        let transport = endpoint.map(|url| {
            info!(event = "live_feed_start", url = %redact(&url));
            let identity = ClientIdentity {
                client_id: config.client_id.clone(),
                version: config.client_version.clone(),
            };
            tokio::spawn(transport_loop(
                url,
                identity,
                config.reconnect_delay,
                event_tx,
                shutdown_rx.clone(),
            ))
        });

        let task = tokio::spawn(manager_loop(
            state,
            event_rx,
            snapshot_tx,
            shutdown_rx,
            config.highlight_interval,
            transport,
        ));

        LiveHandle {
            snapshots: snapshot_rx,
            shutdown: shutdown_tx,
            task: Some(task),
        }
    }
}

/// Observer side of a running manager. Dropping it requests teardown; `shutdown`
/// additionally waits for both tasks to finish.
pub struct LiveHandle {
    snapshots: watch::Receiver<LiveSnapshot>,
    shutdown: watch::Sender<bool>,
    task: Option<JoinHandle<()>>,
}

impl LiveHandle {
    pub fn subscribe(&self) -> watch::Receiver<LiveSnapshot> {
        self.snapshots.clone()
    }

    pub fn snapshot(&self) -> LiveSnapshot {
        self.snapshots.borrow().clone()
    }

    pub async fn shutdown(mut self) {
        self.shutdown.send_replace(true);
        if let Some(task) = self.task.take() {
            if let Err(err) = task.await {
                warn!("live_manager_join_error: {err}");
            }
        }
    }
}

impl Drop for LiveHandle {
    fn drop(&mut self) {
        self.shutdown.send_replace(true);
    }
}

async fn manager_loop(
    mut state: LiveState,
    mut events: mpsc::Receiver<TransportEvent>,
    snapshots: watch::Sender<LiveSnapshot>,
    mut shutdown: watch::Receiver<bool>,
    highlight_interval: Duration,
    transport: Option<JoinHandle<()>>,
) {
    let mut ticker = highlight_ticker(highlight_interval);
    let mut run_count = state.run_count();

    loop {
        tokio::select! {
            _ = wait_for_shutdown(&mut shutdown) => break,
            Some(event) = events.recv() => {
                if is_shut_down(&shutdown) {
                    break;
                }
                state.apply_transport_event(event, Local::now());
            }
            _ = ticker.tick() => {
                if is_shut_down(&shutdown) {
                    break;
                }
                if !state.advance_highlight() {
                    continue;
                }
            }
        }

        if state.run_count() != run_count {
            run_count = state.run_count();
            ticker.reset();
        }
        snapshots.send_replace(state.snapshot());
    }

    drop(events);
    if let Some(transport) = transport {
        if let Err(err) = transport.await {
            warn!("live_transport_join_error: {err}");
        }
    }
    debug!(event = "live_manager_stopped", runs = state.run_count());
}

fn highlight_ticker(period: Duration) -> Interval {
    let period = period.max(Duration::from_millis(1));
    let mut ticker = interval_at(Instant::now() + period, period);
    ticker.set_missed_tick_behavior(MissedTickBehavior::Delay);
    ticker
}

// Keeps the token out of the log line.
fn redact(url: &url::Url) -> String {
    let mut shown = url.clone();
    shown.set_query(None);
    shown.to_string()
}
