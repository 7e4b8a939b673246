use clap::Parser;
use orchestra_core::registry::demo_runs;
use orchestra_live::{
    config::{CLIENT_VERSION, DEFAULT_CLIENT_ID},
    ConnectionManager, LiveConfig, LiveSnapshot,
};
use std::{
    env,
    error::Error,
    fs::OpenOptions,
    io::{self, Write},
    path::PathBuf,
    sync::{Arc, Mutex as StdMutex},
    time::Duration,
};
use tracing::{info, warn};
use tracing_subscriber::{fmt::writer::BoxMakeWriter, EnvFilter};

const RECENT_EVENTS_SHOWN: usize = 5;
const TASK_COLUMN_WIDTH: usize = 48;

#[derive(Parser, Debug)]
#[command(name = "orchestra-live")]
struct Args {
    #[arg(long, default_value = "")]
    daemon_url: String,
    #[arg(long, default_value = "")]
    token: String,
    #[arg(long, default_value = "")]
    client_id: String,
    #[arg(long, default_value_t = 5)]
    reconnect_secs: u64,
    #[arg(long, default_value_t = 4)]
    highlight_secs: u64,
    #[arg(long)]
    demo: bool,
    #[arg(long)]
    json: bool,
    #[arg(long, default_value = "")]
    log_dir: String,
}

struct LogGuard {
    file: Option<Arc<StdMutex<std::fs::File>>>,
}

struct MultiWriter {
    file: Option<Arc<StdMutex<std::fs::File>>>,
}

#[tokio::main]
async fn main() -> Result<(), Box<dyn Error>> {
    let args = Args::parse();
    let _log_guard = init_logging(&resolve_log_dir(&args.log_dir));
    let json = args.json;
    let config = load_config(args);

    let handle = ConnectionManager::start(config);
    let mut rx = handle.subscribe();
    print_snapshot(&rx.borrow_and_update(), json)?;

    loop {
        tokio::select! {
            changed = rx.changed() => {
                if changed.is_err() {
                    break;
                }
                let snapshot = rx.borrow_and_update().clone();
                print_snapshot(&snapshot, json)?;
            }
            signal = tokio::signal::ctrl_c() => {
                if let Err(err) = signal {
                    warn!("signal_error: {err}");
                }
                info!(event = "shutdown_requested");
                break;
            }
        }
    }

    handle.shutdown().await;
    Ok(())
}

fn load_config(args: Args) -> LiveConfig {
    LiveConfig {
        daemon_url: resolve_daemon_url(&args.daemon_url),
        token: resolve_token(&args.token),
        client_id: resolve_client_id(&args.client_id),
        client_version: CLIENT_VERSION.to_string(),
        reconnect_delay: Duration::from_secs(args.reconnect_secs.max(1)),
        highlight_interval: Duration::from_secs(args.highlight_secs.max(1)),
        seed_runs: if args.demo { demo_runs() } else { Vec::new() },
    }
}

fn resolve_daemon_url(value: &str) -> Option<String> {
    non_empty(value).or_else(|| env_value("ORCHESTRA_DAEMON_WS_URL"))
}

fn resolve_token(value: &str) -> Option<String> {
    non_empty(value).or_else(|| env_value("ORCHESTRA_DAEMON_TOKEN"))
}

fn resolve_client_id(value: &str) -> String {
    non_empty(value)
        .or_else(|| env_value("ORCHESTRA_CLIENT_ID"))
        .unwrap_or_else(|| DEFAULT_CLIENT_ID.to_string())
}

fn resolve_log_dir(value: &str) -> String {
    non_empty(value)
        .or_else(|| env_value("ORCHESTRA_LOG_DIR"))
        .unwrap_or_default()
}

fn env_value(key: &str) -> Option<String> {
    env::var(key).ok().and_then(|value| non_empty(&value))
}

fn non_empty(value: &str) -> Option<String> {
    let trimmed = value.trim();
    if trimmed.is_empty() {
        None
    } else {
        Some(trimmed.to_string())
    }
}

fn print_snapshot(snapshot: &LiveSnapshot, json: bool) -> io::Result<()> {
    let rendered = if json {
        serde_json::to_string(snapshot).map_err(io::Error::other)?
    } else {
        render_snapshot(snapshot)
    };
    let mut stdout = io::stdout().lock();
    writeln!(stdout, "{rendered}")?;
    stdout.flush()
}

fn render_snapshot(snapshot: &LiveSnapshot) -> String {
    let summary = &snapshot.summary;
    let mut lines = vec![format!(
        "[{}] runs={} completed={} running={} failed={}",
        snapshot.connection.label(),
        summary.total,
        summary.completed,
        summary.running,
        summary.failed
    )];
    if let Some(ack) = &snapshot.last_ack {
        lines.push(format!("last ack: {ack}"));
    }
    if let Some(error) = &snapshot.last_error {
        lines.push(format!("last error: {error}"));
    }
    if snapshot.runs.is_empty() {
        lines.push("  (no runs)".to_string());
    }
    for (index, run) in snapshot.runs.iter().enumerate() {
        let marker = if index == snapshot.highlight { '>' } else { ' ' };
        lines.push(format!(
            "{marker} {:<5} {:<10} {:<12} {:<9} {}",
            run.timestamp,
            run.run_id,
            run.agent,
            run.status.as_str(),
            ellipsize(&run.task, TASK_COLUMN_WIDTH)
        ));
    }
    if !snapshot.events.is_empty() {
        lines.push("recent events:".to_string());
        for event in snapshot.events.iter().take(RECENT_EVENTS_SHOWN) {
            lines.push(format!(
                "  {} {} <- {}: {}",
                event.received_at, event.kind, event.from, event.payload_preview
            ));
        }
    }
    lines.join("\n")
}

fn ellipsize(input: &str, max: usize) -> String {
    if input.chars().count() <= max {
        return input.to_string();
    }
    if max <= 3 {
        return "...".chars().take(max).collect();
    }
    let prefix: String = input.chars().take(max - 3).collect();
    format!("{prefix}...")
}

fn init_logging(log_dir: &str) -> Option<LogGuard> {
    let level = env::var("ORCHESTRA_LOG_LEVEL").unwrap_or_else(|_| "info".to_string());
    let filter = EnvFilter::try_from_default_env().unwrap_or_else(|_| EnvFilter::new(level));
    let guard = match open_log_file(log_dir) {
        Ok(guard) => guard,
        Err(err) => {
            eprintln!("log_file_error: {err}");
            LogGuard { file: None }
        }
    };
    let file = guard.file.clone();
    let make_writer = BoxMakeWriter::new(move || MultiWriter { file: file.clone() });
    let subscriber = tracing_subscriber::fmt()
        .with_env_filter(filter)
        .with_writer(make_writer)
        .finish();
    if tracing::subscriber::set_global_default(subscriber).is_err() {
        return None;
    }
    Some(guard)
}

fn open_log_file(log_dir: &str) -> io::Result<LogGuard> {
    if log_dir.trim().is_empty() {
        return Ok(LogGuard { file: None });
    }
    let dir = PathBuf::from(log_dir);
    std::fs::create_dir_all(&dir)?;
    let file = OpenOptions::new()
        .create(true)
        .append(true)
        .open(dir.join("orchestra-live.log"))?;
    Ok(LogGuard {
        file: Some(Arc::new(StdMutex::new(file))),
    })
}

// stdout carries the rendered view, so log lines go to stderr.
impl Write for MultiWriter {
    fn write(&mut self, buf: &[u8]) -> io::Result<usize> {
        let _ = io::stderr().write_all(buf);
        if let Some(file) = &self.file {
            if let Ok(mut file) = file.lock() {
                let _ = file.write_all(buf);
            }
        }
        Ok(buf.len())
    }

    fn flush(&mut self) -> io::Result<()> {
        let _ = io::stderr().flush();
        if let Some(file) = &self.file {
            if let Ok(mut file) = file.lock() {
                let _ = file.flush();
            }
        }
        Ok(())
    }
}
