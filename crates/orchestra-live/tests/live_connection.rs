use futures_util::{SinkExt, StreamExt};
use orchestra_core::{ConnectionState, RunStatus};
use orchestra_live::{
    state::PARSE_ERROR_MESSAGE, ConnectionManager, LiveConfig, LiveSnapshot,
    TRANSPORT_ERROR_MESSAGE,
};
use serde_json::{json, Value};
use std::{
    net::SocketAddr,
    sync::{
        atomic::{AtomicUsize, Ordering},
        Arc,
    },
    time::{Duration, Instant},
};
use tokio::{
    net::TcpListener,
    sync::{mpsc, oneshot, watch},
};
use tokio_tungstenite::{
    accept_async, accept_hdr_async,
    tungstenite::{
        handshake::server::{ErrorResponse, Request, Response},
        Message,
    },
};

const WAIT: Duration = Duration::from_secs(5);

fn config_for(addr: SocketAddr) -> LiveConfig {
    LiveConfig {
        client_id: "web-ui".to_string(),
        reconnect_delay: Duration::from_millis(50),
        ..LiveConfig::default()
    }
    .with_daemon_url(format!("ws://{addr}/ws/observe"))
}

async fn wait_for(
    rx: &mut watch::Receiver<LiveSnapshot>,
    pred: impl Fn(&LiveSnapshot) -> bool,
) -> LiveSnapshot {
    tokio::time::timeout(WAIT, async {
        loop {
            {
                let snapshot = rx.borrow_and_update();
                if pred(&snapshot) {
                    return snapshot.clone();
                }
            }
            rx.changed().await.expect("manager alive");
        }
    })
    .await
    .expect("condition reached")
}

fn run_update(id: &str, status: &str) -> String {
    json!({
        "type": "run_update",
        "from": "orchestrator",
        "payload": {
            "runId": id,
            "agent": "droid",
            "task": "Create User model",
            "status": status,
            "timestamp": "2026-02-07T21:05:09Z"
        }
    })
    .to_string()
}

#[tokio::test(flavor = "multi_thread", worker_threads = 2)]
async fn handshake_ack_and_run_updates_reach_the_snapshot() {
    let listener = TcpListener::bind("127.0.0.1:0").await.expect("bind");
    let addr = listener.local_addr().expect("addr");
    let (hello_tx, hello_rx) = oneshot::channel();
    let (script_tx, mut script_rx) = mpsc::channel::<String>(8);

    let server = tokio::spawn(async move {
        let (stream, _) = listener.accept().await.expect("accept");
        let mut ws = accept_async(stream).await.expect("handshake");
        let hello = match ws.next().await {
            Some(Ok(Message::Text(text))) => text,
            other => panic!("expected hello, got {other:?}"),
        };
        let _ = hello_tx.send(hello);
        ws.send(Message::Text(json!({"type": "ack", "echo": "hello"}).to_string()))
            .await
            .expect("send ack");
        while let Some(frame) = script_rx.recv().await {
            ws.send(Message::Text(frame)).await.expect("send frame");
        }
    });

    let handle = ConnectionManager::start(config_for(addr));
    let mut rx = handle.subscribe();

    let hello: Value = serde_json::from_str(
        &tokio::time::timeout(WAIT, hello_rx)
            .await
            .expect("hello in time")
            .expect("hello sent"),
    )
    .expect("hello json");
    assert_eq!(hello["type"], "hello");
    assert_eq!(hello["payload"]["client"], "web-ui");
    assert!(hello["payload"]["ts"].is_string());

    let snapshot = wait_for(&mut rx, |s| s.last_ack.is_some()).await;
    assert_eq!(snapshot.connection, ConnectionState::Connected);
    assert!(snapshot.events.is_empty());
    assert!(snapshot.runs.is_empty());

    script_tx.send(run_update("r1", "running")).await.expect("script");
    let snapshot = wait_for(&mut rx, |s| s.runs.len() == 1).await;
    assert_eq!(snapshot.runs[0].run_id, "r1");
    assert_eq!(snapshot.runs[0].status, RunStatus::Running);
    assert_eq!(snapshot.summary.running, 1);
    assert_eq!(snapshot.events[0].kind, "run_update");
    assert_eq!(snapshot.events[0].from, "orchestrator");

    script_tx.send(run_update("r2", "queued")).await.expect("script");
    script_tx.send(run_update("r1", "success")).await.expect("script");
    let snapshot = wait_for(&mut rx, |s| s.events.len() == 3).await;
    let ids: Vec<&str> = snapshot.runs.iter().map(|run| run.run_id.as_str()).collect();
    assert_eq!(ids, vec!["r2", "r1"]);
    assert_eq!(snapshot.runs[1].status, RunStatus::Completed);
    assert_eq!(snapshot.summary.total, 2);
    assert_eq!(snapshot.summary.completed, 1);
    assert_eq!(snapshot.highlight, 0);

    drop(script_tx);
    handle.shutdown().await;
    let _ = server.await;
}

#[tokio::test(flavor = "multi_thread", worker_threads = 2)]
async fn malformed_payload_keeps_the_connection_open() {
    let listener = TcpListener::bind("127.0.0.1:0").await.expect("bind");
    let addr = listener.local_addr().expect("addr");
    let accepted = Arc::new(AtomicUsize::new(0));
    let accepted_server = accepted.clone();

    let server = tokio::spawn(async move {
        loop {
            let (stream, _) = listener.accept().await.expect("accept");
            accepted_server.fetch_add(1, Ordering::SeqCst);
            let mut ws = accept_async(stream).await.expect("handshake");
            let _hello = ws.next().await;
            ws.send(Message::Text("{not json".to_string()))
                .await
                .expect("send garbage");
            ws.send(Message::Text(run_update("r9", "failed")))
                .await
                .expect("send update");
            while let Some(Ok(_)) = ws.next().await {}
        }
    });

    let handle = ConnectionManager::start(config_for(addr));
    let mut rx = handle.subscribe();
    let snapshot = wait_for(&mut rx, |s| s.runs.len() == 1).await;
    assert_eq!(snapshot.connection, ConnectionState::Connected);
    assert_eq!(snapshot.last_error.as_deref(), Some(PARSE_ERROR_MESSAGE));
    assert_eq!(snapshot.events.len(), 1);
    assert_eq!(snapshot.runs[0].status, RunStatus::Failed);
    assert_eq!(accepted.load(Ordering::SeqCst), 1);

    handle.shutdown().await;
    server.abort();
}

#[tokio::test(flavor = "multi_thread", worker_threads = 2)]
async fn closed_connections_are_redialed_until_teardown() {
    let listener = TcpListener::bind("127.0.0.1:0").await.expect("bind");
    let addr = listener.local_addr().expect("addr");
    let accepted = Arc::new(AtomicUsize::new(0));
    let accepted_server = accepted.clone();

    let server = tokio::spawn(async move {
        loop {
            let (stream, _) = listener.accept().await.expect("accept");
            accepted_server.fetch_add(1, Ordering::SeqCst);
            if let Ok(mut ws) = accept_async(stream).await {
                let _ = ws.close(None).await;
            }
        }
    });

    let handle = ConnectionManager::start(config_for(addr));
    tokio::time::timeout(WAIT, async {
        while accepted.load(Ordering::SeqCst) < 3 {
            tokio::time::sleep(Duration::from_millis(10)).await;
        }
    })
    .await
    .expect("three dials");

    handle.shutdown().await;
    // Let the listener drain a dial that was already in its backlog.
    tokio::time::sleep(Duration::from_millis(100)).await;
    let after_teardown = accepted.load(Ordering::SeqCst);
    tokio::time::sleep(Duration::from_millis(300)).await;
    assert_eq!(accepted.load(Ordering::SeqCst), after_teardown);
    server.abort();
}

#[tokio::test(flavor = "multi_thread", worker_threads = 2)]
async fn refused_connection_surfaces_transport_error() {
    let addr = {
        let listener = std::net::TcpListener::bind("127.0.0.1:0").expect("bind");
        listener.local_addr().expect("addr")
    };
    let config = LiveConfig {
        reconnect_delay: Duration::from_secs(1),
        ..config_for(addr)
    };

    let handle = ConnectionManager::start(config);
    let mut rx = handle.subscribe();
    let snapshot = wait_for(&mut rx, |s| {
        s.last_error.as_deref() == Some(TRANSPORT_ERROR_MESSAGE)
    })
    .await;
    assert!(matches!(
        snapshot.connection,
        ConnectionState::Error | ConnectionState::Disconnected
    ));
    handle.shutdown().await;
}

#[tokio::test(flavor = "multi_thread", worker_threads = 2)]
async fn missing_address_never_dials() {
    let listener = TcpListener::bind("127.0.0.1:0").await.expect("bind");
    let handle = ConnectionManager::start(LiveConfig::default());
    assert_eq!(handle.snapshot().connection, ConnectionState::Disabled);

    let accept = tokio::time::timeout(Duration::from_millis(200), listener.accept()).await;
    assert!(accept.is_err());
    assert_eq!(handle.snapshot().connection, ConnectionState::Disabled);
    handle.shutdown().await;
}

#[tokio::test(flavor = "multi_thread", worker_threads = 2)]
async fn token_rides_on_the_query_string() {
    let listener = TcpListener::bind("127.0.0.1:0").await.expect("bind");
    let addr = listener.local_addr().expect("addr");
    let (uri_tx, uri_rx) = oneshot::channel();

    let server = tokio::spawn(async move {
        let (stream, _) = listener.accept().await.expect("accept");
        let callback = move |req: &Request, resp: Response| -> Result<Response, ErrorResponse> {
            let _ = uri_tx.send(req.uri().to_string());
            Ok(resp)
        };
        let mut ws = accept_hdr_async(stream, callback).await.expect("handshake");
        while let Some(Ok(_)) = ws.next().await {}
    });

    let handle = ConnectionManager::start(config_for(addr).with_token("s3cret value"));
    let uri = tokio::time::timeout(WAIT, uri_rx)
        .await
        .expect("dial in time")
        .expect("uri captured");
    assert_eq!(uri, "/ws/observe?token=s3cret%20value");

    handle.shutdown().await;
    server.abort();
}

#[tokio::test(flavor = "multi_thread", worker_threads = 2)]
async fn teardown_sends_a_close_frame() {
    let listener = TcpListener::bind("127.0.0.1:0").await.expect("bind");
    let addr = listener.local_addr().expect("addr");
    let (closed_tx, closed_rx) = oneshot::channel();

    let server = tokio::spawn(async move {
        let (stream, _) = listener.accept().await.expect("accept");
        let mut ws = accept_async(stream).await.expect("handshake");
        let mut saw_close = false;
        while let Some(Ok(frame)) = ws.next().await {
            if frame.is_close() {
                saw_close = true;
                break;
            }
        }
        let _ = closed_tx.send(saw_close);
    });

    let handle = ConnectionManager::start(config_for(addr));
    let mut rx = handle.subscribe();
    wait_for(&mut rx, |s| s.connection == ConnectionState::Connected).await;

    handle.shutdown().await;
    let saw_close = tokio::time::timeout(WAIT, closed_rx)
        .await
        .expect("server finished")
        .expect("result sent");
    assert!(saw_close);
    let _ = server.await;
}

#[tokio::test(flavor = "multi_thread", worker_threads = 2)]
async fn teardown_completes_under_a_message_backlog() {
    let listener = TcpListener::bind("127.0.0.1:0").await.expect("bind");
    let addr = listener.local_addr().expect("addr");
    let server = tokio::spawn(async move {
        let (stream, _) = listener.accept().await.expect("accept");
        let mut ws = accept_async(stream).await.expect("handshake");
        for seq in 0..5_000 {
            if ws
                .send(Message::Text(run_update(&format!("r{seq}"), "running")))
                .await
                .is_err()
            {
                break;
            }
        }
    });

    let handle = ConnectionManager::start(config_for(addr));
    let mut rx = handle.subscribe();
    wait_for(&mut rx, |s| !s.runs.is_empty()).await;

    {
        // A slow renderer holding the snapshot stalls the manager while frames pile up.
        let _held = rx.borrow();
        std::thread::sleep(Duration::from_millis(400));
    }

    tokio::time::timeout(Duration::from_secs(3), handle.shutdown())
        .await
        .expect("teardown finishes with a full event queue");
    server.abort();
}

#[tokio::test(flavor = "multi_thread", worker_threads = 2)]
async fn each_close_yields_one_redial_after_the_delay() {
    let delay = Duration::from_millis(200);
    let listener = TcpListener::bind("127.0.0.1:0").await.expect("bind");
    let addr = listener.local_addr().expect("addr");
    let closed = Arc::new(AtomicUsize::new(0));
    let closed_server = closed.clone();
    let (dial_tx, mut dial_rx) = mpsc::unbounded_channel::<Instant>();

    let server = tokio::spawn(async move {
        loop {
            let (stream, _) = listener.accept().await.expect("accept");
            let _ = dial_tx.send(Instant::now());
            if let Ok(mut ws) = accept_async(stream).await {
                let _ = ws.close(None).await;
                while let Some(Ok(_)) = ws.next().await {}
            }
            closed_server.fetch_add(1, Ordering::SeqCst);
        }
    });

    let config = LiveConfig {
        reconnect_delay: delay,
        ..config_for(addr)
    };
    let handle = ConnectionManager::start(config);

    let mut dials = Vec::new();
    while dials.len() < 4 {
        let at = tokio::time::timeout(WAIT, dial_rx.recv())
            .await
            .expect("redial in time")
            .expect("server alive");
        dials.push(at);
    }
    handle.shutdown().await;

    for pair in dials.windows(2) {
        let gap = pair[1].duration_since(pair[0]);
        assert!(gap >= delay, "redialed after {gap:?}, before the fixed delay");
        assert!(gap < delay * 5, "redial took {gap:?}");
    }

    // One dial per close: every accepted connection was closed before the next arrived.
    tokio::time::sleep(Duration::from_millis(100)).await;
    let mut extra = 0;
    while dial_rx.try_recv().is_ok() {
        extra += 1;
    }
    let total_dials = dials.len() + extra;
    assert!(total_dials <= closed.load(Ordering::SeqCst) + 1);
    assert!(closed.load(Ordering::SeqCst) <= total_dials);
    server.abort();
}
