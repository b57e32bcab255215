//! End-to-end tests for the progress stream at `/api/v1/batches/{id}/ws`.
//!
//! These tests bind a real listener so the WebSocket upgrade goes through
//! the full middleware stack.

mod common;

use std::net::SocketAddr;
use std::time::Duration;

use axum::Router;
use chemaudit_core::types::BatchId;
use futures::{SinkExt, StreamExt};
use tokio::net::TcpStream;
use tokio_tungstenite::tungstenite::protocol::frame::coding::CloseCode;
use tokio_tungstenite::tungstenite::{Error as WsError, Message};
use tokio_tungstenite::{MaybeTlsStream, WebSocketStream};

type Client = WebSocketStream<MaybeTlsStream<TcpStream>>;

async fn serve(app: Router) -> SocketAddr {
    let listener = tokio::net::TcpListener::bind("127.0.0.1:0").await.unwrap();
    let addr = listener.local_addr().unwrap();
    tokio::spawn(async move {
        axum::serve(listener, app).await.unwrap();
    });
    addr
}

async fn connect(addr: SocketAddr, id: &str) -> Client {
    let url = format!("ws://{addr}/api/v1/batches/{id}/ws");
    let (client, _) = tokio_tungstenite::connect_async(url).await.unwrap();
    client
}

async fn next_message(client: &mut Client) -> Message {
    tokio::time::timeout(Duration::from_secs(10), client.next())
        .await
        .expect("no frame within 10s")
        .expect("stream ended without a Close frame")
        .unwrap()
}

/// Read text frames until the server closes the stream.
async fn read_until_close(client: &mut Client) -> (Vec<serde_json::Value>, Option<CloseCode>) {
    let mut frames = Vec::new();
    loop {
        match next_message(client).await {
            Message::Text(text) => frames.push(serde_json::from_str(&text).unwrap()),
            Message::Close(frame) => return (frames, frame.map(|f| f.code)),
            _ => {}
        }
    }
}

async fn wait_until<F>(mut check: F)
where
    F: FnMut() -> bool,
{
    let deadline = tokio::time::Instant::now() + Duration::from_secs(10);
    while !check() {
        assert!(
            tokio::time::Instant::now() < deadline,
            "condition not reached in time"
        );
        tokio::time::sleep(Duration::from_millis(5)).await;
    }
}

// ---------------------------------------------------------------------------
// Test: snapshot first, then item frames, then a Close after the terminal frame
// ---------------------------------------------------------------------------

#[tokio::test]
async fn stream_sends_snapshot_then_progress_then_close() {
    let (state, gate) = common::gated_state();
    let ws_manager = state.ws_manager.clone();
    let app = common::build_test_app(state);
    let id = common::submit(&app, &["CCO", "CCN", "CCC"]).await;
    let addr = serve(app).await;

    let mut client = connect(addr, &id).await;

    let snapshot: serde_json::Value = match next_message(&mut client).await {
        Message::Text(text) => serde_json::from_str(&text).unwrap(),
        other => panic!("expected a text frame, got {other:?}"),
    };
    assert_eq!(snapshot["type"], "batch_progress");
    assert_eq!(snapshot["kind"], "snapshot");
    assert_eq!(snapshot["batch_id"], id.as_str());
    assert_eq!(snapshot["completed"], 0);
    assert_eq!(snapshot["total"], 3);

    gate.open();
    let (frames, close) = read_until_close(&mut client).await;

    assert_eq!(close, Some(CloseCode::Normal));

    let mut last_seq = snapshot["seq"].as_u64().unwrap();
    for frame in &frames {
        let seq = frame["seq"].as_u64().unwrap();
        assert!(seq > last_seq, "seq {seq} after {last_seq}");
        last_seq = seq;
    }

    let items: Vec<&serde_json::Value> = frames.iter().filter(|f| f["kind"] == "item").collect();
    assert_eq!(items.len(), 3);
    assert!(items.iter().all(|f| f["outcome"]["status"] == "succeeded"));

    let last = frames.last().unwrap();
    assert_eq!(last["state"], "completed");
    assert_eq!(last["completed"], 3);

    let deadline = tokio::time::Instant::now() + Duration::from_secs(10);
    while ws_manager.connection_count().await > 0 {
        assert!(tokio::time::Instant::now() < deadline, "connection never removed");
        tokio::time::sleep(Duration::from_millis(5)).await;
    }
}

// ---------------------------------------------------------------------------
// Test: subscribing to a finished batch yields the snapshot and a Close
// ---------------------------------------------------------------------------

#[tokio::test]
async fn finished_batch_stream_is_snapshot_only() {
    let app = common::build_test_app(common::test_state());
    let id = common::submit(&app, &["CCO", "C1CC"]).await;
    common::wait_terminal(&app, &id).await;
    let addr = serve(app).await;

    let mut client = connect(addr, &id).await;
    let (frames, close) = read_until_close(&mut client).await;

    assert_eq!(frames.len(), 1);
    assert_eq!(frames[0]["kind"], "snapshot");
    assert_eq!(frames[0]["state"], "completed");
    assert_eq!(frames[0]["succeeded"], 1);
    assert_eq!(frames[0]["failed"], 1);
    assert_eq!(close, Some(CloseCode::Normal));
}

// ---------------------------------------------------------------------------
// Test: unknown batch is refused before the upgrade
// ---------------------------------------------------------------------------

#[tokio::test]
async fn unknown_batch_is_refused_with_404() {
    let addr = serve(common::build_test_app(common::test_state())).await;
    let url = format!("ws://{addr}/api/v1/batches/{}/ws", uuid::Uuid::new_v4());

    match tokio_tungstenite::connect_async(url).await {
        Err(WsError::Http(response)) => assert_eq!(response.status(), 404),
        Err(other) => panic!("expected an HTTP error, got {other:?}"),
        Ok(_) => panic!("upgrade should have been refused"),
    }
}

// ---------------------------------------------------------------------------
// Test: client disconnect releases the subscription
// ---------------------------------------------------------------------------

#[tokio::test]
async fn client_disconnect_releases_subscriber() {
    let (state, _gate) = common::gated_state();
    let registry = state.registry.clone();
    let app = common::build_test_app(state);
    let id = common::submit(&app, &["CCO", "CCN"]).await;
    let addr = serve(app).await;

    let session = registry
        .session(id.parse::<BatchId>().unwrap())
        .await
        .unwrap();

    let mut client = connect(addr, &id).await;
    next_message(&mut client).await;
    assert_eq!(session.subscriber_count(), 1);

    client.close(None).await.unwrap();
    drop(client);

    wait_until(|| session.subscriber_count() == 0).await;
    assert!(!session.is_terminal());
}

// ---------------------------------------------------------------------------
// Test: two clients on one batch both reach the terminal frame
// ---------------------------------------------------------------------------

#[tokio::test]
async fn concurrent_clients_see_the_same_terminal_frame() {
    let (state, gate) = common::gated_state();
    let app = common::build_test_app(state);
    let id = common::submit(&app, &["C", "CC", "CCC", "CCCC"]).await;
    let addr = serve(app).await;

    let mut first = connect(addr, &id).await;
    let mut second = connect(addr, &id).await;
    next_message(&mut first).await;
    next_message(&mut second).await;

    gate.open();
    let (a, _) = read_until_close(&mut first).await;
    let (b, _) = read_until_close(&mut second).await;

    let (last_a, last_b) = (a.last().unwrap(), b.last().unwrap());
    assert_eq!(last_a["state"], "completed");
    assert_eq!(last_a["seq"], last_b["seq"]);
    assert_eq!(last_a["completed"], 4);
    assert_eq!(last_b["completed"], 4);
}
