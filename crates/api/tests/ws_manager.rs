//! Unit tests for `WsManager`.
//!
//! These tests exercise the connection manager directly, without performing
//! any HTTP upgrades.

use assert_matches::assert_matches;
use axum::extract::ws::Message;
use chemaudit_api::ws::WsManager;
use chemaudit_core::types::BatchId;

// ---------------------------------------------------------------------------
// Test: new manager starts with zero connections
// ---------------------------------------------------------------------------

#[tokio::test]
async fn new_manager_has_zero_connections() {
    let manager = WsManager::new();

    assert_eq!(manager.connection_count().await, 0);
}

// ---------------------------------------------------------------------------
// Test: add() and remove() adjust the connection count
// ---------------------------------------------------------------------------

#[tokio::test]
async fn add_and_remove_adjust_connection_count() {
    let manager = WsManager::new();

    let _conn = manager.add("conn-1".to_string(), BatchId::new()).await;
    assert_eq!(manager.connection_count().await, 1);

    manager.remove("conn-1").await;
    assert_eq!(manager.connection_count().await, 0);
}

// ---------------------------------------------------------------------------
// Test: remove() with unknown ID is a no-op
// ---------------------------------------------------------------------------

#[tokio::test]
async fn remove_unknown_id_is_noop() {
    let manager = WsManager::new();

    let _conn = manager.add("conn-1".to_string(), BatchId::new()).await;
    manager.remove("nonexistent").await;

    assert_eq!(manager.connection_count().await, 1);
}

// ---------------------------------------------------------------------------
// Test: connections are grouped by batch
// ---------------------------------------------------------------------------

#[tokio::test]
async fn connections_for_batch_counts_only_that_batch() {
    let manager = WsManager::new();
    let (a, b) = (BatchId::new(), BatchId::new());

    let _c1 = manager.add("conn-1".to_string(), a).await;
    let _c2 = manager.add("conn-2".to_string(), a).await;
    let _c3 = manager.add("conn-3".to_string(), b).await;

    assert_eq!(manager.connections_for_batch(a).await, 2);
    assert_eq!(manager.connections_for_batch(b).await, 1);
    assert_eq!(manager.connections_for_batch(BatchId::new()).await, 0);
}

// ---------------------------------------------------------------------------
// Test: ping_all() reaches every connection
// ---------------------------------------------------------------------------

#[tokio::test]
async fn ping_all_sends_ping_frames() {
    let manager = WsManager::new();

    let (_tx1, mut rx1) = manager.add("conn-1".to_string(), BatchId::new()).await;
    let (_tx2, mut rx2) = manager.add("conn-2".to_string(), BatchId::new()).await;

    manager.ping_all().await;

    assert_matches!(rx1.recv().await, Some(Message::Ping(_)));
    assert_matches!(rx2.recv().await, Some(Message::Ping(_)));
}

// ---------------------------------------------------------------------------
// Test: shutdown_all() sends Close and clears the map
// ---------------------------------------------------------------------------

#[tokio::test]
async fn shutdown_all_closes_and_clears() {
    let manager = WsManager::new();

    let (tx, mut rx) = manager.add("conn-1".to_string(), BatchId::new()).await;
    let _other = manager.add("conn-2".to_string(), BatchId::new()).await;

    manager.shutdown_all().await;

    assert_eq!(manager.connection_count().await, 0);
    assert_matches!(rx.recv().await, Some(Message::Close(None)));

    // The caller's sender is the only one left.
    drop(tx);
    assert!(rx.recv().await.is_none());
}
