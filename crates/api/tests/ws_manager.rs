//! Unit tests for `WsManager`.
//!
//! These tests exercise the WebSocket connection manager directly, without
//! performing any HTTP upgrades. They verify add/remove semantics, targeted
//! delivery, broadcast, and graceful shutdown behaviour.

use axum::extract::ws::Message;
use muse_api::ws::WsManager;

// ---------------------------------------------------------------------------
// Test: new manager starts with zero connections
// ---------------------------------------------------------------------------

#[tokio::test]
async fn new_manager_has_zero_connections() {
    let manager = WsManager::new();

    assert_eq!(manager.connection_count().await, 0);
}

// ---------------------------------------------------------------------------
// Test: add() increments and remove() decrements the connection count
// ---------------------------------------------------------------------------

#[tokio::test]
async fn add_and_remove_track_connection_count() {
    let manager = WsManager::new();

    let _rx = manager.add("conn-1".to_string(), Some(1)).await;
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

    let _rx = manager.add("conn-1".to_string(), Some(1)).await;
    manager.remove("nonexistent").await;

    assert_eq!(manager.connection_count().await, 1);
}

// ---------------------------------------------------------------------------
// Test: send_to_user() reaches only that user's connections
// ---------------------------------------------------------------------------

#[tokio::test]
async fn send_to_user_targets_only_matching_connections() {
    let manager = WsManager::new();

    let mut rx_a1 = manager.add("a1".to_string(), Some(1)).await;
    let mut rx_a2 = manager.add("a2".to_string(), Some(1)).await;
    let mut rx_b = manager.add("b".to_string(), Some(2)).await;

    let sent = manager
        .send_to_user(1, Message::Text("job update".into()))
        .await;
    assert_eq!(sent, 2);

    assert!(matches!(rx_a1.recv().await, Some(Message::Text(t)) if t == "job update"));
    assert!(matches!(rx_a2.recv().await, Some(Message::Text(t)) if t == "job update"));
    assert!(rx_b.try_recv().is_err(), "user 2 must not receive the push");
}

// ---------------------------------------------------------------------------
// Test: broadcast() sends message to all connected clients
// ---------------------------------------------------------------------------

#[tokio::test]
async fn broadcast_sends_to_all_connections() {
    let manager = WsManager::new();

    let mut rx1 = manager.add("conn-1".to_string(), Some(1)).await;
    let mut rx2 = manager.add("conn-2".to_string(), Some(2)).await;

    manager.broadcast(Message::Text("hello everyone".into())).await;

    assert!(matches!(rx1.recv().await, Some(Message::Text(t)) if t == "hello everyone"));
    assert!(matches!(rx2.recv().await, Some(Message::Text(t)) if t == "hello everyone"));
}

// ---------------------------------------------------------------------------
// Test: shutdown_all() sends Close and clears all connections
// ---------------------------------------------------------------------------

#[tokio::test]
async fn shutdown_all_sends_close_and_clears() {
    let manager = WsManager::new();

    let mut rx1 = manager.add("conn-1".to_string(), None).await;
    let mut rx2 = manager.add("conn-2".to_string(), None).await;
    assert_eq!(manager.connection_count().await, 2);

    manager.shutdown_all().await;

    assert_eq!(manager.connection_count().await, 0);

    let msg1 = rx1.recv().await.expect("rx1 should receive Close");
    assert!(matches!(msg1, Message::Close(None)));

    let msg2 = rx2.recv().await.expect("rx2 should receive Close");
    assert!(matches!(msg2, Message::Close(None)));

    assert!(
        rx1.recv().await.is_none(),
        "Channel should be closed after shutdown"
    );
}
