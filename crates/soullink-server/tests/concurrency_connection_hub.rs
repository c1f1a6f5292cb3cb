//! Concurrency tests for the WebSocket ConnectionHub.
//!
//! These tests check that broadcasts reach every healthy client in one order,
//! that failing clients are removed without affecting the rest, and that
//! concurrent register/unregister leaves no orphans.

use soullink_server::api_ws::{ConnectionHub, OutgoingMessage};
use std::sync::Arc;
use tokio::sync::mpsc;

fn reset(duration: u64) -> OutgoingMessage {
    OutgoingMessage::Reset { duration }
}

fn duration_of(json: &str) -> u64 {
    let value: serde_json::Value = serde_json::from_str(json).unwrap();
    value["duration"].as_u64().unwrap()
}

#[tokio::test]
async fn test_broadcast_skips_closed_client() {
    let hub = ConnectionHub::new();

    let (tx_a, mut rx_a) = mpsc::channel(8);
    let (tx_b, rx_b) = mpsc::channel(8);
    let (tx_c, mut rx_c) = mpsc::channel(8);
    hub.register(tx_a).await;
    let closed = hub.register(tx_b).await;
    hub.register(tx_c).await;

    // Client B's writer is gone.
    drop(rx_b);

    let remaining = hub.broadcast(&reset(800)).await;
    assert_eq!(remaining, 2);
    assert!(!hub.contains(closed).await);

    assert_eq!(duration_of(&rx_a.recv().await.unwrap()), 800);
    assert_eq!(duration_of(&rx_c.recv().await.unwrap()), 800);
}

#[tokio::test]
async fn test_broadcast_removes_client_with_full_queue() {
    let hub = ConnectionHub::new();

    let (slow_tx, _slow_rx) = mpsc::channel(1);
    let (fast_tx, mut fast_rx) = mpsc::channel(16);
    let slow = hub.register(slow_tx).await;
    hub.register(fast_tx).await;

    assert_eq!(hub.broadcast(&reset(1)).await, 2);
    // Slow client's single slot is still occupied.
    assert_eq!(hub.broadcast(&reset(2)).await, 1);
    assert!(!hub.contains(slow).await);

    assert_eq!(hub.broadcast(&reset(3)).await, 1);
    for expected in 1..=3 {
        assert_eq!(duration_of(&fast_rx.recv().await.unwrap()), expected);
    }
}

#[tokio::test]
async fn test_concurrent_broadcasts_arrive_in_same_order_everywhere() {
    let hub = Arc::new(ConnectionHub::new());

    let mut receivers = Vec::new();
    for _ in 0..4 {
        let (tx, rx) = mpsc::channel(256);
        hub.register(tx).await;
        receivers.push(rx);
    }

    let mut handles = Vec::new();
    for i in 0..50u64 {
        let hub = hub.clone();
        handles.push(tokio::spawn(async move {
            hub.broadcast(&reset(i)).await;
        }));
    }
    for handle in handles {
        handle.await.expect("task should not panic");
    }

    let mut orders = Vec::new();
    for rx in receivers.iter_mut() {
        let mut order = Vec::new();
        while let Ok(msg) = rx.try_recv() {
            order.push(duration_of(&msg));
        }
        assert_eq!(order.len(), 50);
        orders.push(order);
    }
    for order in &orders[1..] {
        assert_eq!(order, &orders[0]);
    }
}

#[tokio::test]
async fn test_concurrent_register_unregister_no_orphans() {
    let hub = Arc::new(ConnectionHub::new());

    let mut handles = Vec::new();
    for _ in 0..100 {
        let hub = hub.clone();
        handles.push(tokio::spawn(async move {
            let (tx, _rx) = mpsc::channel::<String>(1);
            let id = hub.register(tx).await;
            assert!(hub.unregister(id).await);
            // Second removal is a no-op.
            assert!(!hub.unregister(id).await);
        }));
    }
    for handle in handles {
        handle.await.expect("task should not panic");
    }

    assert!(hub.is_empty().await);
}

#[tokio::test]
async fn test_send_to_targets_one_client() {
    let hub = ConnectionHub::new();

    let (tx_a, mut rx_a) = mpsc::channel(8);
    let (tx_b, mut rx_b) = mpsc::channel(8);
    let a = hub.register(tx_a).await;
    hub.register(tx_b).await;

    hub.send_to(a, &OutgoingMessage::Pong).await.unwrap();

    assert_eq!(rx_a.recv().await.unwrap(), r#"{"type":"pong"}"#);
    assert!(rx_b.try_recv().is_err());
}
