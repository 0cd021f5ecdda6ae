//! Integration tests for SocketManager
//!
//! These tests exercise real sockets: port hunting on collision, listener
//! pooling, client dials, and shutdown behavior.

use ssh_forwarder::models::SocketConfig;
use ssh_forwarder::utils::error::ForwardError;
use ssh_forwarder::SocketManager;
use std::sync::Arc;
use tokio::io::{AsyncReadExt, AsyncWriteExt};
use tokio::net::TcpListener;

// =============================================================================
// Port Hunting
// =============================================================================

#[tokio::test]
async fn test_port_hunt_skips_occupied_port() {
    // Occupy an ephemeral port, then ask the manager for exactly that port.
    let occupant = TcpListener::bind("127.0.0.1:0").await.unwrap();
    let taken = occupant.local_addr().unwrap().port();

    let manager = SocketManager::new();
    let listener = manager
        .get(&SocketConfig::listener(taken, "127.0.0.1"))
        .await
        .unwrap();

    let bound = listener.local_addr().unwrap().port();
    assert!(bound > taken, "expected a hunted port above {}, got {}", taken, bound);

    manager.close().await;
}

#[tokio::test]
async fn test_bound_listener_accepts_connections() {
    let manager = SocketManager::new();
    let listener = manager
        .get(&SocketConfig::listener(21900, "127.0.0.1"))
        .await
        .unwrap();
    let addr = listener.local_addr().unwrap();

    let server = {
        let listener = listener.clone();
        tokio::spawn(async move {
            let (mut stream, _) = listener.accept().await.unwrap();
            let mut buf = [0u8; 4];
            stream.read_exact(&mut buf).await.unwrap();
            stream.write_all(&buf).await.unwrap();
        })
    };

    let mut client = manager.connect("127.0.0.1", addr.port()).await.unwrap();
    client.write_all(b"ping").await.unwrap();
    let mut buf = [0u8; 4];
    client.read_exact(&mut buf).await.unwrap();
    assert_eq!(&buf, b"ping");

    server.await.unwrap();
    manager.close().await;
}

// =============================================================================
// Pooling
// =============================================================================

#[tokio::test]
async fn test_same_config_returns_same_listener() {
    let manager = SocketManager::new();
    let config = SocketConfig::listener(21555, "127.0.0.1");

    let first = manager.get(&config).await.unwrap();
    let second = manager.get(&config).await.unwrap();
    assert!(Arc::ptr_eq(&first, &second));

    let other = manager
        .get(&SocketConfig::listener(21557, "127.0.0.1"))
        .await
        .unwrap();
    assert!(!Arc::ptr_eq(&first, &other));

    manager.close().await;
}

// =============================================================================
// Shutdown
// =============================================================================

#[tokio::test]
async fn test_close_is_idempotent_and_blocks_further_use() {
    let manager = SocketManager::new();
    manager
        .get(&SocketConfig::listener(21650, "127.0.0.1"))
        .await
        .unwrap();

    manager.close().await;
    manager.close().await;

    assert!(matches!(
        manager.get(&SocketConfig::listener(21651, "127.0.0.1")).await,
        Err(ForwardError::ShuttingDown)
    ));
    assert!(matches!(
        manager.connect("127.0.0.1", 21650).await,
        Err(ForwardError::ShuttingDown)
    ));
}
