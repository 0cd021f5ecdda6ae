//! Integration tests for ForwarderManager
//!
//! A mock forwarder stands in for the real variants so lifecycle behavior
//! (launch, wait, shutdown, idempotence) is observable without an SSH server.

use async_trait::async_trait;
use ssh_forwarder::forwarder::Forwarder;
use ssh_forwarder::utils::error::ForwardError;
use ssh_forwarder::utils::event::ExitEvent;
use ssh_forwarder::ForwarderManager;
use std::sync::atomic::{AtomicBool, AtomicUsize, Ordering};
use std::sync::Arc;
use std::time::{Duration, Instant};

struct MockForwarder {
    exit: ExitEvent,
    running: Arc<AtomicBool>,
    closes: Arc<AtomicUsize>,
}

impl MockForwarder {
    fn new() -> Self {
        Self {
            exit: ExitEvent::new(),
            running: Arc::new(AtomicBool::new(false)),
            closes: Arc::new(AtomicUsize::new(0)),
        }
    }
}

#[async_trait]
impl Forwarder for MockForwarder {
    async fn forward(&self) {
        self.running.store(true, Ordering::SeqCst);
        self.exit.cancelled().await;
        self.running.store(false, Ordering::SeqCst);
    }

    async fn close(&self) {
        self.closes.fetch_add(1, Ordering::SeqCst);
        self.exit.set();
    }
}

async fn wait_until(what: &str, condition: impl Fn() -> bool) {
    let deadline = Instant::now() + Duration::from_secs(2);
    while !condition() {
        assert!(Instant::now() < deadline, "timed out waiting for {}", what);
        tokio::time::sleep(Duration::from_millis(10)).await;
    }
}

// =============================================================================
// Launch and Join
// =============================================================================

#[tokio::test]
async fn test_get_starts_the_accept_loop() {
    let manager = ForwarderManager::new();
    let forwarder = manager.get(MockForwarder::new()).await.unwrap();

    let running = forwarder.running.clone();
    wait_until("forwarder to start", move || running.load(Ordering::SeqCst)).await;

    manager.close().await;
}

#[tokio::test]
async fn test_wait_returns_once_all_loops_finish() {
    let manager = Arc::new(ForwarderManager::new());
    let first = manager.get(MockForwarder::new()).await.unwrap();
    let second = manager.get(MockForwarder::new()).await.unwrap();

    let waiter = {
        let manager = manager.clone();
        tokio::spawn(async move { manager.wait().await })
    };

    first.close().await;
    second.close().await;

    tokio::time::timeout(Duration::from_secs(2), waiter)
        .await
        .expect("wait must return after every forwarder closed")
        .unwrap();
}

// =============================================================================
// Shutdown
// =============================================================================

#[tokio::test]
async fn test_close_stops_every_forwarder_promptly() {
    let manager = ForwarderManager::new();
    let forwarders = vec![
        manager.get(MockForwarder::new()).await.unwrap(),
        manager.get(MockForwarder::new()).await.unwrap(),
        manager.get(MockForwarder::new()).await.unwrap(),
    ];
    for forwarder in &forwarders {
        let running = forwarder.running.clone();
        wait_until("forwarder to start", move || running.load(Ordering::SeqCst)).await;
    }

    let started = Instant::now();
    manager.close().await;
    assert!(started.elapsed() < Duration::from_secs(5));

    for forwarder in &forwarders {
        assert!(!forwarder.running.load(Ordering::SeqCst));
        assert_eq!(forwarder.closes.load(Ordering::SeqCst), 1);
    }
}

#[tokio::test]
async fn test_close_is_idempotent_and_refuses_new_forwarders() {
    let manager = ForwarderManager::new();
    let forwarder = manager.get(MockForwarder::new()).await.unwrap();

    manager.close().await;
    manager.close().await;
    assert_eq!(forwarder.closes.load(Ordering::SeqCst), 1);

    assert!(matches!(
        manager.get(MockForwarder::new()).await,
        Err(ForwardError::ShuttingDown)
    ));
}
