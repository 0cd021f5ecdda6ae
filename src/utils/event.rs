use std::sync::Arc;
use tokio::sync::watch;

/// Cooperative shutdown signal shared by a component and everything it spawns.
///
/// Cloning is cheap and every clone observes the same flag. Long waits select
/// on [`ExitEvent::cancelled`] so shutdown latency is bounded by the wait
/// itself, not by a polling interval.
#[derive(Clone)]
pub struct ExitEvent {
    tx: Arc<watch::Sender<bool>>,
}

impl ExitEvent {
    pub fn new() -> Self {
        let (tx, _rx) = watch::channel(false);
        Self { tx: Arc::new(tx) }
    }

    /// Signal shutdown. Idempotent.
    pub fn set(&self) {
        let _ = self.tx.send(true);
    }

    pub fn is_set(&self) -> bool {
        *self.tx.borrow()
    }

    /// Resolves once the event is set. Safe to call from any number of tasks.
    pub async fn cancelled(&self) {
        let mut rx = self.tx.subscribe();
        while !*rx.borrow_and_update() {
            if rx.changed().await.is_err() {
                return;
            }
        }
    }
}

impl Default for ExitEvent {
    fn default() -> Self {
        Self::new()
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use std::time::Duration;

    #[tokio::test]
    async fn test_set_unblocks_waiters() {
        let event = ExitEvent::new();
        assert!(!event.is_set());

        let waiter = event.clone();
        let task = tokio::spawn(async move { waiter.cancelled().await });

        event.set();
        tokio::time::timeout(Duration::from_secs(1), task)
            .await
            .expect("waiter should wake after set")
            .unwrap();
        assert!(event.is_set());
    }

    #[tokio::test]
    async fn test_cancelled_returns_immediately_when_already_set() {
        let event = ExitEvent::new();
        event.set();
        event.set(); // idempotent
        tokio::time::timeout(Duration::from_millis(100), event.cancelled())
            .await
            .expect("already-set event must not block");
    }
}
