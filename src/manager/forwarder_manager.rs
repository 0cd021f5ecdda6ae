use crate::forwarder::Forwarder;
use crate::utils::error::{ForwardError, Result};
use chrono::{DateTime, Utc};
use std::sync::atomic::{AtomicBool, Ordering};
use std::sync::{Arc, Mutex as StdMutex};
use tokio::sync::Semaphore;
use tokio::task::JoinHandle;
use uuid::Uuid;

const MAX_ACCEPT_LOOPS: usize = 4096;

/// Launches forwarders and owns their accept-loop tasks.
///
/// The accept-loop pool is separate from the per-connection relay pools, so
/// saturated relay traffic can never starve a newly registered forwarder
/// from starting.
pub struct ForwarderManager {
    forwarders: StdMutex<Vec<ManagedForwarder>>,
    accept_slots: Arc<Semaphore>,
    closed: AtomicBool,
}

struct ManagedForwarder {
    id: Uuid,
    started_at: DateTime<Utc>,
    forwarder: Arc<dyn Forwarder>,
    task: Option<JoinHandle<()>>,
}

impl ForwarderManager {
    pub fn new() -> Self {
        Self {
            forwarders: StdMutex::new(Vec::new()),
            accept_slots: Arc::new(Semaphore::new(MAX_ACCEPT_LOOPS)),
            closed: AtomicBool::new(false),
        }
    }

    /// Register `forwarder` and start its accept loop. Returns a shared
    /// handle to the now-running forwarder.
    pub async fn get<F: Forwarder>(&self, forwarder: F) -> Result<Arc<F>> {
        if self.closed.load(Ordering::SeqCst) {
            return Err(ForwardError::ShuttingDown);
        }
        let forwarder = Arc::new(forwarder);
        let running: Arc<dyn Forwarder> = forwarder.clone();
        let id = Uuid::new_v4();

        let slots = self.accept_slots.clone();
        let looped = running.clone();
        let task = tokio::spawn(async move {
            // Queue for a slot; a closed semaphore means shutdown began
            // before this loop could start.
            let Ok(_permit) = slots.acquire_owned().await else {
                return;
            };
            looped.forward().await;
        });

        {
            let mut forwarders = self
                .forwarders
                .lock()
                .expect("forwarder list lock poisoned");
            // Re-checked under the lock: a close that raced past the first
            // check must not leave an untracked loop behind.
            if self.closed.load(Ordering::SeqCst) {
                task.abort();
                drop(forwarders);
                running.close().await;
                return Err(ForwardError::ShuttingDown);
            }
            forwarders.push(ManagedForwarder {
                id,
                started_at: Utc::now(),
                forwarder: running,
                task: Some(task),
            });
        }
        tracing::info!("forwarder {} started", id);
        Ok(forwarder)
    }

    /// Block until every registered accept loop has finished.
    pub async fn wait(&self) {
        let tasks: Vec<JoinHandle<()>> = {
            let mut forwarders = self
                .forwarders
                .lock()
                .expect("forwarder list lock poisoned");
            forwarders
                .iter_mut()
                .filter_map(|managed| managed.task.take())
                .collect()
        };
        futures::future::join_all(tasks).await;
    }

    /// Stop everything: no new accept loops start, every forwarder's exit
    /// signal is raised, and the loops are joined. Idempotent.
    pub async fn close(&self) {
        if self.closed.swap(true, Ordering::SeqCst) {
            return;
        }
        self.accept_slots.close();

        let managed: Vec<ManagedForwarder> = {
            let mut forwarders = self
                .forwarders
                .lock()
                .expect("forwarder list lock poisoned");
            forwarders.drain(..).collect()
        };
        for entry in managed {
            entry.forwarder.close().await;
            if let Some(task) = entry.task {
                let _ = task.await;
            }
            tracing::info!(
                "forwarder {} stopped after {}s",
                entry.id,
                (Utc::now() - entry.started_at).num_seconds()
            );
        }
    }
}

impl Default for ForwarderManager {
    fn default() -> Self {
        Self::new()
    }
}
