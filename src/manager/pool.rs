//! Keyed resource cache with validate-or-replace lookups.
//!
//! Creation can block for a long time (an SSH chain build takes seconds), so
//! the pool serializes creation per key rather than globally: callers of the
//! same key wait on one another, callers of different keys proceed in
//! parallel.

use crate::utils::error::{ForwardError, Result};
use async_trait::async_trait;
use std::collections::HashMap;
use std::hash::Hash;
use std::sync::atomic::{AtomicBool, Ordering};
use std::sync::{Arc, Mutex as StdMutex};
use tokio::sync::Mutex as AsyncMutex;

/// What a pool delegates to its owner: how to build, check and tear down one
/// resource.
#[async_trait]
pub trait ResourceFactory: Send + Sync {
    type Key: Eq + Hash + Clone + Send + Sync;
    type Resource: Clone + Send + Sync;

    /// Build the resource for `key`. A failed creation stores nothing; the
    /// next `get` for the key retries.
    async fn create(&self, key: &Self::Key) -> Result<Self::Resource>;

    /// A cached resource failing this check is replaced before `get` returns.
    async fn validate(&self, _resource: &Self::Resource) -> bool {
        true
    }

    async fn close_resource(&self, _resource: Self::Resource) {}

    /// Runs exactly once, at the start of `close`, before stored resources
    /// are torn down.
    async fn before_close(&self) {}
}

pub struct Pool<F: ResourceFactory> {
    factory: F,
    entries: StdMutex<HashMap<F::Key, F::Resource>>,
    create_locks: StdMutex<HashMap<F::Key, Arc<AsyncMutex<()>>>>,
    closed: AtomicBool,
}

impl<F: ResourceFactory> Pool<F> {
    pub fn new(factory: F) -> Self {
        Self {
            factory,
            entries: StdMutex::new(HashMap::new()),
            create_locks: StdMutex::new(HashMap::new()),
            closed: AtomicBool::new(false),
        }
    }

    pub fn factory(&self) -> &F {
        &self.factory
    }

    pub fn is_closed(&self) -> bool {
        self.closed.load(Ordering::SeqCst)
    }

    /// Look up `key`, rebuilding the entry if it is missing or no longer
    /// valid. At most one creation per key runs at a time.
    pub async fn get(&self, key: &F::Key) -> Result<F::Resource> {
        if self.is_closed() {
            return Err(ForwardError::ShuttingDown);
        }
        if let Some(found) = self.lookup(key) {
            if self.factory.validate(&found).await {
                return Ok(found);
            }
        }

        let creation = self.creation_lock(key);
        let _guard = creation.lock().await;

        // Another caller may have rebuilt the entry while we waited.
        if let Some(found) = self.lookup(key) {
            if self.factory.validate(&found).await {
                return Ok(found);
            }
        }

        let resource = self.factory.create(key).await?;
        if self.is_closed() {
            self.factory.close_resource(resource).await;
            return Err(ForwardError::ShuttingDown);
        }
        self.entries
            .lock()
            .expect("pool entries lock poisoned")
            .insert(key.clone(), resource.clone());
        Ok(resource)
    }

    /// Tear the pool down: run `before_close` once, then close every stored
    /// resource. Idempotent.
    pub async fn close(&self) {
        if self.closed.swap(true, Ordering::SeqCst) {
            return;
        }
        self.factory.before_close().await;
        let drained: Vec<F::Resource> = {
            let mut entries = self.entries.lock().expect("pool entries lock poisoned");
            entries.drain().map(|(_, resource)| resource).collect()
        };
        for resource in drained {
            self.factory.close_resource(resource).await;
        }
    }

    fn lookup(&self, key: &F::Key) -> Option<F::Resource> {
        self.entries
            .lock()
            .expect("pool entries lock poisoned")
            .get(key)
            .cloned()
    }

    fn creation_lock(&self, key: &F::Key) -> Arc<AsyncMutex<()>> {
        self.create_locks
            .lock()
            .expect("pool create locks poisoned")
            .entry(key.clone())
            .or_default()
            .clone()
    }
}
