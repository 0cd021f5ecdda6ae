use async_trait::async_trait;
use std::sync::Arc;

/// Anything that can be shut down cooperatively.
#[async_trait]
pub trait Closeable {
    async fn close(&self);
}

/// A dependency that is either constructed (and later closed) by its holder,
/// or injected by a caller who keeps ownership.
///
/// The invariant: `close_owned` tears down the `Owned` variant only. A
/// borrowed resource is never closed here; its external owner decides when.
/// This lets one `ForwarderManager` share a single `SocketManager` and
/// `TransportManager` across many forwarders without double-close.
pub enum Dependency<T> {
    Owned(Arc<T>),
    Borrowed(Arc<T>),
}

impl<T> Dependency<T> {
    /// Wrap `injected` as borrowed, or build a fresh owned instance.
    pub fn from_injected(injected: Option<Arc<T>>, make: impl FnOnce() -> T) -> Self {
        match injected {
            Some(resource) => Self::Borrowed(resource),
            None => Self::Owned(Arc::new(make())),
        }
    }

    pub fn get(&self) -> &Arc<T> {
        match self {
            Self::Owned(resource) | Self::Borrowed(resource) => resource,
        }
    }

    pub fn is_owned(&self) -> bool {
        matches!(self, Self::Owned(_))
    }
}

impl<T: Closeable + Send + Sync> Dependency<T> {
    /// Close the resource if and only if this holder owns it.
    pub async fn close_owned(&self) {
        if let Self::Owned(resource) = self {
            resource.close().await;
        }
    }
}
