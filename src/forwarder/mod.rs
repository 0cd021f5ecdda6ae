pub mod base;
pub mod dynamic;
pub mod local;
pub mod remote;

pub use base::{BoxedByteStream, ByteStream};
pub use dynamic::DynamicForwarder;
pub use local::LocalForwarder;
pub use remote::RemoteForwarder;

use async_trait::async_trait;

/// A running port-forwarding unit, driven by
/// [`ForwarderManager`](crate::manager::ForwarderManager).
#[async_trait]
pub trait Forwarder: Send + Sync + 'static {
    /// Run the accept loop until the forwarder is closed.
    async fn forward(&self);

    /// Signal shutdown and release owned resources. Idempotent; borrowed
    /// managers are left for their owner to close.
    async fn close(&self);
}
