pub mod forwarder_manager;
pub mod pool;
pub mod socket_manager;
pub mod transport_manager;

// Re-export main types
pub use forwarder_manager::ForwarderManager;
pub use pool::{Pool, ResourceFactory};
pub use socket_manager::SocketManager;
pub use transport_manager::TransportManager;
