pub mod forward;
pub mod socket;
pub mod ssh;

// Re-export main types
pub use forward::ForwardConfig;
pub use socket::{SocketConfig, SocketFamily, SocketKind};
pub use ssh::SshConfig;
