//! SSH port-forwarding supervisor.
//!
//! Maintains a fleet of TCP forwarders that tunnel traffic through one or
//! more SSH transports, optionally chained through jump hosts:
//!
//! - [`LocalForwarder`]: listen locally, egress via SSH to a fixed
//!   `host:port`
//! - [`RemoteForwarder`]: the SSH server listens, traffic ingresses back to
//!   a local `host:port`
//! - [`DynamicForwarder`]: a local SOCKS5 server whose egress destination
//!   comes from each client request
//!
//! Transports are pooled and shared: forwarders targeting the same
//! `user@ip:port` ride one SSH session, and a session that drops is rebuilt
//! on the next use.
//!
//! # Example
//!
//! ```rust,no_run
//! use ssh_forwarder::{DynamicForwarder, ForwarderManager, LocalForwarder, SshConfig};
//! use std::sync::Arc;
//!
//! #[tokio::main]
//! async fn main() -> Result<(), Box<dyn std::error::Error>> {
//!     ssh_forwarder::logger::init()?;
//!
//!     let key = Arc::new(russh::keys::load_secret_key("/home/ln/.ssh/id_ed25519", None)?);
//!     let master = SshConfig::new("202.116.105.20", "ln", key.clone());
//!     let gpu02 = SshConfig::new("gpu02", "ln", key.clone())
//!         .with_jump_servers(vec![master.clone()]);
//!
//!     let manager = ForwarderManager::new();
//!     // localhost:8888 -> (via master, then gpu02) -> gpu02's localhost:9443
//!     manager.get(LocalForwarder::new((8888, 9443, gpu02)).await?).await?;
//!     // SOCKS5 proxy on localhost:1080, egress via master
//!     manager.get(DynamicForwarder::new((1080, None, master)).await?).await?;
//!
//!     manager.wait().await;
//!     Ok(())
//! }
//! ```

pub mod forwarder;
pub mod manager;
pub mod models;
pub mod protocols;
pub mod settings;
pub mod transport;
pub mod utils;

// Re-export main types
pub use forwarder::{DynamicForwarder, Forwarder, LocalForwarder, RemoteForwarder};
pub use manager::{ForwarderManager, SocketManager, TransportManager};
pub use models::{ForwardConfig, SocketConfig, SshConfig};
pub use settings::Settings;
pub use transport::Transport;
pub use utils::error::{ForwardError, Result};
pub use utils::logger;
