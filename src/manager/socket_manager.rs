use crate::manager::pool::{Pool, ResourceFactory};
use crate::models::{SocketConfig, SocketFamily};
use crate::utils::error::{ForwardError, Result};
use crate::utils::event::ExitEvent;
use crate::utils::resource::Closeable;
use async_trait::async_trait;
use std::net::SocketAddr;
use std::sync::Arc;
use std::time::Duration;
use tokio::net::{lookup_host, TcpListener, TcpSocket, TcpStream};

const LISTEN_BACKLOG: u32 = 10;
const DIAL_TIMEOUT: Duration = Duration::from_secs(10);
const DEFAULT_BIND_HOST: &str = "localhost";

/// Pool of listening sockets, keyed by [`SocketConfig`].
///
/// Listeners are created on first `get` and reused; a bind collision is
/// resolved by hunting upward from the requested port. Client-side sockets
/// are never pooled; `connect` hands out a fresh stream every time.
pub struct SocketManager {
    pool: Pool<SocketFactory>,
}

impl SocketManager {
    pub fn new() -> Self {
        Self {
            pool: Pool::new(SocketFactory {
                exit: ExitEvent::new(),
            }),
        }
    }

    /// The listener for `config`. The effective port may exceed the
    /// requested one after hunting; it is observable via `local_addr`.
    pub async fn get(&self, config: &SocketConfig) -> Result<Arc<TcpListener>> {
        self.pool.get(config).await
    }

    /// Fresh, uncached client connection to `(host, port)`. Used to dial the
    /// first hop of a transport chain and by remote forwarders reaching the
    /// local service.
    pub async fn connect(&self, host: &str, port: u16) -> Result<TcpStream> {
        if self.pool.is_closed() {
            return Err(ForwardError::ShuttingDown);
        }
        let addr = format!("{}:{}", host, port);
        match tokio::time::timeout(DIAL_TIMEOUT, TcpStream::connect(&addr)).await {
            Ok(connected) => {
                connected.map_err(|e| ForwardError::ConnectFailed(format!("{}: {}", addr, e)))
            }
            Err(_) => Err(ForwardError::Timeout(format!("connect to {}", addr))),
        }
    }

    /// Stop any in-flight port hunt and drop every pooled listener.
    /// Idempotent.
    pub async fn close(&self) {
        self.pool.close().await;
    }
}

impl Default for SocketManager {
    fn default() -> Self {
        Self::new()
    }
}

#[async_trait]
impl Closeable for SocketManager {
    async fn close(&self) {
        SocketManager::close(self).await;
    }
}

struct SocketFactory {
    exit: ExitEvent,
}

#[async_trait]
impl ResourceFactory for SocketFactory {
    type Key = SocketConfig;
    type Resource = Arc<TcpListener>;

    async fn create(&self, config: &SocketConfig) -> Result<Arc<TcpListener>> {
        let Some(start_port) = config.bind_port.filter(|port| *port > 0) else {
            return Err(ForwardError::ConfigError(
                "client sockets are not pooled; use SocketManager::connect".into(),
            ));
        };
        let host = config.bind_address.as_deref().unwrap_or(DEFAULT_BIND_HOST);
        let mut addr = resolve_bind_addr(host, start_port, config.family).await?;

        // Port hunting: on any bind failure move one port up, until a bind
        // succeeds or shutdown begins.
        loop {
            if self.exit.is_set() {
                return Err(ForwardError::ShuttingDown);
            }
            match bind_and_listen(&addr, config.family) {
                Ok(listener) => {
                    if let Ok(bound) = listener.local_addr() {
                        tracing::info!("listening on {}", bound);
                    }
                    return Ok(Arc::new(listener));
                }
                Err(e) => {
                    let next = addr.port().checked_add(1).ok_or_else(|| {
                        ForwardError::BindFailed(format!(
                            "no free port above {} on {}",
                            start_port, host
                        ))
                    })?;
                    tracing::error!("port {} unavailable ({}), trying {}", addr.port(), e, next);
                    addr.set_port(next);
                }
            }
        }
    }

    async fn before_close(&self) {
        self.exit.set();
    }
}

async fn resolve_bind_addr(host: &str, port: u16, family: SocketFamily) -> Result<SocketAddr> {
    let mut addrs = lookup_host((host, port))
        .await
        .map_err(|e| ForwardError::BindFailed(format!("resolving {}: {}", host, e)))?;
    addrs
        .find(|addr| match family {
            SocketFamily::V4 => addr.is_ipv4(),
            SocketFamily::V6 => addr.is_ipv6(),
        })
        .ok_or_else(|| ForwardError::BindFailed(format!("no {:?} address for {}", family, host)))
}

fn bind_and_listen(addr: &SocketAddr, family: SocketFamily) -> std::io::Result<TcpListener> {
    let socket = match family {
        SocketFamily::V4 => TcpSocket::new_v4()?,
        SocketFamily::V6 => TcpSocket::new_v6()?,
    };
    socket.bind(*addr)?;
    socket.listen(LISTEN_BACKLOG)
}

#[cfg(test)]
mod tests {
    use super::*;

    #[tokio::test]
    async fn test_client_config_is_rejected_by_get() {
        let manager = SocketManager::new();
        let result = manager.get(&SocketConfig::client()).await;
        assert!(matches!(result, Err(ForwardError::ConfigError(_))));
    }

    #[tokio::test]
    async fn test_connect_after_close_is_refused() {
        let manager = SocketManager::new();
        manager.close().await;
        assert!(matches!(
            manager.connect("localhost", 9).await,
            Err(ForwardError::ShuttingDown)
        ));
    }
}
