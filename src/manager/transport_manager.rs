use crate::manager::pool::{Pool, ResourceFactory};
use crate::manager::socket_manager::SocketManager;
use crate::models::SshConfig;
use crate::transport::Transport;
use crate::utils::error::{ForwardError, Result};
use crate::utils::event::ExitEvent;
use crate::utils::resource::{Closeable, Dependency};
use async_trait::async_trait;
use std::sync::Arc;
use std::time::Duration;

const RETRY_DELAY: Duration = Duration::from_secs(5);
const HOP_DIAL_TIMEOUT: Duration = Duration::from_secs(10);

/// Pool of SSH transports, keyed by [`SshConfig`] identity.
///
/// One transport per `user@ip:port` is shared by every forwarder asking for
/// it; a transport that went inactive is rebuilt on the next `get`. Building
/// walks the config's jump chain, nesting each hop's SSH session inside a
/// `direct-tcpip` channel of the previous one.
pub struct TransportManager {
    pool: Pool<TransportFactory>,
}

impl TransportManager {
    pub fn new() -> Self {
        Self::with_socket_manager(None)
    }

    /// A `socket_manager` injected here is borrowed: the caller keeps
    /// ownership and is the one to close it.
    pub fn with_socket_manager(socket_manager: Option<Arc<SocketManager>>) -> Self {
        let factory = TransportFactory {
            socket_manager: Dependency::from_injected(socket_manager, SocketManager::new),
            exit: ExitEvent::new(),
        };
        Self {
            pool: Pool::new(factory),
        }
    }

    /// The live transport for `config`, connecting (or reconnecting) the
    /// whole chain if needed. Blocks through connect retries until success
    /// or shutdown; concurrent callers for the same identity share one
    /// connection attempt.
    pub async fn get(&self, config: &SshConfig) -> Result<Arc<Transport>> {
        self.pool.get(config).await
    }

    /// Abort in-flight connection attempts and disconnect every pooled
    /// transport. Idempotent.
    pub async fn close(&self) {
        self.pool.close().await;
    }
}

impl Default for TransportManager {
    fn default() -> Self {
        Self::new()
    }
}

#[async_trait]
impl Closeable for TransportManager {
    async fn close(&self) {
        TransportManager::close(self).await;
    }
}

struct TransportFactory {
    socket_manager: Dependency<SocketManager>,
    exit: ExitEvent,
}

impl TransportFactory {
    /// Connect the chain `[jump₁, …, jumpₙ, config]` hop by hop. The first
    /// hop rides a plain TCP connection; every later hop rides a
    /// `direct-tcpip` channel opened on the transport built so far.
    async fn build_chain(&self, config: &SshConfig) -> Result<Transport> {
        let mut transport: Option<Transport> = None;
        for hop in config.connection_chain() {
            let upstream = transport.take().map(Arc::new);
            let next = match upstream {
                Some(current) => {
                    let channel = current
                        .open_direct_tcpip(&hop.ip, hop.port, HOP_DIAL_TIMEOUT)
                        .await?;
                    Transport::establish(channel.into_stream(), hop, Some(current)).await?
                }
                None => {
                    let stream = self
                        .socket_manager
                        .get()
                        .connect(&hop.ip, hop.port)
                        .await?;
                    Transport::establish(stream, hop, None).await?
                }
            };
            transport = Some(next);
        }
        transport.ok_or_else(|| ForwardError::ConfigError("empty connection chain".into()))
    }
}

#[async_trait]
impl ResourceFactory for TransportFactory {
    type Key = SshConfig;
    type Resource = Arc<Transport>;

    async fn create(&self, config: &SshConfig) -> Result<Arc<Transport>> {
        let mut retries = 0u32;
        while !self.exit.is_set() {
            match self.build_chain(config).await {
                Ok(transport) => {
                    if retries > 0 {
                        tracing::info!("{} connected after {} retries", config, retries);
                    }
                    tracing::debug!(
                        "transport to {} established ({} hop(s))",
                        config,
                        transport.hops()
                    );
                    return Ok(Arc::new(transport));
                }
                Err(e) if e.is_shutdown() => break,
                Err(e) => {
                    tracing::error!(
                        "{}: ssh connect failed ({}), retrying in {}s",
                        config,
                        e,
                        RETRY_DELAY.as_secs()
                    );
                    retries += 1;
                    tokio::select! {
                        _ = tokio::time::sleep(RETRY_DELAY) => {}
                        _ = self.exit.cancelled() => break,
                    }
                }
            }
        }
        Err(ForwardError::ShuttingDown)
    }

    async fn validate(&self, transport: &Arc<Transport>) -> bool {
        transport.is_active().await
    }

    async fn close_resource(&self, transport: Arc<Transport>) {
        transport.close().await;
    }

    async fn before_close(&self) {
        self.exit.set();
        self.socket_manager.close_owned().await;
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[tokio::test]
    async fn test_close_is_idempotent_and_spares_borrowed_socket_manager() {
        let shared = Arc::new(SocketManager::new());
        let manager = TransportManager::with_socket_manager(Some(shared.clone()));

        manager.close().await;
        manager.close().await;

        // The borrowed socket manager must still be usable by its owner.
        let listener = shared
            .get(&crate::models::SocketConfig::listener(24661, "127.0.0.1"))
            .await;
        assert!(listener.is_ok());
        shared.close().await;
    }

    #[tokio::test]
    async fn test_get_after_close_returns_shutdown() {
        use russh::keys::ssh_key::{private::Ed25519Keypair, PrivateKey};

        let manager = TransportManager::new();
        manager.close().await;

        let key = Arc::new(PrivateKey::from(Ed25519Keypair::from_seed(&[3u8; 32])));
        let config = SshConfig::new("127.0.0.1", "nobody", key);
        assert!(matches!(
            manager.get(&config).await,
            Err(ForwardError::ShuttingDown)
        ));
    }
}
