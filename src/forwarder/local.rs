use crate::forwarder::base::{
    BoxedByteStream, ForwarderCore, ForwarderHooks, CHANNEL_OPEN_TIMEOUT,
};
use crate::forwarder::Forwarder;
use crate::manager::{SocketManager, TransportManager};
use crate::models::{ForwardConfig, SocketConfig};
use crate::transport::Transport;
use crate::utils::error::{ForwardError, Result};
use crate::utils::resource::Dependency;
use async_trait::async_trait;
use std::sync::Arc;
use tokio::net::TcpListener;
use tokio::sync::RwLock;

/// Listens on `(local_host, local_port)` and tunnels every accepted
/// connection to `(remote_host, remote_port)` through the configured SSH
/// endpoint.
pub struct LocalForwarder {
    config: ForwardConfig,
    remote_port: u16,
    core: ForwarderCore,
    socket_manager: Dependency<SocketManager>,
    transport_manager: Dependency<TransportManager>,
    transport: RwLock<Arc<Transport>>,
    listener: Arc<TcpListener>,
}

impl LocalForwarder {
    /// Construct with internally-owned managers.
    pub async fn new(config: impl Into<ForwardConfig>) -> Result<Self> {
        Self::with_managers(config, None, None).await
    }

    /// Managers injected here are borrowed: `close` leaves them open for
    /// their owner.
    pub async fn with_managers(
        config: impl Into<ForwardConfig>,
        socket_manager: Option<Arc<SocketManager>>,
        transport_manager: Option<Arc<TransportManager>>,
    ) -> Result<Self> {
        let config = config.into();
        let Some(remote_port) = config.remote_port else {
            return Err(ForwardError::ConfigError(
                "local forwarding requires a remote port".into(),
            ));
        };
        let socket_manager = Dependency::from_injected(socket_manager, SocketManager::new);
        let transport_manager =
            Dependency::from_injected(transport_manager, TransportManager::new);

        let transport = transport_manager.get().get(&config.ssh_config).await?;
        let listener = socket_manager
            .get()
            .get(&SocketConfig::listener(
                config.local_port,
                config.local_host.clone(),
            ))
            .await?;

        let label = format!(
            "LocalForwarder[{} <--> {} <--> {}:{}]",
            listener.local_addr()?,
            config.ssh_config,
            config.remote_host,
            remote_port
        );
        tracing::info!("{} initialized", label);

        Ok(Self {
            core: ForwarderCore::new(label),
            remote_port,
            socket_manager,
            transport_manager,
            transport: RwLock::new(transport),
            listener,
            config,
        })
    }

    /// The address actually bound, after any port hunting.
    pub fn local_addr(&self) -> Result<std::net::SocketAddr> {
        Ok(self.listener.local_addr()?)
    }
}

#[async_trait]
impl ForwarderHooks for LocalForwarder {
    async fn source(&self) -> Result<Option<(BoxedByteStream, String)>> {
        let (stream, peer) = self.listener.accept().await?;
        Ok(Some((Box::new(stream), peer.to_string())))
    }

    async fn target(&self, _source: &mut BoxedByteStream) -> Result<(BoxedByteStream, String)> {
        let transport = self.transport.read().await.clone();
        let channel = transport
            .open_direct_tcpip(
                &self.config.remote_host,
                self.remote_port,
                CHANNEL_OPEN_TIMEOUT,
            )
            .await?;
        Ok((
            Box::new(channel.into_stream()),
            format!("{}:{}", self.config.remote_host, self.remote_port),
        ))
    }

    async fn on_forward_failed(&self) {
        // The pool revalidates: a still-active transport comes back as-is, a
        // dead one is rebuilt.
        match self.transport_manager.get().get(&self.config.ssh_config).await {
            Ok(transport) => *self.transport.write().await = transport,
            Err(e) => tracing::error!("{}: transport rebuild failed: {}", self.core.label(), e),
        }
    }
}

#[async_trait]
impl Forwarder for LocalForwarder {
    async fn forward(&self) {
        self.core.run(self).await;
    }

    async fn close(&self) {
        self.core.exit().set();
        self.socket_manager.close_owned().await;
        self.transport_manager.close_owned().await;
    }
}
