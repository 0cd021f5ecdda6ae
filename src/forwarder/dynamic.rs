use crate::forwarder::base::{
    BoxedByteStream, ForwarderCore, ForwarderHooks, CHANNEL_OPEN_TIMEOUT,
};
use crate::forwarder::Forwarder;
use crate::manager::{SocketManager, TransportManager};
use crate::models::{ForwardConfig, SocketConfig};
use crate::protocols::socks5;
use crate::transport::Transport;
use crate::utils::error::{ForwardError, Result};
use crate::utils::resource::Dependency;
use async_trait::async_trait;
use std::sync::Arc;
use tokio::net::TcpListener;
use tokio::sync::RwLock;

/// A local SOCKS5 server whose every CONNECT egresses through the configured
/// SSH endpoint to the client-requested destination. `remote_port` plays no
/// role here.
pub struct DynamicForwarder {
    config: ForwardConfig,
    core: ForwarderCore,
    socket_manager: Dependency<SocketManager>,
    transport_manager: Dependency<TransportManager>,
    transport: RwLock<Arc<Transport>>,
    listener: Arc<TcpListener>,
}

impl DynamicForwarder {
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
            "DynamicForwarder[{} <--> {} <--> *]",
            listener.local_addr()?,
            config.ssh_config
        );
        tracing::info!("{} initialized", label);

        Ok(Self {
            core: ForwarderCore::new(label),
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
impl ForwarderHooks for DynamicForwarder {
    async fn source(&self) -> Result<Option<(BoxedByteStream, String)>> {
        let (stream, peer) = self.listener.accept().await?;
        Ok(Some((Box::new(stream), peer.to_string())))
    }

    async fn target(&self, source: &mut BoxedByteStream) -> Result<(BoxedByteStream, String)> {
        let Some((host, port)) = socks5::destination(source.as_mut()).await? else {
            return Err(ForwardError::SocksProtocol(
                "client did not speak SOCKS5".into(),
            ));
        };
        let transport = self.transport.read().await.clone();
        let channel = transport
            .open_direct_tcpip(&host, port, CHANNEL_OPEN_TIMEOUT)
            .await?;
        Ok((
            Box::new(channel.into_stream()),
            format!("{}:{}", host, port),
        ))
    }

    async fn on_forward_failed(&self) {
        match self.transport_manager.get().get(&self.config.ssh_config).await {
            Ok(transport) => *self.transport.write().await = transport,
            Err(e) => tracing::error!("{}: transport rebuild failed: {}", self.core.label(), e),
        }
    }
}

#[async_trait]
impl Forwarder for DynamicForwarder {
    async fn forward(&self) {
        self.core.run(self).await;
    }

    async fn close(&self) {
        self.core.exit().set();
        self.socket_manager.close_owned().await;
        self.transport_manager.close_owned().await;
    }
}
