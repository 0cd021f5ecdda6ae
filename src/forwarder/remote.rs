use crate::forwarder::base::{BoxedByteStream, ForwarderCore, ForwarderHooks, ACCEPT_POLL};
use crate::forwarder::Forwarder;
use crate::manager::{SocketManager, TransportManager};
use crate::models::ForwardConfig;
use crate::transport::Transport;
use crate::utils::error::{ForwardError, Result};
use crate::utils::resource::Dependency;
use async_trait::async_trait;
use std::sync::Arc;
use tokio::sync::RwLock;

/// Asks the SSH server to listen on `(remote_host, remote_port)` and bridges
/// every connection arriving there back to `(local_host, local_port)`.
///
/// When the requested remote port is taken server-side, the server is asked
/// for any free port instead and the effective one is logged.
pub struct RemoteForwarder {
    config: ForwardConfig,
    requested_port: u16,
    core: ForwarderCore,
    socket_manager: Dependency<SocketManager>,
    transport_manager: Dependency<TransportManager>,
    state: RwLock<RemoteState>,
}

struct RemoteState {
    transport: Arc<Transport>,
    bound_port: u16,
}

impl RemoteForwarder {
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
        let Some(requested_port) = config.remote_port else {
            return Err(ForwardError::ConfigError(
                "remote forwarding requires a remote port".into(),
            ));
        };
        let socket_manager = Dependency::from_injected(socket_manager, SocketManager::new);
        let transport_manager =
            Dependency::from_injected(transport_manager, TransportManager::new);

        let transport = transport_manager.get().get(&config.ssh_config).await?;
        let bound_port =
            Self::request_forward(&transport, &config.remote_host, requested_port).await?;

        let label = format!(
            "RemoteForwarder[{}:{} <--> {} <--> {}:{}]",
            config.local_host, config.local_port, config.ssh_config, config.remote_host, bound_port
        );
        tracing::info!("{} initialized", label);

        Ok(Self {
            core: ForwarderCore::new(label),
            requested_port,
            socket_manager,
            transport_manager,
            state: RwLock::new(RemoteState {
                transport,
                bound_port,
            }),
            config,
        })
    }

    /// The port the server actually listens on; differs from the requested
    /// one after a collision.
    pub async fn bound_port(&self) -> u16 {
        self.state.read().await.bound_port
    }

    async fn request_forward(transport: &Transport, host: &str, port: u16) -> Result<u16> {
        match transport.request_port_forward(host, port).await {
            Ok(bound) => Ok(bound),
            Err(e) => {
                tracing::error!("binding remote port {} failed: {}", port, e);
                let bound = transport.request_port_forward(host, 0).await?;
                tracing::warn!("server chose remote port {}", bound);
                Ok(bound)
            }
        }
    }
}

#[async_trait]
impl ForwarderHooks for RemoteForwarder {
    async fn source(&self) -> Result<Option<(BoxedByteStream, String)>> {
        let transport = self.state.read().await.transport.clone();
        match transport.accept(ACCEPT_POLL).await {
            Some(connection) => {
                let origin = format!("{}:{}", connection.origin.0, connection.origin.1);
                Ok(Some((Box::new(connection.channel.into_stream()), origin)))
            }
            None => {
                // A quiet poll on a dead transport would never recover:
                // surface it so the failure hook rebuilds the forward.
                if transport.is_active().await {
                    Ok(None)
                } else {
                    Err(ForwardError::SshConnectionFailed(
                        "transport closed while waiting for forwarded connections".into(),
                    ))
                }
            }
        }
    }

    async fn target(&self, _source: &mut BoxedByteStream) -> Result<(BoxedByteStream, String)> {
        let stream = self
            .socket_manager
            .get()
            .connect(&self.config.local_host, self.config.local_port)
            .await?;
        Ok((
            Box::new(stream),
            format!("{}:{}", self.config.local_host, self.config.local_port),
        ))
    }

    async fn on_forward_failed(&self) {
        let current = self.state.read().await.transport.clone();
        match self.transport_manager.get().get(&self.config.ssh_config).await {
            Ok(transport) => {
                if Arc::ptr_eq(&transport, &current) {
                    return;
                }
                // A rebuilt transport carries no server-side listener yet.
                match Self::request_forward(
                    &transport,
                    &self.config.remote_host,
                    self.requested_port,
                )
                .await
                {
                    Ok(bound) => {
                        let mut state = self.state.write().await;
                        state.transport = transport;
                        state.bound_port = bound;
                        tracing::info!(
                            "{}: remote forward re-established on port {}",
                            self.core.label(),
                            bound
                        );
                    }
                    Err(e) => tracing::error!("{}: {}", self.core.label(), e),
                }
            }
            Err(e) => tracing::error!("{}: transport rebuild failed: {}", self.core.label(), e),
        }
    }
}

#[async_trait]
impl Forwarder for RemoteForwarder {
    async fn forward(&self) {
        self.core.run(self).await;
    }

    async fn close(&self) {
        self.core.exit().set();
        self.socket_manager.close_owned().await;
        self.transport_manager.close_owned().await;
    }
}
