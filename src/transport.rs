//! SSH transport handle: one authenticated session that carries any number
//! of forwarding channels.

use crate::models::SshConfig;
use crate::utils::error::{ForwardError, Result};
use russh::client::{self, AuthResult, Handle, Msg};
use russh::keys::PrivateKeyWithHashAlg;
// In russh 0.55.0, key types are re-exported in russh::keys
use russh::keys::PublicKey;
use russh::{Channel, Disconnect};
use std::sync::Arc;
use std::time::Duration;
use tokio::io::{AsyncRead, AsyncWrite};
use tokio::sync::{mpsc, Mutex};

pub(crate) const KEEPALIVE_INTERVAL: Duration = Duration::from_secs(30);

/// An inbound connection handed over by the SSH server for an established
/// remote forward.
pub struct ForwardedConnection {
    pub channel: Channel<Msg>,
    /// Peer address on the SSH-server side.
    pub origin: (String, u16),
}

/// A live SSH session, possibly reached through a chain of jump hosts.
///
/// Channel opens from multiple forwarders on one transport are a supported
/// and expected pattern. The previous hop of a chained connection is kept in
/// `upstream` so the carrying sessions stay alive as long as this one.
pub struct Transport {
    handle: Mutex<Handle<TransportHandler>>,
    incoming: Mutex<mpsc::UnboundedReceiver<ForwardedConnection>>,
    peer: (String, u16),
    upstream: Option<Arc<Transport>>,
}

impl Transport {
    /// SSH-connect over `stream` and authenticate as `hop` with its key.
    /// `stream` is either a fresh TCP connection or a `direct-tcpip` channel
    /// of the previous hop; both are plain byte streams here.
    pub(crate) async fn establish<S>(
        stream: S,
        hop: &SshConfig,
        upstream: Option<Arc<Transport>>,
    ) -> Result<Self>
    where
        S: AsyncRead + AsyncWrite + Unpin + Send + 'static,
    {
        let config = client::Config {
            keepalive_interval: Some(KEEPALIVE_INTERVAL),
            ..<client::Config as Default>::default()
        };
        let (sender, receiver) = mpsc::unbounded_channel();
        let handler = TransportHandler::new(sender);

        let mut handle = client::connect_stream(Arc::new(config), stream, handler)
            .await
            .map_err(|e| ForwardError::SshConnectionFailed(format!("{}: {}", hop, e)))?;

        let key = PrivateKeyWithHashAlg::new(hop.private_key.clone(), None);
        let auth_res = handle
            .authenticate_publickey(hop.user.as_str(), key)
            .await
            .map_err(|e| ForwardError::AuthenticationFailed(format!("{}: {}", hop, e)))?;

        if !matches!(auth_res, AuthResult::Success) {
            return Err(ForwardError::AuthenticationFailed(format!(
                "{}: public key rejected",
                hop
            )));
        }

        Ok(Self {
            handle: Mutex::new(handle),
            incoming: Mutex::new(receiver),
            peer: (hop.ip.clone(), hop.port),
            upstream,
        })
    }

    pub async fn is_active(&self) -> bool {
        !self.handle.lock().await.is_closed()
    }

    /// Open a `direct-tcpip` channel to `(host, port)`, originating from this
    /// transport's own peer address.
    pub async fn open_direct_tcpip(
        &self,
        host: &str,
        port: u16,
        timeout: Duration,
    ) -> Result<Channel<Msg>> {
        let handle = self.handle.lock().await;
        let open = handle.channel_open_direct_tcpip(
            host,
            port as u32,
            self.peer.0.as_str(),
            self.peer.1 as u32,
        );
        match tokio::time::timeout(timeout, open).await {
            Ok(opened) => opened.map_err(|e| {
                ForwardError::ChannelOpenFailed(format!("{}:{}: {}", host, port, e))
            }),
            Err(_) => Err(ForwardError::Timeout(format!(
                "channel open to {}:{}",
                host, port
            ))),
        }
    }

    /// Ask the server to listen on `(host, port)` and route connections back
    /// here. Returns the effective port: requesting port 0 lets the server
    /// choose one.
    pub async fn request_port_forward(&self, host: &str, port: u16) -> Result<u16> {
        let mut handle = self.handle.lock().await;
        let bound = handle
            .tcpip_forward(host, port as u32)
            .await
            .map_err(|e| {
                ForwardError::ForwardRequestFailed(format!("{}:{}: {}", host, port, e))
            })?;
        Ok(if bound != 0 { bound as u16 } else { port })
    }

    /// Wait up to `timeout` for an inbound forwarded connection. `None` is a
    /// benign timeout.
    pub async fn accept(&self, timeout: Duration) -> Option<ForwardedConnection> {
        let mut incoming = self.incoming.lock().await;
        tokio::time::timeout(timeout, incoming.recv())
            .await
            .ok()
            .flatten()
    }

    /// `(host, port)` of the SSH endpoint this transport terminates at.
    pub fn peer_addr(&self) -> (&str, u16) {
        (&self.peer.0, self.peer.1)
    }

    /// Number of SSH sessions stacked under this one, itself included.
    pub fn hops(&self) -> usize {
        1 + self.upstream.as_ref().map_or(0, |u| u.hops())
    }

    pub async fn close(&self) {
        let mut handle = self.handle.lock().await;
        if let Err(e) = handle
            .disconnect(Disconnect::ByApplication, "", "English")
            .await
        {
            tracing::debug!("disconnect from {}:{}: {}", self.peer.0, self.peer.1, e);
        }
    }
}

/// russh event handler: accepts server keys (logging the fingerprint) and
/// queues inbound forwarded-tcpip channels for [`Transport::accept`].
#[derive(Clone)]
pub(crate) struct TransportHandler {
    incoming: mpsc::UnboundedSender<ForwardedConnection>,
}

impl TransportHandler {
    fn new(incoming: mpsc::UnboundedSender<ForwardedConnection>) -> Self {
        Self { incoming }
    }
}

impl client::Handler for TransportHandler {
    type Error = russh::Error;

    // In russh 0.55.0, check_server_key uses impl Future, no #[async_trait] needed
    fn check_server_key(
        &mut self,
        server_public_key: &PublicKey,
    ) -> impl std::future::Future<Output = std::result::Result<bool, Self::Error>> + Send {
        use russh::keys::ssh_key::HashAlg;
        let fingerprint = server_public_key.fingerprint(HashAlg::Sha256).to_string();

        async move {
            tracing::debug!("server key fingerprint: {}", fingerprint);
            Ok(true)
        }
    }

    fn server_channel_open_forwarded_tcpip(
        &mut self,
        channel: Channel<Msg>,
        connected_address: &str,
        connected_port: u32,
        originator_address: &str,
        originator_port: u32,
        _session: &mut client::Session,
    ) -> impl std::future::Future<Output = std::result::Result<(), Self::Error>> + Send {
        let connected = format!("{}:{}", connected_address, connected_port);
        let origin = (originator_address.to_string(), originator_port as u16);
        let queued = self.incoming.send(ForwardedConnection { channel, origin });

        async move {
            match queued {
                Ok(()) => {
                    tracing::debug!("queued forwarded connection for {}", connected);
                    Ok(())
                }
                Err(_) => {
                    tracing::warn!("no forwarder accepting connections for {}", connected);
                    Err(russh::Error::Disconnect)
                }
            }
        }
    }
}
