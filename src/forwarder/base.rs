//! The accept → dial → relay machinery shared by all forwarder variants.

use crate::utils::error::Result;
use crate::utils::event::ExitEvent;
use crate::utils::payload;
use async_trait::async_trait;
use std::sync::Arc;
use std::time::Duration;
use tokio::io::{AsyncRead, AsyncReadExt, AsyncWrite, AsyncWriteExt};
use tokio::sync::Semaphore;

pub(crate) const MAX_RELAY_WORKERS: usize = 4096;
pub(crate) const RELAY_BUF_SIZE: usize = 4096;
pub(crate) const ACCEPT_POLL: Duration = Duration::from_secs(1);
pub(crate) const CHANNEL_OPEN_TIMEOUT: Duration = Duration::from_secs(5);
const PAYLOAD_PRINT_LEN: usize = 16;

/// Byte-stream capability shared by OS sockets and SSH channels. The relay
/// worker and the SOCKS5 handshake are parametric over this alone.
pub trait ByteStream: AsyncRead + AsyncWrite + Send + Unpin {}

impl<T: AsyncRead + AsyncWrite + Send + Unpin> ByteStream for T {}

pub type BoxedByteStream = Box<dyn ByteStream>;

/// The two ends a forwarder variant supplies to the shared accept loop.
#[async_trait]
pub(crate) trait ForwarderHooks: Send + Sync {
    /// Block until an ingress is available. `Ok(None)` is a benign poll
    /// timeout; the loop just continues.
    async fn source(&self) -> Result<Option<(BoxedByteStream, String)>>;

    /// Establish the egress matching an accepted ingress. The ingress is
    /// borrowed mutably so handshakes (SOCKS5) can run on it first.
    async fn target(&self, source: &mut BoxedByteStream) -> Result<(BoxedByteStream, String)>;

    /// Invoked after a failure in the accept loop; variants use it to
    /// revalidate their transport.
    async fn on_forward_failed(&self) {}
}

/// Exit signal and relay-worker pool of one forwarder.
pub(crate) struct ForwarderCore {
    label: String,
    exit: ExitEvent,
    workers: Arc<Semaphore>,
}

impl ForwarderCore {
    pub(crate) fn new(label: String) -> Self {
        Self {
            label,
            exit: ExitEvent::new(),
            workers: Arc::new(Semaphore::new(MAX_RELAY_WORKERS)),
        }
    }

    pub(crate) fn exit(&self) -> &ExitEvent {
        &self.exit
    }

    pub(crate) fn label(&self) -> &str {
        &self.label
    }

    /// The accept loop. Runs until the exit event is set. Failures are local
    /// to one connection: the orphan ingress is closed, the error logged,
    /// and the recovery hook invoked before the loop continues.
    pub(crate) async fn run(&self, hooks: &dyn ForwarderHooks) {
        while !self.exit.is_set() {
            let accepted = tokio::select! {
                _ = self.exit.cancelled() => break,
                accepted = hooks.source() => accepted,
            };
            let (mut from_stream, from_addr) = match accepted {
                Ok(Some(ingress)) => ingress,
                Ok(None) => continue,
                Err(e) => {
                    if self.exit.is_set() || e.is_shutdown() {
                        break;
                    }
                    tracing::error!("{}: {}", self.label, e);
                    hooks.on_forward_failed().await;
                    continue;
                }
            };

            match hooks.target(&mut from_stream).await {
                Ok((to_stream, to_addr)) => {
                    self.spawn_relay(from_stream, from_addr, to_stream, to_addr);
                }
                Err(e) => {
                    // Close the orphan ingress so the client is not left
                    // hanging on an accepted-but-abandoned connection.
                    let _ = from_stream.shutdown().await;
                    tracing::error!("{}: {}", self.label, e);
                    hooks.on_forward_failed().await;
                }
            }
        }
        tracing::debug!("{}: accept loop finished", self.label);
    }

    fn spawn_relay(
        &self,
        from: BoxedByteStream,
        from_addr: String,
        to: BoxedByteStream,
        to_addr: String,
    ) {
        let workers = self.workers.clone();
        let exit = self.exit.clone();
        tokio::spawn(async move {
            // Queue inside the worker pool: at the cap, accepted pairs wait
            // here and TCP-level backpressure takes over.
            let _permit = tokio::select! {
                _ = exit.cancelled() => return,
                permit = workers.acquire_owned() => match permit {
                    Ok(permit) => permit,
                    Err(_) => return,
                },
            };
            relay(from, from_addr, to, to_addr, exit).await;
        });
    }
}

/// Copy bidirectionally until EOF, an I/O error, or shutdown. Both streams
/// are closed together when any of those occurs; within one direction bytes
/// stay in order.
pub(crate) async fn relay(
    mut from: BoxedByteStream,
    from_addr: String,
    mut to: BoxedByteStream,
    to_addr: String,
    exit: ExitEvent,
) {
    let mut from_buf = [0u8; RELAY_BUF_SIZE];
    let mut to_buf = [0u8; RELAY_BUF_SIZE];

    loop {
        tokio::select! {
            _ = exit.cancelled() => break,
            read = from.read(&mut from_buf) => {
                if !relay_chunk(read, &from_buf, &mut to, &from_addr, &to_addr).await {
                    break;
                }
            }
            read = to.read(&mut to_buf) => {
                if !relay_chunk(read, &to_buf, &mut from, &to_addr, &from_addr).await {
                    break;
                }
            }
        }
    }

    let _ = from.shutdown().await;
    let _ = to.shutdown().await;
    tracing::debug!("relay {} <--> {} finished", from_addr, to_addr);
}

async fn relay_chunk(
    read: std::io::Result<usize>,
    buf: &[u8],
    dest: &mut BoxedByteStream,
    src_addr: &str,
    dest_addr: &str,
) -> bool {
    let n = match read {
        Ok(0) => return false, // EOF
        Ok(n) => n,
        Err(e) => {
            tracing::debug!("[{} --> {}] {}", src_addr, dest_addr, e);
            return false;
        }
    };
    if tracing::enabled!(tracing::Level::DEBUG) {
        tracing::debug!(
            "[{} --> {}] {}",
            src_addr,
            dest_addr,
            payload::describe_payload(&buf[..n], PAYLOAD_PRINT_LEN)
        );
    }
    if let Err(e) = dest.write_all(&buf[..n]).await {
        tracing::debug!("[{} --> {}] {}", src_addr, dest_addr, e);
        return false;
    }
    true
}

#[cfg(test)]
mod tests {
    use super::*;
    use tokio::io::duplex;

    #[tokio::test]
    async fn test_relay_preserves_bytes_and_order() {
        let (mut client_a, side_a) = duplex(64 * 1024);
        let (side_b, mut client_b) = duplex(64 * 1024);

        let exit = ExitEvent::new();
        let worker = tokio::spawn(relay(
            Box::new(side_a) as BoxedByteStream,
            "a".into(),
            Box::new(side_b) as BoxedByteStream,
            "b".into(),
            exit,
        ));

        // More than one chunk, with recognizable structure.
        let payload: Vec<u8> = (0..10_000u32).flat_map(|i| i.to_be_bytes()).collect();
        client_a.write_all(&payload).await.unwrap();
        client_a.shutdown().await.unwrap();

        let mut received = Vec::new();
        client_b.read_to_end(&mut received).await.unwrap();
        assert_eq!(received, payload);
        worker.await.unwrap();
    }

    #[tokio::test]
    async fn test_relay_works_both_directions() {
        let (mut client_a, side_a) = duplex(1024);
        let (side_b, mut client_b) = duplex(1024);

        let exit = ExitEvent::new();
        tokio::spawn(relay(
            Box::new(side_a) as BoxedByteStream,
            "a".into(),
            Box::new(side_b) as BoxedByteStream,
            "b".into(),
            exit.clone(),
        ));

        client_a.write_all(b"ping").await.unwrap();
        let mut buf = [0u8; 4];
        client_b.read_exact(&mut buf).await.unwrap();
        assert_eq!(&buf, b"ping");

        client_b.write_all(b"pong").await.unwrap();
        client_a.read_exact(&mut buf).await.unwrap();
        assert_eq!(&buf, b"pong");

        exit.set();
    }

    #[tokio::test]
    async fn test_exit_event_stops_idle_relay() {
        let (_client_a, side_a) = duplex(64);
        let (side_b, _client_b) = duplex(64);

        let exit = ExitEvent::new();
        let worker = tokio::spawn(relay(
            Box::new(side_a) as BoxedByteStream,
            "a".into(),
            Box::new(side_b) as BoxedByteStream,
            "b".into(),
            exit.clone(),
        ));

        exit.set();
        tokio::time::timeout(Duration::from_secs(1), worker)
            .await
            .expect("relay must stop on exit")
            .unwrap();
    }

    #[tokio::test]
    async fn test_relay_closes_peer_on_eof() {
        let (client_a, side_a) = duplex(64);
        let (side_b, mut client_b) = duplex(64);

        let exit = ExitEvent::new();
        tokio::spawn(relay(
            Box::new(side_a) as BoxedByteStream,
            "a".into(),
            Box::new(side_b) as BoxedByteStream,
            "b".into(),
            exit,
        ));

        drop(client_a); // EOF on one side

        let mut buf = Vec::new();
        client_b.read_to_end(&mut buf).await.unwrap();
        assert!(buf.is_empty());
    }
}
