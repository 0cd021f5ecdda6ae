//! Server side of a minimal RFC 1928 subset: no authentication (method 0x00),
//! CONNECT-shaped requests only.
//!
//! The command byte is deliberately not validated: BIND and UDP ASSOCIATE are
//! unsupported, and clients sending them fail later at channel open rather
//! than here.

use crate::utils::error::{ForwardError, Result};
use std::net::Ipv6Addr;
use tokio::io::{AsyncRead, AsyncReadExt, AsyncWrite, AsyncWriteExt};

const SOCKS_VERSION: u8 = 5;

const ATYP_IPV4: u8 = 0x01;
const ATYP_DOMAIN: u8 = 0x03;
const ATYP_IPV6: u8 = 0x04;

/// VER=5, REP=succeeded, ATYP=IPv4, bound address and port all zero.
const SUCCESS_REPLY: [u8; 10] = [5, 0, 0, 1, 0, 0, 0, 0, 0, 0];

/// Run the handshake on an accepted stream and return the requested
/// destination.
///
/// `Ok(None)` means the peer did not speak SOCKS5; the greeting was answered
/// with an empty write and the connection is left for the caller to discard.
/// Unresolvable address types parse as the literal host `"unknown"`.
pub async fn destination<S>(stream: &mut S) -> Result<Option<(String, u16)>>
where
    S: AsyncRead + AsyncWrite + Unpin + ?Sized,
{
    let mut header = [0u8; 2];
    read_exact(stream, &mut header, "greeting").await?;
    let (version, nmethods) = (header[0], header[1]);

    if version != SOCKS_VERSION {
        let _ = stream.write(&[]).await;
        tracing::error!("unsupported SOCKS version {}", version);
        return Ok(None);
    }

    // Methods are consumed and ignored; NO-AUTH is always selected.
    let mut methods = vec![0u8; nmethods as usize];
    read_exact(stream, &mut methods, "methods").await?;
    write_all(stream, &[SOCKS_VERSION, 0], "method selection").await?;

    let mut request = [0u8; 4];
    read_exact(stream, &mut request, "request").await?;
    let atyp = request[3];

    let address = match atyp {
        ATYP_IPV4 => {
            let mut octets = [0u8; 4];
            read_exact(stream, &mut octets, "IPv4 address").await?;
            format!("{}.{}.{}.{}", octets[0], octets[1], octets[2], octets[3])
        }
        ATYP_DOMAIN => {
            let mut len = [0u8; 1];
            read_exact(stream, &mut len, "domain length").await?;
            let mut domain = vec![0u8; len[0] as usize];
            read_exact(stream, &mut domain, "domain").await?;
            String::from_utf8(domain)
                .map_err(|e| ForwardError::SocksProtocol(format!("domain not UTF-8: {}", e)))?
        }
        ATYP_IPV6 => {
            let mut octets = [0u8; 16];
            read_exact(stream, &mut octets, "IPv6 address").await?;
            Ipv6Addr::from(octets).to_string()
        }
        _ => "unknown".to_string(),
    };

    let mut port = [0u8; 2];
    read_exact(stream, &mut port, "port").await?;
    let port = u16::from_be_bytes(port);

    tracing::debug!("SOCKS5 destination {}:{}", address, port);
    write_all(stream, &SUCCESS_REPLY, "reply").await?;

    Ok(Some((address, port)))
}

async fn read_exact<S>(stream: &mut S, buf: &mut [u8], what: &str) -> Result<()>
where
    S: AsyncRead + Unpin + ?Sized,
{
    stream
        .read_exact(buf)
        .await
        .map_err(|e| ForwardError::SocksProtocol(format!("reading {}: {}", what, e)))?;
    Ok(())
}

async fn write_all<S>(stream: &mut S, buf: &[u8], what: &str) -> Result<()>
where
    S: AsyncWrite + Unpin + ?Sized,
{
    stream
        .write_all(buf)
        .await
        .map_err(|e| ForwardError::SocksProtocol(format!("writing {}: {}", what, e)))
}

#[cfg(test)]
mod tests {
    use super::*;
    use tokio::io::duplex;

    /// Drive the handshake against a scripted client, returning the parsed
    /// destination and everything the server wrote back.
    async fn run_handshake(client_bytes: &[u8]) -> (Result<Option<(String, u16)>>, Vec<u8>) {
        let (mut client, mut server) = duplex(256);
        client.write_all(client_bytes).await.unwrap();
        client.shutdown().await.unwrap();

        let parsed = destination(&mut server).await;

        let mut replies = Vec::new();
        drop(server);
        client.read_to_end(&mut replies).await.unwrap();
        (parsed, replies)
    }

    #[tokio::test]
    async fn test_connect_to_domain() {
        let mut request = vec![5, 1, 0]; // greeting: ver 5, one method, NO-AUTH
        request.extend_from_slice(&[5, 1, 0, ATYP_DOMAIN, 11]);
        request.extend_from_slice(b"example.com");
        request.extend_from_slice(&443u16.to_be_bytes());

        let (parsed, replies) = run_handshake(&request).await;
        assert_eq!(parsed.unwrap(), Some(("example.com".to_string(), 443)));

        // method selection followed by the fixed 10-byte success reply
        assert_eq!(&replies[..2], &[5, 0]);
        assert_eq!(&replies[2..], &SUCCESS_REPLY);
    }

    #[tokio::test]
    async fn test_connect_to_ipv4() {
        let mut request = vec![5, 2, 0, 2]; // two offered methods
        request.extend_from_slice(&[5, 1, 0, ATYP_IPV4, 1, 1, 1, 1]);
        request.extend_from_slice(&80u16.to_be_bytes());

        let (parsed, _) = run_handshake(&request).await;
        assert_eq!(parsed.unwrap(), Some(("1.1.1.1".to_string(), 80)));
    }

    #[tokio::test]
    async fn test_connect_to_ipv6() {
        let addr: Ipv6Addr = "2606:4700::1111".parse().unwrap();
        let mut request = vec![5, 1, 0];
        request.extend_from_slice(&[5, 1, 0, ATYP_IPV6]);
        request.extend_from_slice(&addr.octets());
        request.extend_from_slice(&8443u16.to_be_bytes());

        let (parsed, _) = run_handshake(&request).await;
        assert_eq!(parsed.unwrap(), Some(("2606:4700::1111".to_string(), 8443)));
    }

    #[tokio::test]
    async fn test_unknown_atyp_parses_as_unknown_host() {
        let mut request = vec![5, 1, 0];
        request.extend_from_slice(&[5, 1, 0, 0x7f]);
        request.extend_from_slice(&9000u16.to_be_bytes());

        let (parsed, _) = run_handshake(&request).await;
        assert_eq!(parsed.unwrap(), Some(("unknown".to_string(), 9000)));
    }

    #[tokio::test]
    async fn test_wrong_version_is_rejected() {
        let (parsed, replies) = run_handshake(&[4, 1, 0]).await;
        assert_eq!(parsed.unwrap(), None);
        assert!(replies.is_empty());
    }

    #[tokio::test]
    async fn test_truncated_request_is_an_error() {
        let (parsed, _) = run_handshake(&[5, 1]).await;
        assert!(matches!(parsed, Err(ForwardError::SocksProtocol(_))));
    }
}
