/// Address family of a managed socket.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Default)]
pub enum SocketFamily {
    #[default]
    V4,
    V6,
}

/// Socket kind. Only stream sockets are managed; the variant exists so the
/// config stays a faithful structural key.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Default)]
pub enum SocketKind {
    #[default]
    Stream,
}

pub const DEFAULT_SOCKET_TIMEOUT_SECS: u64 = 1;

/// Construction key for a pooled socket.
///
/// A config without a bind port describes an ephemeral client socket that is
/// never bound, listened on, or cached. Equality is full structural equality,
/// unlike [`super::SshConfig`].
#[derive(Debug, Clone, PartialEq, Eq, Hash)]
pub struct SocketConfig {
    pub bind_port: Option<u16>,
    pub bind_address: Option<String>,
    pub family: SocketFamily,
    pub kind: SocketKind,
    pub timeout_secs: u64,
}

impl Default for SocketConfig {
    fn default() -> Self {
        Self {
            bind_port: None,
            bind_address: None,
            family: SocketFamily::default(),
            kind: SocketKind::default(),
            timeout_secs: DEFAULT_SOCKET_TIMEOUT_SECS,
        }
    }
}

impl SocketConfig {
    /// Key for a listening socket on `(bind_address, bind_port)`.
    pub fn listener(bind_port: u16, bind_address: impl Into<String>) -> Self {
        Self {
            bind_port: Some(bind_port),
            bind_address: Some(bind_address.into()),
            ..Self::default()
        }
    }

    /// An ephemeral, unpooled client socket.
    pub fn client() -> Self {
        Self::default()
    }

    pub(crate) fn is_listener(&self) -> bool {
        matches!(self.bind_port, Some(port) if port > 0)
    }
}
