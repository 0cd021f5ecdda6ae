use thiserror::Error;

#[derive(Debug, Error)]
pub enum ForwardError {
    #[error("SSH connection failed: {0}")]
    SshConnectionFailed(String),

    #[error("Authentication failed: {0}")]
    AuthenticationFailed(String),

    #[error("Channel open failed: {0}")]
    ChannelOpenFailed(String),

    #[error("Remote forward request failed: {0}")]
    ForwardRequestFailed(String),

    #[error("Bind failed: {0}")]
    BindFailed(String),

    #[error("Connect failed: {0}")]
    ConnectFailed(String),

    #[error("SOCKS5 protocol error: {0}")]
    SocksProtocol(String),

    #[error("Invalid configuration: {0}")]
    ConfigError(String),

    #[error("Private key file not found: {0}")]
    KeyFileNotFound(String),

    #[error("Operation timed out: {0}")]
    Timeout(String),

    #[error("Shutting down")]
    ShuttingDown,

    #[error("IO error: {0}")]
    IoError(#[from] std::io::Error),

    #[error("Serialization error: {0}")]
    SerializationError(#[from] toml::ser::Error),

    #[error("Deserialization error: {0}")]
    DeserializationError(#[from] toml::de::Error),

    #[error(transparent)]
    Other(#[from] anyhow::Error),
}

pub type Result<T> = std::result::Result<T, ForwardError>;

impl ForwardError {
    /// True for the error every blocking wait unwinds to once shutdown starts.
    pub fn is_shutdown(&self) -> bool {
        matches!(self, Self::ShuttingDown)
    }
}
