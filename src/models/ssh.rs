use russh::keys::PrivateKey;
use std::fmt;
use std::hash::{Hash, Hasher};
use std::sync::Arc;

/// Identity of an SSH endpoint, plus the jump chain used to reach it.
///
/// `jump_server_list` names the hops traversed in order *before* this
/// endpoint; the endpoint itself is always the last hop of the chain.
///
/// Equality and hashing cover `(ip, user, port)` only. Neither the private
/// key nor the jump chain participates: two configs that target the same
/// `user@ip:port` through different jump paths are the same pool key, and
/// whichever is materialized first supplies the transport both share.
#[derive(Clone)]
pub struct SshConfig {
    pub ip: String,
    pub user: String,
    pub private_key: Arc<PrivateKey>,
    pub jump_server_list: Vec<SshConfig>,
    pub port: u16,
}

pub const DEFAULT_SSH_PORT: u16 = 22;

impl SshConfig {
    pub fn new(ip: impl Into<String>, user: impl Into<String>, private_key: Arc<PrivateKey>) -> Self {
        Self {
            ip: ip.into(),
            user: user.into(),
            private_key,
            jump_server_list: Vec::new(),
            port: DEFAULT_SSH_PORT,
        }
    }

    pub fn with_port(mut self, port: u16) -> Self {
        self.port = port;
        self
    }

    pub fn with_jump_servers(mut self, jump_server_list: Vec<SshConfig>) -> Self {
        self.jump_server_list = jump_server_list;
        self
    }

    /// The hops to traverse, in connection order, ending with this endpoint.
    pub(crate) fn connection_chain(&self) -> impl Iterator<Item = &SshConfig> {
        self.jump_server_list.iter().chain(std::iter::once(self))
    }
}

impl PartialEq for SshConfig {
    fn eq(&self, other: &Self) -> bool {
        self.ip == other.ip && self.user == other.user && self.port == other.port
    }
}

impl Eq for SshConfig {}

impl Hash for SshConfig {
    fn hash<H: Hasher>(&self, state: &mut H) {
        self.ip.hash(state);
        self.user.hash(state);
        self.port.hash(state);
    }
}

impl fmt::Display for SshConfig {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(f, "{}@{}:{}", self.user, self.ip, self.port)
    }
}

impl fmt::Debug for SshConfig {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(
            f,
            "SshConfig({}, {} jump(s))",
            self,
            self.jump_server_list.len()
        )
    }
}
