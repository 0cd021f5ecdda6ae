use super::SshConfig;

pub const DEFAULT_FORWARD_HOST: &str = "localhost";

/// One port mapping handled by a forwarder.
///
/// `remote_port` is absent for dynamic (SOCKS5) forwarders, where the remote
/// endpoint comes from each client request instead.
#[derive(Debug, Clone)]
pub struct ForwardConfig {
    pub local_port: u16,
    pub remote_port: Option<u16>,
    pub ssh_config: SshConfig,
    pub local_host: String,
    pub remote_host: String,
}

impl ForwardConfig {
    pub fn new(
        local_port: u16,
        remote_port: impl Into<Option<u16>>,
        ssh_config: SshConfig,
    ) -> Self {
        Self {
            local_port,
            remote_port: remote_port.into(),
            ssh_config,
            local_host: DEFAULT_FORWARD_HOST.to_string(),
            remote_host: DEFAULT_FORWARD_HOST.to_string(),
        }
    }

    pub fn with_hosts(
        mut self,
        local_host: impl Into<String>,
        remote_host: impl Into<String>,
    ) -> Self {
        self.local_host = local_host.into();
        self.remote_host = remote_host.into();
        self
    }
}

impl From<(u16, u16, SshConfig)> for ForwardConfig {
    fn from((local_port, remote_port, ssh_config): (u16, u16, SshConfig)) -> Self {
        Self::new(local_port, remote_port, ssh_config)
    }
}

impl From<(u16, Option<u16>, SshConfig)> for ForwardConfig {
    fn from((local_port, remote_port, ssh_config): (u16, Option<u16>, SshConfig)) -> Self {
        Self::new(local_port, remote_port, ssh_config)
    }
}

impl From<(u16, u16, SshConfig, &str, &str)> for ForwardConfig {
    fn from(
        (local_port, remote_port, ssh_config, local_host, remote_host): (
            u16,
            u16,
            SshConfig,
            &str,
            &str,
        ),
    ) -> Self {
        Self::new(local_port, remote_port, ssh_config).with_hosts(local_host, remote_host)
    }
}

impl From<(u16, Option<u16>, SshConfig, &str, &str)> for ForwardConfig {
    fn from(
        (local_port, remote_port, ssh_config, local_host, remote_host): (
            u16,
            Option<u16>,
            SshConfig,
            &str,
            &str,
        ),
    ) -> Self {
        Self::new(local_port, remote_port, ssh_config).with_hosts(local_host, remote_host)
    }
}
