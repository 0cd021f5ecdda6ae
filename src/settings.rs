//! Declarative TOML description of a forwarder fleet.
//!
//! Endpoints are named so forwards and jump chains can reference them;
//! `resolve` turns the file form into the runtime configs, loading each
//! endpoint's private key from disk.

use crate::models::{ForwardConfig, SshConfig};
use crate::utils::error::{ForwardError, Result};
use chrono::{DateTime, Utc};
use serde::{Deserialize, Serialize};
use std::collections::HashMap;
use std::path::{Path, PathBuf};
use std::sync::Arc;

/// Which forwarder variant a [`ForwardSettings`] entry describes.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "lowercase")]
pub enum ForwardKind {
    Local,
    Remote,
    Dynamic,
}

/// One SSH endpoint, referenced by name from forwards and jump chains.
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct EndpointSettings {
    pub name: String,
    pub host: String,
    #[serde(default = "default_ssh_port")]
    pub port: u16,
    pub user: String,
    pub private_key_path: PathBuf,
    /// Names of endpoints to traverse first, in order.
    #[serde(default)]
    pub jump_hosts: Vec<String>,
    #[serde(default = "Utc::now")]
    pub created_at: DateTime<Utc>,
}

/// One declarative forward entry.
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct ForwardSettings {
    pub kind: ForwardKind,
    /// Name of the endpoint the tunnel runs through.
    pub endpoint: String,
    pub local_port: u16,
    #[serde(default)]
    pub remote_port: Option<u16>,
    #[serde(default = "default_forward_host")]
    pub local_host: String,
    #[serde(default = "default_forward_host")]
    pub remote_host: String,
}

#[derive(Debug, Clone, Default, Serialize, Deserialize)]
pub struct Settings {
    #[serde(default)]
    pub endpoints: Vec<EndpointSettings>,
    #[serde(default)]
    pub forwards: Vec<ForwardSettings>,
}

fn default_ssh_port() -> u16 {
    crate::models::ssh::DEFAULT_SSH_PORT
}

fn default_forward_host() -> String {
    crate::models::forward::DEFAULT_FORWARD_HOST.to_string()
}

impl Settings {
    pub async fn load(path: impl AsRef<Path>) -> Result<Self> {
        let path = path.as_ref();
        let content = tokio::fs::read_to_string(path).await?;
        let settings: Settings = toml::from_str(&content)
            .map_err(|e| ForwardError::ConfigError(format!("failed to parse settings: {}", e)))?;

        tracing::info!(
            "loaded {} endpoint(s) and {} forward(s) from {:?}",
            settings.endpoints.len(),
            settings.forwards.len(),
            path
        );
        Ok(settings)
    }

    pub async fn save(&self, path: impl AsRef<Path>) -> Result<()> {
        let path = path.as_ref();
        let content = toml::to_string_pretty(self)
            .map_err(|e| ForwardError::ConfigError(format!("failed to serialize settings: {}", e)))?;
        tokio::fs::write(path, content).await?;

        tracing::info!("saved settings to {:?}", path);
        Ok(())
    }

    /// Materialize runtime configs: load every endpoint's private key and
    /// resolve jump chains by name.
    ///
    /// A referenced jump host enters the chain as a single hop; its own
    /// `jump_hosts` list is not expanded, matching how a chain traversal
    /// consumes hops.
    pub fn resolve(&self) -> Result<Vec<(ForwardKind, ForwardConfig)>> {
        let mut chainless = Vec::with_capacity(self.endpoints.len());
        for endpoint in &self.endpoints {
            let key = load_endpoint_key(&endpoint.private_key_path)?;
            chainless.push(
                SshConfig::new(endpoint.host.clone(), endpoint.user.clone(), key)
                    .with_port(endpoint.port),
            );
        }
        let by_name: HashMap<&str, &SshConfig> = self
            .endpoints
            .iter()
            .map(|endpoint| endpoint.name.as_str())
            .zip(chainless.iter())
            .collect();

        let mut resolved: HashMap<&str, SshConfig> = HashMap::new();
        for (endpoint, base) in self.endpoints.iter().zip(&chainless) {
            let mut jump_server_list = Vec::with_capacity(endpoint.jump_hosts.len());
            for jump_name in &endpoint.jump_hosts {
                let jump = by_name.get(jump_name.as_str()).ok_or_else(|| {
                    ForwardError::ConfigError(format!(
                        "endpoint {} references unknown jump host {}",
                        endpoint.name, jump_name
                    ))
                })?;
                jump_server_list.push((*jump).clone());
            }
            resolved.insert(
                endpoint.name.as_str(),
                base.clone().with_jump_servers(jump_server_list),
            );
        }

        let mut forwards = Vec::with_capacity(self.forwards.len());
        for forward in &self.forwards {
            let ssh_config = resolved.get(forward.endpoint.as_str()).ok_or_else(|| {
                ForwardError::ConfigError(format!(
                    "forward on port {} references unknown endpoint {}",
                    forward.local_port, forward.endpoint
                ))
            })?;
            let config = ForwardConfig::new(
                forward.local_port,
                forward.remote_port,
                ssh_config.clone(),
            )
            .with_hosts(forward.local_host.clone(), forward.remote_host.clone());
            forwards.push((forward.kind, config));
        }
        Ok(forwards)
    }
}

fn load_endpoint_key(path: &Path) -> Result<Arc<russh::keys::PrivateKey>> {
    if !path.exists() {
        return Err(ForwardError::KeyFileNotFound(path.display().to_string()));
    }
    let key = russh::keys::load_secret_key(path, None).map_err(|e| {
        ForwardError::ConfigError(format!("failed to load key {}: {}", path.display(), e))
    })?;
    Ok(Arc::new(key))
}
