//! Configuration type definitions for hops, credentials, host-key trust,
//! tunnel tuning, forwards and logging.

use serde::{Deserialize, Serialize};

use crate::defaults::*;

#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct Config {
    /// Ordered hop chain, first entry is dialed directly.
    pub hops: Vec<HopEntry>,
    #[serde(default)]
    pub auth: AuthConfig,
    #[serde(default)]
    pub host_keys: HostKeysConfig,
    #[serde(default)]
    pub tunnel: TunnelSettings,
    /// Local listeners forwarded to remote targets through the chain.
    #[serde(default)]
    pub forwards: Vec<ForwardConfig>,
    /// Remote listeners on the last hop whose connections are bridged to
    /// local targets.
    #[serde(default)]
    pub remote_forwards: Vec<RemoteForwardConfig>,
    #[serde(default)]
    pub logging: LoggingConfig,
}

/// A hop is either a `[user@]host[:port]` string or a table.
#[derive(Debug, Clone, Serialize, Deserialize)]
#[serde(untagged)]
pub enum HopEntry {
    Spec(String),
    Detailed(HopConfig),
}

#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct HopConfig {
    pub host: String,
    #[serde(default)]
    pub port: Option<u16>,
    #[serde(default)]
    pub user: Option<String>,
    /// Per-hop connect and handshake timeout, overrides the tunnel default.
    #[serde(default)]
    pub timeout_secs: Option<u64>,
    /// Per-hop known_hosts file.
    #[serde(default)]
    pub known_hosts: Option<String>,
    /// Accept any host key for this hop only.
    #[serde(default)]
    pub insecure_ignore_host_key: bool,
}

#[derive(Debug, Clone, Default, Serialize, Deserialize)]
pub struct AuthConfig {
    #[serde(default)]
    pub keys: Vec<KeyConfig>,
    #[serde(default = "default_use_agent")]
    pub agent: bool,
}

#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct KeyConfig {
    pub path: String,
    /// Inline passphrase. Prefer `passphrase_env`.
    #[serde(default)]
    pub passphrase: Option<String>,
    /// Environment variable holding the passphrase.
    #[serde(default)]
    pub passphrase_env: Option<String>,
}

#[derive(Debug, Clone, Default, Serialize, Deserialize)]
pub struct HostKeysConfig {
    /// Global known_hosts file. Defaults to `~/.ssh/known_hosts`.
    #[serde(default)]
    pub known_hosts: Option<String>,
    /// Accept any host key. Only for testing.
    #[serde(default)]
    pub insecure_ignore: bool,
}

#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct TunnelSettings {
    #[serde(default = "default_per_hop_timeout_secs")]
    pub per_hop_timeout_secs: u64,
    /// Keepalive interval, 0 disables.
    #[serde(default = "default_keepalive_secs")]
    pub keepalive_secs: u64,
    #[serde(default = "default_track_connections")]
    pub track_connections: bool,
    /// Idle timeout for forwarded connections, 0 disables.
    #[serde(default = "default_forward_idle_timeout_secs")]
    pub forward_idle_timeout_secs: u64,
    #[serde(default = "default_relay_buffer_size")]
    pub relay_buffer_size: usize,
}

impl Default for TunnelSettings {
    fn default() -> Self {
        Self {
            per_hop_timeout_secs: default_per_hop_timeout_secs(),
            keepalive_secs: default_keepalive_secs(),
            track_connections: default_track_connections(),
            forward_idle_timeout_secs: default_forward_idle_timeout_secs(),
            relay_buffer_size: default_relay_buffer_size(),
        }
    }
}

#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct ForwardConfig {
    #[serde(default)]
    pub name: Option<String>,
    /// Local listen address, e.g. 127.0.0.1:8080
    pub local: String,
    /// Target as seen from the last hop, e.g. db.internal:5432
    pub remote: String,
}

#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct RemoteForwardConfig {
    #[serde(default)]
    pub name: Option<String>,
    /// Listen address on the last hop, e.g. 127.0.0.1:9000
    pub remote: String,
    /// Local target each accepted connection is bridged to.
    pub local: String,
}

#[derive(Debug, Clone, Default, Serialize, Deserialize)]
pub struct LoggingConfig {
    /// Log level: trace, debug, info, warn, error.
    #[serde(default)]
    pub level: Option<String>,
}
