//! CLI override definitions and application logic.

use clap::Parser;

use crate::Config;
use crate::types::*;

#[derive(Debug, Clone, Parser, Default)]
pub struct CliOverrides {
    /// Replace the hop chain (repeatable or comma-separated), e.g. alice@bastion:22
    #[arg(long = "hop", num_args = 1.., value_delimiter = ',')]
    pub hops: Option<Vec<String>>,
    /// Add a private key file (repeatable)
    #[arg(long = "identity", short = 'i')]
    pub identities: Vec<String>,
    /// Enable or disable the SSH agent
    #[arg(long)]
    pub agent: Option<bool>,
    /// Override the global known_hosts file
    #[arg(long)]
    pub known_hosts: Option<String>,
    /// Accept any host key (testing only)
    #[arg(long)]
    pub insecure_ignore_host_key: bool,
    /// Override per-hop connect and handshake timeout (seconds)
    #[arg(long)]
    pub per_hop_timeout_secs: Option<u64>,
    /// Override keepalive interval (seconds, 0 = disabled)
    #[arg(long)]
    pub keepalive_secs: Option<u64>,
    /// Enable or disable connection tracking
    #[arg(long)]
    pub track_connections: Option<bool>,
    /// Override idle timeout for forwarded connections (seconds, 0 = disabled)
    #[arg(long)]
    pub forward_idle_timeout_secs: Option<u64>,
    /// Buffer size for forward relays (bytes)
    #[arg(long)]
    pub relay_buffer_size: Option<usize>,
    /// Add a local forward LISTEN=TARGET, e.g. 127.0.0.1:8080=db.internal:5432
    #[arg(long = "forward", short = 'L')]
    pub forwards: Vec<String>,
    /// Add a remote forward REMOTE_LISTEN=LOCAL_TARGET, e.g. 127.0.0.1:9000=127.0.0.1:3000
    #[arg(long = "remote-forward", short = 'R')]
    pub remote_forwards: Vec<String>,
    /// Override log level (trace/debug/info/warn/error)
    #[arg(long)]
    pub log_level: Option<String>,
}

/// Split `LEFT=RIGHT` into its two addresses.
pub fn parse_forward_pair(s: &str) -> Option<(String, String)> {
    let (left, right) = s.split_once('=')?;
    let (left, right) = (left.trim(), right.trim());
    if left.is_empty() || right.is_empty() {
        return None;
    }
    Some((left.to_string(), right.to_string()))
}

/// Apply overrides on top of a loaded configuration.
///
/// Malformed `--forward`/`--remote-forward` pairs are returned as an error
/// string so the caller can report them alongside validation failures.
pub fn apply_overrides(config: &mut Config, overrides: &CliOverrides) -> Result<(), String> {
    if let Some(v) = &overrides.hops {
        config.hops = v.iter().cloned().map(HopEntry::Spec).collect();
    }
    for path in &overrides.identities {
        config.auth.keys.push(KeyConfig {
            path: path.clone(),
            passphrase: None,
            passphrase_env: None,
        });
    }
    if let Some(v) = overrides.agent {
        config.auth.agent = v;
    }
    if let Some(v) = &overrides.known_hosts {
        config.host_keys.known_hosts = Some(v.clone());
    }
    if overrides.insecure_ignore_host_key {
        config.host_keys.insecure_ignore = true;
    }
    if let Some(v) = overrides.per_hop_timeout_secs {
        config.tunnel.per_hop_timeout_secs = v;
    }
    if let Some(v) = overrides.keepalive_secs {
        config.tunnel.keepalive_secs = v;
    }
    if let Some(v) = overrides.track_connections {
        config.tunnel.track_connections = v;
    }
    if let Some(v) = overrides.forward_idle_timeout_secs {
        config.tunnel.forward_idle_timeout_secs = v;
    }
    if let Some(v) = overrides.relay_buffer_size {
        config.tunnel.relay_buffer_size = v;
    }
    for raw in &overrides.forwards {
        let (local, remote) =
            parse_forward_pair(raw).ok_or_else(|| format!("invalid --forward {raw:?}"))?;
        config.forwards.push(ForwardConfig {
            name: None,
            local,
            remote,
        });
    }
    for raw in &overrides.remote_forwards {
        let (remote, local) =
            parse_forward_pair(raw).ok_or_else(|| format!("invalid --remote-forward {raw:?}"))?;
        config.remote_forwards.push(RemoteForwardConfig {
            name: None,
            remote,
            local,
        });
    }
    if let Some(v) = &overrides.log_level {
        config.logging.level = Some(v.clone());
    }
    Ok(())
}
