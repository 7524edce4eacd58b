//! Turn a file configuration into a ready-to-use [`Tunnel`].

use std::path::Path;
use std::sync::Arc;
use std::time::Duration;

use hoptun_config::{Config, HopConfig, HopEntry, KeyConfig};
use hoptun_tunnel::{Handshaker, Hop, Tunnel, insecure_ignore_host_key};
use tracing::info_span;
use zeroize::Zeroizing;

use crate::error::SshError;
use crate::keys::{KeySigner, expand_tilde};

/// Resolve the configured hop chain, in order.
pub fn resolve_hops(config: &Config) -> Result<Vec<Hop>, SshError> {
    config
        .hops
        .iter()
        .filter(|entry| !matches!(entry, HopEntry::Spec(s) if s.trim().is_empty()))
        .map(|entry| match entry {
            HopEntry::Spec(spec) => Ok(Hop::parse(spec)?),
            HopEntry::Detailed(hop) => detailed_hop(hop),
        })
        .collect()
}

fn detailed_hop(cfg: &HopConfig) -> Result<Hop, SshError> {
    let mut spec = String::new();
    if let Some(user) = cfg.user.as_deref().filter(|u| !u.is_empty()) {
        spec.push_str(user);
        spec.push('@');
    }
    let host = cfg.host.trim();
    match cfg.port {
        Some(port) if host.contains(':') => spec.push_str(&format!("[{host}]:{port}")),
        Some(port) => spec.push_str(&format!("{host}:{port}")),
        None => spec.push_str(host),
    }

    let mut hop = Hop::parse(&spec)?;
    if let Some(secs) = cfg.timeout_secs {
        hop = hop.with_timeout(Duration::from_secs(secs));
    }
    if cfg.insecure_ignore_host_key {
        hop = hop.with_host_key_callback(insecure_ignore_host_key());
    } else if let Some(path) = &cfg.known_hosts {
        hop = hop.with_known_hosts(expand_tilde(Path::new(path))?);
    }
    Ok(hop)
}

fn passphrase(key: &KeyConfig) -> Result<Option<Zeroizing<String>>, SshError> {
    if let Some(p) = &key.passphrase {
        return Ok(Some(Zeroizing::new(p.clone())));
    }
    match &key.passphrase_env {
        Some(var) => std::env::var(var)
            .map(|p| Some(Zeroizing::new(p)))
            .map_err(|_| SshError::PassphraseEnv(var.clone())),
        None => Ok(None),
    }
}

/// Build a tunnel from a validated configuration. Keys are loaded here so
/// that unreadable or undecryptable keys fail before any network I/O.
pub fn tunnel_from_config(
    config: &Config,
    handshaker: Arc<dyn Handshaker>,
) -> Result<Tunnel, SshError> {
    let settings = &config.tunnel;
    let mut builder = Tunnel::builder(handshaker)
        .agent(config.auth.agent)
        .per_hop_timeout(Duration::from_secs(settings.per_hop_timeout_secs))
        .keepalive(Duration::from_secs(settings.keepalive_secs))
        .track_connections(settings.track_connections)
        .forward_idle_timeout(Some(Duration::from_secs(settings.forward_idle_timeout_secs)))
        .relay_buffer_size(settings.relay_buffer_size)
        .span(info_span!("tunnel"));

    for hop in resolve_hops(config)? {
        builder = builder.hop_spec(hop);
    }

    for key in &config.auth.keys {
        let passphrase = passphrase(key)?;
        let signer = KeySigner::from_file(&key.path, passphrase.as_ref().map(|p| p.as_str()))?;
        builder = builder.signer(Arc::new(signer));
    }

    if config.host_keys.insecure_ignore {
        builder = builder.host_key_callback(insecure_ignore_host_key());
    }
    if let Some(path) = &config.host_keys.known_hosts {
        builder = builder.known_hosts(expand_tilde(Path::new(path))?);
    }

    Ok(builder.build()?)
}
