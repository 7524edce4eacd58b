//! Configuration validation logic.

use std::collections::HashSet;

use crate::defaults::{max_relay_buffer_size, min_relay_buffer_size};
use crate::loader::ConfigError;
use crate::{Config, HopEntry};

const LOG_LEVELS: [&str; 5] = ["trace", "debug", "info", "warn", "error"];

pub fn validate_config(config: &Config) -> Result<(), ConfigError> {
    if config.hops.is_empty() {
        return Err(ConfigError::Validation("hops is empty".into()));
    }
    for (i, hop) in config.hops.iter().enumerate() {
        match hop {
            HopEntry::Spec(s) if s.trim().is_empty() => {
                return Err(ConfigError::Validation(format!("hops[{i}] is empty")));
            }
            HopEntry::Detailed(h) => {
                if h.host.trim().is_empty() {
                    return Err(ConfigError::Validation(format!("hops[{i}].host is empty")));
                }
                if h.port == Some(0) {
                    return Err(ConfigError::Validation(format!(
                        "hops[{i}].port must be 1..=65535"
                    )));
                }
                if h.timeout_secs == Some(0) {
                    return Err(ConfigError::Validation(format!(
                        "hops[{i}].timeout_secs must be > 0"
                    )));
                }
            }
            HopEntry::Spec(_) => {}
        }
    }
    if config.auth.keys.is_empty() && !config.auth.agent {
        return Err(ConfigError::Validation(
            "auth: at least one key or the agent must be configured".into(),
        ));
    }
    for (i, key) in config.auth.keys.iter().enumerate() {
        if key.path.trim().is_empty() {
            return Err(ConfigError::Validation(format!("auth.keys[{i}].path is empty")));
        }
        if key.passphrase.is_some() && key.passphrase_env.is_some() {
            return Err(ConfigError::Validation(format!(
                "auth.keys[{i}]: set either passphrase or passphrase_env, not both"
            )));
        }
    }
    if config.tunnel.per_hop_timeout_secs == 0 {
        return Err(ConfigError::Validation(
            "tunnel.per_hop_timeout_secs must be > 0".into(),
        ));
    }
    let buf = config.tunnel.relay_buffer_size;
    if buf < min_relay_buffer_size() || buf > max_relay_buffer_size() {
        return Err(ConfigError::Validation(format!(
            "tunnel.relay_buffer_size must be {}..={}",
            min_relay_buffer_size(),
            max_relay_buffer_size()
        )));
    }
    let mut names = HashSet::new();
    let named = config
        .forwards
        .iter()
        .filter_map(|f| f.name.as_deref())
        .chain(config.remote_forwards.iter().filter_map(|f| f.name.as_deref()));
    for name in named {
        if !names.insert(name) {
            return Err(ConfigError::Validation(format!(
                "duplicate forward name {name:?}"
            )));
        }
    }
    for (i, fwd) in config.forwards.iter().enumerate() {
        if fwd.local.trim().is_empty() || fwd.remote.trim().is_empty() {
            return Err(ConfigError::Validation(format!(
                "forwards[{i}]: local and remote must be set"
            )));
        }
        check_host_port(&fwd.remote, &format!("forwards[{i}].remote"))?;
    }
    for (i, fwd) in config.remote_forwards.iter().enumerate() {
        if fwd.local.trim().is_empty() || fwd.remote.trim().is_empty() {
            return Err(ConfigError::Validation(format!(
                "remote_forwards[{i}]: local and remote must be set"
            )));
        }
        check_host_port(&fwd.remote, &format!("remote_forwards[{i}].remote"))?;
    }
    if let Some(level) = &config.logging.level
        && !LOG_LEVELS.contains(&level.to_ascii_lowercase().as_str())
    {
        return Err(ConfigError::Validation(format!(
            "logging.level must be one of: {:?}",
            LOG_LEVELS
        )));
    }
    Ok(())
}

fn check_host_port(addr: &str, field: &str) -> Result<(), ConfigError> {
    let ok = addr
        .rsplit_once(':')
        .is_some_and(|(host, port)| !host.is_empty() && port.parse::<u16>().is_ok());
    if ok {
        Ok(())
    } else {
        Err(ConfigError::Validation(format!(
            "{field} must be host:port, got {addr:?}"
        )))
    }
}
