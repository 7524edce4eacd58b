//! Hop specifications.
//!
//! A hop is written `[user@]host[:port]`. A missing user resolves to the
//! current user (from `USER`, `LOGNAME` or `USERNAME`), a missing port
//! defaults to 22. IPv6 literals go in brackets when a port is given
//! (`alice@[fe80::1]:2222`); an unbracketed address with several colons is
//! read as a bare IPv6 host on the default port.

use std::fmt;
use std::path::PathBuf;
use std::str::FromStr;
use std::sync::Arc;
use std::time::Duration;

use hoptun_core::defaults::{DEFAULT_SSH_PORT, USER_ENVS};

use crate::error::TunnelError;
use crate::hostkey::HostKeyCallback;

/// Per-hop host-key verification override.
#[derive(Clone)]
pub enum HostKeyCheck {
    Callback(Arc<dyn HostKeyCallback>),
    KnownHosts(PathBuf),
}

impl fmt::Debug for HostKeyCheck {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match self {
            HostKeyCheck::Callback(_) => f.write_str("Callback(..)"),
            HostKeyCheck::KnownHosts(path) => f.debug_tuple("KnownHosts").field(path).finish(),
        }
    }
}

/// One element of the chain. Immutable once handed to the builder.
#[derive(Clone, Debug)]
pub struct Hop {
    pub user: String,
    pub host: String,
    pub port: u16,
    /// Connect and handshake timeout for this hop; the tunnel default when unset.
    pub timeout: Option<Duration>,
    pub host_key: Option<HostKeyCheck>,
}

impl Hop {
    pub fn new(user: impl Into<String>, host: impl Into<String>, port: u16) -> Self {
        Self {
            user: user.into(),
            host: host.into(),
            port,
            timeout: None,
            host_key: None,
        }
    }

    /// Parse `[user@]host[:port]`.
    pub fn parse(spec: &str) -> Result<Self, TunnelError> {
        parse_with_user(spec, current_user)
    }

    pub fn with_timeout(mut self, timeout: Duration) -> Self {
        self.timeout = Some(timeout);
        self
    }

    pub fn with_host_key_callback(mut self, callback: Arc<dyn HostKeyCallback>) -> Self {
        self.host_key = Some(HostKeyCheck::Callback(callback));
        self
    }

    pub fn with_known_hosts(mut self, path: impl Into<PathBuf>) -> Self {
        self.host_key = Some(HostKeyCheck::KnownHosts(path.into()));
        self
    }

    /// `host:port`, with IPv6 hosts in brackets.
    pub fn addr(&self) -> String {
        join_host_port(&self.host, self.port)
    }
}

impl fmt::Display for Hop {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(f, "{}@{}", self.user, self.addr())
    }
}

impl FromStr for Hop {
    type Err = TunnelError;

    fn from_str(s: &str) -> Result<Self, Self::Err> {
        Hop::parse(s)
    }
}

/// Parse several hop specs in order, skipping empty entries.
pub fn parse_hops<I, S>(specs: I) -> Result<Vec<Hop>, TunnelError>
where
    I: IntoIterator<Item = S>,
    S: AsRef<str>,
{
    specs
        .into_iter()
        .filter(|s| !s.as_ref().trim().is_empty())
        .map(|s| Hop::parse(s.as_ref()))
        .collect()
}

/// The account running the process, from the OS first and the usual
/// environment variables when the OS lookup fails.
fn current_user() -> Option<String> {
    whoami::fallible::username()
        .ok()
        .filter(|u| !u.is_empty())
        .or_else(|| {
            USER_ENVS
                .iter()
                .filter_map(|name| std::env::var(name).ok())
                .find(|v| !v.is_empty())
        })
}

fn parse_with_user(
    spec: &str,
    current_user: impl FnOnce() -> Option<String>,
) -> Result<Hop, TunnelError> {
    let trimmed = spec.trim();
    let invalid = |reason: &str| TunnelError::InvalidHop {
        spec: spec.to_string(),
        reason: reason.to_string(),
    };

    let (user, host_port) = match trimmed.split_once('@') {
        Some((user, rest)) => (Some(user), rest),
        None => (None, trimmed),
    };
    let (host, port) = split_host_port(host_port, Some(DEFAULT_SSH_PORT)).map_err(|r| invalid(&r))?;
    if host.is_empty() {
        return Err(invalid("empty host"));
    }
    let user = match user.filter(|u| !u.is_empty()) {
        Some(user) => user.to_string(),
        None => current_user().ok_or_else(|| TunnelError::CurrentUser {
            spec: spec.to_string(),
        })?,
    };

    Ok(Hop::new(user, host, port))
}

/// Split a `host:port` target. Used for dial, listen and forward addresses,
/// where the port is mandatory.
pub(crate) fn split_target(addr: &str) -> Result<(String, u16), TunnelError> {
    let (host, port) = split_host_port(addr.trim(), None).map_err(|reason| {
        TunnelError::InvalidAddress {
            addr: addr.to_string(),
            reason,
        }
    })?;
    Ok((host.to_string(), port))
}

/// Split `host[:port]`. Without `default_port` the port is required and may
/// be 0; with it an explicit port must be non-zero.
fn split_host_port(s: &str, default_port: Option<u16>) -> Result<(&str, u16), String> {
    if let Some(rest) = s.strip_prefix('[') {
        let (host, after) = rest
            .split_once(']')
            .ok_or_else(|| "missing closing bracket".to_string())?;
        return match after.strip_prefix(':') {
            Some(port) => Ok((host, parse_port(port, default_port.is_some())?)),
            None if after.is_empty() => default_port
                .map(|p| (host, p))
                .ok_or_else(|| "missing port".to_string()),
            None => Err(format!("unexpected {after:?} after address")),
        };
    }

    match s.matches(':').count() {
        0 => default_port
            .map(|p| (s, p))
            .ok_or_else(|| "missing port".to_string()),
        1 => {
            let (host, port) = s.split_once(':').unwrap_or((s, ""));
            Ok((host, parse_port(port, default_port.is_some())?))
        }
        // Bare IPv6 literal.
        _ => default_port
            .map(|p| (s, p))
            .ok_or_else(|| "IPv6 addresses need brackets, e.g. [::1]:22".to_string()),
    }
}

fn parse_port(s: &str, nonzero: bool) -> Result<u16, String> {
    match s.parse::<u16>() {
        Ok(0) if nonzero => Err("port must be 1..=65535".to_string()),
        Ok(port) => Ok(port),
        Err(_) => Err(format!("invalid port {s:?}")),
    }
}

pub(crate) fn join_host_port(host: &str, port: u16) -> String {
    if host.contains(':') {
        format!("[{host}]:{port}")
    } else {
        format!("{host}:{port}")
    }
}
