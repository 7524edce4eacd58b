//! Host-key trust.
//!
//! Each hop resolves its verification policy in this order: hop callback,
//! hop known_hosts file, tunnel callback, tunnel known_hosts file, then
//! `~/.ssh/known_hosts`.

use std::ffi::OsString;
use std::fmt;
use std::path::{Path, PathBuf};
use std::sync::Arc;

use hoptun_core::defaults::{HOME_ENV, KNOWN_HOSTS_RELATIVE};
use thiserror::Error;

use crate::error::TunnelError;
use crate::hop::{Hop, HostKeyCheck};

/// A server public key as presented during the handshake.
#[derive(Clone, Debug, PartialEq, Eq)]
pub struct HostKey {
    /// Algorithm name, e.g. `ssh-ed25519`.
    pub algorithm: String,
    /// Base64 encoded key blob as it appears in known_hosts.
    pub base64: String,
    /// `SHA256:...` fingerprint.
    pub fingerprint: String,
}

impl HostKey {
    pub fn new(
        algorithm: impl Into<String>,
        base64: impl Into<String>,
        fingerprint: impl Into<String>,
    ) -> Self {
        Self {
            algorithm: algorithm.into(),
            base64: base64.into(),
            fingerprint: fingerprint.into(),
        }
    }
}

impl fmt::Display for HostKey {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(f, "{} {}", self.algorithm, self.fingerprint)
    }
}

#[derive(Error, Debug)]
pub enum HostKeyError {
    #[error("host key mismatch for {host}: expected {expected}, got {actual}")]
    Mismatch {
        host: String,
        expected: String,
        actual: String,
    },

    #[error("unknown host {0}")]
    Unknown(String),

    #[error("{0}")]
    Rejected(String),
}

/// Decides whether a presented host key is trusted.
pub trait HostKeyCallback: Send + Sync + 'static {
    fn verify(&self, host: &str, port: u16, key: &HostKey) -> Result<(), HostKeyError>;
}

impl<F> HostKeyCallback for F
where
    F: Fn(&str, u16, &HostKey) -> Result<(), HostKeyError> + Send + Sync + 'static,
{
    fn verify(&self, host: &str, port: u16, key: &HostKey) -> Result<(), HostKeyError> {
        self(host, port, key)
    }
}

/// Accept every host key. Only suitable for tests and throwaway setups.
pub fn insecure_ignore_host_key() -> Arc<dyn HostKeyCallback> {
    Arc::new(|_: &str, _: u16, _: &HostKey| -> Result<(), HostKeyError> { Ok(()) })
}

/// Accept exactly one host key.
pub fn fixed_host_key(expected: HostKey) -> Arc<dyn HostKeyCallback> {
    Arc::new(
        move |host: &str, _: u16, key: &HostKey| -> Result<(), HostKeyError> {
            if key.algorithm == expected.algorithm && key.base64 == expected.base64 {
                Ok(())
            } else {
                Err(HostKeyError::Mismatch {
                    host: host.to_string(),
                    expected: expected.fingerprint.clone(),
                    actual: key.fingerprint.clone(),
                })
            }
        },
    )
}

/// Resolved verification policy handed to the handshaker.
#[derive(Clone)]
pub enum HostKeyPolicy {
    Callback(Arc<dyn HostKeyCallback>),
    KnownHosts(PathBuf),
}

impl fmt::Debug for HostKeyPolicy {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match self {
            HostKeyPolicy::Callback(_) => f.write_str("Callback(..)"),
            HostKeyPolicy::KnownHosts(path) => f.debug_tuple("KnownHosts").field(path).finish(),
        }
    }
}

pub(crate) fn resolve_host_key_policy(
    hop: &Hop,
    global_callback: Option<&Arc<dyn HostKeyCallback>>,
    global_known_hosts: Option<&Path>,
) -> Result<HostKeyPolicy, TunnelError> {
    if let Some(check) = &hop.host_key {
        return Ok(match check {
            HostKeyCheck::Callback(cb) => HostKeyPolicy::Callback(cb.clone()),
            HostKeyCheck::KnownHosts(path) => HostKeyPolicy::KnownHosts(path.clone()),
        });
    }
    if let Some(cb) = global_callback {
        return Ok(HostKeyPolicy::Callback(cb.clone()));
    }
    let path = match global_known_hosts {
        Some(path) => path.to_path_buf(),
        None => default_known_hosts_path()?,
    };
    Ok(HostKeyPolicy::KnownHosts(path))
}

/// `<home>/.ssh/known_hosts`, falling back to `$HOME` when the platform
/// lookup fails.
pub fn default_known_hosts_path() -> Result<PathBuf, TunnelError> {
    known_hosts_under(dirs::home_dir(), std::env::var_os(HOME_ENV))
}

fn known_hosts_under(
    home: Option<PathBuf>,
    home_env: Option<OsString>,
) -> Result<PathBuf, TunnelError> {
    home.or_else(|| home_env.filter(|h| !h.is_empty()).map(PathBuf::from))
        .map(|home| home.join(KNOWN_HOSTS_RELATIVE))
        .ok_or(TunnelError::HomeDir)
}
