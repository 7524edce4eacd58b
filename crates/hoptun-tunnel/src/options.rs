//! Tunnel options and the builder that validates them.

use std::path::{Path, PathBuf};
use std::sync::Arc;
use std::time::Duration;

use hoptun_core::defaults::{
    AGENT_SOCK_ENV, DEFAULT_KEEPALIVE_SECS, DEFAULT_PER_HOP_TIMEOUT_SECS,
    DEFAULT_RELAY_BUFFER_SIZE, DEFAULT_TRACK_CONNECTIONS, DEFAULT_USE_AGENT,
    MAX_RELAY_BUFFER_SIZE, MIN_RELAY_BUFFER_SIZE,
};
use tracing::Span;

use crate::auth::{Credential, Signer};
use crate::error::TunnelError;
use crate::hop::Hop;
use crate::hostkey::HostKeyCallback;
use crate::session::Handshaker;
use crate::tunnel::Tunnel;

/// Immutable tunnel configuration.
#[derive(Clone)]
pub(crate) struct Options {
    pub(crate) hops: Vec<Hop>,
    pub(crate) credentials: Vec<Credential>,
    pub(crate) use_agent: bool,
    /// Overrides `SSH_AUTH_SOCK` when set.
    pub(crate) agent_socket: Option<PathBuf>,
    pub(crate) known_hosts: Option<PathBuf>,
    pub(crate) host_key_callback: Option<Arc<dyn HostKeyCallback>>,
    pub(crate) per_hop_timeout: Duration,
    pub(crate) keepalive: Duration,
    pub(crate) track_connections: bool,
    /// Every log line and task of the tunnel runs inside this span.
    pub(crate) span: Span,
    pub(crate) forward_idle_timeout: Option<Duration>,
    pub(crate) relay_buffer_size: usize,
}

impl Default for Options {
    fn default() -> Self {
        Self {
            hops: Vec::new(),
            credentials: Vec::new(),
            use_agent: DEFAULT_USE_AGENT,
            agent_socket: None,
            known_hosts: None,
            host_key_callback: None,
            per_hop_timeout: Duration::from_secs(DEFAULT_PER_HOP_TIMEOUT_SECS),
            keepalive: Duration::from_secs(DEFAULT_KEEPALIVE_SECS),
            track_connections: DEFAULT_TRACK_CONNECTIONS,
            span: Span::none(),
            forward_idle_timeout: None,
            relay_buffer_size: DEFAULT_RELAY_BUFFER_SIZE,
        }
    }
}

impl Options {
    /// Agent socket from the override or the environment.
    pub(crate) fn agent_socket(&self) -> Option<PathBuf> {
        self.agent_socket
            .clone()
            .or_else(|| std::env::var_os(AGENT_SOCK_ENV).map(PathBuf::from))
    }
}

/// Builder for [`Tunnel`]. No network I/O happens until the tunnel is used.
///
/// Option errors are deferred: the first one is returned by [`TunnelBuilder::build`].
pub struct TunnelBuilder {
    handshaker: Arc<dyn Handshaker>,
    options: Options,
    error: Option<TunnelError>,
}

impl TunnelBuilder {
    pub(crate) fn new(handshaker: Arc<dyn Handshaker>) -> Self {
        Self {
            handshaker,
            options: Options::default(),
            error: None,
        }
    }

    fn defer(&mut self, err: TunnelError) {
        if self.error.is_none() {
            self.error = Some(err);
        }
    }

    /// Append a hop parsed from `[user@]host[:port]`.
    pub fn hop(mut self, spec: &str) -> Self {
        match Hop::parse(spec) {
            Ok(hop) => self.options.hops.push(hop),
            Err(e) => self.defer(e),
        }
        self
    }

    /// Append several hop specs, skipping empty entries.
    pub fn hops<I, S>(mut self, specs: I) -> Self
    where
        I: IntoIterator<Item = S>,
        S: AsRef<str>,
    {
        match crate::hop::parse_hops(specs) {
            Ok(hops) => self.options.hops.extend(hops),
            Err(e) => self.defer(e),
        }
        self
    }

    /// Append a pre-built hop. It must name a user, a host and a non-zero port.
    pub fn hop_spec(mut self, hop: Hop) -> Self {
        let reason = if hop.user.is_empty() {
            Some("empty user")
        } else if hop.host.trim().is_empty() {
            Some("empty host")
        } else if hop.port == 0 {
            Some("port must be 1..=65535")
        } else {
            None
        };
        match reason {
            Some(reason) => self.defer(TunnelError::InvalidHop {
                spec: hop.to_string(),
                reason: reason.to_string(),
            }),
            None => self.options.hops.push(hop),
        }
        self
    }

    pub fn key_pem(mut self, pem: impl Into<String>, passphrase: Option<String>) -> Self {
        self.options.credentials.push(Credential::pem(pem, passphrase));
        self
    }

    /// Read a private key file now; it is parsed during the handshake.
    pub fn key_file(mut self, path: impl AsRef<Path>, passphrase: Option<String>) -> Self {
        match Credential::from_file(path.as_ref(), passphrase) {
            Ok(cred) => self.options.credentials.push(cred),
            Err(e) => self.defer(e),
        }
        self
    }

    pub fn signer(mut self, signer: Arc<dyn Signer>) -> Self {
        self.options.credentials.push(Credential::Signer(signer));
        self
    }

    pub fn credential(mut self, credential: Credential) -> Self {
        self.options.credentials.push(credential);
        self
    }

    /// Use the SSH agent at `SSH_AUTH_SOCK`, resolved when the chain is built.
    pub fn agent(mut self, enabled: bool) -> Self {
        self.options.use_agent = enabled;
        self
    }

    /// Use an agent socket other than `SSH_AUTH_SOCK`.
    pub fn agent_socket(mut self, path: impl Into<PathBuf>) -> Self {
        self.options.agent_socket = Some(path.into());
        self
    }

    pub fn known_hosts(mut self, path: impl Into<PathBuf>) -> Self {
        self.options.known_hosts = Some(path.into());
        self
    }

    pub fn host_key_callback(mut self, callback: Arc<dyn HostKeyCallback>) -> Self {
        self.options.host_key_callback = Some(callback);
        self
    }

    pub fn per_hop_timeout(mut self, timeout: Duration) -> Self {
        if timeout.is_zero() {
            self.defer(TunnelError::Config("per-hop timeout must be > 0".into()));
        } else {
            self.options.per_hop_timeout = timeout;
        }
        self
    }

    /// Keepalive interval per hop; zero disables keepalives.
    pub fn keepalive(mut self, interval: Duration) -> Self {
        self.options.keepalive = interval;
        self
    }

    pub fn track_connections(mut self, enabled: bool) -> Self {
        self.options.track_connections = enabled;
        self
    }

    /// Parent span for everything the tunnel logs.
    pub fn span(mut self, span: Span) -> Self {
        self.options.span = span;
        self
    }

    pub fn forward_idle_timeout(mut self, timeout: Option<Duration>) -> Self {
        self.options.forward_idle_timeout = timeout.filter(|d| !d.is_zero());
        self
    }

    pub fn relay_buffer_size(mut self, size: usize) -> Self {
        if (MIN_RELAY_BUFFER_SIZE..=MAX_RELAY_BUFFER_SIZE).contains(&size) {
            self.options.relay_buffer_size = size;
        } else {
            self.defer(TunnelError::Config(format!(
                "relay buffer size must be {MIN_RELAY_BUFFER_SIZE}..={MAX_RELAY_BUFFER_SIZE}"
            )));
        }
        self
    }

    pub fn build(self) -> Result<Tunnel, TunnelError> {
        if let Some(err) = self.error {
            return Err(err);
        }
        if self.options.hops.is_empty() {
            return Err(TunnelError::NoHops);
        }
        if self.options.credentials.is_empty() && !self.options.use_agent {
            return Err(TunnelError::NoAuth);
        }
        Ok(Tunnel::from_parts(self.options, self.handshaker))
    }
}
