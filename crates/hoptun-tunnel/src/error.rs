//! Error types for the tunnel crate.

use std::io;
use std::sync::Arc;
use std::time::Duration;

use hoptun_core::errors::{
    ERROR_AUTH, ERROR_CANCELLED, ERROR_CLOSED, ERROR_CONFIG, ERROR_DIAL, ERROR_HANDSHAKE,
    ERROR_HOST_KEY, ERROR_IO, ERROR_LISTEN, ERROR_TEARDOWN, ERROR_TIMEOUT,
};
use thiserror::Error;

use crate::session::HandshakeError;

/// Errors returned by tunnel construction and operations.
#[derive(Error, Debug)]
pub enum TunnelError {
    #[error("no hops configured")]
    NoHops,

    #[error("no SSH auth methods configured: provide a key, a signer or enable the agent")]
    NoAuth,

    #[error("tunnel closed")]
    Closed,

    #[error("operation cancelled")]
    Cancelled,

    #[error("listener closed")]
    ListenerClosed,

    #[error("invalid hop {spec:?}: {reason}")]
    InvalidHop { spec: String, reason: String },

    #[error("invalid address {addr:?}: {reason}")]
    InvalidAddress { addr: String, reason: String },

    #[error("missing user in hop {spec:?} and failed to detect the current user")]
    CurrentUser { spec: String },

    #[error("cannot resolve home directory for known_hosts")]
    HomeDir,

    #[error("config error: {0}")]
    Config(String),

    #[error("hop {hop} known_hosts: {source}")]
    HostKeyPolicy {
        hop: usize,
        #[source]
        source: Box<TunnelError>,
    },

    #[error("dial hop {hop} ({addr}): {source}")]
    DialHop {
        hop: usize,
        addr: String,
        #[source]
        source: io::Error,
    },

    #[error("via hop {via} dial next {addr}: {source}")]
    DialThrough {
        via: usize,
        addr: String,
        #[source]
        source: io::Error,
    },

    #[error("hop {hop} ({addr}) timed out after {timeout:?}")]
    HopTimeout {
        hop: usize,
        addr: String,
        timeout: Duration,
    },

    #[error("ssh handshake hop {hop} ({addr}): {source}")]
    Handshake {
        hop: usize,
        addr: String,
        #[source]
        source: HandshakeError,
    },

    #[error("dial remote {network} {addr}: {source}")]
    DialRemote {
        network: String,
        addr: String,
        #[source]
        source: io::Error,
    },

    #[error("listen remote {network} {addr}: {source}")]
    ListenRemote {
        network: String,
        addr: String,
        #[source]
        source: io::Error,
    },

    #[error("listen {addr}: {source}")]
    ListenLocal {
        addr: String,
        #[source]
        source: io::Error,
    },

    #[error("unsupported network {0:?} (expected tcp, tcp4 or tcp6)")]
    UnsupportedNetwork(String),

    #[error("close listener {addr}: {source}")]
    CloseListener {
        addr: String,
        #[source]
        source: io::Error,
    },

    #[error("close hop {hop}: {source}")]
    CloseHop {
        hop: usize,
        #[source]
        source: io::Error,
    },

    #[error("teardown: {}", join_errors(.0))]
    Teardown(Arc<[TunnelError]>),

    #[error("IO error: {0}")]
    Io(#[from] io::Error),
}

fn join_errors(errors: &[TunnelError]) -> String {
    errors
        .iter()
        .map(ToString::to_string)
        .collect::<Vec<_>>()
        .join("; ")
}

impl TunnelError {
    /// Stable category label for structured logging.
    pub fn category(&self) -> &'static str {
        match self {
            TunnelError::NoHops
            | TunnelError::InvalidHop { .. }
            | TunnelError::InvalidAddress { .. }
            | TunnelError::CurrentUser { .. }
            | TunnelError::UnsupportedNetwork(_)
            | TunnelError::Config(_) => ERROR_CONFIG,
            TunnelError::NoAuth => ERROR_AUTH,
            TunnelError::Closed | TunnelError::ListenerClosed => ERROR_CLOSED,
            TunnelError::Cancelled => ERROR_CANCELLED,
            TunnelError::HomeDir | TunnelError::HostKeyPolicy { .. } => ERROR_HOST_KEY,
            TunnelError::DialHop { .. }
            | TunnelError::DialThrough { .. }
            | TunnelError::DialRemote { .. } => ERROR_DIAL,
            TunnelError::HopTimeout { .. } => ERROR_TIMEOUT,
            TunnelError::Handshake { source, .. } => match source {
                HandshakeError::HostKeyRejected { .. } => ERROR_HOST_KEY,
                HandshakeError::AuthRejected { .. } => ERROR_AUTH,
                HandshakeError::Timeout => ERROR_TIMEOUT,
                HandshakeError::Io(_) | HandshakeError::Protocol(_) => ERROR_HANDSHAKE,
            },
            TunnelError::ListenRemote { .. } | TunnelError::ListenLocal { .. } => ERROR_LISTEN,
            TunnelError::CloseListener { .. }
            | TunnelError::CloseHop { .. }
            | TunnelError::Teardown(_) => ERROR_TEARDOWN,
            TunnelError::Io(_) => ERROR_IO,
        }
    }

    /// Index of the hop this error refers to, when it is hop-specific.
    pub fn hop(&self) -> Option<usize> {
        match self {
            TunnelError::HostKeyPolicy { hop, .. }
            | TunnelError::DialHop { hop, .. }
            | TunnelError::HopTimeout { hop, .. }
            | TunnelError::Handshake { hop, .. }
            | TunnelError::CloseHop { hop, .. } => Some(*hop),
            TunnelError::DialThrough { via, .. } => Some(via + 1),
            _ => None,
        }
    }
}
