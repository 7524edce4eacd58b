//! SSH backend for hoptun.
//!
//! Implements the tunnel's secure-channel interface on top of `russh`:
//! handshakes over TCP or nested `direct-tcpip` channels, public-key and
//! agent authentication, host-key checks against a callback or a
//! known_hosts file, remote `tcpip-forward` listeners, keepalives and
//! disconnect. Also hosts the `run`/`check` CLI entry points.

pub mod cli;
mod error;
mod handler;
mod keys;
mod session;
mod setup;

pub use error::SshError;
pub use keys::{KeySigner, expand_tilde};
pub use session::{SshHandshaker, SshRemoteListener, SshSession};
pub use setup::{resolve_hops, tunnel_from_config};
