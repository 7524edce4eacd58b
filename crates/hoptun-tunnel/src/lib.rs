//! Multi-hop tunnel orchestration.
//!
//! A [`Tunnel`] chains authenticated sessions through a list of hops: the
//! first hop is dialed directly, every later hop through a channel of the
//! previous one. On top of the chain it offers:
//!
//! - [`Tunnel::dial`]: an outbound connection from the last hop.
//! - [`Tunnel::listen`]: a listener bound on the last hop.
//! - [`Tunnel::forward`]: a local listener bridged to a remote address.
//! - [`Tunnel::close`]: ordered, idempotent teardown of everything above.
//!
//! The secure-channel protocol is supplied by a [`Handshaker`]
//! implementation; see the `hoptun-ssh` crate for the SSH backend.
//!
//! # Architecture
//!
//! - **Chain**: built lazily and exactly once under a lock, rolled back
//!   if any hop fails.
//! - **Tracker**: registry of live connections and listeners so teardown
//!   can close them in bulk.
//! - **Keepalive**: one probe loop per hop session.

mod auth;
mod chain;
mod conn;
mod error;
mod forward;
mod hop;
mod hostkey;
mod keepalive;
mod listener;
mod options;
mod session;
mod tracker;
mod tunnel;

pub use auth::{Authenticator, Credential, Signer};
pub use conn::TunnelConn;
pub use error::TunnelError;
pub use hop::{Hop, HostKeyCheck, parse_hops};
pub use hostkey::{
    HostKey, HostKeyCallback, HostKeyError, HostKeyPolicy, default_known_hosts_path,
    fixed_host_key, insecure_ignore_host_key,
};
pub use listener::{ForwardListener, Listener};
pub use options::TunnelBuilder;
pub use session::{
    BoxStream, HandshakeError, HandshakeRequest, Handshaker, RemoteListener, Session,
    TunnelStream,
};
pub use tokio_util::sync::CancellationToken;
pub use tunnel::Tunnel;
