//! Secure-channel collaborator interface.
//!
//! The tunnel core never speaks the SSH protocol itself. A [`Handshaker`]
//! turns a raw byte stream into an authenticated [`Session`], and sessions
//! open further channels and remote listeners.

use std::io;
use std::sync::Arc;
use std::time::Duration;

use async_trait::async_trait;
use thiserror::Error;
use tokio::io::{AsyncRead, AsyncWrite};

use crate::auth::Authenticator;
use crate::hostkey::HostKeyPolicy;

/// Marker trait for byte streams carried through the tunnel.
pub trait TunnelStream: AsyncRead + AsyncWrite + Unpin + Send + 'static {}

impl<T: AsyncRead + AsyncWrite + Unpin + Send + 'static> TunnelStream for T {}

/// Type-erased stream: a TCP socket for the first hop, a channel afterwards.
pub type BoxStream = Box<dyn TunnelStream>;

/// Everything a handshaker needs to authenticate one hop.
#[derive(Clone, Debug)]
pub struct HandshakeRequest {
    pub hop: usize,
    pub user: String,
    pub host: String,
    pub port: u16,
    /// Authenticators in priority order, never empty.
    pub authenticators: Arc<[Authenticator]>,
    pub host_key: HostKeyPolicy,
    /// Budget for the whole handshake; the core also enforces it.
    pub timeout: Duration,
}

#[derive(Error, Debug)]
pub enum HandshakeError {
    #[error("IO error: {0}")]
    Io(#[from] io::Error),

    #[error("handshake timed out")]
    Timeout,

    #[error("host key rejected for {host}: {reason}")]
    HostKeyRejected { host: String, reason: String },

    #[error("authentication rejected for user {user}")]
    AuthRejected { user: String },

    #[error("protocol error: {0}")]
    Protocol(String),
}

/// Establishes a secure session over an already connected stream.
///
/// The stream is consumed; on failure it is dropped, which closes it.
#[async_trait]
pub trait Handshaker: Send + Sync + 'static {
    async fn handshake(
        &self,
        stream: BoxStream,
        request: HandshakeRequest,
    ) -> Result<Arc<dyn Session>, HandshakeError>;
}

/// A live, authenticated session with one hop.
///
/// After [`Session::close`] every pending and later operation on the
/// session and its channels fails.
#[async_trait]
pub trait Session: Send + Sync + 'static {
    /// Open an outbound channel to `host:port` as seen from this hop.
    async fn open_channel(&self, host: &str, port: u16) -> io::Result<BoxStream>;

    /// Ask the hop to listen on `host:port` and deliver accepted connections back.
    async fn listen(&self, host: &str, port: u16) -> io::Result<Arc<dyn RemoteListener>>;

    /// Send a liveness probe. `Ok(true)` means the peer acknowledged it.
    async fn keepalive(&self) -> io::Result<bool>;

    async fn close(&self) -> io::Result<()>;
}

/// A listening channel bound on the remote side of a session.
#[async_trait]
pub trait RemoteListener: Send + Sync + 'static {
    /// Wait for the next forwarded connection and its originator address.
    async fn accept(&self) -> io::Result<(BoxStream, String)>;

    /// Bound address on the remote side.
    fn local_addr(&self) -> String;

    async fn close(&self) -> io::Result<()>;
}
