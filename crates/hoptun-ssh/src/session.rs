//! SSH sessions on top of russh.
//!
//! [`SshHandshaker`] runs the SSH handshake over whatever stream the chain
//! builder hands it: a TCP socket for the first hop, a `direct-tcpip`
//! channel of the previous hop afterwards.

use std::io;
use std::sync::Arc;

use async_trait::async_trait;
use hoptun_tunnel::{
    Authenticator, BoxStream, HandshakeError, HandshakeRequest, Handshaker, RemoteListener,
    Session,
};
use parking_lot::Mutex;
use russh::Disconnect;
use russh::client::{self, Handle};
use russh::keys::PrivateKeyWithHashAlg;
use tokio::sync::{RwLock, mpsc};
use tokio_util::sync::CancellationToken;
use tracing::{debug, warn};

use crate::handler::{ClientHandler, ForwardRoutes, Forwarded};
use crate::keys::private_key;

/// Pending forwarded connections buffered per remote listener.
const FORWARD_BACKLOG: usize = 64;

/// Establishes SSH sessions for the tunnel.
#[derive(Clone)]
pub struct SshHandshaker {
    config: Arc<client::Config>,
}

impl SshHandshaker {
    pub fn new() -> Self {
        Self::with_config(client::Config::default())
    }

    /// Use a custom russh client configuration (algorithms, window sizes).
    pub fn with_config(config: client::Config) -> Self {
        Self {
            config: Arc::new(config),
        }
    }
}

impl Default for SshHandshaker {
    fn default() -> Self {
        Self::new()
    }
}

#[async_trait]
impl Handshaker for SshHandshaker {
    async fn handshake(
        &self,
        stream: BoxStream,
        request: HandshakeRequest,
    ) -> Result<Arc<dyn Session>, HandshakeError> {
        let rejection = Arc::new(Mutex::new(None));
        let routes = Arc::new(ForwardRoutes::default());
        let handler = ClientHandler::new(
            request.host.clone(),
            request.port,
            request.host_key.clone(),
            rejection.clone(),
            routes.clone(),
        );

        let mut handle = match client::connect_stream(self.config.clone(), stream, handler).await {
            Ok(handle) => handle,
            Err(e) => {
                if let Some(reason) = rejection.lock().take() {
                    return Err(HandshakeError::HostKeyRejected {
                        host: request.host,
                        reason,
                    });
                }
                return Err(protocol_error(e));
            }
        };

        if !authenticate(&mut handle, &request).await? {
            let _ = handle
                .disconnect(Disconnect::ByApplication, "authentication failed", "en")
                .await;
            return Err(HandshakeError::AuthRejected { user: request.user });
        }
        debug!(hop = request.hop, user = %request.user, "authenticated");

        Ok(Arc::new(SshSession {
            hop: request.hop,
            shared: Arc::new(SharedHandle {
                handle: RwLock::new(handle),
                closed: CancellationToken::new(),
            }),
            routes,
        }))
    }
}

fn protocol_error(e: russh::Error) -> HandshakeError {
    match e {
        russh::Error::IO(e) => HandshakeError::Io(e),
        other => HandshakeError::Protocol(other.to_string()),
    }
}

/// Try each authenticator in order until one succeeds.
async fn authenticate(
    handle: &mut Handle<ClientHandler>,
    request: &HandshakeRequest,
) -> Result<bool, HandshakeError> {
    for authenticator in request.authenticators.iter() {
        let accepted = match authenticator {
            Authenticator::Key(credential) => {
                let key = match private_key(credential) {
                    Ok(Some(key)) => key,
                    Ok(None) => {
                        debug!(origin = %credential.origin(), "skipping foreign signer");
                        continue;
                    }
                    Err(e) => {
                        warn!(origin = %credential.origin(), error = %e, "skipping unusable key");
                        continue;
                    }
                };
                let hash = handle
                    .best_supported_rsa_hash()
                    .await
                    .map_err(protocol_error)?
                    .flatten();
                handle
                    .authenticate_publickey(&request.user, PrivateKeyWithHashAlg::new(key, hash))
                    .await
                    .map_err(protocol_error)?
                    .success()
            }
            Authenticator::Agent(path) => authenticate_agent(handle, &request.user, path).await?,
        };
        if accepted {
            return Ok(true);
        }
    }
    Ok(false)
}

#[cfg(unix)]
async fn authenticate_agent(
    handle: &mut Handle<ClientHandler>,
    user: &str,
    path: &std::path::Path,
) -> Result<bool, HandshakeError> {
    use russh::keys::agent::client::AgentClient;

    let mut agent = match AgentClient::connect_uds(path).await {
        Ok(agent) => agent,
        Err(e) => {
            warn!(path = %path.display(), error = %e, "cannot reach SSH agent");
            return Ok(false);
        }
    };
    let identities = match agent.request_identities().await {
        Ok(identities) => identities,
        Err(e) => {
            warn!(error = %e, "SSH agent refused to list identities");
            return Ok(false);
        }
    };

    for identity in identities {
        let hash = handle
            .best_supported_rsa_hash()
            .await
            .map_err(protocol_error)?
            .flatten();
        match handle
            .authenticate_publickey_with(user, identity, hash, &mut agent)
            .await
        {
            Ok(result) if result.success() => return Ok(true),
            Ok(_) => {}
            Err(e) => debug!(error = %e, "agent identity failed"),
        }
    }
    Ok(false)
}

#[cfg(not(unix))]
async fn authenticate_agent(
    _handle: &mut Handle<ClientHandler>,
    _user: &str,
    path: &std::path::Path,
) -> Result<bool, HandshakeError> {
    warn!(path = %path.display(), "SSH agent is only supported on unix");
    Ok(false)
}

/// The russh handle shared by a session and its remote listeners.
///
/// Only `tcpip_forward` takes the write half. Every remote round trip races
/// `closed`, which `close` cancels before it disconnects.
struct SharedHandle {
    handle: RwLock<Handle<ClientHandler>>,
    closed: CancellationToken,
}

fn session_closed() -> io::Error {
    io::Error::new(io::ErrorKind::NotConnected, "session closed")
}

/// An authenticated SSH session with one hop.
pub struct SshSession {
    hop: usize,
    shared: Arc<SharedHandle>,
    routes: Arc<ForwardRoutes>,
}

#[async_trait]
impl Session for SshSession {
    async fn open_channel(&self, host: &str, port: u16) -> io::Result<BoxStream> {
        let shared = &self.shared;
        let channel = tokio::select! {
            _ = shared.closed.cancelled() => return Err(session_closed()),
            result = async {
                shared
                    .handle
                    .read()
                    .await
                    .channel_open_direct_tcpip(host, u32::from(port), "127.0.0.1", 0)
                    .await
            } => result.map_err(io::Error::other)?,
        };
        Ok(Box::new(channel.into_stream()))
    }

    async fn listen(&self, host: &str, port: u16) -> io::Result<Arc<dyn RemoteListener>> {
        let shared = &self.shared;
        let (tx, rx) = mpsc::channel(FORWARD_BACKLOG);
        let assigned = tokio::select! {
            _ = shared.closed.cancelled() => return Err(session_closed()),
            result = async {
                shared
                    .handle
                    .write()
                    .await
                    .tcpip_forward(host, u32::from(port))
                    .await
            } => result.map_err(io::Error::other)?,
        };
        let bound_port = if port == 0 { assigned } else { u32::from(port) };
        self.routes.insert(host.to_string(), bound_port, tx);
        debug!(hop = self.hop, host, port = bound_port, "remote forward registered");

        Ok(Arc::new(SshRemoteListener {
            host: host.to_string(),
            port: bound_port,
            rx: tokio::sync::Mutex::new(rx),
            shared: shared.clone(),
            routes: self.routes.clone(),
        }))
    }

    async fn keepalive(&self) -> io::Result<bool> {
        let shared = &self.shared;
        tokio::select! {
            _ = shared.closed.cancelled() => Err(session_closed()),
            result = async {
                let handle = shared.handle.read().await;
                if handle.is_closed() {
                    return Err(session_closed());
                }
                handle.send_keepalive(true).await.map_err(io::Error::other)?;
                Ok(!handle.is_closed())
            } => result,
        }
    }

    async fn close(&self) -> io::Result<()> {
        if self.shared.closed.is_cancelled() {
            return Ok(());
        }
        self.shared.closed.cancel();
        let handle = self.shared.handle.read().await;
        if handle.is_closed() {
            return Ok(());
        }
        handle
            .disconnect(Disconnect::ByApplication, "", "en")
            .await
            .map_err(io::Error::other)
    }
}

/// A `tcpip-forward` listener on the remote side of a session.
pub struct SshRemoteListener {
    host: String,
    port: u32,
    rx: tokio::sync::Mutex<mpsc::Receiver<Forwarded>>,
    shared: Arc<SharedHandle>,
    routes: Arc<ForwardRoutes>,
}

#[async_trait]
impl RemoteListener for SshRemoteListener {
    async fn accept(&self) -> io::Result<(BoxStream, String)> {
        let mut rx = self.rx.lock().await;
        let next = tokio::select! {
            _ = self.shared.closed.cancelled() => None,
            next = rx.recv() => next,
        };
        match next {
            Some((channel, origin)) => Ok((Box::new(channel.into_stream()), origin)),
            None => Err(io::Error::new(
                io::ErrorKind::NotConnected,
                "remote listener closed",
            )),
        }
    }

    fn local_addr(&self) -> String {
        if self.host.contains(':') {
            format!("[{}]:{}", self.host, self.port)
        } else {
            format!("{}:{}", self.host, self.port)
        }
    }

    async fn close(&self) -> io::Result<()> {
        // Dropping the route's sender ends pending accepts once drained.
        self.routes.remove(&self.host, self.port);
        let shared = &self.shared;
        tokio::select! {
            _ = shared.closed.cancelled() => Ok(()),
            result = async {
                let handle = shared.handle.read().await;
                if handle.is_closed() {
                    return Ok(());
                }
                handle
                    .cancel_tcpip_forward(self.host.as_str(), self.port)
                    .await
                    .map_err(io::Error::other)
            } => result,
        }
    }
}
