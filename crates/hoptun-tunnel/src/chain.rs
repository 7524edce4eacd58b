//! Hop-by-hop chain construction with rollback.
//!
//! Hop 0 is dialed directly over TCP; every later hop is reached through a
//! channel opened on the previous hop's session. Any failure closes the
//! sessions opened so far before the error is returned. If the build future
//! is dropped midway, the same cleanup runs in the background.

use std::sync::Arc;

use tokio::net::TcpStream;
use tokio::time::timeout;
use tokio_util::sync::CancellationToken;
use tracing::{Instrument, debug, info_span, warn};

use crate::auth::{Authenticator, resolve_authenticators};
use crate::error::TunnelError;
use crate::hostkey::resolve_host_key_policy;
use crate::keepalive::spawn_keepalive;
use crate::options::Options;
use crate::session::{BoxStream, HandshakeRequest, Handshaker, Session};

/// Sessions established so far in one build attempt.
#[derive(Default)]
struct PartialChain {
    sessions: Vec<Arc<dyn Session>>,
    keepalives: Vec<CancellationToken>,
}

impl PartialChain {
    fn last(&self) -> Option<&Arc<dyn Session>> {
        self.sessions.last()
    }

    fn push(&mut self, session: Arc<dyn Session>, keepalive: Option<CancellationToken>) {
        self.sessions.push(session);
        self.keepalives.extend(keepalive);
    }

    fn finish(mut self) -> Vec<Arc<dyn Session>> {
        self.keepalives.clear();
        std::mem::take(&mut self.sessions)
    }

    fn take(&mut self) -> Vec<Arc<dyn Session>> {
        for token in self.keepalives.drain(..) {
            token.cancel();
        }
        std::mem::take(&mut self.sessions)
    }

    /// Close every session from this attempt, innermost first.
    async fn rollback(mut self) {
        close_sessions(self.take()).await;
    }
}

impl Drop for PartialChain {
    fn drop(&mut self) {
        let sessions = self.take();
        if sessions.is_empty() {
            return;
        }
        // The build was abandoned mid-flight; clean up without blocking.
        if let Ok(handle) = tokio::runtime::Handle::try_current() {
            handle.spawn(close_sessions(sessions).instrument(info_span!("rollback")));
        }
    }
}

async fn close_sessions(sessions: Vec<Arc<dyn Session>>) {
    for (hop, session) in sessions.iter().enumerate().rev() {
        match session.close().await {
            Ok(()) => debug!(hop, "rolled back hop session"),
            Err(e) => warn!(hop, error = %e, "rollback: close hop failed"),
        }
    }
}

/// Build the full chain. Returns one session per hop, in hop order.
pub(crate) async fn build_chain(
    options: &Options,
    handshaker: &dyn Handshaker,
    shutdown: &CancellationToken,
) -> Result<Vec<Arc<dyn Session>>, TunnelError> {
    let authenticators: Arc<[Authenticator]> = resolve_authenticators(
        &options.credentials,
        options.use_agent,
        options.agent_socket(),
    )?
    .into();

    let mut partial = PartialChain::default();
    match extend_chain(options, handshaker, shutdown, &authenticators, &mut partial).await {
        Ok(()) => Ok(partial.finish()),
        Err(e) => {
            warn!(error = %e, category = e.category(), "chain build failed, rolling back");
            partial.rollback().await;
            Err(e)
        }
    }
}

async fn extend_chain(
    options: &Options,
    handshaker: &dyn Handshaker,
    shutdown: &CancellationToken,
    authenticators: &Arc<[Authenticator]>,
    partial: &mut PartialChain,
) -> Result<(), TunnelError> {
    for (i, hop) in options.hops.iter().enumerate() {
        let hop_timeout = hop.timeout.unwrap_or(options.per_hop_timeout);
        let addr = hop.addr();
        let timed_out = || TunnelError::HopTimeout {
            hop: i,
            addr: addr.clone(),
            timeout: hop_timeout,
        };

        let host_key = resolve_host_key_policy(
            hop,
            options.host_key_callback.as_ref(),
            options.known_hosts.as_deref(),
        )
        .map_err(|e| TunnelError::HostKeyPolicy {
            hop: i,
            source: Box::new(e),
        })?;

        let stream: BoxStream = match partial.last() {
            None => {
                let tcp = timeout(hop_timeout, TcpStream::connect(addr.as_str()))
                    .await
                    .map_err(|_| timed_out())?
                    .map_err(|source| TunnelError::DialHop {
                        hop: i,
                        addr: addr.clone(),
                        source,
                    })?;
                let _ = tcp.set_nodelay(true);
                Box::new(tcp)
            }
            Some(prev) => timeout(hop_timeout, prev.open_channel(&hop.host, hop.port))
                .await
                .map_err(|_| timed_out())?
                .map_err(|source| TunnelError::DialThrough {
                    via: i - 1,
                    addr: addr.clone(),
                    source,
                })?,
        };

        let request = HandshakeRequest {
            hop: i,
            user: hop.user.clone(),
            host: hop.host.clone(),
            port: hop.port,
            authenticators: authenticators.clone(),
            host_key,
            timeout: hop_timeout,
        };
        let session = timeout(
            hop_timeout,
            handshaker
                .handshake(stream, request)
                .instrument(info_span!("handshake", hop = i, %addr)),
        )
        .await
        .map_err(|_| timed_out())?
        .map_err(|source| TunnelError::Handshake {
            hop: i,
            addr: addr.clone(),
            source,
        })?;
        debug!(hop = i, %addr, user = %hop.user, "hop established");

        let keepalive = start_keepalive(i, &session, shutdown, options);
        partial.push(session, keepalive);
    }
    Ok(())
}

fn start_keepalive(
    hop: usize,
    session: &Arc<dyn Session>,
    shutdown: &CancellationToken,
    options: &Options,
) -> Option<CancellationToken> {
    if options.keepalive.is_zero() {
        return None;
    }
    let stop = shutdown.child_token();
    spawn_keepalive(hop, session.clone(), options.keepalive, stop.clone(), &options.span);
    Some(stop)
}
