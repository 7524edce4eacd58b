//! The tunnel handle: lazy chain construction, dial, listen, forward and
//! ordered teardown.

use std::fmt;
use std::sync::Arc;
use std::sync::atomic::{AtomicBool, Ordering};

use tokio::net::TcpListener;
use tokio::sync::Mutex;
use tokio_util::sync::CancellationToken;
use tracing::{Instrument, debug, info, info_span, warn};

use crate::chain::build_chain;
use crate::conn::TunnelConn;
use crate::error::TunnelError;
use crate::forward::{ForwardTarget, serve_forward};
use crate::hop::{Hop, split_target};
use crate::listener::{Backend, ForwardListener, Listener, ListenerShared};
use crate::options::{Options, TunnelBuilder};
use crate::session::{Handshaker, Session};
use crate::tracker::Tracker;

const NETWORKS: [&str; 3] = ["tcp", "tcp4", "tcp6"];

/// A multi-hop tunnel.
///
/// Cheap to clone; all clones share one chain. The chain is built on first
/// use and torn down by [`Tunnel::close`].
#[derive(Clone)]
pub struct Tunnel {
    inner: Arc<Inner>,
}

pub(crate) struct Inner {
    pub(crate) options: Options,
    handshaker: Arc<dyn Handshaker>,
    /// Empty, or one session per hop in hop order.
    chain: Mutex<Vec<Arc<dyn Session>>>,
    connected: AtomicBool,
    closed: AtomicBool,
    tracker: Arc<Tracker>,
    /// Stops keepalive loops.
    shutdown: CancellationToken,
}

impl Tunnel {
    pub fn builder(handshaker: Arc<dyn Handshaker>) -> TunnelBuilder {
        TunnelBuilder::new(handshaker)
    }

    pub(crate) fn from_parts(options: Options, handshaker: Arc<dyn Handshaker>) -> Self {
        let tracker = Arc::new(Tracker::new(options.track_connections));
        Self {
            inner: Arc::new(Inner {
                options,
                handshaker,
                chain: Mutex::new(Vec::new()),
                connected: AtomicBool::new(false),
                closed: AtomicBool::new(false),
                tracker,
                shutdown: CancellationToken::new(),
            }),
        }
    }

    pub fn hops(&self) -> &[Hop] {
        &self.inner.options.hops
    }

    pub fn hop_count(&self) -> usize {
        self.inner.options.hops.len()
    }

    /// Whether the chain is currently established.
    pub fn is_connected(&self) -> bool {
        self.inner.connected.load(Ordering::Acquire)
    }

    pub fn is_closed(&self) -> bool {
        self.inner.closed.load(Ordering::Acquire)
    }

    pub fn tracked_connections(&self) -> usize {
        self.inner.tracker.connection_count()
    }

    pub fn tracked_listeners(&self) -> usize {
        self.inner.tracker.listener_count()
    }

    /// Build the chain now instead of on first use.
    pub async fn connect(&self) -> Result<(), TunnelError> {
        self.inner
            .ensure_chain()
            .instrument(self.inner.options.span.clone())
            .await
            .map(|_| ())
    }

    /// Open a connection to `addr` as seen from the last hop.
    pub async fn dial(&self, network: &str, addr: &str) -> Result<TunnelConn, TunnelError> {
        check_network(network)?;
        self.inner
            .dial(network, addr)
            .instrument(self.inner.options.span.clone())
            .await
    }

    /// Like [`Tunnel::dial`], but gives up with [`TunnelError::Cancelled`]
    /// if `cancel` fires while the chain is being built.
    pub async fn dial_with_cancel(
        &self,
        network: &str,
        addr: &str,
        cancel: &CancellationToken,
    ) -> Result<TunnelConn, TunnelError> {
        check_network(network)?;
        let span = self.inner.options.span.clone();
        async {
            tokio::select! {
                biased;
                _ = cancel.cancelled() => return Err(TunnelError::Cancelled),
                result = self.inner.ensure_chain() => { result?; }
            }
            self.inner.dial(network, addr).await
        }
        .instrument(span)
        .await
    }

    /// Listen on `addr` on the last hop.
    pub async fn listen(&self, network: &str, addr: &str) -> Result<Listener, TunnelError> {
        self.listen_inner(network, addr, None).await
    }

    /// Like [`Tunnel::listen`], and close the listener when `cancel` fires.
    pub async fn listen_with_cancel(
        &self,
        network: &str,
        addr: &str,
        cancel: CancellationToken,
    ) -> Result<Listener, TunnelError> {
        self.listen_inner(network, addr, Some(cancel)).await
    }

    async fn listen_inner(
        &self,
        network: &str,
        addr: &str,
        cancel: Option<CancellationToken>,
    ) -> Result<Listener, TunnelError> {
        check_network(network)?;
        let span = self.inner.options.span.clone();
        let inner = &self.inner;
        async move {
            let (host, port) = split_target(addr)?;
            let last = inner.ensure_chain().await?;
            let remote = last
                .listen(&host, port)
                .await
                .map_err(|source| TunnelError::ListenRemote {
                    network: network.to_string(),
                    addr: addr.to_string(),
                    source,
                })?;
            let bound = remote.local_addr();
            let shared = inner.register_listener(Backend::Remote(remote), bound).await?;
            info!(addr = %shared.local_addr(), "remote listener opened");

            if let Some(cancel) = cancel {
                spawn_cancel_watcher(shared.clone(), cancel);
            }
            Ok(Listener::new(shared))
        }
        .instrument(span)
        .await
    }

    /// Listen locally on `local` and bridge every accepted connection to
    /// `remote` through the tunnel.
    pub async fn forward(&self, local: &str, remote: &str) -> Result<ForwardListener, TunnelError> {
        let span = self.inner.options.span.clone();
        let inner = &self.inner;
        async move {
            let (host, port) = split_target(remote)?;
            inner.ensure_chain().await?;
            let listener = TcpListener::bind(local)
                .await
                .map_err(|source| TunnelError::ListenLocal {
                    addr: local.to_string(),
                    source,
                })?;
            let bound = listener
                .local_addr()
                .map_err(|source| TunnelError::ListenLocal {
                    addr: local.to_string(),
                    source,
                })?
                .to_string();
            let shared = inner
                .register_listener(Backend::Local(Arc::new(listener)), bound)
                .await?;
            info!(listen = %shared.local_addr(), target = %remote, "forward started");

            let target = ForwardTarget {
                host,
                port,
                addr: remote.to_string(),
            };
            let span = info_span!("forward", listen = %shared.local_addr(), target = %remote);
            tokio::spawn(serve_forward(Arc::downgrade(inner), shared.clone(), target).instrument(span));
            Ok(ForwardListener::new(shared))
        }
        .instrument(span)
        .await
    }

    /// Tear the tunnel down: listeners, then tracked connections, then hop
    /// sessions from the last hop back to the first.
    ///
    /// Only the first call tears down and reports what failed; every later
    /// or concurrent call returns `Ok(())` at once. Errors are collected,
    /// never short-circuit.
    pub async fn close(&self) -> Result<(), TunnelError> {
        let inner = &self.inner;
        if inner.closed.swap(true, Ordering::AcqRel) {
            return Ok(());
        }
        let errors = inner.teardown().instrument(inner.options.span.clone()).await;
        if errors.is_empty() {
            Ok(())
        } else {
            Err(TunnelError::Teardown(errors.into()))
        }
    }
}

impl fmt::Debug for Tunnel {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        let hops: Vec<String> = self.hops().iter().map(ToString::to_string).collect();
        f.debug_struct("Tunnel")
            .field("hops", &hops)
            .field("connected", &self.is_connected())
            .field("closed", &self.is_closed())
            .finish()
    }
}

impl Inner {
    fn check_open(&self) -> Result<(), TunnelError> {
        if self.closed.load(Ordering::Acquire) {
            Err(TunnelError::Closed)
        } else {
            Ok(())
        }
    }

    /// Build the chain if needed and return the last hop's session.
    ///
    /// The chain lock is held for the whole build, so concurrent callers
    /// wait and then reuse the chain the winner built.
    async fn ensure_chain(&self) -> Result<Arc<dyn Session>, TunnelError> {
        self.check_open()?;
        let mut chain = self.chain.lock().await;
        self.check_open()?;
        if let Some(last) = chain.last() {
            return Ok(last.clone());
        }

        let sessions = build_chain(&self.options, self.handshaker.as_ref(), &self.shutdown).await?;
        info!(hops = sessions.len(), "tunnel chain established");
        *chain = sessions;
        self.connected.store(true, Ordering::Release);
        chain.last().cloned().ok_or(TunnelError::NoHops)
    }

    async fn dial(&self, network: &str, addr: &str) -> Result<TunnelConn, TunnelError> {
        let (host, port) = split_target(addr)?;
        self.dial_host(network, &host, port, addr).await
    }

    pub(crate) async fn dial_host(
        &self,
        network: &str,
        host: &str,
        port: u16,
        addr: &str,
    ) -> Result<TunnelConn, TunnelError> {
        let last = self.ensure_chain().await?;
        let stream = last
            .open_channel(host, port)
            .await
            .map_err(|source| TunnelError::DialRemote {
                network: network.to_string(),
                addr: addr.to_string(),
                source,
            })?;
        // Teardown may have run while the channel was opening.
        self.check_open()?;
        debug!(%addr, "dialed through tunnel");
        Ok(TunnelConn::new(stream, addr.to_string(), &self.tracker))
    }

    pub(crate) fn track(&self, stream: crate::session::BoxStream, peer: String) -> TunnelConn {
        TunnelConn::new(stream, peer, &self.tracker)
    }

    async fn register_listener(
        &self,
        backend: Backend,
        local_addr: String,
    ) -> Result<Arc<ListenerShared>, TunnelError> {
        let shared = ListenerShared::register(&self.tracker, backend, local_addr);
        if self.check_open().is_err() {
            let _ = shared.close().await;
            return Err(TunnelError::Closed);
        }
        Ok(shared)
    }

    async fn teardown(&self) -> Vec<TunnelError> {
        self.shutdown.cancel();

        let mut chain = self.chain.lock().await;
        let mut errors = Vec::new();

        for listener in self.tracker.take_listeners() {
            match listener.close().await {
                Ok(()) | Err(TunnelError::ListenerClosed) => {}
                Err(e) => errors.push(e),
            }
        }

        if self.options.track_connections {
            let closed = self.tracker.close_connections();
            debug!(connections = closed, "closed tracked connections");
        }

        for (hop, session) in chain.iter().enumerate().rev() {
            if let Err(source) = session.close().await {
                errors.push(TunnelError::CloseHop { hop, source });
            }
        }
        chain.clear();
        self.connected.store(false, Ordering::Release);

        if errors.is_empty() {
            info!("tunnel closed");
        } else {
            warn!(errors = errors.len(), "tunnel closed with errors");
        }
        errors
    }
}

impl Drop for Inner {
    fn drop(&mut self) {
        self.shutdown.cancel();
    }
}

fn check_network(network: &str) -> Result<(), TunnelError> {
    if NETWORKS.contains(&network) {
        Ok(())
    } else {
        Err(TunnelError::UnsupportedNetwork(network.to_string()))
    }
}

fn spawn_cancel_watcher(listener: Arc<ListenerShared>, cancel: CancellationToken) {
    let closed = listener.closed_token();
    let span = info_span!("listen_cancel", addr = %listener.local_addr());
    tokio::spawn(
        async move {
            tokio::select! {
                _ = closed.cancelled() => {}
                _ = cancel.cancelled() => {
                    debug!("listen cancelled");
                    let _ = listener.close().await;
                }
            }
        }
        .instrument(span),
    );
}
