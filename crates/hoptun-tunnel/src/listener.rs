//! Tracked listeners: remote listeners on the last hop and local forward
//! listeners.

use std::fmt;
use std::sync::{Arc, Weak};

use parking_lot::Mutex;
use tokio::net::TcpListener;
use tokio_util::sync::CancellationToken;
use tracing::debug;

use crate::conn::TunnelConn;
use crate::error::TunnelError;
use crate::session::{BoxStream, RemoteListener};
use crate::tracker::Tracker;

#[derive(Clone)]
pub(crate) enum Backend {
    Local(Arc<TcpListener>),
    Remote(Arc<dyn RemoteListener>),
}

impl Backend {
    async fn accept(&self) -> std::io::Result<(BoxStream, String)> {
        match self {
            Backend::Local(listener) => {
                let (stream, peer) = listener.accept().await?;
                let _ = stream.set_nodelay(true);
                Ok((Box::new(stream), peer.to_string()))
            }
            Backend::Remote(listener) => listener.accept().await,
        }
    }
}

pub(crate) struct ListenerShared {
    id: u64,
    local_addr: String,
    backend: Mutex<Option<Backend>>,
    closed: CancellationToken,
    tracker: Weak<Tracker>,
}

impl ListenerShared {
    /// Create the listener state and register it with the tracker.
    pub(crate) fn register(tracker: &Arc<Tracker>, backend: Backend, local_addr: String) -> Arc<Self> {
        let shared = Arc::new(Self {
            id: tracker.next_id(),
            local_addr,
            backend: Mutex::new(Some(backend)),
            closed: CancellationToken::new(),
            tracker: Arc::downgrade(tracker),
        });
        tracker.track_listener(shared.clone());
        shared
    }

    pub(crate) fn id(&self) -> u64 {
        self.id
    }

    pub(crate) fn local_addr(&self) -> &str {
        &self.local_addr
    }

    pub(crate) fn is_closed(&self) -> bool {
        self.closed.is_cancelled()
    }

    /// Fires once the listener has been closed.
    pub(crate) fn closed_token(&self) -> CancellationToken {
        self.closed.clone()
    }

    pub(crate) async fn accept(&self) -> Result<(BoxStream, String), TunnelError> {
        let backend = self
            .backend
            .lock()
            .clone()
            .ok_or(TunnelError::ListenerClosed)?;
        tokio::select! {
            biased;
            _ = self.closed.cancelled() => Err(TunnelError::ListenerClosed),
            result = backend.accept() => result.map_err(TunnelError::Io),
        }
    }

    /// Close and untrack. A second close returns [`TunnelError::ListenerClosed`].
    pub(crate) async fn close(&self) -> Result<(), TunnelError> {
        let backend = self.backend.lock().take();
        let Some(backend) = backend else {
            return Err(TunnelError::ListenerClosed);
        };
        self.closed.cancel();
        if let Some(tracker) = self.tracker.upgrade() {
            tracker.untrack_listener(self.id);
        }
        debug!(addr = %self.local_addr, "listener closed");
        match backend {
            Backend::Local(_) => Ok(()),
            Backend::Remote(remote) => {
                remote
                    .close()
                    .await
                    .map_err(|source| TunnelError::CloseListener {
                        addr: self.local_addr.clone(),
                        source,
                    })
            }
        }
    }
}

/// A listener bound on the far end of the chain.
///
/// Accepted connections belong to the caller and are not tracked.
pub struct Listener {
    shared: Arc<ListenerShared>,
}

impl Listener {
    pub(crate) fn new(shared: Arc<ListenerShared>) -> Self {
        Self { shared }
    }

    pub async fn accept(&self) -> Result<TunnelConn, TunnelError> {
        let (stream, peer) = self.shared.accept().await?;
        Ok(TunnelConn::untracked(stream, peer))
    }

    /// Address bound on the remote side.
    pub fn local_addr(&self) -> &str {
        self.shared.local_addr()
    }

    pub async fn close(&self) -> Result<(), TunnelError> {
        self.shared.close().await
    }

    pub fn is_closed(&self) -> bool {
        self.shared.is_closed()
    }
}

impl fmt::Debug for Listener {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.debug_struct("Listener")
            .field("local_addr", &self.shared.local_addr)
            .field("closed", &self.is_closed())
            .finish()
    }
}

/// A local listener whose connections are bridged through the tunnel.
///
/// Closing it stops the accept loop; bridges already running continue
/// until their streams end or the tunnel closes.
pub struct ForwardListener {
    shared: Arc<ListenerShared>,
}

impl ForwardListener {
    pub(crate) fn new(shared: Arc<ListenerShared>) -> Self {
        Self { shared }
    }

    /// Local bound address, e.g. `127.0.0.1:40123`.
    pub fn local_addr(&self) -> &str {
        self.shared.local_addr()
    }

    pub async fn close(&self) -> Result<(), TunnelError> {
        self.shared.close().await
    }

    pub fn is_closed(&self) -> bool {
        self.shared.is_closed()
    }
}

impl fmt::Debug for ForwardListener {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.debug_struct("ForwardListener")
            .field("local_addr", &self.shared.local_addr)
            .field("closed", &self.is_closed())
            .finish()
    }
}
