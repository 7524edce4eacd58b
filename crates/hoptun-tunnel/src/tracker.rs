//! Per-tunnel registry of live connections and listeners.
//!
//! Connections are represented by the cancellation token that closes them;
//! listeners by their shared state so teardown can close them directly.

use std::collections::HashMap;
use std::sync::Arc;
use std::sync::atomic::{AtomicU64, Ordering};

use parking_lot::Mutex;
use tokio_util::sync::CancellationToken;

use crate::listener::ListenerShared;

#[derive(Default)]
struct Tracked {
    conns: HashMap<u64, CancellationToken>,
    listeners: HashMap<u64, Arc<ListenerShared>>,
}

pub(crate) struct Tracker {
    track_connections: bool,
    next_id: AtomicU64,
    state: Mutex<Tracked>,
}

impl Tracker {
    pub(crate) fn new(track_connections: bool) -> Self {
        Self {
            track_connections,
            next_id: AtomicU64::new(1),
            state: Mutex::new(Tracked::default()),
        }
    }

    pub(crate) fn next_id(&self) -> u64 {
        self.next_id.fetch_add(1, Ordering::Relaxed)
    }

    /// Register a connection. Returns `None` when tracking is disabled.
    pub(crate) fn track_conn(&self) -> Option<(u64, CancellationToken)> {
        if !self.track_connections {
            return None;
        }
        let id = self.next_id();
        let token = CancellationToken::new();
        self.state.lock().conns.insert(id, token.clone());
        Some((id, token))
    }

    pub(crate) fn untrack_conn(&self, id: u64) {
        self.state.lock().conns.remove(&id);
    }

    pub(crate) fn track_listener(&self, listener: Arc<ListenerShared>) {
        self.state.lock().listeners.insert(listener.id(), listener);
    }

    pub(crate) fn untrack_listener(&self, id: u64) {
        self.state.lock().listeners.remove(&id);
    }

    /// Remove every listener from the registry, handing them to the caller.
    pub(crate) fn take_listeners(&self) -> Vec<Arc<ListenerShared>> {
        self.state
            .lock()
            .listeners
            .drain()
            .map(|(_, listener)| listener)
            .collect()
    }

    /// Close every tracked connection. Returns how many were closed.
    pub(crate) fn close_connections(&self) -> usize {
        let tokens: Vec<_> = self.state.lock().conns.drain().map(|(_, t)| t).collect();
        for token in &tokens {
            token.cancel();
        }
        tokens.len()
    }

    pub(crate) fn connection_count(&self) -> usize {
        self.state.lock().conns.len()
    }

    pub(crate) fn listener_count(&self) -> usize {
        self.state.lock().listeners.len()
    }
}
