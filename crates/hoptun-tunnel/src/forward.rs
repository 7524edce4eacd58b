//! Local forward accept loop.
//!
//! The loop runs until its listener is closed, by the caller or by tunnel
//! teardown. Each accepted connection gets its own bridge task, which ends
//! once both directions reach end-of-stream.

use std::sync::{Arc, Weak};

use hoptun_core::io::relay_bidirectional;
use tracing::{Instrument, debug, info_span, warn};

use crate::conn::TunnelConn;
use crate::error::TunnelError;
use crate::listener::ListenerShared;
use crate::tunnel::Inner;

/// Where forwarded connections are dialed, as seen from the last hop.
#[derive(Clone, Debug)]
pub(crate) struct ForwardTarget {
    pub(crate) host: String,
    pub(crate) port: u16,
    pub(crate) addr: String,
}

pub(crate) async fn serve_forward(
    tunnel: Weak<Inner>,
    listener: Arc<ListenerShared>,
    target: ForwardTarget,
) {
    loop {
        let (stream, peer) = match listener.accept().await {
            Ok(accepted) => accepted,
            Err(TunnelError::ListenerClosed) => {
                debug!("forward listener closed");
                return;
            }
            Err(e) => {
                warn!(error = %e, "forward accept failed, closing listener");
                let _ = listener.close().await;
                return;
            }
        };
        let Some(inner) = tunnel.upgrade() else {
            debug!("tunnel dropped, stopping forward");
            return;
        };

        let local = inner.track(stream, peer.clone());
        tokio::spawn(bridge(inner, local, target.clone()).instrument(info_span!("bridge", %peer)));
    }
}

async fn bridge(inner: Arc<Inner>, mut local: TunnelConn, target: ForwardTarget) {
    let remote = match inner.dial_host("tcp", &target.host, target.port, &target.addr).await {
        Ok(conn) => conn,
        Err(e) => {
            debug!(error = %e, "forward dial failed");
            let _ = local.close().await;
            return;
        }
    };

    let idle = inner.options.forward_idle_timeout;
    let buffer = inner.options.relay_buffer_size;
    match relay_bidirectional(local, remote, idle, buffer).await {
        Ok((up, down)) => debug!(up, down, "forward finished"),
        Err(e) => debug!(error = %e, "forward relay ended with error"),
    }
}
