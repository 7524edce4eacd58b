//! Connections handed out by the tunnel.

use std::fmt;
use std::future::Future;
use std::io;
use std::pin::Pin;
use std::sync::Arc;
use std::task::{Context, Poll};

use tokio::io::{AsyncRead, AsyncWrite, AsyncWriteExt, ReadBuf};
use tokio_util::sync::WaitForCancellationFutureOwned;

use crate::session::BoxStream;
use crate::tracker::Tracker;

struct Tracking {
    id: u64,
    tracker: Arc<Tracker>,
    cancelled: Pin<Box<WaitForCancellationFutureOwned>>,
}

/// A byte stream through the tunnel.
///
/// When tracking is enabled the connection is registered with its tunnel
/// and removed exactly once, on [`TunnelConn::close`] or drop. If the tunnel
/// is closed first, pending and later I/O fails with `NotConnected`.
pub struct TunnelConn {
    stream: Option<BoxStream>,
    remote_addr: String,
    tracking: Option<Tracking>,
}

impl TunnelConn {
    pub(crate) fn new(stream: BoxStream, remote_addr: String, tracker: &Arc<Tracker>) -> Self {
        let tracking = tracker.track_conn().map(|(id, token)| Tracking {
            id,
            tracker: tracker.clone(),
            cancelled: Box::pin(token.cancelled_owned()),
        });
        Self {
            stream: Some(stream),
            remote_addr,
            tracking,
        }
    }

    pub(crate) fn untracked(stream: BoxStream, remote_addr: String) -> Self {
        Self {
            stream: Some(stream),
            remote_addr,
            tracking: None,
        }
    }

    /// Address this connection was dialed to, or the originator for
    /// accepted connections.
    pub fn remote_addr(&self) -> &str {
        &self.remote_addr
    }

    pub fn is_tracked(&self) -> bool {
        self.tracking.is_some()
    }

    pub fn is_closed(&self) -> bool {
        self.stream.is_none()
    }

    /// Shut the stream down and untrack it. Calling it again is a no-op.
    pub async fn close(&mut self) -> io::Result<()> {
        let result = match self.stream.take() {
            Some(mut stream) => stream.shutdown().await,
            None => Ok(()),
        };
        self.release();
        result
    }

    fn release(&mut self) {
        if let Some(tracking) = self.tracking.take() {
            tracking.tracker.untrack_conn(tracking.id);
        }
    }

    fn live_stream(&mut self, cx: &mut Context<'_>) -> io::Result<&mut BoxStream> {
        if let Some(tracking) = self.tracking.as_mut()
            && tracking.cancelled.as_mut().poll(cx).is_ready()
        {
            self.stream = None;
            self.release();
        }
        self.stream
            .as_mut()
            .ok_or_else(|| io::Error::new(io::ErrorKind::NotConnected, "connection closed"))
    }
}

impl AsyncRead for TunnelConn {
    fn poll_read(
        self: Pin<&mut Self>,
        cx: &mut Context<'_>,
        buf: &mut ReadBuf<'_>,
    ) -> Poll<io::Result<()>> {
        match self.get_mut().live_stream(cx) {
            Ok(stream) => Pin::new(stream).poll_read(cx, buf),
            Err(e) => Poll::Ready(Err(e)),
        }
    }
}

impl AsyncWrite for TunnelConn {
    fn poll_write(
        self: Pin<&mut Self>,
        cx: &mut Context<'_>,
        buf: &[u8],
    ) -> Poll<io::Result<usize>> {
        match self.get_mut().live_stream(cx) {
            Ok(stream) => Pin::new(stream).poll_write(cx, buf),
            Err(e) => Poll::Ready(Err(e)),
        }
    }

    fn poll_flush(self: Pin<&mut Self>, cx: &mut Context<'_>) -> Poll<io::Result<()>> {
        match self.get_mut().live_stream(cx) {
            Ok(stream) => Pin::new(stream).poll_flush(cx),
            Err(e) => Poll::Ready(Err(e)),
        }
    }

    fn poll_shutdown(self: Pin<&mut Self>, cx: &mut Context<'_>) -> Poll<io::Result<()>> {
        match self.get_mut().live_stream(cx) {
            Ok(stream) => Pin::new(stream).poll_shutdown(cx),
            Err(e) => Poll::Ready(Err(e)),
        }
    }
}

impl Drop for TunnelConn {
    fn drop(&mut self) {
        self.release();
    }
}

impl fmt::Debug for TunnelConn {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.debug_struct("TunnelConn")
            .field("remote_addr", &self.remote_addr)
            .field("tracked", &self.is_tracked())
            .field("closed", &self.is_closed())
            .finish()
    }
}
