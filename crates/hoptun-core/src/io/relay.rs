//! Bidirectional byte-stream bridge with half-close handling.
//!
//! Each direction is driven as an independent poll-based state machine within
//! a single future, so back-pressure on one direction never stalls the other.
//! When a direction reaches end-of-stream it shuts down only the write side of
//! its destination; the opposite direction keeps flowing until it also ends.

use std::future::pending;
use std::io;
use std::pin::Pin;
use std::task::{Context, Poll};
use std::time::Duration;

use tokio::io::{AsyncRead, AsyncWrite, ReadBuf};
use tokio::time::{Instant as TokioInstant, Sleep};

enum CopyState {
    Reading,
    Writing { pos: usize, len: usize },
    Flushing { len: usize },
    ShuttingDown,
    Done,
}

enum CopyPoll {
    Flushed(usize),
    /// EOF seen and the destination's write side shut down.
    Finished,
}

/// Copy one chunk from `reader` to `writer`, or finish the direction.
fn poll_copy_direction<R, W>(
    cx: &mut Context<'_>,
    reader: &mut R,
    writer: &mut W,
    buf: &mut [u8],
    state: &mut CopyState,
) -> Poll<io::Result<CopyPoll>>
where
    R: AsyncRead + Unpin + ?Sized,
    W: AsyncWrite + Unpin + ?Sized,
{
    loop {
        match state {
            CopyState::Reading => {
                let mut read_buf = ReadBuf::new(buf);
                match Pin::new(&mut *reader).poll_read(cx, &mut read_buf) {
                    Poll::Ready(Ok(())) => {
                        let n = read_buf.filled().len();
                        if n == 0 {
                            *state = CopyState::ShuttingDown;
                        } else {
                            *state = CopyState::Writing { pos: 0, len: n };
                        }
                    }
                    Poll::Ready(Err(e)) => return Poll::Ready(Err(e)),
                    Poll::Pending => return Poll::Pending,
                }
            }
            CopyState::Writing { pos, len } => {
                match Pin::new(&mut *writer).poll_write(cx, &buf[*pos..*len]) {
                    Poll::Ready(Ok(0)) => {
                        return Poll::Ready(Err(io::Error::new(
                            io::ErrorKind::WriteZero,
                            "destination stopped accepting bytes",
                        )));
                    }
                    Poll::Ready(Ok(n)) => {
                        *pos += n;
                        if *pos >= *len {
                            *state = CopyState::Flushing { len: *len };
                        }
                    }
                    Poll::Ready(Err(e)) => return Poll::Ready(Err(e)),
                    Poll::Pending => return Poll::Pending,
                }
            }
            CopyState::Flushing { len } => {
                let len = *len;
                match Pin::new(&mut *writer).poll_flush(cx) {
                    Poll::Ready(Ok(())) => {
                        *state = CopyState::Reading;
                        return Poll::Ready(Ok(CopyPoll::Flushed(len)));
                    }
                    Poll::Ready(Err(e)) => return Poll::Ready(Err(e)),
                    Poll::Pending => return Poll::Pending,
                }
            }
            // Half-close.
            CopyState::ShuttingDown => match Pin::new(&mut *writer).poll_shutdown(cx) {
                Poll::Ready(_) => {
                    *state = CopyState::Done;
                    return Poll::Ready(Ok(CopyPoll::Finished));
                }
                Poll::Pending => return Poll::Pending,
            },
            CopyState::Done => return Poll::Ready(Ok(CopyPoll::Finished)),
        }
    }
}

async fn wait_idle(sleep: &mut Option<Pin<Box<Sleep>>>) {
    match sleep {
        Some(sleep) => sleep.as_mut().await,
        None => pending::<()>().await,
    }
}

/// Bridge two streams until both directions have reached end-of-stream.
///
/// `a → b` and `b → a` run concurrently. A direction that sees EOF issues a
/// write-side shutdown on its destination and stops; the bridge returns only
/// once both directions are done, and both streams are fully closed when the
/// caller drops them. An I/O error in either direction aborts the bridge.
///
/// With `idle_timeout` set, the bridge also returns when **neither**
/// direction has transferred data within that window.
///
/// Returns the number of bytes copied `(a → b, b → a)`.
pub async fn relay_bidirectional<A, B>(
    a: A,
    b: B,
    idle_timeout: Option<Duration>,
    buffer_size: usize,
) -> io::Result<(u64, u64)>
where
    A: AsyncRead + AsyncWrite + Unpin,
    B: AsyncRead + AsyncWrite + Unpin,
{
    let (mut a_r, mut a_w) = tokio::io::split(a);
    let (mut b_r, mut b_w) = tokio::io::split(b);

    let mut buf_ab = vec![0u8; buffer_size];
    let mut buf_ba = vec![0u8; buffer_size];
    let mut state_ab = CopyState::Reading;
    let mut state_ba = CopyState::Reading;

    let mut idle_sleep = idle_timeout.map(|d| Box::pin(tokio::time::sleep(d)));

    let mut ab_done = false;
    let mut ba_done = false;
    let mut ab_bytes = 0u64;
    let mut ba_bytes = 0u64;

    loop {
        if ab_done && ba_done {
            return Ok((ab_bytes, ba_bytes));
        }

        let both = std::future::poll_fn(|cx| {
            let mut any_ready = false;
            let mut activity = false;
            let mut error: Option<io::Error> = None;

            if !ab_done {
                match poll_copy_direction(cx, &mut a_r, &mut b_w, &mut buf_ab, &mut state_ab) {
                    Poll::Ready(Ok(CopyPoll::Flushed(n))) => {
                        ab_bytes += n as u64;
                        activity = true;
                        any_ready = true;
                    }
                    Poll::Ready(Ok(CopyPoll::Finished)) => {
                        ab_done = true;
                        any_ready = true;
                    }
                    Poll::Ready(Err(e)) => {
                        error = Some(e);
                        any_ready = true;
                    }
                    Poll::Pending => {}
                }
            }

            if !ba_done {
                match poll_copy_direction(cx, &mut b_r, &mut a_w, &mut buf_ba, &mut state_ba) {
                    Poll::Ready(Ok(CopyPoll::Flushed(n))) => {
                        ba_bytes += n as u64;
                        activity = true;
                        any_ready = true;
                    }
                    Poll::Ready(Ok(CopyPoll::Finished)) => {
                        ba_done = true;
                        any_ready = true;
                    }
                    Poll::Ready(Err(e)) => {
                        error = Some(e);
                        any_ready = true;
                    }
                    Poll::Pending => {}
                }
            }

            if let Some(e) = error {
                return Poll::Ready(Err(e));
            }

            if any_ready {
                Poll::Ready(Ok(activity))
            } else {
                Poll::Pending
            }
        });

        tokio::select! {
            result = both => {
                let activity = result?;
                if activity
                    && let (Some(sleep), Some(timeout)) = (idle_sleep.as_mut(), idle_timeout)
                {
                    sleep.as_mut().reset(TokioInstant::now() + timeout);
                }
            }
            _ = wait_idle(&mut idle_sleep) => {
                return Ok((ab_bytes, ba_bytes));
            }
        }
    }
}
