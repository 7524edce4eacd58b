//! Per-hop keepalive loop.
//!
//! The loop exits on the first refused or failed probe, or when its token is
//! cancelled. It never closes the session: a dead link surfaces on the next
//! real operation.

use std::sync::Arc;
use std::time::Duration;

use tokio::task::JoinHandle;
use tokio::time::{Instant, MissedTickBehavior};
use tokio_util::sync::CancellationToken;
use tracing::{Instrument, Span, debug, info_span, trace};

use crate::session::Session;

pub(crate) fn spawn_keepalive(
    hop: usize,
    session: Arc<dyn Session>,
    interval: Duration,
    stop: CancellationToken,
    parent: &Span,
) -> JoinHandle<()> {
    tokio::spawn(
        run_keepalive(session, interval, stop)
            .instrument(info_span!(parent: parent, "keepalive", hop)),
    )
}

async fn run_keepalive(session: Arc<dyn Session>, interval: Duration, stop: CancellationToken) {
    let mut ticker = tokio::time::interval_at(Instant::now() + interval, interval);
    ticker.set_missed_tick_behavior(MissedTickBehavior::Delay);

    loop {
        tokio::select! {
            biased;
            _ = stop.cancelled() => {
                trace!("keepalive stopped");
                return;
            }
            _ = ticker.tick() => {}
        }

        match session.keepalive().await {
            Ok(true) => trace!("keepalive acknowledged"),
            Ok(false) => {
                debug!("keepalive not acknowledged, stopping");
                return;
            }
            Err(e) => {
                debug!(error = %e, "keepalive failed, stopping");
                return;
            }
        }
    }
}
