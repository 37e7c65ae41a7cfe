//! Error sink: a bounded error queue drained by one consumer that hands each error to the
//! observer under the admission timeout. Delivery is best-effort on both ends.

use crossbeam_channel::{Receiver, Sender, TrySendError, select};
use log::{debug, warn};
use std::sync::Arc;
use std::thread::{self, JoinHandle};

use crate::error::FunnelError;
use crate::types::SharedErrorObserver;

use super::context::FunnelContext;
use super::deadline::{DeadlineRunner, Outcome};
use super::stats::{FunnelCounters, LiveGuard};

/// Push `err` to the sink without blocking. When the queue is full or already closed the
/// error is logged and counted as dropped instead.
pub fn report_error(error_tx: &Sender<FunnelError>, err: FunnelError, counters: &FunnelCounters) {
    match error_tx.try_send(err) {
        Ok(()) => {}
        Err(TrySendError::Full(err)) => {
            counters.record_error_dropped();
            warn!("error queue full, dropping: {}", err);
        }
        Err(TrySendError::Disconnected(err)) => {
            counters.record_error_dropped();
            warn!("error sink closed, dropping: {}", err);
        }
    }
}

/// Hand one error to the observer and wait at most `admission_timeout` for it.
fn deliver(
    err: FunnelError,
    runner: &mut DeadlineRunner<()>,
    observer: &SharedErrorObserver,
    ctx: &FunnelContext,
) {
    let funnel = &ctx.opts.id;
    let timeout = ctx.opts.admission_timeout;
    let scope = ctx.token.scope(timeout);
    let observer = Arc::clone(observer);
    match runner.run(&scope, move || observer.observe(err)) {
        Outcome::Done(()) => {}
        Outcome::TimedOut => {
            ctx.counters.record_error_dropped();
            warn!(
                "{}",
                FunnelError::ObserverTimeout {
                    funnel: funnel.clone(),
                    observer: "error",
                    timeout,
                }
            );
        }
        Outcome::Cancelled => {
            ctx.counters.record_error_dropped();
            debug!("funnel {funnel}: error observer abandoned on cancel");
        }
        Outcome::Panicked(message) => {
            warn!("funnel {funnel}: error observer panicked: {message}");
        }
        Outcome::SpawnFailed(e) => {
            ctx.counters.record_error_dropped();
            warn!("funnel {funnel}: could not spawn error observer: {e}");
        }
    }
}

fn error_sink_loop(
    error_rx: Receiver<FunnelError>,
    observer: SharedErrorObserver,
    ctx: Arc<FunnelContext>,
    _guard: LiveGuard,
) {
    let funnel = &ctx.opts.id;
    let mut runner = DeadlineRunner::new(format!("{funnel}-observer"));
    while !ctx.token.is_cancelled() {
        select! {
            recv(ctx.token.done()) -> _ => break,
            recv(error_rx) -> msg => match msg {
                Ok(err) => deliver(err, &mut runner, &observer, &ctx),
                Err(_) => break,
            }
        }
    }
    debug!("funnel {funnel}: error sink exiting");
}

/// Spawn the single error-sink consumer.
pub fn spawn_error_sink(
    error_rx: Receiver<FunnelError>,
    done_tx: &Sender<()>,
    observer: SharedErrorObserver,
    ctx: &Arc<FunnelContext>,
) -> anyhow::Result<JoinHandle<()>> {
    let guard = LiveGuard::enter(&ctx.counters, done_tx.clone());
    let ctx_e = Arc::clone(ctx);
    thread::Builder::new()
        .name(format!("{}-errors", ctx.opts.id))
        .spawn(move || error_sink_loop(error_rx, observer, ctx_e, guard))
        .map_err(|e| anyhow::Error::new(e).context("spawn error sink"))
}
