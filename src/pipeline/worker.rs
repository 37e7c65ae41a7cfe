use crossbeam_channel::{Receiver, Sender, select};
use log::{debug, warn};
use std::panic::{self, AssertUnwindSafe};
use std::sync::Arc;
use std::thread::{self, JoinHandle};

use crate::error::{FunnelError, panic_message};
use crate::types::SharedHandler;

use super::context::FunnelContext;
use super::deadline::{DeadlineRunner, Outcome};
use super::error_handler::report_error;
use super::stats::LiveGuard;

/// Single worker: pull items until the stop signal fires and the queue is drained, or the
/// token fires. Any panic escaping `process_item` is turned into a panic error and the loop
/// continues.
fn worker_loop<T: Send + 'static>(
    worker: usize,
    item_rx: Receiver<T>,
    stop_rx: Receiver<()>,
    error_tx: Sender<FunnelError>,
    handler: SharedHandler<T>,
    ctx: Arc<FunnelContext>,
    _guard: LiveGuard,
) {
    let id = &ctx.opts.id;
    let mut runner = DeadlineRunner::new(format!("{id}-handler-{worker}"));
    while !ctx.token.is_cancelled() {
        select! {
            recv(ctx.token.done()) -> _ => {
                debug!("funnel {id}: worker {worker} cancelled");
                break;
            }
            recv(stop_rx) -> _ => {
                while !ctx.token.is_cancelled() {
                    match item_rx.try_recv() {
                        Ok(item) => handle_item(worker, item, &mut runner, &handler, &ctx, &error_tx),
                        Err(_) => break,
                    }
                }
                debug!("funnel {id}: worker {worker} drained, exiting");
                break;
            }
            recv(item_rx) -> msg => match msg {
                Ok(item) => handle_item(worker, item, &mut runner, &handler, &ctx, &error_tx),
                Err(_) => break,
            }
        }
    }
}

fn handle_item<T: Send + 'static>(
    worker: usize,
    item: T,
    runner: &mut DeadlineRunner<anyhow::Result<()>>,
    handler: &SharedHandler<T>,
    ctx: &FunnelContext,
    error_tx: &Sender<FunnelError>,
) {
    let failure = panic::catch_unwind(AssertUnwindSafe(|| {
        process_item(worker, item, runner, handler, ctx)
    }))
    .unwrap_or_else(|payload| {
        ctx.counters.record_panicked();
        Some(FunnelError::HandlerPanic {
            funnel: ctx.opts.id.clone(),
            worker,
            message: panic_message(&*payload),
        })
    });
    if let Some(err) = failure {
        report_error(error_tx, err, &ctx.counters);
    }
}

/// Run the handler for one item on the worker's runner under a `handler_timeout` scope.
/// Returns the error to route to the sink, if any; counters are updated here.
fn process_item<T: Send + 'static>(
    worker: usize,
    item: T,
    runner: &mut DeadlineRunner<anyhow::Result<()>>,
    handler: &SharedHandler<T>,
    ctx: &FunnelContext,
) -> Option<FunnelError> {
    let funnel = ctx.opts.id.clone();
    let timeout = ctx.opts.handler_timeout;
    let scope = ctx.token.scope(timeout);
    let handler = Arc::clone(handler);
    let handler_scope = scope.clone();
    let outcome = runner.run(&scope, move || handler.handle(item, &handler_scope));

    match outcome {
        Outcome::Done(Ok(())) => {
            ctx.counters.record_processed();
            None
        }
        Outcome::Done(Err(error)) => {
            ctx.counters.record_failed();
            Some(FunnelError::Handler {
                funnel,
                worker,
                error,
            })
        }
        Outcome::Panicked(message) => {
            ctx.counters.record_panicked();
            Some(FunnelError::HandlerPanic {
                funnel,
                worker,
                message,
            })
        }
        Outcome::TimedOut => {
            ctx.counters.record_timed_out();
            Some(FunnelError::HandlerTimeout {
                funnel,
                worker,
                timeout,
            })
        }
        Outcome::Cancelled => {
            // Forced shutdown: the attempt is abandoned like a timeout.
            warn!("funnel {funnel}: worker {worker} abandoned a running handler on cancel");
            ctx.counters.record_timed_out();
            Some(FunnelError::HandlerTimeout {
                funnel,
                worker,
                timeout,
            })
        }
        Outcome::SpawnFailed(e) => {
            ctx.counters.record_failed();
            Some(FunnelError::Handler {
                funnel,
                worker,
                error: anyhow::Error::new(e).context("spawn handler thread"),
            })
        }
    }
}

/// Spawn `ctx.opts.workers` workers reading from `item_rx` until `stop_rx` disconnects.
/// Each worker takes a live guard (built here, before the thread starts) holding a clone
/// of `done_tx`.
pub fn spawn_workers<T: Send + 'static>(
    item_rx: &Receiver<T>,
    stop_rx: &Receiver<()>,
    error_tx: &Sender<FunnelError>,
    done_tx: &Sender<()>,
    handler: &SharedHandler<T>,
    ctx: &Arc<FunnelContext>,
) -> anyhow::Result<Vec<JoinHandle<()>>> {
    (0..ctx.opts.workers)
        .map(|worker| {
            let item_rx = item_rx.clone();
            let stop_rx = stop_rx.clone();
            let error_tx = error_tx.clone();
            let handler = Arc::clone(handler);
            let ctx_w = Arc::clone(ctx);
            let guard = LiveGuard::enter(&ctx.counters, done_tx.clone());
            thread::Builder::new()
                .name(format!("{}-worker-{worker}", ctx.opts.id))
                .spawn(move || worker_loop(worker, item_rx, stop_rx, error_tx, handler, ctx_w, guard))
                .map_err(|e| anyhow::Error::new(e).context(format!("spawn worker {worker}")))
        })
        .collect()
}
