//! Lifecycle controller: construction, admission, accessors and two-phase shutdown.

use anyhow::Result;
use crossbeam_channel::{Receiver, RecvTimeoutError, Sender, select};
use log::{debug, info, warn};
use std::sync::atomic::{AtomicBool, AtomicU8, Ordering};
use std::sync::{Arc, Mutex, MutexGuard};
use std::time::Duration;

use crate::error::FunnelError;
use crate::types::{FunnelState, FunnelStats};

use super::cancel::CancelToken;
use super::context::{
    FunnelConfig, FunnelContext, ResolvedOpts, create_funnel_channels, log_error_observer,
};
use super::error_handler::{report_error, spawn_error_sink};
use super::heartbeat::spawn_heartbeat;
use super::stats::FunnelCounters;
use super::worker::spawn_workers;

/// Lock that shrugs off poisoning: the guarded values are plain senders.
/// Only close and the admission-overflow path take these locks.
fn lock<V>(m: &Mutex<V>) -> MutexGuard<'_, V> {
    m.lock().unwrap_or_else(|poisoned| poisoned.into_inner())
}

struct FunnelInner<T> {
    ctx: Arc<FunnelContext>,
    /// Lives as long as the funnel; workers stop on `stop_tx` instead of on disconnect.
    item_tx: Sender<T>,
    error_tx: Mutex<Option<Sender<FunnelError>>>,
    /// Dropped by close: workers drain the queue and exit, the heartbeat exits.
    stop_tx: Mutex<Option<Sender<()>>>,
    /// For `len()` and the post-shutdown sweep.
    item_rx: Receiver<T>,
    error_rx: Receiver<FunnelError>,
    /// Disconnects once every consumer's live guard is dropped.
    done_rx: Receiver<()>,
    closed: AtomicBool,
    state: AtomicU8,
}

/// Handle to a running funnel. Cheap to clone; all clones drive the same pipeline.
///
/// Items go in through [`Funnel::add_data`] and are processed by the worker pool.
/// Failures only surface through the error observer. Call [`Funnel::close`] (or
/// [`Closer::close`]) to shut down; dropping handles does not stop the consumers.
pub struct Funnel<T> {
    inner: Arc<FunnelInner<T>>,
}

impl<T> Clone for Funnel<T> {
    fn clone(&self) -> Self {
        Self {
            inner: Arc::clone(&self.inner),
        }
    }
}

/// Close function returned alongside the funnel by [`Funnel::new`].
pub struct Closer<T> {
    funnel: Funnel<T>,
}

impl<T: Send + 'static> Closer<T> {
    /// Same as [`Funnel::close`].
    pub fn close(&self) {
        self.funnel.close();
    }
}

impl<T> Clone for Closer<T> {
    fn clone(&self) -> Self {
        Self {
            funnel: self.funnel.clone(),
        }
    }
}

impl<T: Send + 'static> Funnel<T> {
    /// Resolve defaults, create queues and token, and start every consumer.
    ///
    /// Returns only after all workers, the error sink and the heartbeat are running.
    /// Defaulting is total, so the only failure today is the OS refusing a thread.
    pub fn new(config: FunnelConfig<T>) -> Result<(Funnel<T>, Closer<T>)> {
        let FunnelConfig {
            opts,
            handler,
            error_observer,
            heartbeat_observer,
        } = config;
        let opts = ResolvedOpts::from(&opts);
        debug!(
            "{} CONFIG:{:#?}",
            env!("CARGO_PKG_NAME").to_string().to_uppercase(),
            opts
        );

        let channels = create_funnel_channels::<T>(&opts);
        let ctx = Arc::new(FunnelContext {
            opts,
            token: CancelToken::new(),
            counters: Arc::new(FunnelCounters::default()),
        });
        let funnel = Funnel {
            inner: Arc::new(FunnelInner {
                ctx: Arc::clone(&ctx),
                item_tx: channels.item_tx,
                error_tx: Mutex::new(Some(channels.error_tx.clone())),
                stop_tx: Mutex::new(Some(channels.stop_tx)),
                item_rx: channels.item_rx.clone(),
                error_rx: channels.error_rx.clone(),
                done_rx: channels.done_rx,
                closed: AtomicBool::new(false),
                state: AtomicU8::new(FunnelState::Created.as_u8()),
            }),
        };

        let started = spawn_workers(
            &channels.item_rx,
            &channels.stop_rx,
            &channels.error_tx,
            &channels.done_tx,
            &handler,
            &ctx,
        )
        .and_then(|_| {
            spawn_error_sink(
                channels.error_rx,
                &channels.done_tx,
                error_observer.unwrap_or_else(log_error_observer),
                &ctx,
            )
        })
        .and_then(|_| {
            spawn_heartbeat(
                &funnel,
                channels.stop_rx,
                &channels.done_tx,
                heartbeat_observer,
            )
        });
        // Consumers own the remaining done senders through their guards.
        drop(channels.done_tx);
        drop(channels.error_tx);

        if let Err(e) = started {
            ctx.token.cancel();
            funnel.close();
            return Err(e);
        }

        funnel.set_state(FunnelState::Running);
        debug!(
            "funnel {}: started {} workers",
            funnel.id(),
            funnel.worker_count()
        );
        let closer = Closer {
            funnel: funnel.clone(),
        };
        Ok((funnel, closer))
    }

    /// Submit one item. Never reports failure to the caller.
    ///
    /// Rejected outright once closed. Otherwise blocks up to the admission timeout while
    /// the queue is full; on timeout the item is dropped and an admission-overflow error
    /// goes to the error sink.
    pub fn add_data(&self, item: T) {
        let ctx = &self.inner.ctx;
        if self.is_closed() {
            ctx.counters.record_rejected();
            warn!("funnel {}: closed, rejecting item", ctx.opts.id);
            return;
        }
        let timeout = ctx.opts.admission_timeout;
        select! {
            send(self.inner.item_tx, item) -> res => {
                if res.is_err() {
                    ctx.counters.record_rejected();
                    warn!("funnel {}: item queue disconnected, rejecting item", ctx.opts.id);
                }
            }
            recv(ctx.token.done()) -> _ => {
                ctx.counters.record_dropped();
                debug!("funnel {}: cancelled while admitting, item dropped", ctx.opts.id);
            }
            default(timeout) => {
                ctx.counters.record_dropped();
                let err = FunnelError::AdmissionOverflow {
                    funnel: ctx.opts.id.clone(),
                    timeout,
                };
                match lock(&self.inner.error_tx).clone() {
                    Some(error_tx) => report_error(&error_tx, err, &ctx.counters),
                    None => {
                        ctx.counters.record_error_dropped();
                        warn!("{}", err);
                    }
                }
            }
        }
    }

    /// Two-phase shutdown. The first call stops admission, tells the workers to drain the
    /// queue and the heartbeat to stop, and closes the error queue. It waits up to the
    /// admission timeout for consumers to exit, then cancels the token and waits one more
    /// admission timeout. Items still queued after that are counted as dropped. Later calls
    /// log a warning and return immediately.
    ///
    /// Whether the drain completed is only visible in logs and [`Funnel::live_worker_count`].
    pub fn close(&self) {
        let inner = &self.inner;
        let id = &inner.ctx.opts.id;
        if inner
            .closed
            .compare_exchange(false, true, Ordering::SeqCst, Ordering::SeqCst)
            .is_err()
        {
            warn!("funnel {id}: close called more than once");
            return;
        }
        self.set_state(FunnelState::Closing);
        info!("funnel {id}: closing");

        drop(lock(&inner.stop_tx).take());
        drop(lock(&inner.error_tx).take());

        let timeout = inner.ctx.opts.admission_timeout;
        if self.wait_for_consumers(timeout) {
            info!(
                "funnel {id}: drained; processed {} items",
                self.processed_count()
            );
        } else {
            warn!(
                "{}",
                FunnelError::ShutdownTimeout {
                    funnel: id.clone(),
                    timeout,
                    live: self.live_worker_count(),
                }
            );
            inner.ctx.token.cancel();
            if self.wait_for_consumers(timeout) {
                info!("funnel {id}: forced shutdown complete");
            } else {
                warn!(
                    "funnel {id}: {} consumers still live after forced shutdown",
                    self.live_worker_count()
                );
            }
        }
        // Abandoned handlers still holding a scope see cancellation from here on.
        inner.ctx.token.cancel();
        let stranded = inner.item_rx.try_iter().count();
        if stranded > 0 {
            inner.ctx.counters.record_dropped_many(stranded as u64);
            warn!("funnel {id}: {stranded} queued items dropped at shutdown");
        }
        self.set_state(FunnelState::Closed);
    }

    /// True once every consumer exited, false if `timeout` passed first.
    fn wait_for_consumers(&self, timeout: Duration) -> bool {
        matches!(
            self.inner.done_rx.recv_timeout(timeout),
            Err(RecvTimeoutError::Disconnected)
        )
    }
}

impl<T> Funnel<T> {
    fn set_state(&self, state: FunnelState) {
        self.inner.state.store(state.as_u8(), Ordering::SeqCst);
    }

    pub(crate) fn cancel_token(&self) -> &CancelToken {
        &self.inner.ctx.token
    }

    pub(crate) fn counters(&self) -> &Arc<FunnelCounters> {
        &self.inner.ctx.counters
    }

    pub fn id(&self) -> &str {
        &self.inner.ctx.opts.id
    }

    pub fn state(&self) -> FunnelState {
        FunnelState::from_u8(self.inner.state.load(Ordering::SeqCst))
    }

    pub fn is_closed(&self) -> bool {
        self.inner.closed.load(Ordering::SeqCst)
    }

    /// Handler invocations that completed successfully.
    pub fn processed_count(&self) -> u64 {
        self.inner.ctx.counters.processed()
    }

    /// Consumers still running (workers, error sink, heartbeat). A momentary snapshot.
    pub fn live_worker_count(&self) -> usize {
        self.inner.ctx.counters.live()
    }

    /// Items waiting in the queue. Approximate under concurrency.
    pub fn pending_item_count(&self) -> usize {
        self.inner.item_rx.len()
    }

    /// Errors waiting for the observer. Approximate under concurrency.
    pub fn pending_error_count(&self) -> usize {
        self.inner.error_rx.len()
    }

    pub fn worker_count(&self) -> usize {
        self.inner.ctx.opts.workers
    }

    pub fn capacity(&self) -> usize {
        self.inner.ctx.opts.capacity
    }

    pub fn handler_timeout(&self) -> Duration {
        self.inner.ctx.opts.handler_timeout
    }

    pub fn admission_timeout(&self) -> Duration {
        self.inner.ctx.opts.admission_timeout
    }

    pub fn heartbeat_interval(&self) -> Duration {
        self.inner.ctx.opts.heartbeat_interval
    }

    pub fn stats(&self) -> FunnelStats {
        let counters = &self.inner.ctx.counters;
        FunnelStats {
            id: self.id().to_string(),
            state: self.state(),
            processed: counters.processed(),
            failed: counters.failed(),
            timed_out: counters.timed_out(),
            panicked: counters.panicked(),
            rejected: counters.rejected(),
            dropped: counters.dropped(),
            errors_dropped: counters.errors_dropped(),
            live_workers: counters.live(),
            pending_items: self.pending_item_count(),
            pending_errors: self.pending_error_count(),
        }
    }
}
