//! Funnel config and channels: caller-facing config, its resolved form, and the shared
//! state handed to each consumer thread.

use crossbeam_channel::{Receiver, Sender, bounded};
use log::error;
use std::sync::Arc;
use std::sync::atomic::{AtomicU64, Ordering};
use std::time::Duration;

use crate::error::FunnelError;
use crate::types::{
    ErrorObserver, FunnelOpts, HeartbeatObserver, ItemHandler, SharedErrorObserver,
    SharedHandler, SharedHeartbeatObserver,
};
use crate::utils::config::FunnelDefaults;

use super::cancel::CancelToken;
use super::stats::FunnelCounters;

static NEXT_FUNNEL_SEQ: AtomicU64 = AtomicU64::new(1);

fn generate_id() -> String {
    format!(
        "funnel-{}-{}",
        std::process::id(),
        NEXT_FUNNEL_SEQ.fetch_add(1, Ordering::Relaxed)
    )
}

/// Whole milliseconds, rounded up so a non-zero duration never reads as unset. Saturates.
fn duration_ms(d: Duration) -> u64 {
    let ms = u64::try_from(d.as_millis()).unwrap_or(u64::MAX);
    if d > Duration::from_millis(ms) {
        ms.saturating_add(1)
    } else {
        ms
    }
}

/// Everything needed to start a funnel: options plus the caller's callbacks.
pub struct FunnelConfig<T> {
    pub opts: FunnelOpts,
    pub handler: SharedHandler<T>,
    pub error_observer: Option<SharedErrorObserver>,
    pub heartbeat_observer: Option<SharedHeartbeatObserver<T>>,
}

impl<T: Send + 'static> FunnelConfig<T> {
    /// Config with default options and no observers.
    pub fn new(handler: impl ItemHandler<T>) -> Self {
        Self {
            opts: FunnelOpts::default(),
            handler: Arc::new(handler),
            error_observer: None,
            heartbeat_observer: None,
        }
    }

    pub fn with_opts(mut self, opts: FunnelOpts) -> Self {
        self.opts = opts;
        self
    }

    pub fn with_id(mut self, id: impl Into<String>) -> Self {
        self.opts.id = Some(id.into());
        self
    }

    pub fn with_workers(mut self, workers: usize) -> Self {
        self.opts.workers = workers;
        self
    }

    pub fn with_capacity(mut self, capacity: usize) -> Self {
        self.opts.capacity = capacity;
        self
    }

    /// Error queue capacity. Zero follows the item queue capacity.
    pub fn with_error_capacity(mut self, capacity: usize) -> Self {
        self.opts.error_capacity = capacity;
        self
    }

    pub fn with_handler_timeout(mut self, timeout: Duration) -> Self {
        self.opts.handler_timeout_ms = duration_ms(timeout);
        self
    }

    pub fn with_admission_timeout(mut self, timeout: Duration) -> Self {
        self.opts.admission_timeout_ms = duration_ms(timeout);
        self
    }

    pub fn with_heartbeat_interval(mut self, interval: Duration) -> Self {
        self.opts.heartbeat_ms = duration_ms(interval);
        self
    }

    pub fn with_error_observer(mut self, observer: impl ErrorObserver) -> Self {
        self.error_observer = Some(Arc::new(observer));
        self
    }

    pub fn with_heartbeat_observer(mut self, observer: impl HeartbeatObserver<T>) -> Self {
        self.heartbeat_observer = Some(Arc::new(observer));
        self
    }
}

/// Options after defaulting. Every field is usable as-is.
#[derive(Clone, Debug)]
pub struct ResolvedOpts {
    pub id: String,
    pub workers: usize,
    pub capacity: usize,
    pub error_capacity: usize,
    pub handler_timeout: Duration,
    pub admission_timeout: Duration,
    pub heartbeat_interval: Duration,
}

/// Replace zero with the default.
fn or_default<V: PartialEq + Default>(v: V, default: V) -> V {
    if v == V::default() { default } else { v }
}

impl From<&FunnelOpts> for ResolvedOpts {
    fn from(o: &FunnelOpts) -> Self {
        let id = o
            .id
            .as_deref()
            .map(str::trim)
            .filter(|s| !s.is_empty())
            .map(str::to_string)
            .unwrap_or_else(generate_id);
        let capacity = or_default(o.capacity, FunnelDefaults::CAPACITY);
        ResolvedOpts {
            id,
            workers: or_default(o.workers, FunnelDefaults::WORKERS),
            capacity,
            error_capacity: or_default(o.error_capacity, capacity),
            handler_timeout: or_default(o.handler_timeout(), FunnelDefaults::HANDLER_TIMEOUT),
            admission_timeout: or_default(
                o.admission_timeout(),
                FunnelDefaults::ADMISSION_TIMEOUT,
            ),
            heartbeat_interval: or_default(
                o.heartbeat_interval(),
                FunnelDefaults::HEARTBEAT_INTERVAL,
            ),
        }
    }
}

/// Default error observer: log and drop.
pub(crate) fn log_error_observer() -> SharedErrorObserver {
    Arc::new(|err: FunnelError| error!("{}", err))
}

/// Shared state cloned into every consumer thread.
pub struct FunnelContext {
    pub opts: ResolvedOpts,
    pub token: CancelToken,
    pub counters: Arc<FunnelCounters>,
}

/// Channels for one funnel. Lifecycle keeps the senders; consumers get receivers.
/// `done_tx` is cloned into each consumer's live guard; `done_rx` disconnects when all exit.
pub struct FunnelChannels<T> {
    pub item_tx: Sender<T>,
    pub item_rx: Receiver<T>,
    pub error_tx: Sender<FunnelError>,
    pub error_rx: Receiver<FunnelError>,
    pub stop_tx: Sender<()>,
    pub stop_rx: Receiver<()>,
    pub done_tx: Sender<()>,
    pub done_rx: Receiver<()>,
}

pub fn create_funnel_channels<T>(opts: &ResolvedOpts) -> FunnelChannels<T> {
    let (item_tx, item_rx) = bounded::<T>(opts.capacity);
    let (error_tx, error_rx) = bounded::<FunnelError>(opts.error_capacity);
    let (stop_tx, stop_rx) = bounded::<()>(0);
    let (done_tx, done_rx) = bounded::<()>(0);
    FunnelChannels {
        item_tx,
        item_rx,
        error_tx,
        error_rx,
        stop_tx,
        stop_rx,
        done_tx,
        done_rx,
    }
}
