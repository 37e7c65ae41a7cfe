//! Public types for the funnel API: options, callbacks, lifecycle state, stats snapshot.

use serde::{Deserialize, Serialize};
use std::sync::Arc;
use std::time::Duration;

use crate::error::FunnelError;
use crate::pipeline::{Funnel, Scope};

/// Plain-data funnel options. Zero / `None` fields are replaced by
/// [`FunnelDefaults`](crate::utils::config::FunnelDefaults) when the funnel starts.
#[derive(Clone, Debug, Default, Deserialize, Serialize)]
#[serde(default)]
pub struct FunnelOpts {
    /// Diagnostic identifier. Generated when `None` or blank.
    pub id: Option<String>,
    /// Concurrent workers.
    pub workers: usize,
    /// Item queue capacity.
    pub capacity: usize,
    /// Error queue capacity. Follows `capacity` when zero.
    pub error_capacity: usize,
    /// Max wait for one handler invocation, in milliseconds.
    pub handler_timeout_ms: u64,
    /// Bound for `add_data`, error observer calls and each shutdown phase, in milliseconds.
    pub admission_timeout_ms: u64,
    /// Heartbeat period in milliseconds.
    pub heartbeat_ms: u64,
}

impl FunnelOpts {
    pub fn handler_timeout(&self) -> Duration {
        Duration::from_millis(self.handler_timeout_ms)
    }

    pub fn admission_timeout(&self) -> Duration {
        Duration::from_millis(self.admission_timeout_ms)
    }

    pub fn heartbeat_interval(&self) -> Duration {
        Duration::from_millis(self.heartbeat_ms)
    }
}

/// Processes one item. Called concurrently from every worker thread.
///
/// `scope` ends when the handler timeout passes or the funnel is force-cancelled.
/// The funnel stops waiting at that point; a handler that ignores it keeps running
/// in the background and its late result is discarded.
pub trait ItemHandler<T>: Send + Sync + 'static {
    fn handle(&self, item: T, scope: &Scope) -> anyhow::Result<()>;
}

impl<T, F> ItemHandler<T> for F
where
    F: Fn(T, &Scope) -> anyhow::Result<()> + Send + Sync + 'static,
{
    fn handle(&self, item: T, scope: &Scope) -> anyhow::Result<()> {
        self(item, scope)
    }
}

/// Receives failures routed through the error sink. Runs under the admission timeout.
pub trait ErrorObserver: Send + Sync + 'static {
    fn observe(&self, error: FunnelError);
}

impl<F> ErrorObserver for F
where
    F: Fn(FunnelError) + Send + Sync + 'static,
{
    fn observe(&self, error: FunnelError) {
        self(error)
    }
}

/// Called on every heartbeat tick with the funnel, for read-only introspection.
pub trait HeartbeatObserver<T>: Send + Sync + 'static {
    fn beat(&self, funnel: &Funnel<T>);
}

impl<T, F> HeartbeatObserver<T> for F
where
    F: Fn(&Funnel<T>) + Send + Sync + 'static,
{
    fn beat(&self, funnel: &Funnel<T>) {
        self(funnel)
    }
}

pub type SharedHandler<T> = Arc<dyn ItemHandler<T>>;
pub type SharedErrorObserver = Arc<dyn ErrorObserver>;
pub type SharedHeartbeatObserver<T> = Arc<dyn HeartbeatObserver<T>>;

/// Lifecycle: `Created → Running → Closing → Closed`. Never moves backwards.
#[derive(Clone, Copy, Debug, PartialEq, Eq, Serialize)]
#[serde(rename_all = "snake_case")]
pub enum FunnelState {
    Created,
    Running,
    Closing,
    Closed,
}

impl FunnelState {
    pub(crate) fn from_u8(v: u8) -> Self {
        match v {
            0 => FunnelState::Created,
            1 => FunnelState::Running,
            2 => FunnelState::Closing,
            _ => FunnelState::Closed,
        }
    }

    pub(crate) fn as_u8(self) -> u8 {
        match self {
            FunnelState::Created => 0,
            FunnelState::Running => 1,
            FunnelState::Closing => 2,
            FunnelState::Closed => 3,
        }
    }
}

/// Point-in-time snapshot of funnel counters. Fields are read independently,
/// so they may not add up exactly while items are in flight.
#[derive(Clone, Debug, Serialize)]
pub struct FunnelStats {
    pub id: String,
    pub state: FunnelState,
    /// Handler invocations that returned `Ok`.
    pub processed: u64,
    /// Handler invocations that returned `Err`.
    pub failed: u64,
    pub timed_out: u64,
    pub panicked: u64,
    /// `add_data` calls refused because the funnel was closed.
    pub rejected: u64,
    /// Items dropped on admission timeout.
    pub dropped: u64,
    /// Errors that never reached the observer (queue full, closing, or observer too slow).
    pub errors_dropped: u64,
    pub live_workers: usize,
    pub pending_items: usize,
    pub pending_errors: usize,
}

impl FunnelStats {
    /// Items that reached a terminal handler outcome.
    pub fn completed(&self) -> u64 {
        self.processed + self.failed + self.timed_out + self.panicked
    }
}
