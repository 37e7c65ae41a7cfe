//! Atomic counters shared by producers, workers and the error sink.
//!
//! Outcome counters are relaxed and only eventually consistent. `live` is sequentially
//! consistent; completion itself is signalled through the done channel, not this count.

use std::sync::Arc;
use std::sync::atomic::{AtomicU64, AtomicUsize, Ordering};

use crossbeam_channel::Sender;

#[derive(Debug, Default)]
pub struct FunnelCounters {
    processed: AtomicU64,
    failed: AtomicU64,
    timed_out: AtomicU64,
    panicked: AtomicU64,
    rejected: AtomicU64,
    dropped: AtomicU64,
    errors_dropped: AtomicU64,
    /// Internal consumers currently running (workers, error sink, heartbeat).
    live: AtomicUsize,
}

impl FunnelCounters {
    #[inline]
    pub fn record_processed(&self) {
        self.processed.fetch_add(1, Ordering::Relaxed);
    }

    #[inline]
    pub fn record_failed(&self) {
        self.failed.fetch_add(1, Ordering::Relaxed);
    }

    #[inline]
    pub fn record_timed_out(&self) {
        self.timed_out.fetch_add(1, Ordering::Relaxed);
    }

    #[inline]
    pub fn record_panicked(&self) {
        self.panicked.fetch_add(1, Ordering::Relaxed);
    }

    #[inline]
    pub fn record_rejected(&self) {
        self.rejected.fetch_add(1, Ordering::Relaxed);
    }

    #[inline]
    pub fn record_dropped(&self) {
        self.dropped.fetch_add(1, Ordering::Relaxed);
    }

    pub fn record_dropped_many(&self, n: u64) {
        self.dropped.fetch_add(n, Ordering::Relaxed);
    }

    #[inline]
    pub fn record_error_dropped(&self) {
        self.errors_dropped.fetch_add(1, Ordering::Relaxed);
    }

    pub fn processed(&self) -> u64 {
        self.processed.load(Ordering::Relaxed)
    }

    pub fn failed(&self) -> u64 {
        self.failed.load(Ordering::Relaxed)
    }

    pub fn timed_out(&self) -> u64 {
        self.timed_out.load(Ordering::Relaxed)
    }

    pub fn panicked(&self) -> u64 {
        self.panicked.load(Ordering::Relaxed)
    }

    pub fn rejected(&self) -> u64 {
        self.rejected.load(Ordering::Relaxed)
    }

    pub fn dropped(&self) -> u64 {
        self.dropped.load(Ordering::Relaxed)
    }

    pub fn errors_dropped(&self) -> u64 {
        self.errors_dropped.load(Ordering::Relaxed)
    }

    pub fn live(&self) -> usize {
        self.live.load(Ordering::SeqCst)
    }
}

/// Held by every internal consumer for its whole life. Dropping it (normal exit or unwind)
/// decrements the live count and releases the consumer's completion sender; once every
/// guard is gone the completion channel disconnects.
pub struct LiveGuard {
    counters: Arc<FunnelCounters>,
    _done_tx: Sender<()>,
}

impl LiveGuard {
    pub fn enter(counters: &Arc<FunnelCounters>, done_tx: Sender<()>) -> Self {
        counters.live.fetch_add(1, Ordering::SeqCst);
        Self {
            counters: Arc::clone(counters),
            _done_tx: done_tx,
        }
    }
}

impl Drop for LiveGuard {
    fn drop(&mut self) {
        self.counters.live.fetch_sub(1, Ordering::SeqCst);
    }
}
