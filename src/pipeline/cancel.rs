//! Cancellation token and deadline scopes.
//!
//! The token is a crossbeam channel that never carries a message: cancelling drops the only
//! sender, so every clone of the receiver becomes disconnected at once. That makes
//! `recv(token.done())` usable inside `select!` next to queue receives.

use crossbeam_channel::{Receiver, Sender, after, bounded, never, select};
use std::sync::atomic::{AtomicBool, Ordering};
use std::sync::{Arc, Mutex};
use std::time::{Duration, Instant};

struct TokenInner {
    tx: Mutex<Option<Sender<()>>>,
    rx: Receiver<()>,
    cancelled: AtomicBool,
}

/// Shared cancel signal. Clones observe the same state.
#[derive(Clone)]
pub struct CancelToken {
    inner: Arc<TokenInner>,
}

impl Default for CancelToken {
    fn default() -> Self {
        Self::new()
    }
}

impl CancelToken {
    /// Fresh root token, not cancelled.
    pub fn new() -> Self {
        let (tx, rx) = bounded::<()>(0);
        Self {
            inner: Arc::new(TokenInner {
                tx: Mutex::new(Some(tx)),
                rx,
                cancelled: AtomicBool::new(false),
            }),
        }
    }

    /// Fire the token. Idempotent.
    pub fn cancel(&self) {
        self.inner.cancelled.store(true, Ordering::SeqCst);
        let mut tx = self
            .inner
            .tx
            .lock()
            .unwrap_or_else(|poisoned| poisoned.into_inner());
        drop(tx.take());
    }

    pub fn is_cancelled(&self) -> bool {
        self.inner.cancelled.load(Ordering::SeqCst)
    }

    /// Receiver that disconnects when the token fires. Never yields a message.
    pub fn done(&self) -> &Receiver<()> {
        &self.inner.rx
    }

    /// Deadline-bound child scope: cancelled when this token fires or `timeout` elapses.
    pub fn scope(&self, timeout: Duration) -> Scope {
        Scope {
            token: self.clone(),
            deadline: Instant::now().checked_add(timeout),
        }
    }

    /// Block until the token fires or `timeout` elapses. Returns true if cancelled.
    pub fn wait_timeout(&self, timeout: Duration) -> bool {
        select! {
            recv(self.done()) -> _ => true,
            recv(after(timeout)) -> _ => self.is_cancelled(),
        }
    }
}

/// Cancellation scope handed to handlers: the funnel's token plus a deadline.
///
/// Handlers that run long should poll [`Scope::is_cancelled`] or sleep through
/// [`Scope::sleep`]; the funnel stops waiting at the deadline but never stops the handler.
#[derive(Clone)]
pub struct Scope {
    token: CancelToken,
    /// `None` when the timeout overflowed `Instant` (effectively no deadline).
    deadline: Option<Instant>,
}

impl Scope {
    /// True once the parent token fired or the deadline passed.
    pub fn is_cancelled(&self) -> bool {
        self.token.is_cancelled() || self.deadline_passed()
    }

    pub fn deadline_passed(&self) -> bool {
        self.deadline.is_some_and(|d| Instant::now() >= d)
    }

    pub fn deadline(&self) -> Option<Instant> {
        self.deadline
    }

    /// Time left before the deadline; `Duration::ZERO` once it passed.
    pub fn remaining(&self) -> Option<Duration> {
        self.deadline
            .map(|d| d.saturating_duration_since(Instant::now()))
    }

    /// Receiver that fires (or disconnects) when the scope ends, for use in `select!`.
    /// Pair it with [`CancelToken::done`] via [`Scope::token_done`] to also catch the parent.
    pub fn done(&self) -> Receiver<Instant> {
        match self.remaining() {
            Some(left) => after(left),
            None => never(),
        }
    }

    pub fn token_done(&self) -> &Receiver<()> {
        self.token.done()
    }

    /// Cooperative sleep. Returns false if the scope ended before `d` elapsed.
    pub fn sleep(&self, d: Duration) -> bool {
        if self.is_cancelled() {
            return false;
        }
        let deadline = self.done();
        select! {
            recv(self.token.done()) -> _ => false,
            recv(deadline) -> _ => false,
            recv(after(d)) -> _ => !self.is_cancelled(),
        }
    }

    /// Block until the scope ends.
    pub fn wait(&self) {
        let deadline = self.done();
        select! {
            recv(self.token.done()) -> _ => {},
            recv(deadline) -> _ => {},
        }
    }
}
