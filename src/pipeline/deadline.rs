//! Run closures on a reusable helper thread and race each call against a scope.

use crossbeam_channel::{Receiver, Sender, bounded, select};
use std::io;
use std::panic::{self, AssertUnwindSafe};
use std::thread;

use crate::error::panic_message;

use super::cancel::Scope;

type Job<R> = Box<dyn FnOnce() -> R + Send>;

/// How a deadline-bound call ended.
pub(crate) enum Outcome<R> {
    Done(R),
    Panicked(String),
    /// Scope deadline passed first. The closure keeps running in the background.
    TimedOut,
    /// Parent token fired first. The closure keeps running in the background.
    Cancelled,
    SpawnFailed(io::Error),
}

struct Helper<R> {
    job_tx: Sender<Job<R>>,
    result_rx: Receiver<thread::Result<R>>,
}

fn spawn_helper<R: Send + 'static>(name: &str) -> io::Result<Helper<R>> {
    let (job_tx, job_rx) = bounded::<Job<R>>(1);
    // Capacity 1 so an abandoned call never blocks on send after we stopped listening.
    let (result_tx, result_rx) = bounded::<thread::Result<R>>(1);
    thread::Builder::new().name(name.to_string()).spawn(move || {
        for job in job_rx {
            let result = panic::catch_unwind(AssertUnwindSafe(job));
            if result_tx.send(result).is_err() {
                break;
            }
        }
    })?;
    Ok(Helper { job_tx, result_rx })
}

/// One execution thread per owner, reused across calls. A call that panics leaves the
/// thread usable; a call that is abandoned (deadline or cancel) takes its thread with it,
/// and the next call starts a fresh one.
pub(crate) struct DeadlineRunner<R> {
    name: String,
    helper: Option<Helper<R>>,
}

impl<R: Send + 'static> DeadlineRunner<R> {
    pub(crate) fn new(name: String) -> Self {
        Self { name, helper: None }
    }

    /// Run `f` on the helper thread and wait for it until `scope` ends.
    pub(crate) fn run<F>(&mut self, scope: &Scope, f: F) -> Outcome<R>
    where
        F: FnOnce() -> R + Send + 'static,
    {
        let helper = match self.helper.take() {
            Some(helper) => helper,
            None => match spawn_helper(&self.name) {
                Ok(helper) => helper,
                Err(e) => return Outcome::SpawnFailed(e),
            },
        };
        if helper.job_tx.send(Box::new(f)).is_err() {
            return Outcome::Panicked("execution thread exited".to_string());
        }

        let deadline = scope.done();
        let outcome = select! {
            recv(helper.result_rx) -> msg => match msg {
                Ok(Ok(r)) => Outcome::Done(r),
                Ok(Err(payload)) => Outcome::Panicked(panic_message(&*payload)),
                Err(_) => return Outcome::Panicked("execution thread exited without a result".to_string()),
            },
            recv(deadline) -> _ => Outcome::TimedOut,
            recv(scope.token_done()) -> _ => Outcome::Cancelled,
        };
        if matches!(outcome, Outcome::Done(_) | Outcome::Panicked(_)) {
            self.helper = Some(helper);
        }
        outcome
    }
}
