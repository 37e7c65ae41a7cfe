//! Funnel error types
//!
//! Every failure the funnel can observe. Per-item variants are delivered to the error
//! observer; the rest are only logged.

use std::time::Duration;

use thiserror::Error;

/// Funnel errors
#[derive(Debug, Error)]
pub enum FunnelError {
    /// The handler returned an error for an item
    #[error("funnel {funnel}: worker {worker}: handler failed: {error:#}")]
    Handler {
        funnel: String,
        worker: usize,
        error: anyhow::Error,
    },

    /// The handler did not finish within the handler timeout
    #[error("funnel {funnel}: worker {worker}: handler timed out after {timeout:?}")]
    HandlerTimeout {
        funnel: String,
        worker: usize,
        timeout: Duration,
    },

    /// The handler panicked; `message` is the panic payload when it was a string
    #[error("funnel {funnel}: worker {worker}: handler panicked: {message}")]
    HandlerPanic {
        funnel: String,
        worker: usize,
        message: String,
    },

    /// `add_data` could not enqueue within the admission timeout; the item was dropped
    #[error("funnel {funnel}: queue full after {timeout:?}, item dropped")]
    AdmissionOverflow { funnel: String, timeout: Duration },

    /// An observer did not return in time; the notification was dropped
    #[error("funnel {funnel}: {observer} observer timed out after {timeout:?}")]
    ObserverTimeout {
        funnel: String,
        observer: &'static str,
        timeout: Duration,
    },

    /// Graceful drain did not finish in time; consumers were cancelled
    #[error("funnel {funnel}: shutdown timed out after {timeout:?} with {live} consumers live")]
    ShutdownTimeout {
        funnel: String,
        timeout: Duration,
        live: usize,
    },
}

impl FunnelError {
    /// True for errors raised by a handler invocation (failure, timeout, panic).
    pub fn is_handler_error(&self) -> bool {
        matches!(
            self,
            FunnelError::Handler { .. }
                | FunnelError::HandlerTimeout { .. }
                | FunnelError::HandlerPanic { .. }
        )
    }

    /// Short kind label for logs and counters.
    pub fn kind(&self) -> &'static str {
        match self {
            FunnelError::Handler { .. } => "handler",
            FunnelError::HandlerTimeout { .. } => "handler_timeout",
            FunnelError::HandlerPanic { .. } => "handler_panic",
            FunnelError::AdmissionOverflow { .. } => "admission_overflow",
            FunnelError::ObserverTimeout { .. } => "observer_timeout",
            FunnelError::ShutdownTimeout { .. } => "shutdown_timeout",
        }
    }
}

/// Render a panic payload as text. Non-string payloads get a fixed label.
pub(crate) fn panic_message(payload: &(dyn std::any::Any + Send)) -> String {
    if let Some(s) = payload.downcast_ref::<&str>() {
        (*s).to_string()
    } else if let Some(s) = payload.downcast_ref::<String>() {
        s.clone()
    } else {
        "non-string panic payload".to_string()
    }
}
