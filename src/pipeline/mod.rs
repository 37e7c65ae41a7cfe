//! Funnel components: context, cancellation, workers, error sink, heartbeat, lifecycle.

pub mod cancel;
pub mod context;
mod deadline;
pub mod error_handler;
pub mod heartbeat;
pub mod orchestrator;
pub mod stats;
pub mod worker;

pub use cancel::{CancelToken, Scope};
pub use context::{FunnelConfig, FunnelContext, ResolvedOpts, create_funnel_channels};
pub use error_handler::{report_error, spawn_error_sink};
pub use heartbeat::spawn_heartbeat;
pub use orchestrator::{Closer, Funnel};
pub use stats::{FunnelCounters, LiveGuard};
pub use worker::spawn_workers;
