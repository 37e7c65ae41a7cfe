//! Funnel: bounded-queue worker pool with per-item timeout, error sink, heartbeat and
//! two-phase shutdown.

pub mod engine;
pub mod error;
pub mod pipeline;
pub mod types;
pub mod utils;

/// Re-export types for API
pub use error::FunnelError;
pub use pipeline::{CancelToken, Closer, Funnel, FunnelConfig, Scope};
pub use types::*;

/// Result alias used by public funnel API
pub use anyhow::Error;
pub type Result<T> = std::result::Result<T, Error>;

/// Single entry point: start a funnel from `config` and return it with its close function.
///
/// - Items: [`Funnel::add_data`]; fire-and-forget, blocks at most the admission timeout.
/// - Failures: only through the error observer (default: logged).
/// - Shutdown: [`Closer::close`]; idempotent, bounded by two admission timeouts.
///
/// ```ignore
/// let config = funnel::FunnelConfig::new(|n: u64, _scope: &funnel::Scope| {
///     println!("{n}");
///     Ok(())
/// })
/// .with_workers(4);
/// let (f, closer) = funnel::start_funnel(config)?;
/// for n in 0..100 {
///     f.add_data(n);
/// }
/// closer.close();
/// ```
pub fn start_funnel<T: Send + 'static>(config: FunnelConfig<T>) -> Result<(Funnel<T>, Closer<T>)> {
    Funnel::new(config)
}
