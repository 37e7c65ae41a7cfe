use crossbeam_channel::{Receiver, Sender, select, tick};
use log::debug;
use std::thread::{self, JoinHandle};
use std::time::Duration;

use crate::types::SharedHeartbeatObserver;

use super::orchestrator::Funnel;
use super::stats::LiveGuard;

/// Tick every `interval` until the stop signal disconnects or the token fires.
/// The observer runs inline, so a slow observer only delays the next tick.
fn heartbeat_loop<T: Send + 'static>(
    funnel: Funnel<T>,
    stop_rx: Receiver<()>,
    observer: Option<SharedHeartbeatObserver<T>>,
    interval: Duration,
    _guard: LiveGuard,
) {
    let ticker = tick(interval);
    let token = funnel.cancel_token();
    while !token.is_cancelled() {
        select! {
            recv(token.done()) -> _ => break,
            recv(stop_rx) -> _ => break,
            recv(ticker) -> _ => match &observer {
                Some(observer) => observer.beat(&funnel),
                None => debug!("heartbeat: {:?}", funnel.stats()),
            },
        }
    }
    debug!("funnel {}: heartbeat exiting", funnel.id());
}

pub fn spawn_heartbeat<T: Send + 'static>(
    funnel: &Funnel<T>,
    stop_rx: Receiver<()>,
    done_tx: &Sender<()>,
    observer: Option<SharedHeartbeatObserver<T>>,
) -> anyhow::Result<JoinHandle<()>> {
    let guard = LiveGuard::enter(funnel.counters(), done_tx.clone());
    let interval = funnel.heartbeat_interval();
    let funnel_h = funnel.clone();
    thread::Builder::new()
        .name(format!("{}-heartbeat", funnel.id()))
        .spawn(move || heartbeat_loop(funnel_h, stop_rx, observer, interval, guard))
        .map_err(|e| anyhow::Error::new(e).context("spawn heartbeat"))
}
