//! The single worker that owns the reconciler: coalesces triggers, ticks the
//! periodic resync and re-queues failed cycles with exponential backoff.

use std::sync::Arc;
use std::time::Duration;

use fluo_core::Trigger;
use tokio::sync::mpsc;
use tokio::task::JoinHandle;
use tokio::time::{Instant, MissedTickBehavior};
use tracing::{debug, info, warn};

use crate::reconciler::Reconciler;

pub const RETRY_BASE: Duration = Duration::from_secs(5);
pub const RETRY_MAX: Duration = Duration::from_secs(300);

#[derive(Debug, Clone)]
pub struct Backoff {
    base: Duration,
    max: Duration,
    failures: u32,
}

impl Backoff {
    pub fn new(base: Duration, max: Duration) -> Self { Self { base, max, failures: 0 } }

    /// 5s → 10s → 20s → … capped at `max`.
    pub fn next_delay(&mut self) -> Duration {
        let factor = 2u32.saturating_pow(self.failures.min(16));
        self.failures = self.failures.saturating_add(1);
        self.base.saturating_mul(factor).min(self.max)
    }

    pub fn failures(&self) -> u32 { self.failures }

    pub fn reset(&mut self) { self.failures = 0; }
}

impl Default for Backoff {
    fn default() -> Self { Self::new(RETRY_BASE, RETRY_MAX) }
}

/// Every trigger rebuilds everything, so pending triggers collapse into one.
/// A resync wins because it also forces a republish.
fn coalesce(pending: Option<Trigger>, next: Trigger) -> Trigger {
    match (pending, next) {
        (Some(Trigger::Resync), _) | (_, Trigger::Resync) => Trigger::Resync,
        (_, next) => next,
    }
}

/// Spawn the worker loop. It stops once every trigger sender is dropped.
/// The first resync tick fires immediately, so a cycle runs at startup.
pub fn spawn_controller(reconciler: Arc<Reconciler>, mut rx: mpsc::Receiver<Trigger>, resync: Duration) -> JoinHandle<()> {
    tokio::spawn(async move {
        let mut ticker = tokio::time::interval(resync);
        ticker.set_missed_tick_behavior(MissedTickBehavior::Delay);
        let mut backoff = Backoff::default();
        let mut retry_at: Option<Instant> = None;
        info!(resync_secs = resync.as_secs(), "controller started");
        loop {
            let mut pending = tokio::select! {
                maybe = rx.recv() => match maybe {
                    Some(t) => Some(t),
                    None => {
                        debug!("trigger channel closed; exiting controller loop");
                        break;
                    }
                },
                _ = ticker.tick() => Some(Trigger::Resync),
                _ = tokio::time::sleep_until(retry_at.unwrap_or_else(Instant::now)), if retry_at.is_some() => {
                    Some(Trigger::Retry)
                }
            };
            while let Ok(t) = rx.try_recv() {
                pending = Some(coalesce(pending, t));
            }
            let Some(trigger) = pending else { continue };
            match reconciler.reconcile(&trigger).await {
                Ok(_) => {
                    backoff.reset();
                    retry_at = None;
                }
                Err(e) => {
                    let delay = backoff.next_delay();
                    retry_at = Some(Instant::now() + delay);
                    warn!(error = %e, retry = backoff.failures(), delay_secs = delay.as_secs(), "cycle failed, will retry");
                }
            }
        }
        info!("controller stopped");
    })
}
