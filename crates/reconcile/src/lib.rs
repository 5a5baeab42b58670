//! Fluo reconcile: drives list → render → publish → reload on every trigger.

#![forbid(unsafe_code)]

pub mod reconciler;
pub mod reload;
pub mod runner;

pub use reconciler::{Collaborators, CycleReport, Phase, ReloadOutcome, Reconciler};
pub use reload::{HttpReloader, ReloadNotifier, ReloadResponse};
pub use runner::{spawn_controller, Backoff, RETRY_BASE, RETRY_MAX};
