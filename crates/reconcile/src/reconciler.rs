//! One reconciliation cycle: list → render → publish → notify.

use std::sync::Arc;
use std::time::Instant;

use arc_swap::ArcSwapOption;
use fluo_core::{ConfigSink, FluoError, OperatorConfig, OutputSource, Result, SecretStore, Trigger};
use fluo_render::Assembler;
use metrics::{counter, histogram};
use serde::{Deserialize, Serialize};
use tokio::sync::watch;
use tracing::{debug, info, instrument, warn};

use crate::reload::ReloadNotifier;

#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
pub enum Phase {
    Idle,
    Listing,
    Rendering,
    Publishing,
    Notifying,
    /// The cycle failed; the error has been handed back to the caller.
    Error,
}

#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub enum ReloadOutcome {
    Reloaded { status: u16 },
    /// Logged only; the document is published regardless.
    Failed(String),
    /// Nothing new was published, so nothing to reload.
    Skipped,
}

#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct CycleReport {
    pub outputs: usize,
    pub bytes: usize,
    pub published: bool,
    pub reload: ReloadOutcome,
}

/// External collaborators of the reconciler.
#[derive(Clone)]
pub struct Collaborators {
    pub outputs: Arc<dyn OutputSource>,
    pub secrets: Arc<dyn SecretStore>,
    pub sink: Arc<dyn ConfigSink>,
    pub notifier: Arc<dyn ReloadNotifier>,
}

pub struct Reconciler {
    cfg: Arc<OperatorConfig>,
    deps: Collaborators,
    assembler: Assembler,
    /// Last document that was both published and acknowledged by the daemon.
    last_applied: ArcSwapOption<Vec<u8>>,
    phase_tx: watch::Sender<Phase>,
}

impl Reconciler {
    pub fn new(cfg: Arc<OperatorConfig>, deps: Collaborators) -> Self {
        let assembler = Assembler::new(Arc::clone(&cfg));
        let (phase_tx, _) = watch::channel(Phase::Idle);
        Self { cfg, deps, assembler, last_applied: ArcSwapOption::empty(), phase_tx }
    }

    pub fn config(&self) -> &OperatorConfig { &self.cfg }

    pub fn phase(&self) -> Phase { *self.phase_tx.borrow() }

    pub fn subscribe_phase(&self) -> watch::Receiver<Phase> { self.phase_tx.subscribe() }

    fn enter(&self, phase: Phase) {
        self.phase_tx.send_replace(phase);
        debug!(?phase, "phase");
    }

    /// Run a full cycle. Errors before the document is published abort the cycle
    /// and are returned for retry; a failed reload is only logged.
    #[instrument(skip_all, fields(trigger = ?trigger))]
    pub async fn reconcile(&self, trigger: &Trigger) -> Result<CycleReport> {
        let t0 = Instant::now();
        counter!("fluo_reconcile_total", 1u64);
        // A resync always republishes, repairing out-of-band edits of the config object.
        // The daemon is only reloaded when the document differs from what it last accepted.
        let force = matches!(trigger, Trigger::Resync);
        let res = self.cycle(force).await;
        histogram!("fluo_reconcile_latency_ms", t0.elapsed().as_secs_f64() * 1000.0);
        match &res {
            Ok(r) => info!(outputs = r.outputs, bytes = r.bytes, published = r.published, reload = ?r.reload, "reconciled"),
            Err(e) => {
                counter!("fluo_reconcile_errors_total", 1u64);
                self.enter(Phase::Error);
                warn!(error = %e, transient = e.is_transient(), "reconcile failed");
            }
        }
        self.enter(Phase::Idle);
        res
    }

    async fn cycle(&self, force: bool) -> Result<CycleReport> {
        self.enter(Phase::Listing);
        let outputs = self.deps.outputs.list_outputs().await.map_err(FluoError::List)?;

        self.enter(Phase::Rendering);
        let doc = self.assembler.assemble(&outputs, self.deps.secrets.as_ref()).await?;
        let mut report = CycleReport { outputs: outputs.len(), bytes: doc.len(), published: false, reload: ReloadOutcome::Skipped };

        let unchanged = self.unchanged(doc.as_bytes());
        if unchanged && !force {
            counter!("fluo_publish_skipped_total", 1u64);
            debug!("document unchanged; skipping publish");
            return Ok(report);
        }

        self.enter(Phase::Publishing);
        let target = self.cfg.config_target();
        if !unchanged {
            self.last_applied.store(None);
        }
        self.deps
            .sink
            .ensure_config(&target, doc.as_bytes())
            .await
            .map_err(|source| FluoError::Publish { target: target.to_string(), source })?;
        counter!("fluo_publish_total", 1u64);
        report.published = true;
        if unchanged {
            // the daemon already runs these bytes; only the stored object was repaired
            debug!("document unchanged; republished without reload");
            return Ok(report);
        }

        self.enter(Phase::Notifying);
        report.reload = match self.deps.notifier.reload().await {
            Ok(resp) => {
                counter!("fluo_reload_ok_total", 1u64);
                self.last_applied.store(Some(Arc::new(doc.as_bytes().to_vec())));
                ReloadOutcome::Reloaded { status: resp.status }
            }
            Err(e) => {
                counter!("fluo_reload_err_total", 1u64);
                warn!(error = %e, "reload failed; daemon will pick the document up on its next restart");
                ReloadOutcome::Failed(e.to_string())
            }
        };
        Ok(report)
    }

    fn unchanged(&self, doc: &[u8]) -> bool {
        self.last_applied.load().as_deref().map(|prev| prev.as_slice() == doc).unwrap_or(false)
    }
}
