use anyhow::Result;
use prometheus::{Encoder, IntCounter, IntCounterVec, Opts, Registry, TextEncoder};
use std::sync::Arc;

/// Prometheus collectors for block synchronization.
#[derive(Clone)]
pub struct SyncMetrics {
    registry: Registry,
    // Synchronizer
    sync_runs: IntCounterVec,
    sync_runs_rejected: IntCounter,
    // Startup recovery
    recovery_rollbacks: IntCounter,
    recovery_replayed_blocks: IntCounter,
    // Pending transactions
    pending_transactions: IntCounterVec,
}

impl SyncMetrics {
    pub fn new() -> Result<Self> {
        Self::with_registry(Registry::new())
    }

    /// Register the sync collectors into an existing registry.
    pub fn with_registry(registry: Registry) -> Result<Self> {
        let sync_runs = IntCounterVec::new(
            Opts::new("sync_runs_total", "Total number of completed synchronizer runs"),
            &["mechanism", "result"],
        )?;
        registry.register(Box::new(sync_runs.clone()))?;

        let sync_runs_rejected = IntCounter::with_opts(Opts::new(
            "sync_runs_rejected_total",
            "Runs rejected because the synchronizer was already active",
        ))?;
        registry.register(Box::new(sync_runs_rejected.clone()))?;

        let recovery_rollbacks = IntCounter::with_opts(Opts::new(
            "sync_recovery_rollbacks_total",
            "Blocks deleted from the canonical chain during startup recovery",
        ))?;
        registry.register(Box::new(recovery_rollbacks.clone()))?;

        let recovery_replayed_blocks = IntCounter::with_opts(Opts::new(
            "sync_recovery_replayed_blocks_total",
            "Temporary blocks replayed onto the canonical chain during startup recovery",
        ))?;
        registry.register(Box::new(recovery_replayed_blocks.clone()))?;

        let pending_transactions = IntCounterVec::new(
            Opts::new(
                "sync_pending_transactions_total",
                "Pending transactions fetched from peers, by pool verdict",
            ),
            &["result"],
        )?;
        registry.register(Box::new(pending_transactions.clone()))?;

        Ok(Self {
            registry,
            sync_runs,
            sync_runs_rejected,
            recovery_rollbacks,
            recovery_replayed_blocks,
            pending_transactions,
        })
    }

    pub fn registry(&self) -> &Registry {
        &self.registry
    }

    pub fn gather(&self) -> Result<String> {
        let metric_families = self.registry.gather();
        let mut buffer = Vec::<u8>::new();
        TextEncoder::new().encode(&metric_families, &mut buffer)?;
        Ok(String::from_utf8(buffer)?)
    }

    pub fn inc_sync_run(&self, mechanism: &str, result: &str) {
        self.sync_runs.with_label_values(&[mechanism, result]).inc();
    }

    pub fn inc_sync_run_rejected(&self) {
        self.sync_runs_rejected.inc();
    }

    pub fn inc_recovery_rollbacks(&self, count: u64) {
        self.recovery_rollbacks.inc_by(count);
    }

    pub fn inc_recovery_replayed_blocks(&self, count: u64) {
        self.recovery_replayed_blocks.inc_by(count);
    }

    pub fn inc_pending_transactions(&self, result: &str, count: u64) {
        self.pending_transactions.with_label_values(&[result]).inc_by(count);
    }
}

pub type SharedMetrics = Arc<SyncMetrics>;
