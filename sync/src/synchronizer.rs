use containers::{Block, RawBlock};
use fork_choice::{ConsensusOracle, PrevotedHeightOracle};
use libp2p_identity::PeerId;
use metrics::SharedMetrics;
/// Synchronizer coordinating block synchronization.
///
/// The Synchronizer is the entry point for every block that does not simply extend
/// the local tip. It:
/// 1. Reconciles the temporary block table once at startup (StartupRecovery)
/// 2. Picks the first registered Mechanism that applies to a received block
/// 3. Runs it under the RunGuard so that at most one sync happens at a time
/// 4. Loads pending transactions from the network when the node comes online
use std::sync::Arc;
use tokio::sync::OnceCell;
use tracing::{debug, error, info, warn};

use crate::{
    config::SyncConfig,
    error::SyncError,
    mechanism::{Mechanism, MechanismDefinition},
    recovery::{RecoveryOutcome, StartupRecovery},
    schema::ValidationErrors,
    states::RunGuard,
    transactions::{fetch_pending_transactions, PendingTransactionsReport},
    types::{ChainDataAccess, NetworkChannel, Processor, TransactionPool},
};

enum MechanismEntry {
    Static(Arc<dyn Mechanism>),
    Definition(MechanismDefinition),
}

/// Wires collaborators and the ordered mechanism list into a [`Synchronizer`].
pub struct SynchronizerBuilder {
    processor: Arc<dyn Processor>,
    chain: Arc<dyn ChainDataAccess>,
    channel: Arc<dyn NetworkChannel>,
    pool: Arc<dyn TransactionPool>,
    oracle: Arc<dyn ConsensusOracle>,
    config: SyncConfig,
    metrics: Option<SharedMetrics>,
    mechanisms: Vec<MechanismEntry>,
}

impl SynchronizerBuilder {
    pub fn new(
        processor: Arc<dyn Processor>,
        chain: Arc<dyn ChainDataAccess>,
        channel: Arc<dyn NetworkChannel>,
        pool: Arc<dyn TransactionPool>,
    ) -> Self {
        Self {
            processor,
            chain,
            channel,
            pool,
            oracle: Arc::new(PrevotedHeightOracle),
            config: SyncConfig::default(),
            metrics: None,
            mechanisms: Vec::new(),
        }
    }

    /// Replace the default [`PrevotedHeightOracle`].
    pub fn oracle(mut self, oracle: Arc<dyn ConsensusOracle>) -> Self {
        self.oracle = oracle;
        self
    }

    pub fn config(mut self, config: SyncConfig) -> Self {
        self.config = config;
        self
    }

    pub fn metrics(mut self, metrics: SharedMetrics) -> Self {
        self.metrics = Some(metrics);
        self
    }

    /// Register a mechanism. Registration order is selection order.
    pub fn mechanism(mut self, mechanism: Arc<dyn Mechanism>) -> Self {
        self.mechanisms.push(MechanismEntry::Static(mechanism));
        self
    }

    /// Register a runtime-assembled mechanism, checked by [`Self::build`].
    pub fn mechanism_definition(mut self, definition: MechanismDefinition) -> Self {
        self.mechanisms.push(MechanismEntry::Definition(definition));
        self
    }

    pub fn build(self) -> Result<Synchronizer, SyncError> {
        let mut mechanisms: Vec<Arc<dyn Mechanism>> = Vec::with_capacity(self.mechanisms.len());
        for entry in self.mechanisms {
            match entry {
                MechanismEntry::Static(mechanism) => mechanisms.push(mechanism),
                MechanismEntry::Definition(definition) => {
                    mechanisms.push(Arc::new(definition.build()?))
                }
            }
        }

        let names: Vec<&str> = mechanisms.iter().map(|m| m.name()).collect();
        debug!(mechanisms = ?names, "Synchronizer built");

        Ok(Synchronizer {
            processor: self.processor,
            chain: self.chain,
            channel: self.channel,
            pool: self.pool,
            oracle: self.oracle,
            config: self.config,
            metrics: self.metrics,
            mechanisms,
            guard: RunGuard::new(),
            recovered: OnceCell::new(),
        })
    }
}

pub struct Synchronizer {
    processor: Arc<dyn Processor>,
    chain: Arc<dyn ChainDataAccess>,
    channel: Arc<dyn NetworkChannel>,
    pool: Arc<dyn TransactionPool>,
    oracle: Arc<dyn ConsensusOracle>,
    config: SyncConfig,
    metrics: Option<SharedMetrics>,
    mechanisms: Vec<Arc<dyn Mechanism>>,
    guard: RunGuard,
    recovered: OnceCell<()>,
}

impl Synchronizer {
    /// Startup hook. Reconciles the temporary block table, at most once.
    ///
    /// Recovery failures are logged and swallowed: the node keeps running on its
    /// current canonical chain. Concurrent callers wait for the same recovery. If the
    /// future is dropped before recovery completes, the next `init` starts it again.
    pub async fn init(&self) {
        if self.recovered.initialized() {
            debug!("Synchronizer already initialized");
            return;
        }

        self.recovered.get_or_init(|| self.recover()).await;
    }

    async fn recover(&self) {
        let recovery = StartupRecovery::new(
            self.processor.as_ref(),
            self.chain.as_ref(),
            self.oracle.as_ref(),
        )
        .with_metrics(self.metrics.as_deref());

        match recovery.run().await {
            Ok(RecoveryOutcome::Empty) => {}
            Ok(outcome) => debug!(?outcome, "Startup recovery finished"),
            Err(err) => error!(
                error = %err,
                cause = ?err,
                "Failed to restore blocks from temp table upon startup"
            ),
        }
    }

    /// Synchronize with `peer_id` after it sent `block`.
    ///
    /// Rejected immediately if another run is in progress. Returns `Ok(())` when no
    /// mechanism applies to the block.
    pub async fn run(&self, block: Option<RawBlock>, peer_id: PeerId) -> Result<(), SyncError> {
        if !self.recovered.initialized() {
            return Err(SyncError::NotInitialized);
        }

        let Some(_permit) = self.guard.try_acquire() else {
            warn!(peer = %peer_id, "Synchronizer is already running, rejecting run");
            if let Some(metrics) = &self.metrics {
                metrics.inc_sync_run_rejected();
            }
            return Err(SyncError::AlreadyRunning);
        };

        let raw = block.ok_or(SyncError::MissingBlock)?;
        self.synchronize(&raw, &peer_id).await
    }

    async fn synchronize(&self, raw: &RawBlock, peer_id: &PeerId) -> Result<(), SyncError> {
        let block = self.processor.deserialize(raw).await.map_err(|err| {
            SyncError::InvalidBlock(ValidationErrors::single(
                "",
                format!("should be a decodable block: {err:#}"),
            ))
        })?;

        info!(
            height = block.height().0,
            id = %block.id(),
            peer = %peer_id,
            "Starting synchronizer"
        );

        self.processor
            .validate(&block)
            .await
            .map_err(SyncError::InvalidBlock)?;

        let Some(mechanism) = self.select_mechanism(&block).await? else {
            info!(
                height = block.height().0,
                id = %block.id(),
                "Syncing mechanism could not be determined for the given block"
            );
            return Ok(());
        };

        info!(mechanism = mechanism.name(), "Triggering mechanism");

        let result = mechanism.run(&block, peer_id).await;
        if let Some(metrics) = &self.metrics {
            let label = if result.is_ok() { "success" } else { "failure" };
            metrics.inc_sync_run(mechanism.name(), label);
        }
        result?;

        match self.chain.get_last_block().await {
            Ok(tip) => info!(
                last_block_height = tip.height().0,
                last_block_id = %tip.id(),
                mechanism = mechanism.name(),
                "Synchronization finished"
            ),
            Err(err) => warn!(
                error = %err,
                mechanism = mechanism.name(),
                "Synchronization finished but the new tip could not be read"
            ),
        }

        Ok(())
    }

    async fn select_mechanism(&self, block: &Block) -> Result<Option<Arc<dyn Mechanism>>, SyncError> {
        for mechanism in &self.mechanisms {
            if mechanism.is_valid_for(block).await? {
                return Ok(Some(Arc::clone(mechanism)));
            }
        }
        Ok(None)
    }

    pub fn is_active(&self) -> bool {
        self.guard.is_active()
    }

    /// Registered mechanisms in selection order.
    pub fn mechanism_names(&self) -> Vec<&str> {
        self.mechanisms.iter().map(|m| m.name()).collect()
    }

    pub fn config(&self) -> &SyncConfig {
        &self.config
    }

    /// Fetch pending transactions from `peer_id`, or from a peer the channel picks.
    pub async fn load_unconfirmed_transactions(
        &self,
        peer_id: Option<PeerId>,
    ) -> Result<PendingTransactionsReport, SyncError> {
        fetch_pending_transactions(
            self.channel.as_ref(),
            self.pool.as_ref(),
            &self.config.transactions_procedure,
            peer_id.as_ref(),
            self.metrics.as_deref(),
        )
        .await
    }

    /// Network ready hook. Failures are logged, the node carries on without them.
    pub async fn on_network_ready(&self) {
        if let Err(err) = self.load_unconfirmed_transactions(None).await {
            error!(error = %err, "Failed to load unconfirmed transactions from the network");
        }
    }
}
