/// Startup reconciliation of the temporary block table.
///
/// Blocks land in the temporary table when a sync run rolls the canonical chain
/// back, or when they arrive on a branch that does not extend the tip. If the node
/// stops before the run completes, the table still holds that branch on the next
/// boot. Recovery decides once, with the fork choice rule, whether the branch
/// should become canonical again or be thrown away.
///
/// ## Algorithm
///
/// 1. Empty table: nothing to do.
/// 2. Load the entries, order them by height and check they form one chain
///    anchored in the canonical chain. If they do not, the table is cleared and
///    the canonical chain is left alone.
/// 3. Compare the highest entry with the canonical tip.
/// 4. If the temporary branch wins, delete canonical blocks down to the fork point
///    and replay every entry in ascending order.
/// 5. Otherwise clear the table.
use containers::{BlockHeader, Height, TempBlock};
use fork_choice::{fork_choice, ConsensusOracle, ForkOutcome};
use metrics::SyncMetrics;
use tracing::{debug, info, trace, warn};

use crate::{
    error::RecoveryError,
    types::{ChainDataAccess, DeleteOptions, ProcessOptions, Processor},
};

#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum RecoveryOutcome {
    /// The temporary table was empty.
    Empty,

    /// The temporary branch replaced the canonical tip.
    Restored { rolled_back: u64, replayed: u64 },

    /// The temporary branch lost the fork choice and the table was cleared.
    Discarded { outcome: ForkOutcome },
}

pub struct StartupRecovery<'a> {
    processor: &'a dyn Processor,
    chain: &'a dyn ChainDataAccess,
    oracle: &'a dyn ConsensusOracle,
    metrics: Option<&'a SyncMetrics>,
}

impl<'a> StartupRecovery<'a> {
    pub fn new(
        processor: &'a dyn Processor,
        chain: &'a dyn ChainDataAccess,
        oracle: &'a dyn ConsensusOracle,
    ) -> Self {
        Self {
            processor,
            chain,
            oracle,
            metrics: None,
        }
    }

    pub fn with_metrics(mut self, metrics: Option<&'a SyncMetrics>) -> Self {
        self.metrics = metrics;
        self
    }

    pub async fn run(&self) -> Result<RecoveryOutcome, RecoveryError> {
        let is_empty = self
            .chain
            .is_temp_block_empty()
            .await
            .map_err(RecoveryError::ReadTempBlocks)?;
        if is_empty {
            debug!("Temporary block table is empty");
            return Ok(RecoveryOutcome::Empty);
        }

        let mut temp_blocks = self
            .chain
            .get_temp_blocks()
            .await
            .map_err(RecoveryError::ReadTempBlocks)?;
        temp_blocks.sort_by_key(|entry| entry.height);

        let (Some(lowest), Some(highest)) = (temp_blocks.first(), temp_blocks.last()) else {
            return Ok(RecoveryOutcome::Empty);
        };

        let checked = match check_linked(&temp_blocks) {
            Ok(()) => self.check_anchored(lowest).await,
            Err(err) => Err(err),
        };
        match checked {
            Ok(()) => {}
            Err(err @ RecoveryError::BrokenTempChain { .. }) => {
                warn!(
                    error = %err,
                    num_blocks = temp_blocks.len(),
                    "Clearing temporary block table that cannot be replayed"
                );
                self.chain
                    .clear_temp_blocks()
                    .await
                    .map_err(RecoveryError::Clear)?;
                return Err(err);
            }
            Err(err) => return Err(err),
        }

        let tip = self
            .chain
            .get_last_block()
            .await
            .map_err(RecoveryError::ReadCanonical)?;

        let outcome = fork_choice(&highest.full_block.header, &tip.header, self.oracle);

        debug!(
            num_blocks = temp_blocks.len(),
            lowest_height = lowest.height.0,
            highest_height = highest.height.0,
            tip_height = tip.height().0,
            %outcome,
            "Evaluated temporary blocks against canonical tip"
        );

        if !outcome.favors_candidate() {
            self.chain
                .clear_temp_blocks()
                .await
                .map_err(RecoveryError::Clear)?;
            debug!(%outcome, "Temporary blocks discarded");
            return Ok(RecoveryOutcome::Discarded { outcome });
        }

        info!("Restoring blocks from temporary table");

        let rolled_back = delete_blocks_after_height(
            self.processor,
            tip.height(),
            lowest.height.parent(),
            DeleteOptions {
                save_temp_block: false,
            },
        )
        .await?;
        if let Some(metrics) = self.metrics {
            metrics.inc_recovery_rollbacks(rolled_back);
        }

        let mut replayed = 0;
        for entry in &temp_blocks {
            self.processor
                .process_validated(
                    &entry.full_block,
                    ProcessOptions {
                        remove_from_temp_table: true,
                    },
                )
                .await
                .map_err(|source| RecoveryError::Replay {
                    height: entry.height,
                    id: entry.id,
                    source,
                })?;

            replayed += 1;
            if let Some(metrics) = self.metrics {
                metrics.inc_recovery_replayed_blocks(1);
            }
            trace!(height = entry.height.0, id = %entry.id, "Replayed temporary block");
        }

        info!("Chain successfully restored");

        Ok(RecoveryOutcome::Restored {
            rolled_back,
            replayed,
        })
    }

    /// The lowest entry must sit on a block that is still canonical.
    async fn check_anchored(&self, lowest: &TempBlock) -> Result<(), RecoveryError> {
        if lowest.height == Height::GENESIS {
            return Ok(());
        }

        let parent = self
            .chain
            .get_block_header_by_height(lowest.height.parent())
            .await
            .map_err(RecoveryError::ReadCanonical)?;

        match parent {
            Some(parent) if parent.id == lowest.full_block.previous_block_id() => Ok(()),
            _ => Err(RecoveryError::BrokenTempChain {
                height: lowest.height,
                id: lowest.id,
            }),
        }
    }
}

/// Entries sorted ascending must link one to the next by height and parent id.
fn check_linked(temp_blocks: &[TempBlock]) -> Result<(), RecoveryError> {
    for entry in temp_blocks {
        if entry.full_block.height() != entry.height || entry.full_block.id() != entry.id {
            return Err(RecoveryError::BrokenTempChain {
                height: entry.height,
                id: entry.id,
            });
        }
    }

    for pair in temp_blocks.windows(2) {
        let (parent, child) = (&pair[0], &pair[1]);
        if child.height != parent.height.child()
            || child.full_block.previous_block_id() != parent.id
        {
            return Err(RecoveryError::BrokenTempChain {
                height: child.height,
                id: child.id,
            });
        }
    }

    Ok(())
}

/// Delete canonical blocks until the tip is at or below `desired`.
///
/// Each deletion reports the new tip, whose height becomes the current height.
/// Returns the number of blocks deleted.
pub(crate) async fn delete_blocks_after_height(
    processor: &dyn Processor,
    current: Height,
    desired: Height,
    options: DeleteOptions,
) -> Result<u64, RecoveryError> {
    let mut current = current;
    let mut deleted = 0;

    while desired < current {
        let new_tip: BlockHeader =
            processor
                .delete_last_block(options)
                .await
                .map_err(|source| RecoveryError::Rollback {
                    height: current,
                    source,
                })?;

        trace!(
            deleted_height = current.0,
            new_tip_height = new_tip.height.0,
            new_tip_id = %new_tip.id,
            save_temp_block = options.save_temp_block,
            "Deleted canonical block"
        );

        if new_tip.height >= current {
            return Err(RecoveryError::Rollback {
                height: current,
                source: anyhow::anyhow!(
                    "tip is at height {} after deleting the block at height {}",
                    new_tip.height,
                    current
                ),
            });
        }

        current = new_tip.height;
        deleted += 1;
    }

    Ok(deleted)
}
