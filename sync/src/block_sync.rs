use anyhow::{anyhow, bail, ensure, Context, Result};
use async_trait::async_trait;
use containers::{Block, BlockHeader, BlockId, Height};
use libp2p_identity::PeerId;
use serde_json::json;
/// Block synchronization for catching up with a peer that is ahead.
///
/// When a block arrives more than one height above the local tip, the node has
/// missed blocks. This mechanism finds the highest block shared with the sender,
/// rolls the local chain back to it, and downloads the sender's chain from there.
///
/// ## The Process
///
/// 1. **Common block**: offer the ids of the most recent canonical blocks and let
///    the peer answer with the highest one it also has
/// 2. **Rollback**: delete local blocks above the common block. They go to the
///    temporary table so a failed sync can be undone
/// 3. **Download**: request batches of blocks after the last applied one and apply
///    them strictly in order until the received block itself is applied
/// 4. **Cleanup**: once the target is reached the rolled back branch is obsolete
///    and the temporary table is cleared
///
/// A failed run deletes what it applied and replays the rolled back blocks from
/// the temporary table right away. Only if that replay fails are the blocks left
/// for startup recovery, and no new run starts until the table is empty again.
/// The table therefore never holds more than one branch.
///
/// ## Safety: Round Limits
///
/// A peer can advertise an arbitrarily tall chain. `max_sync_rounds` bounds the
/// number of download requests a single run issues.
use std::sync::Arc;
use tracing::{debug, error, trace, warn};

use crate::{
    config::SyncConfig,
    error::SyncError,
    mechanism::Mechanism,
    recovery::delete_blocks_after_height,
    schema::{validate, BLOCKS_LIST, COMMON_BLOCK},
    types::{ChainDataAccess, DeleteOptions, NetworkChannel, ProcessOptions, Processor},
};

pub struct BlockSyncMechanism {
    processor: Arc<dyn Processor>,
    chain: Arc<dyn ChainDataAccess>,
    channel: Arc<dyn NetworkChannel>,
    config: SyncConfig,
}

impl BlockSyncMechanism {
    pub fn new(
        processor: Arc<dyn Processor>,
        chain: Arc<dyn ChainDataAccess>,
        channel: Arc<dyn NetworkChannel>,
        config: SyncConfig,
    ) -> Self {
        Self {
            processor,
            chain,
            channel,
            config,
        }
    }

    /// Ask `peer_id` for the highest block both chains share.
    async fn highest_common_block(&self, tip: Height, peer_id: &PeerId) -> Result<BlockHeader> {
        let window = self.config.common_block_window.max(1);
        let low = Height(tip.0.saturating_sub(window - 1));
        let headers = self
            .chain
            .get_block_headers_by_height_between(low, tip)
            .await?;

        // Highest first, the peer answers with the first id it knows.
        let ids: Vec<String> = headers.iter().rev().map(|h| h.id.to_string()).collect();

        debug!(
            peer = %peer_id,
            num_ids = ids.len(),
            from_height = low.0,
            to_height = tip.0,
            "Requesting highest common block"
        );

        let response = self
            .channel
            .invoke_from_network(
                &self.config.common_block_procedure,
                Some(peer_id),
                json!({ "ids": ids }),
            )
            .await?;

        validate(&COMMON_BLOCK, &response.data).map_err(|errors| SyncError::Schema {
            schema: COMMON_BLOCK.id,
            errors,
        })?;

        let id: BlockId = response
            .data
            .as_str()
            .ok_or_else(|| anyhow!("common block id is not a string"))?
            .parse()
            .context("common block id is not a valid block id")?;

        headers
            .into_iter()
            .find(|header| header.id == id)
            .ok_or_else(|| {
                anyhow!("peer {peer_id} returned common block {id} which is not in the recent canonical chain")
            })
    }

    /// Request the blocks following `from` and decode them.
    async fn request_blocks(&self, from: BlockId, peer_id: &PeerId) -> Result<Vec<Block>> {
        let response = self
            .channel
            .invoke_from_network(
                &self.config.blocks_procedure,
                Some(peer_id),
                json!({ "blockId": from.to_string() }),
            )
            .await?;

        validate(&BLOCKS_LIST, &response.data).map_err(|errors| SyncError::Schema {
            schema: BLOCKS_LIST.id,
            errors,
        })?;

        let entries = response
            .data
            .as_array()
            .map(Vec::as_slice)
            .unwrap_or_default();

        ensure!(
            entries.len() <= self.config.max_blocks_per_request,
            "peer {peer_id} returned {} blocks, more than the {} requested",
            entries.len(),
            self.config.max_blocks_per_request
        );

        entries
            .iter()
            .enumerate()
            .map(|(index, entry)| {
                let encoded = entry.as_str().unwrap_or_default();
                Block::from_hex(encoded)
                    .with_context(|| format!("failed to decode block {index} of batch"))
            })
            .collect()
    }

    async fn apply(&self, block: &Block, parent: &BlockHeader) -> Result<()> {
        ensure!(
            block.verify_id(),
            "block at height {} does not match its id {}",
            block.height(),
            block.id()
        );
        ensure!(
            block.previous_block_id() == parent.id && block.height() == parent.height.child(),
            "block {} at height {} does not extend block {} at height {}",
            block.id(),
            block.height(),
            parent.id,
            parent.height
        );

        self.processor
            .validate(block)
            .await
            .with_context(|| {
                format!("block {} at height {} is invalid", block.id(), block.height())
            })?;
        self.processor
            .process_validated(
                block,
                ProcessOptions {
                    remove_from_temp_table: false,
                },
            )
            .await?;

        trace!(height = block.height().0, id = %block.id(), "Applied synced block");
        Ok(())
    }

    /// Roll back to `common` and apply the peer's chain up to the announced block.
    ///
    /// Returns the number of blocks rolled back and applied.
    async fn sync_from(
        &self,
        common: &BlockHeader,
        tip: Height,
        block: &Block,
        peer_id: &PeerId,
    ) -> Result<(u64, usize)> {
        let target = block.height();
        let rolled_back = delete_blocks_after_height(
            self.processor.as_ref(),
            tip,
            common.height,
            DeleteOptions {
                save_temp_block: true,
            },
        )
        .await?;

        let mut last = common.clone();
        let mut applied = 0usize;

        for round in 0..self.config.max_sync_rounds {
            if last.height >= target {
                break;
            }

            let batch = self.request_blocks(last.id, peer_id).await?;
            if batch.is_empty() {
                debug!(peer = %peer_id, round, "Peer returned no blocks");
                break;
            }

            debug!(
                peer = %peer_id,
                round,
                num_blocks = batch.len(),
                from_height = last.height.0,
                "Received blocks from peer"
            );

            for synced in batch {
                if last.height >= target {
                    break;
                }
                self.apply(&synced, &last).await?;
                last = synced.header;
                applied += 1;
            }
        }

        if last.height < target {
            warn!(
                peer = %peer_id,
                reached_height = last.height.0,
                target_height = target.0,
                "Block sync stopped before reaching target"
            );
            bail!(
                "block sync with peer {peer_id} stopped at height {} before reaching {}",
                last.height,
                target
            );
        }

        ensure!(
            last.id == block.id(),
            "peer {peer_id} served block {} at height {} but announced block {}",
            last.id,
            target,
            block.id()
        );

        Ok((rolled_back, applied))
    }

    /// Undo a failed run: drop what was applied above `common` and replay the
    /// rolled back blocks from the temporary table.
    async fn restore(&self, common: &BlockHeader) -> Result<usize> {
        let tip = self.chain.get_last_block().await?;
        delete_blocks_after_height(
            self.processor.as_ref(),
            tip.height(),
            common.height,
            DeleteOptions {
                save_temp_block: false,
            },
        )
        .await?;

        let mut saved = self.chain.get_temp_blocks().await?;
        saved.sort_by_key(|entry| entry.height);
        for entry in &saved {
            self.processor
                .process_validated(
                    &entry.full_block,
                    ProcessOptions {
                        remove_from_temp_table: true,
                    },
                )
                .await
                .with_context(|| {
                    format!("failed to replay block {} at height {}", entry.id, entry.height)
                })?;
        }

        Ok(saved.len())
    }
}

#[async_trait]
impl Mechanism for BlockSyncMechanism {
    fn name(&self) -> &str {
        "BlockSyncMechanism"
    }

    async fn is_valid_for(&self, block: &Block) -> Result<bool> {
        let tip = self.chain.get_last_block().await?;
        Ok(block.height().distance_above(tip.height()) > 1)
    }

    async fn run(&self, block: &Block, peer_id: &PeerId) -> Result<()> {
        let pending = self.chain.get_temp_blocks().await?;
        ensure!(
            pending.is_empty(),
            "temporary block table holds {} blocks from an unfinished sync, refusing to roll back on top of them",
            pending.len()
        );

        let tip = self.chain.get_last_block().await?;
        let common = self.highest_common_block(tip.height(), peer_id).await?;
        debug!(
            peer = %peer_id,
            common_height = common.height.0,
            common_id = %common.id,
            tip_height = tip.height().0,
            target_height = block.height().0,
            "Found highest common block"
        );

        match self.sync_from(&common, tip.height(), block, peer_id).await {
            Ok((rolled_back, applied)) => {
                self.chain.clear_temp_blocks().await?;
                debug!(
                    peer = %peer_id,
                    rolled_back,
                    applied,
                    height = block.height().0,
                    "Block sync complete"
                );
                Ok(())
            }
            Err(err) => {
                match self.restore(&common).await {
                    Ok(replayed) => debug!(
                        peer = %peer_id,
                        replayed,
                        "Restored canonical chain after failed block sync"
                    ),
                    Err(restore_err) => error!(
                        peer = %peer_id,
                        error = %restore_err,
                        "Failed to restore canonical chain after failed block sync, leaving temporary blocks for startup recovery"
                    ),
                }
                Err(err)
            }
        }
    }
}

impl std::fmt::Debug for BlockSyncMechanism {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.debug_struct("BlockSyncMechanism")
            .field("config", &self.config)
            .finish_non_exhaustive()
    }
}
