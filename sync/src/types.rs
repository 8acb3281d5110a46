/// Collaborator interfaces consumed by the sync subsystem.
///
/// Storage, block processing, transport and the transaction pool live outside this
/// crate. Each is reached through a narrow async trait so the node can plug in its
/// real services and tests can plug in in-memory fakes.
use anyhow::Result;
use async_trait::async_trait;
use containers::{Block, BlockHeader, Height, RawBlock, TempBlock, Transaction};
use libp2p_identity::PeerId;
use serde_json::Value;

use crate::schema::ValidationErrors;

#[derive(Debug, Clone, Copy, PartialEq, Eq, Default)]
pub struct ProcessOptions {
    /// Drop the block from the temporary table once it is applied.
    pub remove_from_temp_table: bool,
}

#[derive(Debug, Clone, Copy, PartialEq, Eq, Default)]
pub struct DeleteOptions {
    /// Keep the deleted block in the temporary table.
    pub save_temp_block: bool,
}

/// Block validation, (de)serialization and canonical chain mutation.
#[async_trait]
pub trait Processor: Send + Sync {
    async fn deserialize(&self, raw: &RawBlock) -> Result<Block>;

    async fn validate(&self, block: &Block) -> std::result::Result<(), ValidationErrors>;

    /// Apply an already validated block on top of the canonical tip.
    async fn process_validated(&self, block: &Block, options: ProcessOptions) -> Result<()>;

    /// Delete the canonical tip and return the header of the new tip.
    async fn delete_last_block(&self, options: DeleteOptions) -> Result<BlockHeader>;
}

/// Read access to the canonical chain and the temporary block table.
#[async_trait]
pub trait ChainDataAccess: Send + Sync {
    async fn is_temp_block_empty(&self) -> Result<bool>;

    /// Entries in storage order; callers sort as needed.
    async fn get_temp_blocks(&self) -> Result<Vec<TempBlock>>;

    async fn clear_temp_blocks(&self) -> Result<()>;

    async fn get_last_block(&self) -> Result<Block>;

    /// Headers with `low <= height <= high`, ascending.
    async fn get_block_headers_by_height_between(
        &self,
        low: Height,
        high: Height,
    ) -> Result<Vec<BlockHeader>>;

    async fn get_block_header_by_height(&self, height: Height) -> Result<Option<BlockHeader>>;
}

/// Reply to a remote procedure call.
#[derive(Debug, Clone, PartialEq)]
pub struct NetworkResponse {
    /// Peer that answered. Useful when the channel picked one.
    pub peer_id: Option<PeerId>,
    pub data: Value,
}

/// Remote procedure calls to peers.
#[async_trait]
pub trait NetworkChannel: Send + Sync {
    /// Invoke `procedure` on `peer_id`, or on a peer chosen by the channel when `None`.
    async fn invoke_from_network(
        &self,
        procedure: &str,
        peer_id: Option<&PeerId>,
        params: Value,
    ) -> Result<NetworkResponse>;
}

#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum TransactionStatus {
    Ok,
    Fail,
}

#[derive(Debug, Clone, PartialEq, Eq)]
pub struct AddTransactionResult {
    pub status: TransactionStatus,
    pub errors: Vec<String>,
}

impl AddTransactionResult {
    pub fn ok() -> Self {
        Self {
            status: TransactionStatus::Ok,
            errors: vec![],
        }
    }

    pub fn fail(errors: Vec<String>) -> Self {
        Self {
            status: TransactionStatus::Fail,
            errors,
        }
    }

    pub fn is_ok(&self) -> bool {
        self.status == TransactionStatus::Ok && self.errors.is_empty()
    }
}

/// Pending transaction pool. Acceptance policy is entirely the pool's.
#[async_trait]
pub trait TransactionPool: Send + Sync {
    async fn add(&self, transaction: Transaction) -> AddTransactionResult;
}
