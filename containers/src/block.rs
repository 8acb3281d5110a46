use crate::serde_helpers::{hex_bytes, quoted_u64};
use crate::{BlockId, Bytes32, Height};
use serde::{Deserialize, Serialize};
use sha2::{Digest, Sha256};
use thiserror::Error;

/// A block exactly as it arrived from a peer, before the processor deserializes it.
pub type RawBlock = serde_json::Value;

#[derive(Clone, Debug, PartialEq, Eq, Hash, Default, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct BlockHeader {
    pub height: Height,
    pub id: BlockId,
    /// Zero for genesis.
    pub previous_block_id: BlockId,
    pub version: u32,
    #[serde(with = "quoted_u64")]
    pub timestamp: u64,
    /// Highest height that received pre-votes from a majority when this block was forged.
    pub max_height_prevoted: Height,
}

impl BlockHeader {
    pub fn is_genesis(&self) -> bool {
        self.previous_block_id.is_zero()
    }
}

/// An immutable block. The id is derived from every other header field and the payload.
#[derive(Clone, Debug, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct Block {
    pub header: BlockHeader,
    #[serde(with = "hex_bytes")]
    pub payload: Vec<u8>,
}

#[derive(Debug, Error)]
pub enum BlockDecodeError {
    #[error("block is not valid hex: {0}")]
    Hex(#[from] hex::FromHexError),
    #[error("block is not a valid JSON document: {0}")]
    Json(#[from] serde_json::Error),
}

impl Block {
    pub fn new(
        height: Height,
        previous_block_id: BlockId,
        version: u32,
        timestamp: u64,
        max_height_prevoted: Height,
        payload: Vec<u8>,
    ) -> Self {
        let mut header = BlockHeader {
            height,
            id: Bytes32::ZERO,
            previous_block_id,
            version,
            timestamp,
            max_height_prevoted,
        };
        header.id = compute_block_id(&header, &payload);
        Self { header, payload }
    }

    pub fn height(&self) -> Height {
        self.header.height
    }

    pub fn id(&self) -> BlockId {
        self.header.id
    }

    pub fn previous_block_id(&self) -> BlockId {
        self.header.previous_block_id
    }

    pub fn version(&self) -> u32 {
        self.header.version
    }

    /// True if the stored id matches the content of the block.
    pub fn verify_id(&self) -> bool {
        compute_block_id(&self.header, &self.payload) == self.header.id
    }

    /// Wire form: hex encoding of the JSON document.
    pub fn to_hex(&self) -> Result<String, serde_json::Error> {
        Ok(hex::encode(serde_json::to_vec(self)?))
    }

    pub fn from_hex(encoded: &str) -> Result<Self, BlockDecodeError> {
        let bytes = hex::decode(encoded.trim_start_matches("0x"))?;
        Ok(serde_json::from_slice(&bytes)?)
    }
}

/// Content identifier of a block: SHA-256 over the header fields (id excluded) and payload.
pub fn compute_block_id(header: &BlockHeader, payload: &[u8]) -> BlockId {
    let mut hasher = Sha256::new();
    hasher.update(header.height.0.to_le_bytes());
    hasher.update(header.previous_block_id.as_bytes());
    hasher.update(header.version.to_le_bytes());
    hasher.update(header.timestamp.to_le_bytes());
    hasher.update(header.max_height_prevoted.0.to_le_bytes());
    hasher.update((payload.len() as u64).to_le_bytes());
    hasher.update(payload);
    Bytes32(hasher.finalize().into())
}

/// Entry of the temporary block table.
///
/// Blocks land here when they were rolled off the canonical chain, or arrived on a
/// branch that did not extend the canonical tip.
#[derive(Clone, Debug, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct TempBlock {
    pub height: Height,
    pub id: BlockId,
    pub full_block: Block,
}

impl From<Block> for TempBlock {
    fn from(block: Block) -> Self {
        Self {
            height: block.height(),
            id: block.id(),
            full_block: block,
        }
    }
}
