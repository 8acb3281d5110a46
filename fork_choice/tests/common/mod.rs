//! Common test utilities for fork choice tests

use containers::{BlockHeader, BlockId, Bytes32, Height};
use fork_choice::ConsensusOracle;

/// Deterministic id derived from a label
pub fn id(label: &str) -> BlockId {
    Bytes32::digest(label.as_bytes())
}

/// Header with an explicit id and parent
pub fn header(height: u64, label: &str, parent: &str) -> BlockHeader {
    BlockHeader {
        height: Height(height),
        id: id(label),
        previous_block_id: id(parent),
        version: 2,
        timestamp: height * 10,
        max_height_prevoted: Height(0),
    }
}

/// Header with pre-vote information for oracle tests
pub fn prevoted_header(height: u64, label: &str, max_height_prevoted: u64) -> BlockHeader {
    BlockHeader {
        max_height_prevoted: Height(max_height_prevoted),
        ..header(height, label, "parent")
    }
}

/// Oracle answering the same way for every pair
pub struct FixedOracle(pub bool);

impl ConsensusOracle for FixedOracle {
    fn prefers(&self, _candidate: &BlockHeader, _canonical: &BlockHeader) -> bool {
        self.0
    }
}
