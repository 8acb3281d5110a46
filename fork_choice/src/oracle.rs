use containers::BlockHeader;

/// Consensus-weight judgment between two competing tips.
///
/// Implementations wrap the finality gadget (BFT pre-votes, delegate weight, ...).
/// The fork choice rule only consults the oracle once the cheap structural checks
/// have failed, and must get the same answer for the same pair of headers.
pub trait ConsensusOracle: Send + Sync {
    /// Return true if `candidate` should replace `canonical` as the chain tip.
    fn prefers(&self, candidate: &BlockHeader, canonical: &BlockHeader) -> bool;
}

/// BFT preference: the tip with more pre-voted history wins, then the taller tip.
#[derive(Debug, Clone, Copy, Default)]
pub struct PrevotedHeightOracle;

impl ConsensusOracle for PrevotedHeightOracle {
    fn prefers(&self, candidate: &BlockHeader, canonical: &BlockHeader) -> bool {
        candidate.max_height_prevoted > canonical.max_height_prevoted
            || (candidate.max_height_prevoted == canonical.max_height_prevoted
                && candidate.height > canonical.height)
    }
}
