use containers::BlockHeader;
use tracing::trace;

use crate::{ConsensusOracle, ForkOutcome};

/// Classify `candidate` against the canonical tip.
///
/// Checks run in a fixed order: identity, direct extension, then the oracle.
/// The function has no state of its own, so identical inputs and oracle answers
/// always yield the same outcome.
pub fn fork_choice<O>(candidate: &BlockHeader, canonical: &BlockHeader, oracle: &O) -> ForkOutcome
where
    O: ConsensusOracle + ?Sized,
{
    let outcome = if candidate.id == canonical.id {
        ForkOutcome::Identical
    } else if candidate.previous_block_id == canonical.id {
        ForkOutcome::ExtendsCanonical
    } else if oracle.prefers(candidate, canonical) {
        ForkOutcome::DifferentChainPreferred
    } else {
        ForkOutcome::Discard
    };

    trace!(
        candidate_height = candidate.height.0,
        candidate_id = %candidate.id,
        canonical_height = canonical.height.0,
        canonical_id = %canonical.id,
        %outcome,
        "Fork choice evaluated"
    );

    outcome
}
