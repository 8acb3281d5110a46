use std::fmt;

/// Relationship between a candidate tip and the canonical tip.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash)]
pub enum ForkOutcome {
    /// Candidate is the canonical tip itself.
    Identical,
    /// Candidate's parent is the canonical tip.
    ExtendsCanonical,
    /// Candidate sits on another branch that the consensus oracle prefers.
    DifferentChainPreferred,
    /// Canonical history wins; the candidate is abandoned.
    Discard,
}

impl ForkOutcome {
    /// Whether the candidate branch should become canonical.
    pub fn favors_candidate(&self) -> bool {
        matches!(
            self,
            ForkOutcome::ExtendsCanonical | ForkOutcome::DifferentChainPreferred
        )
    }
}

impl fmt::Display for ForkOutcome {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        let name = match self {
            ForkOutcome::Identical => "identical",
            ForkOutcome::ExtendsCanonical => "extends_canonical",
            ForkOutcome::DifferentChainPreferred => "different_chain_preferred",
            ForkOutcome::Discard => "discard",
        };
        f.write_str(name)
    }
}
