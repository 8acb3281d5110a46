use serde::{Deserialize, Serialize};
use std::fmt;

/// Position of a block in the canonical chain, genesis at zero.
#[derive(Clone, Copy, Debug, PartialEq, Eq, PartialOrd, Ord, Hash, Default, Serialize, Deserialize)]
#[serde(transparent)]
pub struct Height(pub u64);

impl Height {
    pub const GENESIS: Height = Height(0);

    /// Height of the parent block. Genesis has no parent and stays at zero.
    pub fn parent(self) -> Height {
        Height(self.0.saturating_sub(1))
    }

    pub fn child(self) -> Height {
        Height(self.0 + 1)
    }

    /// Number of blocks between `self` and a lower `other`, zero if `other` is not lower.
    pub fn distance_above(self, other: Height) -> u64 {
        self.0.saturating_sub(other.0)
    }
}

impl fmt::Display for Height {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(f, "{}", self.0)
    }
}
