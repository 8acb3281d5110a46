//! Tests for the pre-voted height preference

use fork_choice::{fork_choice, ConsensusOracle, ForkOutcome, PrevotedHeightOracle};
use rstest::rstest;

mod common;
use common::*;

#[rstest]
#[case::more_prevoted_history(8, 4, 5, 6, true)]
#[case::less_prevoted_history(4, 8, 9, 6, false)]
#[case::tie_taller_candidate(6, 6, 9, 8, true)]
#[case::tie_same_height(6, 6, 8, 8, false)]
#[case::tie_shorter_candidate(6, 6, 7, 8, false)]
fn test_prevoted_height_preference(
    #[case] candidate_prevoted: u64,
    #[case] canonical_prevoted: u64,
    #[case] candidate_height: u64,
    #[case] canonical_height: u64,
    #[case] expected: bool,
) {
    let candidate = prevoted_header(candidate_height, "candidate", candidate_prevoted);
    let canonical = prevoted_header(canonical_height, "canonical", canonical_prevoted);

    assert_eq!(PrevotedHeightOracle.prefers(&candidate, &canonical), expected);
}

#[test]
fn test_shorter_branch_with_more_prevotes_wins() {
    let canonical = prevoted_header(20, "canonical", 10);
    let candidate = prevoted_header(15, "candidate", 12);

    assert_eq!(
        fork_choice(&candidate, &canonical, &PrevotedHeightOracle),
        ForkOutcome::DifferentChainPreferred
    );
}
