//! Canonical status state machine.

use crate::ci::CiState;
use crate::snapshot::{BaseState, CanonicalStatus};

/// Everything the state machine looks at.
#[derive(Debug, Clone, Copy)]
pub struct StatusInputs<'a> {
    pub base_state: BaseState,
    pub merge_state: &'a str,
    pub review_sufficient: bool,
    pub ci_state: CiState,
    pub comments_known: bool,
    pub unresolved: u32,
}

/// Returns true when the merge-state signal reports an unmergeable tree.
pub fn is_conflicting(merge_state: &str) -> bool {
    let state = merge_state.trim();
    state.eq_ignore_ascii_case("dirty") || state.eq_ignore_ascii_case("conflicting")
}

/// Maps inputs to exactly one status. Rules are checked top to bottom and the
/// first match wins.
pub fn canonical_status(inputs: &StatusInputs<'_>) -> CanonicalStatus {
    if inputs.base_state == BaseState::Merged {
        return CanonicalStatus::Merged;
    }
    if inputs.base_state == BaseState::Closed {
        return CanonicalStatus::Closed;
    }
    if is_conflicting(inputs.merge_state) {
        return CanonicalStatus::Conflict;
    }
    if !inputs.review_sufficient {
        return CanonicalStatus::AwaitingReview;
    }
    if inputs.ci_state != CiState::Success {
        return CanonicalStatus::AwaitingCi;
    }
    if inputs.comments_known {
        return if inputs.unresolved > 0 {
            CanonicalStatus::AwaitingComments
        } else {
            CanonicalStatus::CanMerge
        };
    }
    if inputs.base_state == BaseState::Draft {
        return CanonicalStatus::Draft;
    }
    CanonicalStatus::Open
}
