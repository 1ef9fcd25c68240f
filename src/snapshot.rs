//! Point-in-time view of a single pull request.

use std::fmt;

use chrono::{DateTime, Utc};
use serde::{Deserialize, Serialize};

use crate::ci::CiSummary;
use crate::review::{self, ReviewDecision};
use crate::status::{self, StatusInputs};

/// Lifecycle state of a PR on the code-review platform.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "lowercase")]
pub enum BaseState {
    Open,
    Draft,
    Closed,
    Merged,
}

impl BaseState {
    /// Maps the platform's `state` and `isDraft` fields.
    pub fn from_wire(state: &str, is_draft: bool) -> Self {
        match state.to_ascii_uppercase().as_str() {
            "MERGED" => BaseState::Merged,
            "CLOSED" => BaseState::Closed,
            _ if is_draft => BaseState::Draft,
            _ => BaseState::Open,
        }
    }

    /// Merged and closed PRs never change again.
    pub fn is_terminal(&self) -> bool {
        matches!(self, BaseState::Merged | BaseState::Closed)
    }
}

/// The single merge-readiness label for a PR.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize, Deserialize)]
#[serde(rename_all = "kebab-case")]
pub enum CanonicalStatus {
    Merged,
    Closed,
    Conflict,
    AwaitingReview,
    AwaitingCi,
    AwaitingComments,
    CanMerge,
    Draft,
    Open,
}

impl CanonicalStatus {
    /// All statuses, in evaluation order.
    pub const ALL: [CanonicalStatus; 9] = [
        CanonicalStatus::Merged,
        CanonicalStatus::Closed,
        CanonicalStatus::Conflict,
        CanonicalStatus::AwaitingReview,
        CanonicalStatus::AwaitingCi,
        CanonicalStatus::AwaitingComments,
        CanonicalStatus::CanMerge,
        CanonicalStatus::Draft,
        CanonicalStatus::Open,
    ];

    pub fn label(&self) -> &'static str {
        match self {
            CanonicalStatus::Merged => "merged",
            CanonicalStatus::Closed => "closed",
            CanonicalStatus::Conflict => "conflict",
            CanonicalStatus::AwaitingReview => "awaiting-review",
            CanonicalStatus::AwaitingCi => "awaiting-ci",
            CanonicalStatus::AwaitingComments => "awaiting-comments",
            CanonicalStatus::CanMerge => "can-merge",
            CanonicalStatus::Draft => "draft",
            CanonicalStatus::Open => "open",
        }
    }
}

impl fmt::Display for CanonicalStatus {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(self.label())
    }
}

/// Review-thread counts for a PR.
#[derive(Debug, Clone, Copy, Default, PartialEq, Eq, Serialize, Deserialize)]
pub struct CommentCounts {
    pub unresolved: u32,
    pub resolved: u32,
    pub total: u32,
}

/// One pull request at a point in time.
///
/// The canonical status is not stored: [`PrSnapshot::status`] derives it from
/// the other fields on every call, so it can never disagree with them.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct PrSnapshot {
    pub number: u64,
    pub url: String,
    /// Head branch name.
    pub branch: String,
    /// Branch the PR targets.
    pub base_branch: String,
    pub title: String,
    pub base_state: BaseState,
    /// Lowercased merge-state signal, e.g. "clean" or "dirty".
    pub merge_state: String,
    pub review_decision: ReviewDecision,
    pub approved_count: u32,
    pub required_approvals: u32,
    /// Whether either approval count came from a real signal.
    pub review_known: bool,
    pub ci: CiSummary,
    pub comments: CommentCounts,
    pub comments_known: bool,
    pub updated_at: Option<DateTime<Utc>>,
}

impl PrSnapshot {
    /// Returns true for PRs that are neither merged nor closed.
    pub fn is_active(&self) -> bool {
        !self.base_state.is_terminal()
    }

    /// Whether the PR has enough approvals to merge.
    pub fn review_sufficient(&self) -> bool {
        review::has_sufficient_approvals(
            self.required_approvals,
            self.approved_count,
            self.review_known,
            self.review_decision,
        )
    }

    /// Computes the canonical status from the current field values.
    pub fn status(&self) -> CanonicalStatus {
        status::canonical_status(&StatusInputs {
            base_state: self.base_state,
            merge_state: &self.merge_state,
            review_sufficient: self.review_sufficient(),
            ci_state: self.ci.state,
            comments_known: self.comments_known,
            unresolved: self.comments.unresolved,
        })
    }

    /// Whether comment counts are worth fetching for this PR.
    pub fn wants_comments(&self) -> bool {
        matches!(self.base_state, BaseState::Open | BaseState::Draft)
    }
}

/// Orders PRs for display: active before terminal, newest first, then by
/// number descending.
pub fn sort_snapshots(prs: &mut [PrSnapshot]) {
    prs.sort_by(|a, b| {
        a.base_state
            .is_terminal()
            .cmp(&b.base_state.is_terminal())
            .then_with(|| b.updated_at.cmp(&a.updated_at))
            .then_with(|| b.number.cmp(&a.number))
    });
}

#[cfg(test)]
pub(crate) mod fixtures {
    use super::*;
    use crate::ci::CiState;

    /// An open, clean PR with nothing resolved yet.
    pub fn open_pr(number: u64, branch: &str) -> PrSnapshot {
        PrSnapshot {
            number,
            url: format!("https://github.com/acme/widgets/pull/{}", number),
            branch: branch.to_string(),
            base_branch: "main".to_string(),
            title: format!("PR {}", number),
            base_state: BaseState::Open,
            merge_state: "clean".to_string(),
            review_decision: ReviewDecision::Unknown,
            approved_count: 0,
            required_approvals: 0,
            review_known: false,
            ci: CiSummary {
                state: CiState::None,
                completed: 0,
                total: 0,
                failing: Vec::new(),
            },
            comments: CommentCounts::default(),
            comments_known: false,
            updated_at: None,
        }
    }
}

#[cfg(test)]
mod tests {
    use super::fixtures::open_pr;
    use super::*;
    use chrono::TimeZone;

    #[test]
    fn base_state_maps_wire_values() {
        assert_eq!(BaseState::from_wire("OPEN", false), BaseState::Open);
        assert_eq!(BaseState::from_wire("OPEN", true), BaseState::Draft);
        assert_eq!(BaseState::from_wire("MERGED", false), BaseState::Merged);
        assert_eq!(BaseState::from_wire("closed", true), BaseState::Closed);
    }

    #[test]
    fn canonical_status_serializes_kebab_case() {
        assert_eq!(
            serde_json::to_string(&CanonicalStatus::AwaitingComments).unwrap(),
            "\"awaiting-comments\""
        );
        for status in CanonicalStatus::ALL {
            let json = serde_json::to_string(&status).unwrap();
            assert_eq!(json, format!("\"{}\"", status.label()));
        }
    }

    #[test]
    fn sort_puts_active_first_then_newest_then_number() {
        let at = |h| Some(Utc.with_ymd_and_hms(2026, 3, 1, h, 0, 0).unwrap());

        let mut merged = open_pr(1, "a");
        merged.base_state = BaseState::Merged;
        merged.updated_at = at(23);

        let mut old = open_pr(2, "b");
        old.updated_at = at(1);

        let mut new_low = open_pr(3, "c");
        new_low.updated_at = at(12);

        let mut new_high = open_pr(4, "d");
        new_high.updated_at = at(12);

        let mut prs = vec![merged, old, new_low, new_high];
        sort_snapshots(&mut prs);

        let order: Vec<u64> = prs.iter().map(|p| p.number).collect();
        assert_eq!(order, vec![4, 3, 2, 1]);
    }

    #[test]
    fn terminal_prs_do_not_want_comments() {
        let mut pr = open_pr(7, "x");
        assert!(pr.wants_comments());
        pr.base_state = BaseState::Draft;
        assert!(pr.wants_comments());
        pr.base_state = BaseState::Closed;
        assert!(!pr.wants_comments());
    }
}
