//! Approval resolution from protection rules, review lists, and the
//! platform's review decision.
//!
//! Required count: branch protection first, then the decision enum.
//! Approved count: the per-PR review list first, then the decision enum.

use std::collections::HashMap;

use chrono::{DateTime, Utc};
use serde::{Deserialize, Serialize};

/// The platform's aggregate review decision.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Default, Serialize, Deserialize)]
#[serde(rename_all = "SCREAMING_SNAKE_CASE")]
pub enum ReviewDecision {
    Approved,
    ReviewRequired,
    ChangesRequested,
    #[default]
    #[serde(other)]
    Unknown,
}

impl ReviewDecision {
    /// Parses the raw wire value; anything unrecognized is `Unknown`.
    pub fn parse(raw: &str) -> Self {
        match raw.trim().to_ascii_uppercase().as_str() {
            "APPROVED" => ReviewDecision::Approved,
            "REVIEW_REQUIRED" => ReviewDecision::ReviewRequired,
            "CHANGES_REQUESTED" => ReviewDecision::ChangesRequested,
            _ => ReviewDecision::Unknown,
        }
    }

    /// Required approvals implied by the decision alone.
    pub fn implied_required(&self) -> Option<u32> {
        match self {
            ReviewDecision::ReviewRequired | ReviewDecision::Approved => Some(1),
            _ => None,
        }
    }

    /// Approvals implied by the decision alone.
    pub fn implied_approved(&self) -> Option<u32> {
        match self {
            ReviewDecision::Approved => Some(1),
            ReviewDecision::ReviewRequired | ReviewDecision::ChangesRequested => Some(0),
            ReviewDecision::Unknown => None,
        }
    }
}

/// Resolved approval counts for one PR.
#[derive(Debug, Clone, Copy, Default, PartialEq, Eq)]
pub struct ReviewResolution {
    pub approved: u32,
    pub required: u32,
    pub approved_known: bool,
    pub required_known: bool,
}

impl ReviewResolution {
    /// Whether either count came from a real signal.
    pub fn known(&self) -> bool {
        self.approved_known || self.required_known
    }
}

/// Resolves the required-approval count.
///
/// `protection` is the branch-protection rule for the base branch, `None` when
/// it could not be read.
pub fn resolve_required(protection: Option<u32>, decision: ReviewDecision) -> Option<u32> {
    protection.or_else(|| decision.implied_required())
}

/// Combines every available signal into one resolution.
pub fn resolve(
    protection: Option<u32>,
    approved_reviews: Option<u32>,
    decision: ReviewDecision,
) -> ReviewResolution {
    let required = resolve_required(protection, decision);
    let approved = approved_reviews.or_else(|| decision.implied_approved());

    ReviewResolution {
        approved: approved.unwrap_or(0),
        required: required.unwrap_or(0),
        approved_known: approved.is_some(),
        required_known: required.is_some(),
    }
}

/// Decides whether a PR has enough approvals.
pub fn has_sufficient_approvals(
    required: u32,
    approved: u32,
    known: bool,
    decision: ReviewDecision,
) -> bool {
    if required > 0 {
        approved >= required
    } else if known {
        approved > 0
    } else {
        decision == ReviewDecision::Approved
    }
}

/// One submitted review.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct ReviewRecord {
    pub author: String,
    pub state: String,
    pub submitted_at: Option<DateTime<Utc>>,
}

/// Counts reviewers whose latest review is an approval.
///
/// Reviews are expected in submission order; a later entry replaces an
/// earlier one from the same author unless its timestamp is older.
pub fn count_latest_approvals(reviews: &[ReviewRecord]) -> u32 {
    let mut latest: HashMap<&str, &ReviewRecord> = HashMap::new();

    for review in reviews {
        if review.author.is_empty() {
            continue;
        }
        match latest.get(review.author.as_str()) {
            Some(previous) if is_older(review, previous) => {}
            _ => {
                latest.insert(review.author.as_str(), review);
            }
        }
    }

    latest
        .values()
        .filter(|r| r.state.eq_ignore_ascii_case("approved"))
        .count() as u32
}

fn is_older(candidate: &ReviewRecord, current: &ReviewRecord) -> bool {
    match (candidate.submitted_at, current.submitted_at) {
        (Some(c), Some(p)) => c < p,
        _ => false,
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use chrono::TimeZone;

    fn review(author: &str, state: &str, minute: u32) -> ReviewRecord {
        ReviewRecord {
            author: author.to_string(),
            state: state.to_string(),
            submitted_at: Some(Utc.with_ymd_and_hms(2026, 2, 14, 10, minute, 0).unwrap()),
        }
    }

    #[test]
    fn two_required_one_approved_is_insufficient() {
        assert!(!has_sufficient_approvals(2, 1, true, ReviewDecision::Approved));
    }

    #[test]
    fn known_signal_without_requirement_needs_one_approval() {
        assert!(has_sufficient_approvals(0, 1, true, ReviewDecision::Unknown));
        assert!(!has_sufficient_approvals(0, 0, true, ReviewDecision::Approved));
    }

    #[test]
    fn unknown_signals_fall_back_to_decision() {
        assert!(has_sufficient_approvals(0, 0, false, ReviewDecision::Approved));
        assert!(!has_sufficient_approvals(0, 0, false, ReviewDecision::ReviewRequired));
    }

    #[test]
    fn protection_wins_over_decision() {
        let res = resolve(Some(2), Some(2), ReviewDecision::ReviewRequired);
        assert_eq!(res.required, 2);
        assert_eq!(res.approved, 2);
        assert!(res.required_known && res.approved_known);
    }

    #[test]
    fn decision_fallbacks_apply_without_protection() {
        let approved = resolve(None, None, ReviewDecision::Approved);
        assert_eq!((approved.approved, approved.required), (1, 1));

        let required = resolve(None, None, ReviewDecision::ReviewRequired);
        assert_eq!((required.approved, required.required), (0, 1));

        let changes = resolve(None, None, ReviewDecision::ChangesRequested);
        assert_eq!(changes.approved, 0);
        assert!(changes.approved_known);
        assert!(!changes.required_known);

        let unknown = resolve(None, None, ReviewDecision::Unknown);
        assert!(!unknown.known());
    }

    #[test]
    fn only_latest_review_per_author_counts() {
        let reviews = vec![
            review("alice", "APPROVED", 0),
            review("bob", "APPROVED", 1),
            review("alice", "CHANGES_REQUESTED", 2),
            review("carol", "COMMENTED", 3),
        ];
        assert_eq!(count_latest_approvals(&reviews), 1);
    }

    #[test]
    fn out_of_order_timestamps_keep_newest() {
        let reviews = vec![
            review("alice", "APPROVED", 30),
            review("alice", "CHANGES_REQUESTED", 5),
        ];
        assert_eq!(count_latest_approvals(&reviews), 1);
    }

    #[test]
    fn decision_parses_wire_strings() {
        assert_eq!(ReviewDecision::parse("APPROVED"), ReviewDecision::Approved);
        assert_eq!(ReviewDecision::parse("review_required"), ReviewDecision::ReviewRequired);
        assert_eq!(ReviewDecision::parse(""), ReviewDecision::Unknown);

        let parsed: ReviewDecision = serde_json::from_str("\"SOMETHING_NEW\"").unwrap();
        assert_eq!(parsed, ReviewDecision::Unknown);
    }
}
