//! CI check rollup summarization.

use serde::{Deserialize, Serialize};

/// Aggregate CI state for a PR.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum CiState {
    /// No countable checks.
    None,
    InProgress,
    Fail,
    Success,
}

/// One check result from the rollup. Either field may be empty.
#[derive(Debug, Clone, Default, PartialEq, Eq)]
pub struct CheckEntry {
    pub name: String,
    pub status: String,
    pub conclusion: String,
}

impl CheckEntry {
    pub fn new(name: &str, status: &str, conclusion: &str) -> Self {
        Self {
            name: name.to_string(),
            status: status.to_string(),
            conclusion: conclusion.to_string(),
        }
    }
}

/// Summarized CI rollup.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct CiSummary {
    pub state: CiState,
    pub completed: u32,
    pub total: u32,
    /// Failing check names, deduplicated and sorted.
    pub failing: Vec<String>,
}

impl Default for CiSummary {
    fn default() -> Self {
        Self {
            state: CiState::None,
            completed: 0,
            total: 0,
            failing: Vec::new(),
        }
    }
}

impl CiSummary {
    /// Failing check names joined for display.
    pub fn failing_display(&self) -> String {
        self.failing.join(",")
    }
}

const PASSING_CONCLUSIONS: &[&str] = &["success", "skipped", "neutral"];

/// Summarizes a list of check entries into one CI state.
pub fn summarize_ci(checks: &[CheckEntry]) -> CiSummary {
    let mut summary = CiSummary::default();
    let mut any_incomplete = false;

    for check in checks {
        let status = check.status.trim().to_ascii_lowercase();
        let conclusion = check.conclusion.trim().to_ascii_lowercase();
        if status.is_empty() && conclusion.is_empty() {
            continue;
        }

        summary.total += 1;
        if !conclusion.is_empty() {
            summary.completed += 1;
            if !PASSING_CONCLUSIONS.contains(&conclusion.as_str()) {
                summary.failing.push(check.name.clone());
            }
        }
        if (!status.is_empty() && status != "completed") || conclusion.is_empty() {
            any_incomplete = true;
        }
    }

    summary.failing.sort();
    summary.failing.dedup();

    summary.state = if summary.total == 0 {
        CiState::None
    } else if !summary.failing.is_empty() {
        CiState::Fail
    } else if any_incomplete {
        CiState::InProgress
    } else {
        CiState::Success
    };

    summary
}
