//! Bulk listing and per-branch lookup of pull requests.

use std::path::Path;
use std::time::Duration;

use chrono::{DateTime, Utc};
use serde::Deserialize;

use crate::ci::{summarize_ci, CheckEntry};
use crate::config::EngineConfig;
use crate::error::Result;
use crate::review::{self, ReviewDecision};
use crate::snapshot::{sort_snapshots, BaseState, CommentCounts, PrSnapshot};

use super::{run_json, GhClient};

/// Full field projection.
pub const PRIMARY_FIELDS: &str = "number,url,title,headRefName,baseRefName,state,isDraft,\
mergeStateStatus,mergeable,reviewDecision,statusCheckRollup,updatedAt";

/// Reduced projection used once when the full query fails.
pub const FALLBACK_FIELDS: &str = "number,url,title,headRefName,baseRefName,state,isDraft,updatedAt";

#[derive(Debug, Deserialize)]
#[serde(rename_all = "camelCase")]
struct WirePr {
    number: u64,
    #[serde(default)]
    url: String,
    #[serde(default)]
    title: String,
    #[serde(default)]
    head_ref_name: String,
    #[serde(default)]
    base_ref_name: String,
    #[serde(default)]
    state: String,
    #[serde(default)]
    is_draft: bool,
    #[serde(default)]
    merge_state_status: Option<String>,
    #[serde(default)]
    mergeable: Option<String>,
    #[serde(default)]
    review_decision: Option<String>,
    #[serde(default)]
    status_check_rollup: Option<Vec<WireCheck>>,
    #[serde(default)]
    updated_at: Option<DateTime<Utc>>,
}

/// A rollup entry: either a check run or a commit status context.
#[derive(Debug, Deserialize)]
#[serde(rename_all = "camelCase")]
struct WireCheck {
    #[serde(default)]
    name: Option<String>,
    #[serde(default)]
    context: Option<String>,
    #[serde(default)]
    status: Option<String>,
    #[serde(default)]
    conclusion: Option<String>,
    #[serde(default)]
    state: Option<String>,
}

impl WireCheck {
    fn into_entry(self) -> CheckEntry {
        let name = self
            .name
            .filter(|n| !n.is_empty())
            .or(self.context)
            .unwrap_or_else(|| "(unnamed)".to_string());

        if let Some(state) = self.state.filter(|s| !s.is_empty()) {
            // Status contexts report a single state instead of status + conclusion.
            return match state.to_ascii_uppercase().as_str() {
                "SUCCESS" => CheckEntry::new(&name, "completed", "success"),
                "FAILURE" | "ERROR" => CheckEntry::new(&name, "completed", "failure"),
                _ => CheckEntry::new(&name, "pending", ""),
            };
        }

        CheckEntry {
            name,
            status: self.status.unwrap_or_default(),
            conclusion: self.conclusion.unwrap_or_default(),
        }
    }
}

impl WirePr {
    fn into_snapshot(self) -> PrSnapshot {
        let decision = ReviewDecision::parse(self.review_decision.as_deref().unwrap_or(""));
        let resolution = review::resolve(None, None, decision);
        let checks: Vec<CheckEntry> = self
            .status_check_rollup
            .unwrap_or_default()
            .into_iter()
            .map(WireCheck::into_entry)
            .collect();

        PrSnapshot {
            number: self.number,
            url: self.url,
            branch: self.head_ref_name,
            base_branch: self.base_ref_name,
            title: self.title,
            base_state: BaseState::from_wire(&self.state, self.is_draft),
            merge_state: merge_state(self.merge_state_status, self.mergeable),
            review_decision: decision,
            approved_count: resolution.approved,
            required_approvals: resolution.required,
            review_known: resolution.known(),
            ci: summarize_ci(&checks),
            comments: CommentCounts::default(),
            comments_known: false,
            updated_at: self.updated_at,
        }
    }
}

/// Picks the merge-state signal, preferring `mergeStateStatus` unless it is
/// blank or unknown.
fn merge_state(status: Option<String>, mergeable: Option<String>) -> String {
    let status = status.unwrap_or_default().trim().to_ascii_lowercase();
    if !status.is_empty() && status != "unknown" {
        return status;
    }
    let mergeable = mergeable.unwrap_or_default().trim().to_ascii_lowercase();
    if mergeable.is_empty() {
        status
    } else {
        mergeable
    }
}

fn list_args(config: &EngineConfig, fields: &str) -> Vec<String> {
    vec![
        "pr".to_string(),
        "list".to_string(),
        "--author".to_string(),
        config.client.author.clone(),
        "--state".to_string(),
        "all".to_string(),
        "--limit".to_string(),
        config.client.list_limit.to_string(),
        "--json".to_string(),
        fields.to_string(),
    ]
}

fn view_args(branch: &str, fields: &str) -> Vec<String> {
    vec![
        "pr".to_string(),
        "view".to_string(),
        branch.to_string(),
        "--json".to_string(),
        fields.to_string(),
    ]
}

/// Fetches the author's PRs, sorted for display.
///
/// Retries once with [`FALLBACK_FIELDS`] if the full query fails for any
/// reason other than a missing client.
pub async fn list_prs(
    client: &dyn GhClient,
    repo_root: &Path,
    config: &EngineConfig,
) -> Result<Vec<PrSnapshot>> {
    let timeouts = &config.timeouts;
    let primary = fetch_list(client, repo_root, config, PRIMARY_FIELDS, timeouts.list_primary()).await;

    let wire = match primary {
        Ok(wire) => wire,
        Err(e) if e.is_retryable() => {
            tracing::warn!(
                repo = ?repo_root,
                error = %e,
                "PR list failed, retrying with reduced fields"
            );
            fetch_list(client, repo_root, config, FALLBACK_FIELDS, timeouts.list_fallback()).await?
        }
        Err(e) => return Err(e),
    };

    let mut prs: Vec<PrSnapshot> = wire.into_iter().map(WirePr::into_snapshot).collect();
    sort_snapshots(&mut prs);

    tracing::debug!(repo = ?repo_root, count = prs.len(), "fetched PR list");
    Ok(prs)
}

async fn fetch_list(
    client: &dyn GhClient,
    repo_root: &Path,
    config: &EngineConfig,
    fields: &str,
    timeout: Duration,
) -> Result<Vec<WirePr>> {
    run_json(client, repo_root, &list_args(config, fields), None, timeout).await
}

/// Looks up the PR whose head is `branch`.
///
/// Returns `Ok(None)` when the platform reports that no PR exists.
pub async fn view_pr(
    client: &dyn GhClient,
    repo_root: &Path,
    branch: &str,
    config: &EngineConfig,
) -> Result<Option<PrSnapshot>> {
    let timeouts = &config.timeouts;
    let primary = run_json::<WirePr>(
        client,
        repo_root,
        &view_args(branch, PRIMARY_FIELDS),
        Some(branch),
        timeouts.view_primary(),
    )
    .await;

    let result = match primary {
        Err(e) if e.is_retryable() => {
            tracing::warn!(branch = %branch, error = %e, "PR view failed, retrying with reduced fields");
            run_json::<WirePr>(
                client,
                repo_root,
                &view_args(branch, FALLBACK_FIELDS),
                Some(branch),
                timeouts.view_fallback(),
            )
            .await
        }
        other => other,
    };

    match result {
        Ok(wire) => Ok(Some(wire.into_snapshot())),
        Err(e) if e.is_not_found() => {
            tracing::debug!(branch = %branch, "no PR for branch");
            Ok(None)
        }
        Err(e) => Err(e),
    }
}
