//! Low-latency status-line rendering.
//!
//! Lookup order: a fresh disk record, then a bounded live fetch, then a stale
//! disk record, then [`PLACEHOLDER`]. Rendering never fails.

use std::path::Path;
use std::sync::Arc;

use chrono::Utc;

use crate::cache::PrStatusService;
use crate::disk_cache::DiskStatusCache;
use crate::snapshot::{CanonicalStatus, PrSnapshot};

/// Shown when nothing better is available.
pub const PLACEHOLDER: &str = "PR ?";

/// Shown when the branch has no PR.
pub const NO_PR: &str = "no PR";

/// One-line summary of a branch's PR.
pub fn summarize(pr: Option<&PrSnapshot>) -> String {
    let Some(pr) = pr else {
        return NO_PR.to_string();
    };

    let status = pr.status();
    let detail = match status {
        CanonicalStatus::AwaitingCi if !pr.ci.failing.is_empty() => Some(format!(
            "ci {}/{} failing: {}",
            pr.ci.completed,
            pr.ci.total,
            pr.ci.failing_display()
        )),
        CanonicalStatus::AwaitingCi if pr.ci.total > 0 => {
            Some(format!("ci {}/{}", pr.ci.completed, pr.ci.total))
        }
        CanonicalStatus::AwaitingReview if pr.required_approvals > 0 => Some(format!(
            "{}/{} approvals",
            pr.approved_count, pr.required_approvals
        )),
        CanonicalStatus::AwaitingComments => Some(format!("{} unresolved", pr.comments.unresolved)),
        _ => None,
    };

    match detail {
        Some(detail) => format!("#{} {} ({})", pr.number, status, detail),
        None => format!("#{} {}", pr.number, status),
    }
}

/// Renders status-line text for one branch.
pub struct StatusLine {
    service: Arc<PrStatusService>,
    disk: Option<DiskStatusCache>,
}

impl StatusLine {
    /// Uses the disk cache location from the service configuration.
    pub fn new(service: Arc<PrStatusService>) -> Self {
        let disk = DiskStatusCache::from_config(&service.config().cache);
        Self { service, disk }
    }

    /// Uses an explicit disk cache, or none.
    pub fn with_disk_cache(service: Arc<PrStatusService>, disk: Option<DiskStatusCache>) -> Self {
        Self { service, disk }
    }

    /// Produces the summary for `branch`, degrading to cached text or the
    /// placeholder instead of failing.
    pub async fn render(&self, repo_root: &Path, branch: &str) -> String {
        let branch = branch.trim();
        if branch.is_empty() || branch.eq_ignore_ascii_case("detached") {
            return PLACEHOLDER.to_string();
        }

        let config = self.service.config();
        let now = Utc::now().timestamp();

        if let Some(disk) = &self.disk {
            if let Some(record) =
                disk.read_within(repo_root, branch, config.cache.status_line_ttl(), now)
            {
                return record.summary;
            }
        }

        let live = tokio::time::timeout(
            config.timeouts.status_line_live(),
            self.service.prs_for_branches(repo_root, [branch], false),
        )
        .await;

        match live {
            Ok(lookup) if lookup.error.is_none() && lookup.prs.contains_key(branch) => {
                let summary = summarize(lookup.pr(branch));
                if let Some(disk) = &self.disk {
                    let written_at = Utc::now().timestamp();
                    if let Err(e) = disk.write(repo_root, branch, &summary, written_at) {
                        tracing::warn!(branch = %branch, error = %e, "failed to write status-line cache");
                    }
                    match disk.prune(config.cache.status_line_stale_ttl(), written_at) {
                        Ok(0) => {}
                        Ok(removed) => tracing::debug!(removed, "pruned expired status-line records"),
                        Err(e) => tracing::warn!(error = %e, "failed to prune status-line cache"),
                    }
                }
                return summary;
            }
            Ok(lookup) => {
                tracing::debug!(branch = %branch, error = ?lookup.error, "live status-line fetch failed");
            }
            Err(_) => {
                tracing::debug!(branch = %branch, "live status-line fetch timed out");
            }
        }

        self.disk
            .as_ref()
            .and_then(|disk| {
                disk.read_within(repo_root, branch, config.cache.status_line_stale_ttl(), now)
            })
            .map(|record| record.summary)
            .unwrap_or_else(|| PLACEHOLDER.to_string())
    }
}
