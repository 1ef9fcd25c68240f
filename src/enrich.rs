//! Concurrent enrichment of freshly fetched PRs.
//!
//! Branch protection is read once per distinct base branch, then a bounded
//! pool of workers fetches approval and review-thread counts per PR. A single
//! collector applies worker results; a failed call leaves that PR's fields as
//! they were.

use std::collections::{BTreeSet, HashMap};
use std::future::Future;
use std::path::{Path, PathBuf};
use std::sync::Arc;

use tokio::sync::Semaphore;
use tokio::task::JoinSet;

use crate::config::EngineConfig;
use crate::error::Result;
use crate::gh::{self, GhClient};
use crate::review;
use crate::snapshot::{CommentCounts, PrSnapshot};

/// Runs `jobs` with at most `limit` in flight, handing each result to
/// `collect` as it completes.
///
/// Dropping the returned future aborts every job still running.
pub(crate) async fn fan_out<T, Fut>(limit: usize, jobs: Vec<Fut>, mut collect: impl FnMut(T))
where
    Fut: Future<Output = T> + Send + 'static,
    T: Send + 'static,
{
    let permits = Arc::new(Semaphore::new(limit.max(1)));
    let mut tasks = JoinSet::new();

    for job in jobs {
        let permits = Arc::clone(&permits);
        tasks.spawn(async move {
            let _permit = permits.acquire_owned().await;
            job.await
        });
    }

    while let Some(joined) = tasks.join_next().await {
        match joined {
            Ok(value) => collect(value),
            Err(e) => tracing::warn!(error = %e, "worker task failed"),
        }
    }
}

/// Worker output for one PR.
struct Enrichment {
    index: usize,
    approvals: Option<Result<u32>>,
    comments: Option<Result<CommentCounts>>,
}

/// Fills in approval and comment counts on `prs`.
///
/// Never fails: rows whose calls error keep their prior values.
pub async fn enrich(
    client: Arc<dyn GhClient>,
    repo_root: &Path,
    config: &EngineConfig,
    mut prs: Vec<PrSnapshot>,
) -> Vec<PrSnapshot> {
    if prs.is_empty() {
        return prs;
    }

    let protections = fetch_protections(&client, repo_root, config, &prs).await;
    for pr in prs.iter_mut() {
        let protection = protections.get(&pr.base_branch).copied().flatten();
        apply_resolution(pr, protection, None);
    }

    let mut jobs = Vec::new();
    for (index, pr) in prs.iter().enumerate() {
        if !pr.is_active() {
            continue;
        }
        let want_approvals = pr.required_approvals > 0;
        let want_comments = pr.wants_comments();
        if !want_approvals && !want_comments {
            continue;
        }

        let client = Arc::clone(&client);
        let repo_root = repo_root.to_path_buf();
        let number = pr.number;
        let reviews_timeout = config.timeouts.reviews();
        let threads_timeout = config.timeouts.review_threads();

        jobs.push(async move {
            let approvals = if want_approvals {
                Some(gh::approved_review_count(client.as_ref(), &repo_root, number, reviews_timeout).await)
            } else {
                None
            };
            let comments = if want_comments {
                Some(gh::review_thread_counts(client.as_ref(), &repo_root, number, threads_timeout).await)
            } else {
                None
            };
            Enrichment {
                index,
                approvals,
                comments,
            }
        });
    }

    let mut degraded = 0usize;
    fan_out(config.concurrency, jobs, |result: Enrichment| {
        let pr = &mut prs[result.index];
        let protection = protections.get(&pr.base_branch).copied().flatten();

        match result.approvals {
            Some(Ok(approved)) => apply_resolution(pr, protection, Some(approved)),
            Some(Err(e)) => {
                degraded += 1;
                tracing::warn!(number = pr.number, error = %e, "approval lookup failed");
            }
            None => {}
        }

        match result.comments {
            Some(Ok(counts)) => {
                pr.comments = counts;
                pr.comments_known = true;
            }
            Some(Err(e)) => {
                degraded += 1;
                tracing::warn!(number = pr.number, error = %e, "review thread count failed");
            }
            None => {}
        }
    })
    .await;

    tracing::debug!(
        repo = ?repo_root,
        count = prs.len(),
        degraded,
        "enriched PRs"
    );
    prs
}

/// Looks up branch protection once per distinct base branch of active PRs.
async fn fetch_protections(
    client: &Arc<dyn GhClient>,
    repo_root: &Path,
    config: &EngineConfig,
    prs: &[PrSnapshot],
) -> HashMap<String, Option<u32>> {
    let bases: BTreeSet<String> = prs
        .iter()
        .filter(|pr| pr.is_active() && !pr.base_branch.is_empty())
        .map(|pr| pr.base_branch.clone())
        .collect();

    let jobs: Vec<_> = bases
        .into_iter()
        .map(|base| {
            let client = Arc::clone(client);
            let repo_root: PathBuf = repo_root.to_path_buf();
            let timeout = config.timeouts.protection();
            async move {
                let result = gh::required_approvals(client.as_ref(), &repo_root, &base, timeout).await;
                (base, result)
            }
        })
        .collect();

    let mut protections = HashMap::new();
    fan_out(config.concurrency, jobs, |(base, result)| {
        let required = match result {
            Ok(count) => Some(count),
            Err(e) => {
                tracing::debug!(base = %base, error = %e, "branch protection unavailable");
                None
            }
        };
        protections.insert(base, required);
    })
    .await;

    protections
}

fn apply_resolution(pr: &mut PrSnapshot, protection: Option<u32>, approved: Option<u32>) {
    let resolution = review::resolve(protection, approved, pr.review_decision);
    pr.approved_count = resolution.approved;
    pr.required_approvals = resolution.required;
    pr.review_known = resolution.known();
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::gh::GhOutput;
    use crate::review::ReviewDecision;
    use crate::snapshot::fixtures::open_pr;
    use crate::snapshot::BaseState;
    use async_trait::async_trait;
    use std::sync::Mutex;

    /// Answers protection and reviews; review threads always fail.
    struct Partial {
        calls: Mutex<Vec<String>>,
    }

    #[async_trait]
    impl GhClient for Partial {
        async fn exec(&self, _repo_root: &Path, args: &[String]) -> Result<GhOutput> {
            let target = args.get(1).cloned().unwrap_or_default();
            self.calls.lock().unwrap().push(target.clone());
            if target.contains("/protection/") {
                Ok(GhOutput::ok(r#"{"required_approving_review_count": 1}"#))
            } else if target.contains("/reviews") {
                Ok(GhOutput::ok(
                    r#"[{"user": {"login": "alice"}, "state": "APPROVED", "submitted_at": "2026-02-14T10:00:00Z"}]"#,
                ))
            } else {
                Ok(GhOutput::failed("HTTP 502"))
            }
        }
    }

    #[tokio::test]
    async fn failed_comment_lookup_degrades_only_that_field() {
        let client = Arc::new(Partial {
            calls: Mutex::new(Vec::new()),
        });
        let mut pr = open_pr(5, "feat/a");
        pr.review_decision = ReviewDecision::ReviewRequired;

        let prs = enrich(client.clone(), Path::new("."), &EngineConfig::default(), vec![pr]).await;

        assert_eq!(prs.len(), 1);
        assert_eq!(prs[0].required_approvals, 1);
        assert_eq!(prs[0].approved_count, 1);
        assert!(!prs[0].comments_known);
    }

    #[tokio::test]
    async fn protection_is_queried_once_per_base_branch() {
        let client = Arc::new(Partial {
            calls: Mutex::new(Vec::new()),
        });
        let prs: Vec<PrSnapshot> = (1..=4).map(|n| open_pr(n, &format!("b{}", n))).collect();

        enrich(client.clone(), Path::new("."), &EngineConfig::default(), prs).await;

        let calls = client.calls.lock().unwrap();
        let protection_calls = calls.iter().filter(|c| c.contains("/protection/")).count();
        assert_eq!(protection_calls, 1);
    }

    #[tokio::test]
    async fn terminal_prs_are_not_enriched() {
        let client = Arc::new(Partial {
            calls: Mutex::new(Vec::new()),
        });
        let mut pr = open_pr(9, "old");
        pr.base_state = BaseState::Merged;
        pr.review_decision = ReviewDecision::Approved;

        let prs = enrich(client.clone(), Path::new("."), &EngineConfig::default(), vec![pr]).await;

        assert!(client.calls.lock().unwrap().is_empty());
        assert_eq!(prs[0].approved_count, 1);
    }

    /// No branch protection; review threads answer with a single page.
    struct Unprotected {
        calls: Mutex<Vec<String>>,
    }

    #[async_trait]
    impl GhClient for Unprotected {
        async fn exec(&self, _repo_root: &Path, args: &[String]) -> Result<GhOutput> {
            let target = args.get(1).cloned().unwrap_or_default();
            self.calls.lock().unwrap().push(target.clone());
            if target == "graphql" {
                Ok(GhOutput::ok(
                    r#"{"data": {"repository": {"pullRequest": {"reviewThreads": {
                        "totalCount": 1,
                        "pageInfo": {"hasNextPage": false, "endCursor": null},
                        "nodes": [{"isResolved": false}]
                    }}}}}"#,
                ))
            } else {
                Ok(GhOutput::failed("gh: Branch not protected (HTTP 404)"))
            }
        }
    }

    #[tokio::test]
    async fn approvals_skipped_without_required_count() {
        let client = Arc::new(Unprotected {
            calls: Mutex::new(Vec::new()),
        });
        let mut pr = open_pr(11, "feat/c");
        pr.review_decision = ReviewDecision::Unknown;

        let prs = enrich(client.clone(), Path::new("."), &EngineConfig::default(), vec![pr]).await;

        let calls = client.calls.lock().unwrap();
        assert!(!calls.iter().any(|c| c.contains("/reviews")));
        assert!(calls.iter().any(|c| c == "graphql"));
        assert_eq!(prs[0].required_approvals, 0);
        assert!(prs[0].comments_known);
        assert_eq!(prs[0].comments.unresolved, 1);
    }

    #[tokio::test]
    async fn fan_out_respects_limit() {
        let in_flight = Arc::new(std::sync::atomic::AtomicUsize::new(0));
        let peak = Arc::new(std::sync::atomic::AtomicUsize::new(0));
        let jobs: Vec<_> = (0..20)
            .map(|i| {
                let in_flight = Arc::clone(&in_flight);
                let peak = Arc::clone(&peak);
                async move {
                    use std::sync::atomic::Ordering;
                    let now = in_flight.fetch_add(1, Ordering::SeqCst) + 1;
                    peak.fetch_max(now, Ordering::SeqCst);
                    tokio::time::sleep(std::time::Duration::from_millis(5)).await;
                    in_flight.fetch_sub(1, Ordering::SeqCst);
                    i
                }
            })
            .collect();

        let mut seen = Vec::new();
        fan_out(3, jobs, |i| seen.push(i)).await;

        seen.sort();
        assert_eq!(seen, (0..20).collect::<Vec<_>>());
        assert!(peak.load(std::sync::atomic::Ordering::SeqCst) <= 3);
    }
}
