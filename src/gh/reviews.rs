//! Branch-protection and review-list lookups.

use std::path::Path;
use std::time::Duration;

use chrono::{DateTime, Utc};
use serde::Deserialize;

use crate::error::Result;
use crate::review::{count_latest_approvals, ReviewRecord};

use super::{run_checked, run_json, to_args, with_timeout, GhClient};

/// Reviews requested per page.
pub const REVIEW_PAGE_SIZE: usize = 100;

#[derive(Debug, Deserialize)]
struct WireProtection {
    #[serde(default)]
    required_approving_review_count: u32,
}

#[derive(Debug, Deserialize)]
struct WireUser {
    #[serde(default)]
    login: String,
}

#[derive(Debug, Deserialize)]
struct WireReview {
    #[serde(default)]
    user: Option<WireUser>,
    #[serde(default)]
    state: String,
    #[serde(default)]
    submitted_at: Option<DateTime<Utc>>,
}

/// Reads the required approving review count for `base_branch`.
///
/// Fails when the branch is unprotected, the token lacks admin scope, or the
/// call times out; callers treat all of these as "unavailable".
pub async fn required_approvals(
    client: &dyn GhClient,
    repo_root: &Path,
    base_branch: &str,
    timeout: Duration,
) -> Result<u32> {
    let path = format!(
        "repos/{{owner}}/{{repo}}/branches/{}/protection/required_pull_request_reviews",
        base_branch
    );
    let wire: WireProtection =
        run_json(client, repo_root, &to_args(&["api", &path]), None, timeout).await?;
    Ok(wire.required_approving_review_count)
}

/// Counts reviewers whose latest review on PR `number` is an approval.
///
/// Reviews arrive oldest first, so every page is read. All pages share one
/// `timeout`.
pub async fn approved_review_count(
    client: &dyn GhClient,
    repo_root: &Path,
    number: u64,
    timeout: Duration,
) -> Result<u32> {
    let records = with_timeout(
        "gh api pulls reviews",
        timeout,
        read_reviews(client, repo_root, number),
    )
    .await?;
    Ok(count_latest_approvals(&records))
}

fn reviews_page_path(number: u64, page: usize) -> String {
    format!(
        "repos/{{owner}}/{{repo}}/pulls/{}/reviews?per_page={}&page={}",
        number, REVIEW_PAGE_SIZE, page
    )
}

async fn read_reviews(
    client: &dyn GhClient,
    repo_root: &Path,
    number: u64,
) -> Result<Vec<ReviewRecord>> {
    let mut records = Vec::new();
    let mut page = 1;

    loop {
        let path = reviews_page_path(number, page);
        let stdout = run_checked(client, repo_root, &to_args(&["api", &path]), None).await?;
        let wire: Vec<WireReview> = serde_json::from_str(&stdout)?;
        let short = wire.len() < REVIEW_PAGE_SIZE;

        records.extend(wire.into_iter().map(|r| ReviewRecord {
            author: r.user.map(|u| u.login).unwrap_or_default(),
            state: r.state,
            submitted_at: r.submitted_at,
        }));

        if short {
            break;
        }
        page += 1;
    }

    tracing::debug!(number, pages = page, reviews = records.len(), "read PR reviews");
    Ok(records)
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::gh::GhOutput;
    use async_trait::async_trait;
    use std::sync::Mutex;

    struct Canned {
        output: GhOutput,
        seen: Mutex<Vec<Vec<String>>>,
    }

    #[async_trait]
    impl GhClient for Canned {
        async fn exec(&self, _repo_root: &Path, args: &[String]) -> Result<GhOutput> {
            self.seen.lock().unwrap().push(args.to_vec());
            Ok(self.output.clone())
        }
    }

    fn canned(output: GhOutput) -> Canned {
        Canned {
            output,
            seen: Mutex::new(Vec::new()),
        }
    }

    #[tokio::test]
    async fn protection_count_is_read() {
        let client = canned(GhOutput::ok(
            r#"{"required_approving_review_count": 2, "dismiss_stale_reviews": true}"#,
        ));

        let count = required_approvals(&client, Path::new("."), "main", Duration::from_secs(1))
            .await
            .unwrap();

        assert_eq!(count, 2);
        let seen = client.seen.lock().unwrap();
        assert_eq!(
            seen[0][1],
            "repos/{owner}/{repo}/branches/main/protection/required_pull_request_reviews"
        );
    }

    #[tokio::test]
    async fn unprotected_branch_is_an_error() {
        let client = canned(GhOutput::failed("gh: Branch not protected (HTTP 404)"));

        let result =
            required_approvals(&client, Path::new("."), "main", Duration::from_secs(1)).await;
        assert!(result.is_err());
    }

    #[tokio::test]
    async fn approvals_use_latest_review_per_user() {
        let client = canned(GhOutput::ok(
            r#"[
                {"user": {"login": "alice"}, "state": "APPROVED", "submitted_at": "2026-02-14T10:00:00Z"},
                {"user": {"login": "bob"}, "state": "APPROVED", "submitted_at": "2026-02-14T10:05:00Z"},
                {"user": {"login": "alice"}, "state": "CHANGES_REQUESTED", "submitted_at": "2026-02-14T11:00:00Z"},
                {"user": null, "state": "APPROVED", "submitted_at": null}
            ]"#,
        ));

        let count = approved_review_count(&client, Path::new("."), 42, Duration::from_secs(1))
            .await
            .unwrap();
        assert_eq!(count, 1);
    }

    /// Serves a full first page of comment reviews, then a short second page.
    struct Paged {
        seen: Mutex<Vec<String>>,
    }

    #[async_trait]
    impl GhClient for Paged {
        async fn exec(&self, _repo_root: &Path, args: &[String]) -> Result<GhOutput> {
            self.seen.lock().unwrap().push(args[1].clone());
            let body = if args[1].ends_with("&page=1") {
                let mut reviews: Vec<String> = (0..REVIEW_PAGE_SIZE)
                    .map(|i| {
                        format!(
                            r#"{{"user": {{"login": "bot{}"}}, "state": "COMMENTED", "submitted_at": "2026-02-14T09:00:00Z"}}"#,
                            i % 7
                        )
                    })
                    .collect();
                reviews[0] = r#"{"user": {"login": "alice"}, "state": "CHANGES_REQUESTED", "submitted_at": "2026-02-14T08:00:00Z"}"#.to_string();
                format!("[{}]", reviews.join(","))
            } else {
                r#"[
                    {"user": {"login": "alice"}, "state": "APPROVED", "submitted_at": "2026-02-15T10:00:00Z"},
                    {"user": {"login": "bob"}, "state": "APPROVED", "submitted_at": "2026-02-15T11:00:00Z"}
                ]"#
                .to_string()
            };
            Ok(GhOutput::ok(body))
        }
    }

    #[tokio::test]
    async fn approvals_on_later_pages_are_counted() {
        let client = Paged {
            seen: Mutex::new(Vec::new()),
        };

        let count = approved_review_count(&client, Path::new("."), 42, Duration::from_secs(1))
            .await
            .unwrap();

        assert_eq!(count, 2);
        let seen = client.seen.lock().unwrap();
        assert_eq!(seen.len(), 2);
        assert_eq!(seen[1], "repos/{owner}/{repo}/pulls/42/reviews?per_page=100&page=2");
    }

    #[tokio::test]
    async fn review_pages_share_one_timeout() {
        struct Slow;

        #[async_trait]
        impl GhClient for Slow {
            async fn exec(&self, _repo_root: &Path, _args: &[String]) -> Result<GhOutput> {
                tokio::time::sleep(Duration::from_secs(5)).await;
                Ok(GhOutput::ok("[]"))
            }
        }

        let err = approved_review_count(&Slow, Path::new("."), 42, Duration::from_millis(50))
            .await
            .unwrap_err();
        assert!(err.is_timeout());
    }
}
