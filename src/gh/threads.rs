//! Paginated review-thread counting over the GraphQL API.

use std::path::Path;
use std::time::Duration;

use serde::Deserialize;

use crate::error::Result;
use crate::snapshot::CommentCounts;

use super::{run_checked, with_timeout, GhClient};

/// Threads requested per page.
pub const REVIEW_THREAD_PAGE_SIZE: u32 = 100;

const REVIEW_THREADS_QUERY: &str = "query($owner: String!, $name: String!, $number: Int!, $first: Int!, $cursor: String) {
  repository(owner: $owner, name: $name) {
    pullRequest(number: $number) {
      reviewThreads(first: $first, after: $cursor) {
        totalCount
        pageInfo { hasNextPage endCursor }
        nodes { isResolved }
      }
    }
  }
}";

#[derive(Debug, Deserialize)]
struct Envelope {
    data: Data,
}

#[derive(Debug, Deserialize)]
struct Data {
    repository: Repository,
}

#[derive(Debug, Deserialize)]
#[serde(rename_all = "camelCase")]
struct Repository {
    pull_request: PullRequest,
}

#[derive(Debug, Deserialize)]
#[serde(rename_all = "camelCase")]
struct PullRequest {
    review_threads: ThreadPage,
}

#[derive(Debug, Deserialize)]
#[serde(rename_all = "camelCase")]
struct ThreadPage {
    total_count: u32,
    page_info: PageInfo,
    #[serde(default)]
    nodes: Vec<ThreadNode>,
}

#[derive(Debug, Deserialize)]
#[serde(rename_all = "camelCase")]
struct PageInfo {
    has_next_page: bool,
    #[serde(default)]
    end_cursor: Option<String>,
}

#[derive(Debug, Deserialize)]
#[serde(rename_all = "camelCase")]
struct ThreadNode {
    is_resolved: bool,
}

fn page_args(number: u64, cursor: Option<&str>) -> Vec<String> {
    let mut args = vec![
        "api".to_string(),
        "graphql".to_string(),
        "-f".to_string(),
        format!("query={}", REVIEW_THREADS_QUERY),
        "-F".to_string(),
        "owner={owner}".to_string(),
        "-F".to_string(),
        "name={repo}".to_string(),
        "-F".to_string(),
        format!("number={}", number),
        "-F".to_string(),
        format!("first={}", REVIEW_THREAD_PAGE_SIZE),
    ];
    if let Some(cursor) = cursor {
        args.push("-f".to_string());
        args.push(format!("cursor={}", cursor));
    }
    args
}

/// Counts resolved and unresolved review threads on PR `number`.
///
/// All pages share one `timeout`. On expiry the whole traversal fails with a
/// timeout error and no partial counts are returned.
pub async fn review_thread_counts(
    client: &dyn GhClient,
    repo_root: &Path,
    number: u64,
    timeout: Duration,
) -> Result<CommentCounts> {
    with_timeout(
        "gh api graphql reviewThreads",
        timeout,
        traverse(client, repo_root, number),
    )
    .await
}

async fn traverse(client: &dyn GhClient, repo_root: &Path, number: u64) -> Result<CommentCounts> {
    let mut total: Option<u32> = None;
    let mut unresolved: u32 = 0;
    let mut resolved: u32 = 0;
    let mut cursor: Option<String> = None;
    let mut pages = 0;

    loop {
        let stdout = run_checked(client, repo_root, &page_args(number, cursor.as_deref()), None).await?;
        let page = serde_json::from_str::<Envelope>(&stdout)?
            .data
            .repository
            .pull_request
            .review_threads;
        pages += 1;

        if total.is_none() {
            total = Some(page.total_count);
        }
        for node in &page.nodes {
            if node.is_resolved {
                resolved += 1;
            } else {
                unresolved += 1;
            }
        }

        match page.page_info.end_cursor {
            Some(next) if page.page_info.has_next_page && !next.is_empty() => cursor = Some(next),
            _ => break,
        }
    }

    let total = total.unwrap_or(0);
    let unresolved = unresolved.min(total);
    tracing::debug!(
        number,
        pages,
        total,
        unresolved,
        counted_resolved = resolved,
        "counted review threads"
    );

    Ok(CommentCounts {
        unresolved,
        resolved: total.saturating_sub(unresolved),
        total,
    })
}
