//! Source adapters over the `gh` code-review CLI.
//!
//! [`GhClient`] runs one invocation and returns raw output. Everything above it
//! (timeouts, failure classification, JSON decoding, fallback field sets) lives
//! in this module so alternative clients get identical behavior.

mod pr;
mod reviews;
mod threads;

pub use pr::{list_prs, view_pr, FALLBACK_FIELDS, PRIMARY_FIELDS};
pub use reviews::{approved_review_count, required_approvals, REVIEW_PAGE_SIZE};
pub use threads::{review_thread_counts, REVIEW_THREAD_PAGE_SIZE};

use std::future::Future;
use std::path::Path;
use std::process::Stdio;
use std::time::Duration;

use async_trait::async_trait;
use serde::de::DeserializeOwned;
use tokio::process::Command;

use crate::error::{Error, Result};

/// Diagnostic text `gh pr view` prints when a branch has no PR.
pub const NOT_FOUND_PHRASE: &str = "no pull requests found for branch";

/// Raw result of one client invocation.
#[derive(Debug, Clone, Default)]
pub struct GhOutput {
    pub success: bool,
    pub stdout: String,
    pub stderr: String,
}

impl GhOutput {
    /// A successful invocation with the given stdout.
    pub fn ok(stdout: impl Into<String>) -> Self {
        Self {
            success: true,
            stdout: stdout.into(),
            stderr: String::new(),
        }
    }

    /// A failed invocation with the given stderr.
    pub fn failed(stderr: impl Into<String>) -> Self {
        Self {
            success: false,
            stdout: String::new(),
            stderr: stderr.into(),
        }
    }
}

/// Runs the code-review client.
#[async_trait]
pub trait GhClient: Send + Sync {
    /// Runs the client with `args` inside `repo_root`.
    ///
    /// Returns `Err` only when the client could not be run at all.
    async fn exec(&self, repo_root: &Path, args: &[String]) -> Result<GhOutput>;
}

/// Client backed by the real `gh` binary.
pub struct GhCli {
    /// Path to the gh binary.
    program: String,
}

impl Default for GhCli {
    fn default() -> Self {
        Self::new()
    }
}

impl GhCli {
    /// Creates a client using the `gh` found on PATH.
    pub fn new() -> Self {
        Self {
            program: "gh".to_string(),
        }
    }

    /// Creates a client with a custom binary path.
    pub fn with_program(program: impl Into<String>) -> Self {
        Self {
            program: program.into(),
        }
    }
}

#[async_trait]
impl GhClient for GhCli {
    async fn exec(&self, repo_root: &Path, args: &[String]) -> Result<GhOutput> {
        tracing::trace!(program = %self.program, args = ?args, "running code-review client");

        // Dropping the future (timeout or caller cancellation) kills the child.
        let output = Command::new(&self.program)
            .args(args)
            .current_dir(repo_root)
            .env("GH_PROMPT_DISABLED", "1")
            .stdin(Stdio::null())
            .kill_on_drop(true)
            .output()
            .await
            .map_err(|e| match e.kind() {
                std::io::ErrorKind::NotFound => Error::ClientMissing {
                    program: self.program.clone(),
                },
                _ => Error::Io(e),
            })?;

        Ok(GhOutput {
            success: output.status.success(),
            stdout: String::from_utf8_lossy(&output.stdout).into_owned(),
            stderr: String::from_utf8_lossy(&output.stderr).trim().to_string(),
        })
    }
}

/// Short human-readable label for an invocation, used in errors and logs.
pub(crate) fn command_label(args: &[String]) -> String {
    let shown: Vec<&str> = args
        .iter()
        .take_while(|a| !a.starts_with('-'))
        .take(3)
        .map(String::as_str)
        .collect();
    format!("gh {}", shown.join(" "))
}

/// Turns a failed invocation into a typed error.
///
/// `branch` is set for lookups where "no PR" is an expected answer.
pub(crate) fn classify_failure(args: &[String], branch: Option<&str>, stderr: &str) -> Error {
    if let Some(branch) = branch {
        if stderr.to_ascii_lowercase().contains(NOT_FOUND_PHRASE) {
            return Error::NotFound {
                branch: branch.to_string(),
            };
        }
    }
    Error::Command {
        command: command_label(args),
        stderr: stderr.to_string(),
    }
}

/// Runs `fut` under a deadline, mapping expiry to [`Error::Timeout`].
pub(crate) async fn with_timeout<T, F>(operation: &str, timeout: Duration, fut: F) -> Result<T>
where
    F: Future<Output = Result<T>>,
{
    match tokio::time::timeout(timeout, fut).await {
        Ok(result) => result,
        Err(_) => Err(Error::Timeout {
            operation: operation.to_string(),
            timeout,
        }),
    }
}

/// Runs the client and returns stdout, classifying failures.
pub(crate) async fn run_checked(
    client: &dyn GhClient,
    repo_root: &Path,
    args: &[String],
    branch: Option<&str>,
) -> Result<String> {
    let output = client.exec(repo_root, args).await?;
    if output.success {
        Ok(output.stdout)
    } else {
        Err(classify_failure(args, branch, &output.stderr))
    }
}

/// Runs the client under `timeout` and decodes stdout as JSON.
pub(crate) async fn run_json<T: DeserializeOwned>(
    client: &dyn GhClient,
    repo_root: &Path,
    args: &[String],
    branch: Option<&str>,
    timeout: Duration,
) -> Result<T> {
    let label = command_label(args);
    let stdout = with_timeout(&label, timeout, run_checked(client, repo_root, args, branch)).await?;
    Ok(serde_json::from_str(&stdout)?)
}

pub(crate) fn to_args(args: &[&str]) -> Vec<String> {
    args.iter().map(|a| a.to_string()).collect()
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn not_found_is_classified_for_branch_lookups() {
        let args = to_args(&["pr", "view", "feat/x"]);
        let err = classify_failure(
            &args,
            Some("feat/x"),
            "no pull requests found for branch \"feat/x\"",
        );
        assert!(err.is_not_found());
    }

    #[test]
    fn not_found_phrase_is_ignored_without_branch() {
        let args = to_args(&["pr", "list"]);
        let err = classify_failure(&args, None, "no pull requests found for branch \"x\"");
        assert!(matches!(err, Error::Command { .. }));
    }

    #[test]
    fn other_failures_keep_diagnostics_verbatim() {
        let args = to_args(&["pr", "view", "feat/x", "--json", "number"]);
        let err = classify_failure(&args, Some("feat/x"), "HTTP 502: Bad Gateway");
        match err {
            Error::Command { command, stderr } => {
                assert_eq!(command, "gh pr view feat/x");
                assert_eq!(stderr, "HTTP 502: Bad Gateway");
            }
            other => panic!("unexpected error: {other:?}"),
        }
    }

    #[tokio::test]
    async fn with_timeout_reports_configured_duration() {
        let result: Result<()> = with_timeout("slow call", Duration::from_millis(10), async {
            tokio::time::sleep(Duration::from_secs(5)).await;
            Ok(())
        })
        .await;

        match result {
            Err(Error::Timeout { operation, timeout }) => {
                assert_eq!(operation, "slow call");
                assert_eq!(timeout, Duration::from_millis(10));
            }
            other => panic!("expected timeout, got {other:?}"),
        }
    }

    #[tokio::test]
    async fn missing_binary_is_an_environment_error() {
        let client = GhCli::with_program("definitely-not-a-real-gh-binary-4242");
        let dir = std::env::temp_dir();
        let err = client
            .exec(&dir, &to_args(&["--version"]))
            .await
            .unwrap_err();
        assert!(err.is_environment());
    }
}
