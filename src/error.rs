//! Error types for the PR status engine.

use std::time::Duration;
use thiserror::Error;

/// Top-level error type for status engine operations.
#[derive(Error, Debug)]
pub enum Error {
    /// No pull request exists for the branch.
    ///
    /// Callers cache this as a negative entry rather than surfacing it.
    #[error("no pull request found for branch {branch}")]
    NotFound { branch: String },

    /// An external call exceeded its deadline.
    #[error("{operation} timed out after {}s", timeout.as_secs())]
    Timeout {
        operation: String,
        timeout: Duration,
    },

    /// The code-review client exited non-zero.
    #[error("{command} failed: {stderr}")]
    Command { command: String, stderr: String },

    /// The code-review client binary could not be started.
    #[error("code-review client '{program}' not found on PATH")]
    ClientMissing { program: String },

    /// IO error while reading or writing cache files.
    #[error("IO error: {0}")]
    Io(#[from] std::io::Error),

    /// The client returned output that is not the expected JSON.
    #[error("malformed client output: {0}")]
    Json(#[from] serde_json::Error),

    /// Configuration error.
    #[error("configuration error: {0}")]
    Config(String),
}

impl Error {
    /// Returns true for the "no PR for this branch" outcome.
    pub fn is_not_found(&self) -> bool {
        matches!(self, Error::NotFound { .. })
    }

    /// Returns true if the error is a deadline expiry.
    pub fn is_timeout(&self) -> bool {
        matches!(self, Error::Timeout { .. })
    }

    /// Returns true if the environment cannot run the client at all.
    pub fn is_environment(&self) -> bool {
        matches!(self, Error::ClientMissing { .. })
    }

    /// Returns true if a reduced-field fallback query is worth attempting.
    pub fn is_retryable(&self) -> bool {
        !self.is_environment() && !self.is_not_found()
    }
}

/// Result type alias for status engine operations.
pub type Result<T> = std::result::Result<T, Error>;

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn timeout_message_carries_duration() {
        let err = Error::Timeout {
            operation: "gh pr list".to_string(),
            timeout: Duration::from_secs(20),
        };
        assert_eq!(err.to_string(), "gh pr list timed out after 20s");
        assert!(err.is_timeout());
        assert!(err.is_retryable());
    }

    #[test]
    fn environment_errors_are_not_retried() {
        let err = Error::ClientMissing {
            program: "gh".to_string(),
        };
        assert!(err.is_environment());
        assert!(!err.is_retryable());
    }

    #[test]
    fn command_error_appends_diagnostics() {
        let err = Error::Command {
            command: "gh pr view feat/x".to_string(),
            stderr: "HTTP 502".to_string(),
        };
        assert_eq!(err.to_string(), "gh pr view feat/x failed: HTTP 502");
        assert!(!err.is_not_found());
    }
}
