//! Engine configuration and validation.
//!
//! Configuration is read from `<config dir>/wt-pr-status/config.toml` when
//! present. Every field has a default, so an empty or missing file yields a
//! working engine.

use std::path::{Path, PathBuf};
use std::time::Duration;

use serde::{Deserialize, Serialize};

use crate::error::{Error, Result};

/// Settings for invoking the code-review client.
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct ClientConfig {
    /// Client binary name or path.
    #[serde(default = "default_program")]
    pub program: String,
    /// Author filter for bulk listing.
    #[serde(default = "default_author")]
    pub author: String,
    /// Maximum PRs returned by a bulk listing.
    #[serde(default = "default_list_limit")]
    pub list_limit: u32,
}

fn default_program() -> String {
    "gh".to_string()
}

fn default_author() -> String {
    "@me".to_string()
}

fn default_list_limit() -> u32 {
    100
}

impl Default for ClientConfig {
    fn default() -> Self {
        Self {
            program: default_program(),
            author: default_author(),
            list_limit: default_list_limit(),
        }
    }
}

/// Per-call timeouts, in seconds.
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct TimeoutsConfig {
    /// Bulk list with the full field set.
    #[serde(default = "default_list_primary")]
    pub list_primary_secs: u64,
    /// Bulk list with the reduced field set.
    #[serde(default = "default_list_fallback")]
    pub list_fallback_secs: u64,
    /// Single-PR view with the full field set.
    #[serde(default = "default_view_primary")]
    pub view_primary_secs: u64,
    /// Single-PR view with the reduced field set.
    #[serde(default = "default_view_fallback")]
    pub view_fallback_secs: u64,
    /// Branch-protection lookup.
    #[serde(default = "default_short_call")]
    pub protection_secs: u64,
    /// Approved-review listing.
    #[serde(default = "default_short_call")]
    pub reviews_secs: u64,
    /// Whole review-thread traversal, across all pages.
    #[serde(default = "default_review_threads")]
    pub review_threads_secs: u64,
    /// Upper bound on a live status-line fetch.
    #[serde(default = "default_status_line_live")]
    pub status_line_live_secs: u64,
}

fn default_list_primary() -> u64 {
    20
}

fn default_list_fallback() -> u64 {
    8
}

fn default_view_primary() -> u64 {
    10
}

fn default_view_fallback() -> u64 {
    5
}

fn default_short_call() -> u64 {
    5
}

fn default_review_threads() -> u64 {
    8
}

fn default_status_line_live() -> u64 {
    12
}

impl Default for TimeoutsConfig {
    fn default() -> Self {
        Self {
            list_primary_secs: default_list_primary(),
            list_fallback_secs: default_list_fallback(),
            view_primary_secs: default_view_primary(),
            view_fallback_secs: default_view_fallback(),
            protection_secs: default_short_call(),
            reviews_secs: default_short_call(),
            review_threads_secs: default_review_threads(),
            status_line_live_secs: default_status_line_live(),
        }
    }
}

impl TimeoutsConfig {
    pub fn list_primary(&self) -> Duration {
        Duration::from_secs(self.list_primary_secs)
    }

    pub fn list_fallback(&self) -> Duration {
        Duration::from_secs(self.list_fallback_secs)
    }

    pub fn view_primary(&self) -> Duration {
        Duration::from_secs(self.view_primary_secs)
    }

    pub fn view_fallback(&self) -> Duration {
        Duration::from_secs(self.view_fallback_secs)
    }

    pub fn protection(&self) -> Duration {
        Duration::from_secs(self.protection_secs)
    }

    pub fn reviews(&self) -> Duration {
        Duration::from_secs(self.reviews_secs)
    }

    pub fn review_threads(&self) -> Duration {
        Duration::from_secs(self.review_threads_secs)
    }

    pub fn status_line_live(&self) -> Duration {
        Duration::from_secs(self.status_line_live_secs)
    }
}

/// Freshness windows for the in-memory and on-disk caches, in seconds.
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct CacheConfig {
    /// Bulk list freshness.
    #[serde(default = "default_ttl")]
    pub list_ttl_secs: u64,
    /// Per-branch entry freshness.
    #[serde(default = "default_ttl")]
    pub branch_ttl_secs: u64,
    /// Status-line disk record freshness.
    #[serde(default = "default_status_line_ttl")]
    pub status_line_ttl_secs: u64,
    /// Maximum age of a disk record served after a failed live fetch.
    #[serde(default = "default_status_line_stale_ttl")]
    pub status_line_stale_ttl_secs: u64,
    /// Branch entries older than this are dropped when the branch map is
    /// swapped, unless the current lookup asked for them.
    #[serde(default = "default_branch_retain")]
    pub branch_retain_secs: u64,
    /// Overrides the status-line cache directory.
    #[serde(default)]
    pub status_line_dir: Option<PathBuf>,
}

fn default_ttl() -> u64 {
    30
}

fn default_status_line_ttl() -> u64 {
    60
}

fn default_status_line_stale_ttl() -> u64 {
    900
}

fn default_branch_retain() -> u64 {
    900
}

impl Default for CacheConfig {
    fn default() -> Self {
        Self {
            list_ttl_secs: default_ttl(),
            branch_ttl_secs: default_ttl(),
            status_line_ttl_secs: default_status_line_ttl(),
            status_line_stale_ttl_secs: default_status_line_stale_ttl(),
            branch_retain_secs: default_branch_retain(),
            status_line_dir: None,
        }
    }
}

impl CacheConfig {
    pub fn list_ttl(&self) -> Duration {
        Duration::from_secs(self.list_ttl_secs)
    }

    pub fn branch_ttl(&self) -> Duration {
        Duration::from_secs(self.branch_ttl_secs)
    }

    pub fn status_line_ttl(&self) -> Duration {
        Duration::from_secs(self.status_line_ttl_secs)
    }

    pub fn status_line_stale_ttl(&self) -> Duration {
        Duration::from_secs(self.status_line_stale_ttl_secs)
    }

    pub fn branch_retain(&self) -> Duration {
        Duration::from_secs(self.branch_retain_secs)
    }
}

/// Top-level engine configuration.
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct EngineConfig {
    #[serde(default)]
    pub client: ClientConfig,
    #[serde(default)]
    pub timeouts: TimeoutsConfig,
    #[serde(default)]
    pub cache: CacheConfig,
    /// Ceiling on outstanding external calls per fan-out.
    #[serde(default = "default_concurrency")]
    pub concurrency: usize,
}

fn default_concurrency() -> usize {
    6
}

impl Default for EngineConfig {
    fn default() -> Self {
        Self {
            client: ClientConfig::default(),
            timeouts: TimeoutsConfig::default(),
            cache: CacheConfig::default(),
            concurrency: default_concurrency(),
        }
    }
}

impl EngineConfig {
    /// Parses and validates a TOML document.
    pub fn from_toml(source: &str) -> Result<Self> {
        let config: EngineConfig =
            toml::from_str(source).map_err(|e| Error::Config(format!("invalid TOML: {}", e)))?;
        for warning in config.validate().into_result()? {
            tracing::warn!(warning = %warning, "configuration warning");
        }
        Ok(config)
    }

    /// Loads configuration from a TOML file.
    pub fn load(path: &Path) -> Result<Self> {
        let source = std::fs::read_to_string(path)?;
        Self::from_toml(&source)
    }

    /// Loads the per-user configuration file, or defaults if it does not exist.
    pub fn load_default() -> Result<Self> {
        match Self::default_path() {
            Some(path) if path.exists() => Self::load(&path),
            _ => Ok(Self::default()),
        }
    }

    /// Location of the per-user configuration file.
    pub fn default_path() -> Option<PathBuf> {
        dirs::config_dir().map(|dir| dir.join("wt-pr-status").join("config.toml"))
    }
}

/// Validation result containing all found issues.
#[derive(Debug, Clone, Default)]
pub struct ValidationResult {
    /// List of validation errors (fatal).
    pub errors: Vec<String>,
    /// List of validation warnings (non-fatal).
    pub warnings: Vec<String>,
}

impl ValidationResult {
    /// Returns true if validation passed (no errors).
    pub fn is_valid(&self) -> bool {
        self.errors.is_empty()
    }

    pub fn add_error(&mut self, msg: impl Into<String>) {
        self.errors.push(msg.into());
    }

    pub fn add_warning(&mut self, msg: impl Into<String>) {
        self.warnings.push(msg.into());
    }

    /// Converts to a Result, failing if there are errors.
    pub fn into_result(self) -> Result<Vec<String>> {
        if self.is_valid() {
            Ok(self.warnings)
        } else {
            Err(Error::Config(self.errors.join("; ")))
        }
    }
}

/// Trait for validatable configuration types.
pub trait Validate {
    /// Validates the configuration and returns any issues found.
    fn validate(&self) -> ValidationResult;
}

impl Validate for EngineConfig {
    fn validate(&self) -> ValidationResult {
        let mut result = ValidationResult::default();

        if self.concurrency == 0 {
            result.add_error("concurrency must be at least 1");
        }
        if self.concurrency > 16 {
            result.add_warning("concurrency above 16 may trip API rate limits");
        }

        if self.client.program.trim().is_empty() {
            result.add_error("client.program cannot be empty");
        }
        if self.client.list_limit == 0 {
            result.add_error("client.list_limit must be at least 1");
        }

        let t = &self.timeouts;
        if t.list_fallback_secs > t.list_primary_secs {
            result.add_error("timeouts.list_fallback_secs must not exceed list_primary_secs");
        }
        if t.view_fallback_secs > t.view_primary_secs {
            result.add_error("timeouts.view_fallback_secs must not exceed view_primary_secs");
        }
        if t.review_threads_secs == 0 || t.protection_secs == 0 || t.reviews_secs == 0 {
            result.add_warning("a zero enrichment timeout disables that enrichment");
        }

        let c = &self.cache;
        if c.status_line_stale_ttl_secs < c.status_line_ttl_secs {
            result.add_error(
                "cache.status_line_stale_ttl_secs must be at least status_line_ttl_secs",
            );
        }
        if c.branch_retain_secs < c.branch_ttl_secs {
            result.add_error("cache.branch_retain_secs must be at least branch_ttl_secs");
        }

        result
    }
}
