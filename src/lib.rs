//! wt-pr-status - pull request status for git worktree managers
//!
//! This library merges PR metadata, CI rollups, review decisions, branch
//! protection, and review-thread counts into one canonical status per PR, and
//! caches the result so interactive views and status lines never block on a
//! slow network.

pub mod cache;
pub mod ci;
pub mod config;
pub mod disk_cache;
pub mod enrich;
pub mod error;
pub mod gh;
pub mod review;
pub mod snapshot;
pub mod status;
pub mod statusline;

pub use cache::{BranchLookup, PrList, PrStatusService};
pub use ci::{summarize_ci, CheckEntry, CiState, CiSummary};
pub use config::{CacheConfig, ClientConfig, EngineConfig, TimeoutsConfig, Validate, ValidationResult};
pub use disk_cache::{DiskStatusCache, StatusCacheRecord};
pub use error::{Error, Result};
pub use gh::{GhCli, GhClient, GhOutput};
pub use review::{has_sufficient_approvals, ReviewDecision, ReviewResolution};
pub use snapshot::{BaseState, CanonicalStatus, CommentCounts, PrSnapshot};
pub use status::{canonical_status, StatusInputs};
pub use statusline::{summarize, StatusLine, NO_PR, PLACEHOLDER};
