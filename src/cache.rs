//! Per-repository PR cache service.
//!
//! [`PrStatusService`] owns the in-memory cache for every repository it has
//! seen. Refreshes build a complete new snapshot set without holding the lock
//! and swap it in under one lock acquisition, so readers only ever see whole
//! snapshot sets. Failed refreshes never touch cached data, and a refresh
//! never replaces data from a refresh that started after it.

use std::collections::{BTreeSet, HashMap};
use std::path::{Path, PathBuf};
use std::sync::{Arc, Mutex, MutexGuard};
use std::time::Instant;

use chrono::{DateTime, Utc};

use crate::config::EngineConfig;
use crate::enrich::{self, fan_out};
use crate::error::{Error, Result};
use crate::gh::{self, GhClient};
use crate::snapshot::{sort_snapshots, PrSnapshot};

/// Result of a bulk list request.
#[derive(Debug)]
pub struct PrList {
    /// Best available snapshot set, possibly empty.
    pub prs: Arc<Vec<PrSnapshot>>,
    /// When `prs` was fetched, if ever.
    pub fetched_at: Option<DateTime<Utc>>,
    /// True when `prs` is older than the list TTL.
    pub stale: bool,
    /// The refresh error, if the latest attempt failed.
    pub error: Option<Error>,
}

/// Result of a per-branch lookup.
#[derive(Debug, Default)]
pub struct BranchLookup {
    /// Requested branches with a known answer. `None` means no PR exists.
    pub prs: HashMap<String, Option<PrSnapshot>>,
    /// The first fetch error, in branch-name order.
    pub error: Option<Error>,
}

impl BranchLookup {
    /// The PR for `branch`, if one is known to exist.
    pub fn pr(&self, branch: &str) -> Option<&PrSnapshot> {
        self.prs.get(branch).and_then(Option::as_ref)
    }
}

#[derive(Debug, Clone)]
struct ListEntry {
    prs: Arc<Vec<PrSnapshot>>,
    /// When the fetch that produced `prs` was issued.
    started: Instant,
    fetched: Instant,
    fetched_at: DateTime<Utc>,
    enriched: bool,
}

#[derive(Debug, Clone)]
struct BranchEntry {
    pr: Option<PrSnapshot>,
    started: Instant,
    fetched: Instant,
}

#[derive(Debug, Default)]
struct RepoCache {
    list: Option<ListEntry>,
    branches: Arc<HashMap<String, BranchEntry>>,
}

/// Serves PR status for any number of repositories.
pub struct PrStatusService {
    client: Arc<dyn GhClient>,
    config: EngineConfig,
    repos: Mutex<HashMap<PathBuf, RepoCache>>,
}

impl PrStatusService {
    /// Creates a service with an empty cache.
    pub fn new(client: Arc<dyn GhClient>, config: EngineConfig) -> Self {
        Self {
            client,
            config,
            repos: Mutex::new(HashMap::new()),
        }
    }

    /// Returns the engine configuration.
    pub fn config(&self) -> &EngineConfig {
        &self.config
    }

    fn lock(&self) -> MutexGuard<'_, HashMap<PathBuf, RepoCache>> {
        // A panic while holding the lock cannot leave a half-swapped entry.
        self.repos.lock().unwrap_or_else(|poisoned| poisoned.into_inner())
    }

    /// Lists the author's PRs with statuses from the listing alone.
    pub async fn list_prs(&self, repo_root: &Path, force: bool) -> PrList {
        self.list(repo_root, force, false).await
    }

    /// Lists the author's PRs with protection, approval, and comment data.
    pub async fn list_prs_enriched(&self, repo_root: &Path, force: bool) -> PrList {
        self.list(repo_root, force, true).await
    }

    async fn list(&self, repo_root: &Path, force: bool, enriched: bool) -> PrList {
        let cached = self
            .lock()
            .get(repo_root)
            .and_then(|repo| repo.list.clone());
        let ttl = self.config.cache.list_ttl();

        if !force {
            if let Some(entry) = &cached {
                if entry.fetched.elapsed() < ttl && (entry.enriched || !enriched) {
                    tracing::debug!(repo = ?repo_root, "serving cached PR list");
                    return PrList {
                        prs: Arc::clone(&entry.prs),
                        fetched_at: Some(entry.fetched_at),
                        stale: false,
                        error: None,
                    };
                }
            }
        }

        let started = Instant::now();
        let fetched = gh::list_prs(self.client.as_ref(), repo_root, &self.config).await;
        let prs = match fetched {
            Ok(prs) => prs,
            Err(e) if e.is_environment() => {
                return PrList {
                    prs: Arc::new(Vec::new()),
                    fetched_at: None,
                    stale: false,
                    error: Some(e),
                };
            }
            Err(e) => {
                tracing::warn!(repo = ?repo_root, error = %e, "PR list refresh failed");
                return match cached {
                    Some(entry) => PrList {
                        prs: entry.prs,
                        fetched_at: Some(entry.fetched_at),
                        stale: entry.fetched.elapsed() >= ttl,
                        error: Some(e),
                    },
                    None => PrList {
                        prs: Arc::new(Vec::new()),
                        fetched_at: None,
                        stale: false,
                        error: Some(e),
                    },
                };
            }
        };

        let mut prs = if enriched {
            enrich::enrich(Arc::clone(&self.client), repo_root, &self.config, prs).await
        } else {
            prs
        };
        sort_snapshots(&mut prs);

        let entry = ListEntry {
            prs: Arc::new(prs),
            started,
            fetched: Instant::now(),
            fetched_at: Utc::now(),
            enriched,
        };
        let entry = {
            let mut repos = self.lock();
            let repo = repos.entry(repo_root.to_path_buf()).or_default();
            let newer = repo
                .list
                .as_ref()
                .filter(|current| current.started > entry.started)
                .cloned();
            match newer {
                Some(current) => {
                    tracing::debug!(repo = ?repo_root, "PR list overtaken by a newer refresh");
                    current
                }
                None => {
                    repo.list = Some(entry.clone());
                    tracing::debug!(repo = ?repo_root, count = entry.prs.len(), enriched, "swapped PR list");
                    entry
                }
            }
        };

        PrList {
            prs: entry.prs,
            fetched_at: Some(entry.fetched_at),
            stale: false,
            error: None,
        }
    }

    /// Looks up the PR for each branch.
    ///
    /// Blank and `detached` names are dropped. Branches with a fresh cached
    /// answer are not refetched unless `force` is set. Branches whose fetch
    /// fails keep any previously cached answer.
    pub async fn prs_for_branches<I, S>(&self, repo_root: &Path, branches: I, force: bool) -> BranchLookup
    where
        I: IntoIterator<Item = S>,
        S: AsRef<str>,
    {
        let wanted = normalize_branches(branches);
        if wanted.is_empty() {
            return BranchLookup::default();
        }

        let cached = self
            .lock()
            .get(repo_root)
            .map(|repo| Arc::clone(&repo.branches))
            .unwrap_or_default();
        let ttl = self.config.cache.branch_ttl();

        let to_fetch: Vec<String> = wanted
            .iter()
            .filter(|branch| {
                force
                    || cached
                        .get(branch.as_str())
                        .map_or(true, |entry| entry.fetched.elapsed() >= ttl)
            })
            .cloned()
            .collect();

        let started = Instant::now();
        let mut results: Vec<(String, Result<Option<PrSnapshot>>)> = Vec::new();
        if !to_fetch.is_empty() {
            let jobs: Vec<_> = to_fetch
                .into_iter()
                .map(|branch| {
                    let client = Arc::clone(&self.client);
                    let repo_root = repo_root.to_path_buf();
                    let config = self.config.clone();
                    async move {
                        let result = gh::view_pr(client.as_ref(), &repo_root, &branch, &config).await;
                        (branch, result)
                    }
                })
                .collect();
            fan_out(self.config.concurrency, jobs, |result| results.push(result)).await;
        }
        results.sort_by(|a, b| a.0.cmp(&b.0));

        let mut error = None;
        let mut found = Vec::new();
        let mut negatives = Vec::new();
        for (branch, result) in results {
            match result {
                Ok(Some(pr)) => found.push((branch, pr)),
                Ok(None) => negatives.push(branch),
                Err(e) => {
                    tracing::warn!(branch = %branch, error = %e, "branch PR lookup failed");
                    if error.is_none() {
                        error = Some(e);
                    }
                }
            }
        }

        if error.as_ref().is_some_and(Error::is_environment) {
            return BranchLookup {
                prs: HashMap::new(),
                error,
            };
        }

        let branch_names: Vec<String> = found.iter().map(|(b, _)| b.clone()).collect();
        let enriched = enrich::enrich(
            Arc::clone(&self.client),
            repo_root,
            &self.config,
            found.into_iter().map(|(_, pr)| pr).collect(),
        )
        .await;

        let now = Instant::now();
        let mut fresh: Vec<(String, BranchEntry)> = branch_names
            .into_iter()
            .zip(enriched)
            .map(|(branch, pr)| {
                let entry = BranchEntry {
                    pr: Some(pr),
                    started,
                    fetched: now,
                };
                (branch, entry)
            })
            .collect();
        fresh.extend(negatives.into_iter().map(|branch| {
            let entry = BranchEntry {
                pr: None,
                started,
                fetched: now,
            };
            (branch, entry)
        }));

        let merged = if fresh.is_empty() {
            cached
        } else {
            let mut repos = self.lock();
            let repo = repos.entry(repo_root.to_path_buf()).or_default();
            let mut map = HashMap::clone(&repo.branches);
            for (branch, entry) in fresh {
                let overtaken = map
                    .get(&branch)
                    .is_some_and(|current| current.started > entry.started);
                if overtaken {
                    tracing::debug!(branch = %branch, "branch entry overtaken by a newer refresh");
                } else {
                    map.insert(branch, entry);
                }
            }
            let retain = self.config.cache.branch_retain();
            let before = map.len();
            map.retain(|branch, entry| wanted.contains(branch) || entry.fetched.elapsed() < retain);
            if map.len() < before {
                tracing::debug!(repo = ?repo_root, evicted = before - map.len(), "evicted old branch entries");
            }
            let map = Arc::new(map);
            repo.branches = Arc::clone(&map);
            map
        };

        let prs = wanted
            .into_iter()
            .filter_map(|branch| {
                let pr = merged.get(&branch)?.pr.clone();
                Some((branch, pr))
            })
            .collect();

        BranchLookup { prs, error }
    }

    /// Returns the cached list without touching the network.
    pub fn cached_list(&self, repo_root: &Path) -> Option<Arc<Vec<PrSnapshot>>> {
        self.lock()
            .get(repo_root)
            .and_then(|repo| repo.list.as_ref().map(|entry| Arc::clone(&entry.prs)))
    }

    /// Returns the cached answer for one branch without touching the network.
    ///
    /// The outer `None` means nothing is cached; `Some(None)` is a cached
    /// "no PR" answer.
    pub fn cached_branch(&self, repo_root: &Path, branch: &str) -> Option<Option<PrSnapshot>> {
        self.lock()
            .get(repo_root)
            .and_then(|repo| repo.branches.get(branch).map(|entry| entry.pr.clone()))
    }

    /// Drops everything cached for a repository.
    pub fn invalidate(&self, repo_root: &Path) {
        if self.lock().remove(repo_root).is_some() {
            tracing::debug!(repo = ?repo_root, "invalidated PR cache");
        }
    }
}

/// Deduplicates branch names and drops blank or detached entries.
fn normalize_branches<I, S>(branches: I) -> BTreeSet<String>
where
    I: IntoIterator<Item = S>,
    S: AsRef<str>,
{
    branches
        .into_iter()
        .map(|b| b.as_ref().trim().to_string())
        .filter(|b| !b.is_empty() && !b.eq_ignore_ascii_case("detached"))
        .collect()
}
