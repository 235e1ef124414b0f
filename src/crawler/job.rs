//! Crawl job model
//!
//! A [`Job`] owns the frontier, visited set and enqueued set of one crawl run.
//! All three live behind a single mutex together with the counters, so a URL
//! can never be dequeued twice and a link can never be counted twice.

use crate::crawler::dns::DnsStats;
use crate::embedding::EmbeddingStats;
use crate::url::{host_of, normalize_url};
use crate::{HarvestError, Result};
use chrono::{DateTime, Utc};
use serde::{Deserialize, Serialize};
use std::collections::{BTreeSet, HashSet, VecDeque};
use std::fmt;
use std::sync::{Mutex, MutexGuard};
use std::time::Instant;
use url::Url;
use uuid::Uuid;

/// Lifecycle state of a job
///
/// ```text
/// pending → running → completed | cancelled | failed
/// ```
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize, Deserialize)]
#[serde(rename_all = "lowercase")]
pub enum JobStatus {
    Pending,
    Running,
    /// Frontier exhausted with no work in flight
    Completed,
    /// Page budget reached before the frontier was exhausted
    Cancelled,
    /// Unrecoverable scheduler or storage error
    Failed,
}

impl JobStatus {
    pub fn is_terminal(&self) -> bool {
        matches!(self, Self::Completed | Self::Cancelled | Self::Failed)
    }

    /// Converts the status to its database string representation
    pub fn to_db_string(&self) -> &'static str {
        match self {
            Self::Pending => "pending",
            Self::Running => "running",
            Self::Completed => "completed",
            Self::Cancelled => "cancelled",
            Self::Failed => "failed",
        }
    }

    /// Parses a status from its database string representation
    pub fn from_db_string(s: &str) -> Option<Self> {
        match s {
            "pending" => Some(Self::Pending),
            "running" => Some(Self::Running),
            "completed" => Some(Self::Completed),
            "cancelled" => Some(Self::Cancelled),
            "failed" => Some(Self::Failed),
            _ => None,
        }
    }
}

impl fmt::Display for JobStatus {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(f, "{}", self.to_db_string())
    }
}

/// Cumulative counters for a job
#[derive(Debug, Clone, Copy, Default, PartialEq, Eq, Serialize, Deserialize)]
pub struct JobStats {
    pub fetched: u64,
    pub skipped: u64,
    pub errors: u64,
    pub bytes: u64,
    pub not_modified: u64,
    pub disallowed: u64,
    pub queued: u64,
    pub duration_ms: u64,
    pub dns_hits: u64,
    pub dns_misses: u64,
    pub embeddings_queued: u64,
    pub embeddings_embedded: u64,
    pub embeddings_failed: u64,
}

/// Read-only view of a job handed to callers
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct JobSnapshot {
    pub id: Uuid,
    pub status: JobStatus,
    pub seeds: Vec<String>,
    pub allowed_hosts: Vec<String>,
    pub max_pages: usize,
    pub dry_run: bool,
    pub created_at: DateTime<Utc>,
    pub started_at: Option<DateTime<Utc>>,
    pub finished_at: Option<DateTime<Utc>>,
    pub stats: JobStats,
    pub failure: Option<String>,
}

/// What happened to a dequeued URL
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum UrlOutcome {
    /// Already visited
    Skipped,
    /// Blocked by robots.txt
    Disallowed,
    /// Server answered `304`
    NotModified,
    /// Transport failure or non-2xx status
    Error,
    /// Successful fetch of `bytes` body bytes
    Fetched { bytes: u64 },
}

/// Result of asking a job for work
#[derive(Debug, Clone, PartialEq, Eq)]
pub enum Dequeue {
    /// Process this URL, then call [`Job::finish_url`]
    Url(Url),
    /// Nothing available right now but peers may still add work
    Wait,
    /// The worker should exit
    Done,
}

#[derive(Debug)]
struct JobState {
    status: JobStatus,
    frontier: VecDeque<Url>,
    visited: HashSet<String>,
    enqueued: HashSet<String>,
    in_flight: usize,
    stats: JobStats,
    started_at: Option<DateTime<Utc>>,
    started: Option<Instant>,
    finished_at: Option<DateTime<Utc>>,
    failure: Option<String>,
}

/// One crawl run
#[derive(Debug)]
pub struct Job {
    id: Uuid,
    seeds: Vec<Url>,
    allowed_hosts: BTreeSet<String>,
    max_pages: usize,
    dry_run: bool,
    created_at: DateTime<Utc>,
    state: Mutex<JobState>,
}

/// Normalizes and deduplicates seeds, returning them with their host set
///
/// # Errors
///
/// * `HarvestError::SeedsRequired` - `seeds` is empty
/// * `HarvestError::InvalidSeed` - a seed is not an absolute http(s) URL
pub fn normalize_seeds<S: AsRef<str>>(seeds: &[S]) -> Result<(Vec<Url>, BTreeSet<String>)> {
    if seeds.is_empty() {
        return Err(HarvestError::SeedsRequired);
    }

    let mut normalized: Vec<Url> = Vec::new();
    let mut hosts = BTreeSet::new();

    for seed in seeds {
        let seed = seed.as_ref();
        let url = normalize_url(seed.trim()).map_err(|e| HarvestError::InvalidSeed {
            seed: seed.to_string(),
            reason: e.to_string(),
        })?;
        let host = host_of(&url).ok_or_else(|| HarvestError::InvalidSeed {
            seed: seed.to_string(),
            reason: "missing host".to_string(),
        })?;

        hosts.insert(host);
        if !normalized.contains(&url) {
            normalized.push(url);
        }
    }

    Ok((normalized, hosts))
}

impl Job {
    /// Creates a pending job from raw seed strings
    ///
    /// The frontier starts with the normalized seeds in order, and each seed
    /// counts toward the `queued` stat.
    pub fn new<S: AsRef<str>>(seeds: &[S], max_pages: usize, dry_run: bool) -> Result<Self> {
        if max_pages == 0 {
            return Err(HarvestError::InvalidMaxPages);
        }

        let (seeds, allowed_hosts) = normalize_seeds(seeds)?;

        let frontier: VecDeque<Url> = seeds.iter().cloned().collect();
        let enqueued: HashSet<String> = seeds.iter().map(|u| u.to_string()).collect();
        let stats = JobStats {
            queued: seeds.len() as u64,
            ..JobStats::default()
        };

        Ok(Self {
            id: Uuid::new_v4(),
            seeds,
            allowed_hosts,
            max_pages,
            dry_run,
            created_at: Utc::now(),
            state: Mutex::new(JobState {
                status: JobStatus::Pending,
                frontier,
                visited: HashSet::new(),
                enqueued,
                in_flight: 0,
                stats,
                started_at: None,
                started: None,
                finished_at: None,
                failure: None,
            }),
        })
    }

    fn state(&self) -> MutexGuard<'_, JobState> {
        self.state.lock().unwrap_or_else(|e| e.into_inner())
    }

    pub fn id(&self) -> Uuid {
        self.id
    }

    pub fn seeds(&self) -> &[Url] {
        &self.seeds
    }

    pub fn allowed_hosts(&self) -> &BTreeSet<String> {
        &self.allowed_hosts
    }

    pub fn max_pages(&self) -> usize {
        self.max_pages
    }

    pub fn is_dry_run(&self) -> bool {
        self.dry_run
    }

    pub fn created_at(&self) -> DateTime<Utc> {
        self.created_at
    }

    pub fn status(&self) -> JobStatus {
        self.state().status
    }

    pub fn stats(&self) -> JobStats {
        self.state().stats
    }

    /// Moves a pending job to running
    pub fn start(&self) {
        let mut state = self.state();
        if state.status == JobStatus::Pending {
            state.status = JobStatus::Running;
            state.started_at = Some(Utc::now());
            state.started = Some(Instant::now());
        }
    }

    /// Hands the next frontier URL to a worker
    ///
    /// # Decision Order
    ///
    /// 1. Terminal job → `Done`
    /// 2. `fetched >= max_pages` → mark cancelled if work remains, `Done`
    /// 3. `fetched + in_flight >= max_pages` → `Wait` (the budget is reserved)
    /// 4. Frontier non-empty → pop the head (FIFO), `Url`
    /// 5. Frontier empty with peers in flight → `Wait`, otherwise `Done`
    pub fn next_url(&self) -> Dequeue {
        let mut state = self.state();

        if state.status.is_terminal() {
            return Dequeue::Done;
        }

        let fetched = state.stats.fetched as usize;
        if fetched >= self.max_pages {
            if !state.frontier.is_empty() {
                state.status = JobStatus::Cancelled;
            }
            return Dequeue::Done;
        }

        if fetched + state.in_flight >= self.max_pages {
            return Dequeue::Wait;
        }

        match state.frontier.pop_front() {
            Some(url) => {
                state.in_flight += 1;
                Dequeue::Url(url)
            }
            None if state.in_flight > 0 => Dequeue::Wait,
            None => Dequeue::Done,
        }
    }

    /// Releases the in-flight slot taken by [`Job::next_url`]
    pub fn finish_url(&self) {
        let mut state = self.state();
        state.in_flight = state.in_flight.saturating_sub(1);
    }

    /// Marks `url` visited; returns false if it already was
    pub fn mark_visited(&self, url: &Url) -> bool {
        self.state().visited.insert(url.to_string())
    }

    pub fn is_visited(&self, url: &Url) -> bool {
        self.state().visited.contains(url.as_str())
    }

    /// Applies the stat changes for one processed URL
    pub fn record(&self, outcome: UrlOutcome) {
        let mut state = self.state();
        let stats = &mut state.stats;

        match outcome {
            UrlOutcome::Skipped => stats.skipped += 1,
            UrlOutcome::Disallowed => {
                stats.disallowed += 1;
                stats.skipped += 1;
            }
            UrlOutcome::NotModified => {
                stats.not_modified += 1;
                stats.skipped += 1;
            }
            UrlOutcome::Error => stats.errors += 1,
            UrlOutcome::Fetched { bytes } => {
                stats.fetched += 1;
                stats.bytes += bytes;
            }
        }
    }

    /// Appends in-scope, never-seen links to the frontier tail
    ///
    /// Stops once `fetched + frontier length` reaches the page budget.
    /// Returns the number of links accepted.
    pub fn enqueue_links<I>(&self, links: I) -> usize
    where
        I: IntoIterator<Item = Url>,
    {
        let mut state = self.state();
        let mut accepted = 0;

        for link in links {
            if state.stats.fetched as usize + state.frontier.len() >= self.max_pages {
                break;
            }

            if !matches!(link.scheme(), "http" | "https") {
                continue;
            }

            let in_scope = host_of(&link)
                .map(|host| self.allowed_hosts.contains(&host))
                .unwrap_or(false);
            if !in_scope {
                continue;
            }

            if !state.enqueued.insert(link.to_string()) {
                continue;
            }

            state.frontier.push_back(link);
            state.stats.queued += 1;
            accepted += 1;
        }

        accepted
    }

    /// Marks the job failed with `message`
    pub fn fail(&self, message: impl Into<String>) {
        let mut state = self.state();
        state.status = JobStatus::Failed;
        state.failure = Some(message.into());
        if state.finished_at.is_none() {
            state.finished_at = Some(Utc::now());
        }
        if let Some(started) = state.started {
            state.stats.duration_ms = started.elapsed().as_millis() as u64;
        }
    }

    /// Closes out the job after its workers exited
    ///
    /// A job still `running` becomes `completed`; `cancelled` and `failed`
    /// are kept. The duration is computed and shared-cache and embedding
    /// counters are merged into the stats.
    pub fn finalize(&self, dns: DnsStats, embeddings: EmbeddingStats) {
        let mut state = self.state();

        if !state.status.is_terminal() {
            state.status = JobStatus::Completed;
        }

        if let Some(started) = state.started {
            state.stats.duration_ms = started.elapsed().as_millis() as u64;
        }
        state.finished_at = Some(Utc::now());

        state.stats.dns_hits = dns.hits;
        state.stats.dns_misses = dns.misses;
        state.stats.embeddings_queued = embeddings.queued;
        state.stats.embeddings_embedded = embeddings.embedded;
        state.stats.embeddings_failed = embeddings.failed;
    }

    pub fn snapshot(&self) -> JobSnapshot {
        let state = self.state();

        JobSnapshot {
            id: self.id,
            status: state.status,
            seeds: self.seeds.iter().map(|u| u.to_string()).collect(),
            allowed_hosts: self.allowed_hosts.iter().cloned().collect(),
            max_pages: self.max_pages,
            dry_run: self.dry_run,
            created_at: self.created_at,
            started_at: state.started_at,
            finished_at: state.finished_at,
            stats: state.stats,
            failure: state.failure.clone(),
        }
    }
}
