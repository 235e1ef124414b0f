//! Crawl scheduler
//!
//! This module handles:
//! - Creating jobs and keeping a registry of them
//! - Running a fixed pool of async workers per job over its frontier
//! - Per-URL processing: robots gate, conditional fetch, persistence,
//!   embedding submission and link discovery
//! - Closing a job out: stats merge, job totals, buffer flush

use crate::config::{validate, Config, CrawlerConfig};
use crate::crawler::job::{Dequeue, Job, JobSnapshot, JobStatus, UrlOutcome};
use crate::crawler::parser::{extract_links, is_html, text_for_embedding};
use crate::crawler::{FetchOptions, HttpTransport};
use crate::embedding::{Embedder, EmbeddingQueue};
use crate::robots::RobotsEvaluator;
use crate::storage::{content_hash, CorpusStats, FlushCounts, PageRecord, SqliteStore, Storage};
use crate::{HarvestError, Result};
use chrono::Utc;
use std::collections::HashMap;
use std::path::Path;
use std::sync::{Arc, RwLock};
use std::time::Duration;
use tokio::task::{JoinHandle, JoinSet};
use url::Url;
use uuid::Uuid;

/// Owns the shared collaborators and every job created through it
///
/// The transport (with its DNS and metadata caches), the robots evaluator,
/// the store and the embedding queue are shared by all jobs.
pub struct Scheduler {
    config: CrawlerConfig,
    transport: Arc<HttpTransport>,
    robots: Arc<RobotsEvaluator>,
    store: Arc<dyn Storage>,
    embeddings: Arc<EmbeddingQueue>,
    jobs: RwLock<HashMap<Uuid, Arc<Job>>>,
}

impl Scheduler {
    pub fn new(
        config: CrawlerConfig,
        transport: Arc<HttpTransport>,
        robots: Arc<RobotsEvaluator>,
        store: Arc<dyn Storage>,
        embeddings: Arc<EmbeddingQueue>,
    ) -> Self {
        Self {
            config,
            transport,
            robots,
            store,
            embeddings,
            jobs: RwLock::new(HashMap::new()),
        }
    }

    /// Wires a scheduler from configuration around an existing store
    ///
    /// The configuration is validated first.
    pub fn build(config: &Config, store: Arc<dyn Storage>, embedder: Arc<dyn Embedder>) -> Result<Self> {
        validate(config)?;
        let transport = Arc::new(HttpTransport::new(&config.transport)?);
        let robots = Arc::new(RobotsEvaluator::new(&config.robots, Arc::clone(&transport)));
        let embeddings = Arc::new(EmbeddingQueue::new(
            &config.embeddings,
            embedder,
            Arc::clone(&store),
        ));

        Ok(Self::new(
            config.crawler.clone(),
            transport,
            robots,
            store,
            embeddings,
        ))
    }

    /// Wires a scheduler from configuration, opening the configured database
    pub fn open(config: &Config, embedder: Arc<dyn Embedder>) -> Result<Self> {
        let store = SqliteStore::open(
            Path::new(&config.storage.database_path),
            config.storage.batch_size,
        )?;
        Self::build(config, Arc::new(store), embedder)
    }

    pub fn transport(&self) -> &Arc<HttpTransport> {
        &self.transport
    }

    pub fn store(&self) -> &Arc<dyn Storage> {
        &self.store
    }

    pub fn embeddings(&self) -> &Arc<EmbeddingQueue> {
        &self.embeddings
    }

    /// Creates and registers a pending job
    ///
    /// # Arguments
    ///
    /// * `seeds` - Seed URLs as supplied by the caller
    /// * `max_pages` - Page budget; the configured default when `None`
    /// * `dry_run` - Persist metadata only
    ///
    /// # Errors
    ///
    /// Seed validation errors; no job is registered in that case.
    pub fn create_job<S: AsRef<str>>(
        &self,
        seeds: &[S],
        max_pages: Option<usize>,
        dry_run: bool,
    ) -> Result<Arc<Job>> {
        let max_pages = max_pages.unwrap_or(self.config.default_max_pages);
        let job = Arc::new(Job::new(seeds, max_pages, dry_run)?);

        self.jobs
            .write()
            .unwrap_or_else(|e| e.into_inner())
            .insert(job.id(), Arc::clone(&job));

        tracing::info!(
            "Created job {} with {} seed(s), max_pages={}, dry_run={}",
            job.id(),
            job.seeds().len(),
            max_pages,
            dry_run
        );
        Ok(job)
    }

    /// Runs `job` to a terminal state and returns its final snapshot
    ///
    /// # Process
    ///
    /// 1. Mark the job running and record its row
    /// 2. Run the worker pool until every worker exits
    /// 3. A worker error or panic fails the job
    /// 4. Flush embeddings, merge counters, write totals, flush the store
    pub async fn run_job(&self, job: Arc<Job>) -> JobSnapshot {
        job.start();
        tracing::info!("Job {} running with {} worker(s)", job.id(), self.worker_count());

        if let Err(e) = self.store.update_job_totals(&job.snapshot()) {
            tracing::error!("Job {}: failed to record job row: {}", job.id(), e);
            job.fail(format!("storage: {}", e));
        }

        let mut workers = JoinSet::new();
        if job.status() == JobStatus::Running {
            for worker_id in 0..self.worker_count() {
                let worker = Worker {
                    id: worker_id,
                    job: Arc::clone(&job),
                    transport: Arc::clone(&self.transport),
                    robots: Arc::clone(&self.robots),
                    store: Arc::clone(&self.store),
                    embeddings: Arc::clone(&self.embeddings),
                    idle_backoff: Duration::from_millis(self.config.idle_backoff_ms.max(1)),
                    max_idle_backoff: Duration::from_millis(
                        self.config
                            .max_idle_backoff_ms
                            .max(self.config.idle_backoff_ms.max(1)),
                    ),
                };
                workers.spawn(worker.run());
            }
        }

        while let Some(joined) = workers.join_next().await {
            match joined {
                Ok(Ok(())) => {}
                Ok(Err(e)) => {
                    tracing::error!("Job {}: worker failed: {}", job.id(), e);
                    job.fail(e.to_string());
                }
                Err(e) => {
                    tracing::error!("Job {}: worker task aborted: {}", job.id(), e);
                    job.fail(HarvestError::Worker(e.to_string()).to_string());
                }
            }
        }

        self.finish(&job);

        let snapshot = job.snapshot();
        tracing::info!(
            "Job {} {}: fetched={} skipped={} errors={} bytes={} in {}ms",
            snapshot.id,
            snapshot.status,
            snapshot.stats.fetched,
            snapshot.stats.skipped,
            snapshot.stats.errors,
            snapshot.stats.bytes,
            snapshot.stats.duration_ms
        );
        snapshot
    }

    fn worker_count(&self) -> usize {
        self.config.concurrency.max(1)
    }

    fn finish(&self, job: &Job) {
        if let Err(e) = self.embeddings.flush() {
            tracing::error!("Job {}: embedding flush failed: {}", job.id(), e);
            job.fail(format!("embedding flush: {}", e));
        }

        job.finalize(self.transport.dns_stats(), self.embeddings.stats());

        if let Err(e) = self.store.flush_all() {
            tracing::error!("Job {}: store flush failed: {}", job.id(), e);
            job.fail(format!("storage: {}", e));
        }

        if let Err(e) = self.store.update_job_totals(&job.snapshot()) {
            tracing::error!("Job {}: failed to write job totals: {}", job.id(), e);
            job.fail(format!("storage: {}", e));
        }
    }

    /// Runs `job` on its own task
    pub fn spawn_job(self: &Arc<Self>, job: Arc<Job>) -> JoinHandle<JobSnapshot> {
        let scheduler = Arc::clone(self);
        tokio::spawn(async move { scheduler.run_job(job).await })
    }

    /// Creates a job and runs it to completion
    pub async fn crawl<S: AsRef<str>>(
        &self,
        seeds: &[S],
        max_pages: Option<usize>,
        dry_run: bool,
    ) -> Result<JobSnapshot> {
        let job = self.create_job(seeds, max_pages, dry_run)?;
        Ok(self.run_job(job).await)
    }

    /// Looks a job up, in memory first and then in the store
    pub fn job(&self, id: Uuid) -> Result<Option<JobSnapshot>> {
        let in_memory = self
            .jobs
            .read()
            .unwrap_or_else(|e| e.into_inner())
            .get(&id)
            .map(|job| job.snapshot());

        match in_memory {
            Some(snapshot) => Ok(Some(snapshot)),
            None => Ok(self.store.get_job(id)?),
        }
    }

    /// Snapshots of every job created by this scheduler
    pub fn jobs(&self) -> Vec<JobSnapshot> {
        let mut snapshots: Vec<JobSnapshot> = self
            .jobs
            .read()
            .unwrap_or_else(|e| e.into_inner())
            .values()
            .map(|job| job.snapshot())
            .collect();
        snapshots.sort_by_key(|s| s.created_at);
        snapshots
    }

    pub fn corpus_stats(&self) -> Result<CorpusStats> {
        Ok(self.store.corpus_stats()?)
    }

    /// Drains the embedding queue and flushes every store buffer
    pub fn shutdown(&self) -> Result<FlushCounts> {
        self.embeddings.flush()?;
        let counts = self.store.shutdown()?;
        tracing::info!(
            "Flushed {} page(s) and {} embedding(s) on shutdown",
            counts.pages,
            counts.embeddings
        );
        Ok(counts)
    }
}

/// Releases the job's in-flight slot however processing ends
struct InFlight<'a> {
    job: &'a Job,
    url: &'a Url,
}

impl Drop for InFlight<'_> {
    fn drop(&mut self) {
        if std::thread::panicking() {
            self.job
                .fail(format!("worker panicked while processing {}", self.url));
        }
        self.job.finish_url();
    }
}

struct Worker {
    id: usize,
    job: Arc<Job>,
    transport: Arc<HttpTransport>,
    robots: Arc<RobotsEvaluator>,
    store: Arc<dyn Storage>,
    embeddings: Arc<EmbeddingQueue>,
    idle_backoff: Duration,
    max_idle_backoff: Duration,
}

impl Worker {
    async fn run(self) -> Result<()> {
        let mut backoff = self.idle_backoff;

        loop {
            match self.job.next_url() {
                Dequeue::Url(url) => {
                    backoff = self.idle_backoff;
                    let _slot = InFlight {
                        job: &self.job,
                        url: &url,
                    };
                    self.process_url(&url).await?;
                }
                Dequeue::Wait => {
                    tokio::time::sleep(backoff).await;
                    backoff = (backoff * 2).min(self.max_idle_backoff);
                }
                Dequeue::Done => break,
            }
        }

        tracing::trace!("Job {}: worker {} exiting", self.job.id(), self.id);
        Ok(())
    }

    async fn process_url(&self, url: &Url) -> Result<()> {
        let job = &self.job;

        if !job.mark_visited(url) {
            job.record(UrlOutcome::Skipped);
            return Ok(());
        }

        if !self.robots.is_allowed(url).await {
            tracing::debug!("Disallowed by robots.txt: {}", url);
            job.record(UrlOutcome::Disallowed);
            return Ok(());
        }

        let response = match self.transport.fetch(url, FetchOptions::conditional()).await {
            Ok(response) => response,
            Err(e) => {
                tracing::warn!("Fetch failed for {} [{}]: {}", url, e.code(), e);
                job.record(UrlOutcome::Error);
                return Ok(());
            }
        };

        if response.not_modified {
            tracing::debug!("Not modified: {}", url);
            job.record(UrlOutcome::NotModified);
            return Ok(());
        }

        if !response.is_success() {
            tracing::debug!("HTTP {} for {}", response.status, url);
            job.record(UrlOutcome::Error);
            self.store
                .queue_page(PageRecord::status_only(job.id(), url.as_str(), response.status))?;
            return Ok(());
        }

        let bytes = response.body.len() as u64;
        let content_type = response.content_type();
        job.record(UrlOutcome::Fetched { bytes });

        let record = PageRecord {
            job_id: job.id(),
            url: url.to_string(),
            status: response.status,
            content_type: content_type.clone(),
            content_length: Some(bytes),
            fetched_at: Utc::now(),
            etag: response.etag(),
            last_modified: response.last_modified(),
            content: if job.is_dry_run() {
                None
            } else {
                Some(response.body.clone())
            },
            content_hash: Some(content_hash(&response.body)),
        };
        self.store.queue_page(record)?;

        if !job.is_dry_run() {
            if let Some(text) = text_for_embedding(content_type.as_deref(), &response.body) {
                self.embeddings.enqueue(job.id(), url.as_str(), text)?;
            }
        }

        if is_html(content_type.as_deref()) {
            let html = String::from_utf8_lossy(&response.body);
            // Relative links resolve against the final URL after redirects
            let accepted = job.enqueue_links(extract_links(&html, &response.url));
            tracing::debug!("Fetched {} ({} bytes), queued {} link(s)", url, bytes, accepted);
        } else {
            tracing::debug!("Fetched {} ({} bytes)", url, bytes);
        }

        Ok(())
    }
}
