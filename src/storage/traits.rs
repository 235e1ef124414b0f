//! Storage traits and error types
//!
//! This module defines the trait interface for storage backends and
//! associated error types.

use crate::crawler::JobSnapshot;
use crate::storage::{CorpusStats, EmbeddingRecord, FlushCounts, PageRecord, SearchHit};
use thiserror::Error;
use uuid::Uuid;

/// Errors that can occur during storage operations
#[derive(Debug, Error)]
pub enum StorageError {
    #[error("Serialization error: {0}")]
    Serialization(String),

    #[error("SQLite error: {0}")]
    Sqlite(#[from] rusqlite::Error),
}

impl From<serde_json::Error> for StorageError {
    fn from(err: serde_json::Error) -> Self {
        Self::Serialization(err.to_string())
    }
}

/// Result type for storage operations
pub type StorageResult<T> = Result<T, StorageError>;

/// Trait for storage backend implementations
///
/// Writes are buffered and persisted in batches; reads only see what has
/// been flushed. Implementations must be shareable across worker tasks.
pub trait Storage: Send + Sync {
    // ===== Buffered Writes =====

    /// Buffers a page record, flushing the page buffer when it is full
    ///
    /// # Errors
    ///
    /// Returns the flush error if an automatic flush fails; the batch stays
    /// buffered.
    fn queue_page(&self, record: PageRecord) -> StorageResult<()>;

    /// Buffers an embedding record, flushing the embedding buffer when full
    fn queue_embedding(&self, record: EmbeddingRecord) -> StorageResult<()>;

    /// Persists every buffered record
    ///
    /// Each buffer is written in one transaction with upsert semantics keyed
    /// by (job id, URL). A failed transaction is rolled back as a whole.
    fn flush_all(&self) -> StorageResult<FlushCounts>;

    /// Number of buffered (page, embedding) records not yet persisted
    fn pending(&self) -> (usize, usize);

    /// Flushes before the owning process exits
    fn shutdown(&self) -> StorageResult<FlushCounts> {
        self.flush_all()
    }

    // ===== Jobs =====

    /// Inserts or replaces the job row with the snapshot's status and totals
    fn update_job_totals(&self, job: &JobSnapshot) -> StorageResult<()>;

    /// Reads a job row back as a snapshot
    fn get_job(&self, job_id: Uuid) -> StorageResult<Option<JobSnapshot>>;

    // ===== Reads =====

    /// Aggregate page count, content bytes and embedding count across all jobs
    fn corpus_stats(&self) -> StorageResult<CorpusStats>;

    fn get_page(&self, job_id: Uuid, url: &str) -> StorageResult<Option<PageRecord>>;

    /// All persisted pages of a job, ordered by URL
    fn pages_for_job(&self, job_id: Uuid) -> StorageResult<Vec<PageRecord>>;

    /// All persisted embeddings of a job, ordered by URL
    fn embeddings_for_job(&self, job_id: Uuid) -> StorageResult<Vec<EmbeddingRecord>>;

    /// Full-text search over persisted page content
    fn search_pages(&self, query: &str, limit: usize) -> StorageResult<Vec<SearchHit>>;
}
