//! Storage module for persisting the crawl corpus
//!
//! This module handles all database operations for the engine, including:
//! - SQLite database initialization and schema management
//! - Buffered, batched page and embedding writes
//! - Job totals and snapshots
//! - Corpus-wide statistics and full-text search

mod schema;
mod sqlite;
mod traits;

pub use sqlite::SqliteStore;
pub use traits::{Storage, StorageError, StorageResult};

use chrono::{DateTime, Utc};
use serde::{Deserialize, Serialize};
use sha2::{Digest, Sha256};
use std::path::Path;
use uuid::Uuid;

/// Opens or creates the corpus database
///
/// # Arguments
///
/// * `path` - Path to the SQLite database file
/// * `batch_size` - Buffered records that trigger an automatic flush
pub fn open_storage(path: &Path, batch_size: usize) -> StorageResult<SqliteStore> {
    SqliteStore::open(path, batch_size)
}

/// One fetch outcome for a URL within a job
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct PageRecord {
    pub job_id: Uuid,
    pub url: String,
    pub status: u16,
    pub content_type: Option<String>,
    pub content_length: Option<u64>,
    pub fetched_at: DateTime<Utc>,
    pub etag: Option<String>,
    pub last_modified: Option<String>,
    /// Raw body; `None` for dry runs and non-success responses
    pub content: Option<Vec<u8>>,
    pub content_hash: Option<String>,
}

impl PageRecord {
    /// Minimal record for a non-2xx response
    pub fn status_only(job_id: Uuid, url: impl Into<String>, status: u16) -> Self {
        Self {
            job_id,
            url: url.into(),
            status,
            content_type: None,
            content_length: None,
            fetched_at: Utc::now(),
            etag: None,
            last_modified: None,
            content: None,
            content_hash: None,
        }
    }
}

/// SHA-256 of `body`, hex encoded
pub fn content_hash(body: &[u8]) -> String {
    hex::encode(Sha256::digest(body))
}

/// One derived vector for a URL within a job
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct EmbeddingRecord {
    pub job_id: Uuid,
    pub url: String,
    pub vector: Vec<f32>,
    pub dims: usize,
}

impl EmbeddingRecord {
    pub fn new(job_id: Uuid, url: impl Into<String>, vector: Vec<f32>) -> Self {
        let dims = vector.len();
        Self {
            job_id,
            url: url.into(),
            vector,
            dims,
        }
    }
}

/// Aggregate counts across every job
#[derive(Debug, Clone, Copy, Default, PartialEq, Eq, Serialize, Deserialize)]
pub struct CorpusStats {
    pub pages: u64,
    pub bytes: u64,
    pub embeddings: u64,
}

/// Records persisted by one flush
#[derive(Debug, Clone, Copy, Default, PartialEq, Eq)]
pub struct FlushCounts {
    pub pages: usize,
    pub embeddings: usize,
}

/// A full-text search match
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct SearchHit {
    pub job_id: Uuid,
    pub url: String,
    pub snippet: String,
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_content_hash() {
        assert_eq!(
            content_hash(b"abc"),
            "ba7816bf8f01cfea414140de5dae2223b00361a396177a9cb410ff61f20015ad"
        );
    }

    #[test]
    fn test_embedding_record_dims() {
        let record = EmbeddingRecord::new(Uuid::nil(), "https://example.com/", vec![0.0; 8]);
        assert_eq!(record.dims, 8);
    }

    #[test]
    fn test_status_only_record() {
        let record = PageRecord::status_only(Uuid::nil(), "https://example.com/x", 404);
        assert_eq!(record.status, 404);
        assert!(record.content.is_none());
        assert!(record.content_hash.is_none());
    }
}
