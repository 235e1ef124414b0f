//! SQLite storage implementation
//!
//! This module provides a SQLite-based implementation of the Storage trait.
//! Page and embedding records are buffered in memory and written in batches,
//! each batch inside a single transaction.

use crate::crawler::{text_for_embedding, JobSnapshot, JobStats, JobStatus};
use crate::storage::schema::initialize_schema;
use crate::storage::traits::{Storage, StorageError, StorageResult};
use crate::storage::{CorpusStats, EmbeddingRecord, FlushCounts, PageRecord, SearchHit};
use chrono::{DateTime, Utc};
use rusqlite::{params, Connection, OptionalExtension, Row};
use std::path::Path;
use std::sync::{Mutex, MutexGuard};
use uuid::Uuid;

#[derive(Debug, Default)]
struct Buffers {
    pages: Vec<PageRecord>,
    embeddings: Vec<EmbeddingRecord>,
}

/// SQLite storage backend with write buffering
pub struct SqliteStore {
    conn: Mutex<Connection>,
    buffers: Mutex<Buffers>,
    batch_size: usize,
}

impl SqliteStore {
    /// Opens or creates a database file
    ///
    /// # Arguments
    ///
    /// * `path` - Path to the SQLite database file
    /// * `batch_size` - Buffered records per table that trigger a flush
    ///
    /// # Returns
    ///
    /// * `Ok(SqliteStore)` - Successfully opened/created database
    /// * `Err(StorageError)` - Failed to open database
    pub fn open(path: &Path, batch_size: usize) -> StorageResult<Self> {
        let conn = Connection::open(path)?;

        conn.execute_batch(
            "
            PRAGMA journal_mode = WAL;
            PRAGMA synchronous = NORMAL;
            PRAGMA temp_store = MEMORY;
        ",
        )?;

        Self::with_connection(conn, batch_size)
    }

    /// Creates an in-memory database
    pub fn open_in_memory(batch_size: usize) -> StorageResult<Self> {
        Self::with_connection(Connection::open_in_memory()?, batch_size)
    }

    fn with_connection(conn: Connection, batch_size: usize) -> StorageResult<Self> {
        initialize_schema(&conn)?;

        Ok(Self {
            conn: Mutex::new(conn),
            buffers: Mutex::new(Buffers::default()),
            batch_size: batch_size.max(1),
        })
    }

    fn conn(&self) -> MutexGuard<'_, Connection> {
        self.conn.lock().unwrap_or_else(|e| e.into_inner())
    }

    fn buffers(&self) -> MutexGuard<'_, Buffers> {
        self.buffers.lock().unwrap_or_else(|e| e.into_inner())
    }

    /// Writes the buffered pages; on failure they are put back
    fn flush_pages(&self) -> StorageResult<usize> {
        let batch = std::mem::take(&mut self.buffers().pages);
        if batch.is_empty() {
            return Ok(0);
        }

        let result = write_pages(&mut self.conn(), &batch);
        match result {
            Ok(()) => {
                tracing::debug!("Flushed {} page record(s)", batch.len());
                Ok(batch.len())
            }
            Err(e) => {
                tracing::error!("Page flush of {} record(s) failed: {}", batch.len(), e);
                let mut buffers = self.buffers();
                let newer = std::mem::replace(&mut buffers.pages, batch);
                buffers.pages.extend(newer);
                Err(e)
            }
        }
    }

    /// Writes the buffered embeddings; on failure they are put back
    fn flush_embeddings(&self) -> StorageResult<usize> {
        let batch = std::mem::take(&mut self.buffers().embeddings);
        if batch.is_empty() {
            return Ok(0);
        }

        let result = write_embeddings(&mut self.conn(), &batch);
        match result {
            Ok(()) => {
                tracing::debug!("Flushed {} embedding record(s)", batch.len());
                Ok(batch.len())
            }
            Err(e) => {
                tracing::error!("Embedding flush of {} record(s) failed: {}", batch.len(), e);
                let mut buffers = self.buffers();
                let newer = std::mem::replace(&mut buffers.embeddings, batch);
                buffers.embeddings.extend(newer);
                Err(e)
            }
        }
    }
}

fn write_pages(conn: &mut Connection, batch: &[PageRecord]) -> StorageResult<()> {
    let tx = conn.transaction()?;
    {
        let mut upsert = tx.prepare_cached(
            "INSERT OR REPLACE INTO pages
                (job_id, url, status, content_type, content_length, fetched_at,
                 etag, last_modified, content, content_hash)
             VALUES (?1, ?2, ?3, ?4, ?5, ?6, ?7, ?8, ?9, ?10)",
        )?;
        let mut unindex = tx.prepare_cached("DELETE FROM pages_fts WHERE job_id = ?1 AND url = ?2")?;
        let mut index =
            tx.prepare_cached("INSERT INTO pages_fts (job_id, url, content) VALUES (?1, ?2, ?3)")?;

        for page in batch {
            let job_id = page.job_id.to_string();

            upsert.execute(params![
                job_id,
                page.url,
                page.status,
                page.content_type,
                page.content_length.map(|n| n as i64),
                page.fetched_at.to_rfc3339(),
                page.etag,
                page.last_modified,
                page.content,
                page.content_hash,
            ])?;

            unindex.execute(params![job_id, page.url])?;
            let text = page
                .content
                .as_deref()
                .and_then(|body| text_for_embedding(page.content_type.as_deref(), body));
            if let Some(text) = text {
                index.execute(params![job_id, page.url, text])?;
            }
        }
    }
    tx.commit()?;
    Ok(())
}

fn write_embeddings(conn: &mut Connection, batch: &[EmbeddingRecord]) -> StorageResult<()> {
    let tx = conn.transaction()?;
    {
        let mut upsert = tx.prepare_cached(
            "INSERT OR REPLACE INTO embeddings (job_id, url, dims, vector)
             VALUES (?1, ?2, ?3, ?4)",
        )?;

        for record in batch {
            let vector = serde_json::to_string(&record.vector)?;
            upsert.execute(params![
                record.job_id.to_string(),
                record.url,
                record.dims as i64,
                vector,
            ])?;
        }
    }
    tx.commit()?;
    Ok(())
}

fn parse_uuid(value: &str) -> StorageResult<Uuid> {
    Uuid::parse_str(value).map_err(|e| StorageError::Serialization(e.to_string()))
}

fn parse_time(value: &str) -> StorageResult<DateTime<Utc>> {
    DateTime::parse_from_rfc3339(value)
        .map(|t| t.with_timezone(&Utc))
        .map_err(|e| StorageError::Serialization(e.to_string()))
}

fn parse_optional_time(value: Option<String>) -> StorageResult<Option<DateTime<Utc>>> {
    value.as_deref().map(parse_time).transpose()
}

/// Raw page row before text columns are decoded
struct PageRow {
    job_id: String,
    url: String,
    status: u16,
    content_type: Option<String>,
    content_length: Option<i64>,
    fetched_at: String,
    etag: Option<String>,
    last_modified: Option<String>,
    content: Option<Vec<u8>>,
    content_hash: Option<String>,
}

const PAGE_COLUMNS: &str = "job_id, url, status, content_type, content_length, fetched_at, \
                            etag, last_modified, content, content_hash";

impl PageRow {
    fn from_row(row: &Row<'_>) -> rusqlite::Result<Self> {
        Ok(Self {
            job_id: row.get(0)?,
            url: row.get(1)?,
            status: row.get(2)?,
            content_type: row.get(3)?,
            content_length: row.get(4)?,
            fetched_at: row.get(5)?,
            etag: row.get(6)?,
            last_modified: row.get(7)?,
            content: row.get(8)?,
            content_hash: row.get(9)?,
        })
    }

    fn into_record(self) -> StorageResult<PageRecord> {
        Ok(PageRecord {
            job_id: parse_uuid(&self.job_id)?,
            url: self.url,
            status: self.status,
            content_type: self.content_type,
            content_length: self.content_length.map(|n| n.max(0) as u64),
            fetched_at: parse_time(&self.fetched_at)?,
            etag: self.etag,
            last_modified: self.last_modified,
            content: self.content,
            content_hash: self.content_hash,
        })
    }
}

impl Storage for SqliteStore {
    // ===== Buffered Writes =====

    fn queue_page(&self, record: PageRecord) -> StorageResult<()> {
        let full = {
            let mut buffers = self.buffers();
            buffers.pages.push(record);
            buffers.pages.len() >= self.batch_size
        };

        if full {
            self.flush_pages()?;
        }
        Ok(())
    }

    fn queue_embedding(&self, record: EmbeddingRecord) -> StorageResult<()> {
        let full = {
            let mut buffers = self.buffers();
            buffers.embeddings.push(record);
            buffers.embeddings.len() >= self.batch_size
        };

        if full {
            self.flush_embeddings()?;
        }
        Ok(())
    }

    fn flush_all(&self) -> StorageResult<FlushCounts> {
        let pages = self.flush_pages()?;
        let embeddings = self.flush_embeddings()?;
        Ok(FlushCounts { pages, embeddings })
    }

    fn pending(&self) -> (usize, usize) {
        let buffers = self.buffers();
        (buffers.pages.len(), buffers.embeddings.len())
    }

    // ===== Jobs =====

    fn update_job_totals(&self, job: &JobSnapshot) -> StorageResult<()> {
        let stats = &job.stats;
        self.conn().execute(
            "INSERT OR REPLACE INTO jobs
                (id, status, seeds, allowed_hosts, max_pages, dry_run, created_at,
                 started_at, finished_at, failure, fetched, skipped, errors, bytes,
                 not_modified, disallowed, queued, duration_ms, stats)
             VALUES (?1, ?2, ?3, ?4, ?5, ?6, ?7, ?8, ?9, ?10, ?11, ?12, ?13, ?14,
                     ?15, ?16, ?17, ?18, ?19)",
            params![
                job.id.to_string(),
                job.status.to_db_string(),
                serde_json::to_string(&job.seeds)?,
                serde_json::to_string(&job.allowed_hosts)?,
                job.max_pages as i64,
                job.dry_run,
                job.created_at.to_rfc3339(),
                job.started_at.map(|t| t.to_rfc3339()),
                job.finished_at.map(|t| t.to_rfc3339()),
                job.failure,
                stats.fetched as i64,
                stats.skipped as i64,
                stats.errors as i64,
                stats.bytes as i64,
                stats.not_modified as i64,
                stats.disallowed as i64,
                stats.queued as i64,
                stats.duration_ms as i64,
                serde_json::to_string(stats)?,
            ],
        )?;
        Ok(())
    }

    fn get_job(&self, job_id: Uuid) -> StorageResult<Option<JobSnapshot>> {
        type JobRow = (
            String,
            String,
            String,
            i64,
            bool,
            String,
            Option<String>,
            Option<String>,
            Option<String>,
            String,
        );

        let row: Option<JobRow> = self
            .conn()
            .query_row(
                "SELECT status, seeds, allowed_hosts, max_pages, dry_run, created_at,
                        started_at, finished_at, failure, stats
                 FROM jobs WHERE id = ?1",
                params![job_id.to_string()],
                |row| {
                    Ok((
                        row.get(0)?,
                        row.get(1)?,
                        row.get(2)?,
                        row.get(3)?,
                        row.get(4)?,
                        row.get(5)?,
                        row.get(6)?,
                        row.get(7)?,
                        row.get(8)?,
                        row.get(9)?,
                    ))
                },
            )
            .optional()?;

        let Some((
            status,
            seeds,
            allowed_hosts,
            max_pages,
            dry_run,
            created_at,
            started_at,
            finished_at,
            failure,
            stats,
        )) = row
        else {
            return Ok(None);
        };

        let status = JobStatus::from_db_string(&status)
            .ok_or_else(|| StorageError::Serialization(format!("unknown job status: {}", status)))?;
        let stats: JobStats = serde_json::from_str(&stats)?;

        Ok(Some(JobSnapshot {
            id: job_id,
            status,
            seeds: serde_json::from_str(&seeds)?,
            allowed_hosts: serde_json::from_str(&allowed_hosts)?,
            max_pages: max_pages.max(0) as usize,
            dry_run,
            created_at: parse_time(&created_at)?,
            started_at: parse_optional_time(started_at)?,
            finished_at: parse_optional_time(finished_at)?,
            stats,
            failure,
        }))
    }

    // ===== Reads =====

    fn corpus_stats(&self) -> StorageResult<CorpusStats> {
        let conn = self.conn();

        let (pages, bytes): (i64, i64) = conn.query_row(
            "SELECT COUNT(*), COALESCE(SUM(content_length), 0) FROM pages",
            [],
            |row| Ok((row.get(0)?, row.get(1)?)),
        )?;
        let embeddings: i64 =
            conn.query_row("SELECT COUNT(*) FROM embeddings", [], |row| row.get(0))?;

        Ok(CorpusStats {
            pages: pages.max(0) as u64,
            bytes: bytes.max(0) as u64,
            embeddings: embeddings.max(0) as u64,
        })
    }

    fn get_page(&self, job_id: Uuid, url: &str) -> StorageResult<Option<PageRecord>> {
        let sql = format!("SELECT {} FROM pages WHERE job_id = ?1 AND url = ?2", PAGE_COLUMNS);
        let row = self
            .conn()
            .query_row(&sql, params![job_id.to_string(), url], PageRow::from_row)
            .optional()?;

        row.map(PageRow::into_record).transpose()
    }

    fn pages_for_job(&self, job_id: Uuid) -> StorageResult<Vec<PageRecord>> {
        let sql = format!("SELECT {} FROM pages WHERE job_id = ?1 ORDER BY url", PAGE_COLUMNS);
        let conn = self.conn();
        let mut stmt = conn.prepare(&sql)?;

        let rows = stmt
            .query_map(params![job_id.to_string()], PageRow::from_row)?
            .collect::<Result<Vec<_>, _>>()?;

        rows.into_iter().map(PageRow::into_record).collect()
    }

    fn embeddings_for_job(&self, job_id: Uuid) -> StorageResult<Vec<EmbeddingRecord>> {
        let conn = self.conn();
        let mut stmt = conn.prepare(
            "SELECT url, dims, vector FROM embeddings WHERE job_id = ?1 ORDER BY url",
        )?;

        let rows = stmt
            .query_map(params![job_id.to_string()], |row| {
                Ok((
                    row.get::<_, String>(0)?,
                    row.get::<_, i64>(1)?,
                    row.get::<_, String>(2)?,
                ))
            })?
            .collect::<Result<Vec<_>, _>>()?;

        rows.into_iter()
            .map(|(url, dims, vector)| -> StorageResult<EmbeddingRecord> {
                Ok(EmbeddingRecord {
                    job_id,
                    url,
                    vector: serde_json::from_str(&vector)?,
                    dims: dims.max(0) as usize,
                })
            })
            .collect()
    }

    fn search_pages(&self, query: &str, limit: usize) -> StorageResult<Vec<SearchHit>> {
        let conn = self.conn();
        let mut stmt = conn.prepare(
            "SELECT job_id, url, snippet(pages_fts, 2, '[', ']', '...', 12)
             FROM pages_fts WHERE pages_fts MATCH ?1
             ORDER BY rank LIMIT ?2",
        )?;

        let rows = stmt
            .query_map(params![query, limit as i64], |row| {
                Ok((
                    row.get::<_, String>(0)?,
                    row.get::<_, String>(1)?,
                    row.get::<_, String>(2)?,
                ))
            })?
            .collect::<Result<Vec<_>, _>>()?;

        rows.into_iter()
            .map(|(job_id, url, snippet)| -> StorageResult<SearchHit> {
                Ok(SearchHit {
                    job_id: parse_uuid(&job_id)?,
                    url,
                    snippet,
                })
            })
            .collect()
    }
}
