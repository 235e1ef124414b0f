//! Embedding queue
//!
//! Texts are buffered as `(job id, url, text)` and embedded in batches. A
//! batch runs when the buffer reaches the configured size or on an explicit
//! [`EmbeddingQueue::flush`]. Each resulting vector is handed to the store's
//! embedding buffer.

use crate::config::EmbeddingConfig;
use crate::embedding::{Embedder, EmbeddingError};
use crate::storage::{EmbeddingRecord, Storage};
use serde::{Deserialize, Serialize};
use std::sync::atomic::{AtomicU64, Ordering};
use std::sync::{Arc, Mutex, MutexGuard};
use uuid::Uuid;

#[derive(Debug, Clone)]
struct PendingText {
    job_id: Uuid,
    url: String,
    text: String,
}

/// Queue counters
#[derive(Debug, Clone, Copy, Default, PartialEq, Eq, Serialize, Deserialize)]
pub struct EmbeddingStats {
    /// Texts accepted by `enqueue`
    pub queued: u64,
    /// Vectors forwarded to storage
    pub embedded: u64,
    /// Texts the embedder rejected
    pub failed: u64,
    /// Batches run
    pub batches: u64,
}

/// Batching front of an [`Embedder`]
pub struct EmbeddingQueue {
    enabled: bool,
    batch_size: usize,
    embedder: Arc<dyn Embedder>,
    store: Arc<dyn Storage>,
    buffer: Mutex<Vec<PendingText>>,
    queued: AtomicU64,
    embedded: AtomicU64,
    failed: AtomicU64,
    batches: AtomicU64,
}

impl EmbeddingQueue {
    pub fn new(
        config: &EmbeddingConfig,
        embedder: Arc<dyn Embedder>,
        store: Arc<dyn Storage>,
    ) -> Self {
        Self {
            enabled: config.enabled,
            batch_size: config.batch_size.max(1),
            embedder,
            store,
            buffer: Mutex::new(Vec::new()),
            queued: AtomicU64::new(0),
            embedded: AtomicU64::new(0),
            failed: AtomicU64::new(0),
            batches: AtomicU64::new(0),
        }
    }

    fn buffer(&self) -> MutexGuard<'_, Vec<PendingText>> {
        self.buffer.lock().unwrap_or_else(|e| e.into_inner())
    }

    pub fn is_enabled(&self) -> bool {
        self.enabled
    }

    /// Number of texts waiting for the next batch
    pub fn pending(&self) -> usize {
        self.buffer().len()
    }

    /// Buffers a text for embedding
    ///
    /// # Returns
    ///
    /// * `Ok(false)` - The queue is disabled; nothing was buffered
    /// * `Ok(true)` - The text was buffered (and a batch may have run)
    /// * `Err(EmbeddingError)` - A triggered batch could not reach storage
    pub fn enqueue(
        &self,
        job_id: Uuid,
        url: impl Into<String>,
        text: impl Into<String>,
    ) -> Result<bool, EmbeddingError> {
        if !self.enabled {
            return Ok(false);
        }

        let batch = {
            let mut buffer = self.buffer();
            buffer.push(PendingText {
                job_id,
                url: url.into(),
                text: text.into(),
            });
            self.queued.fetch_add(1, Ordering::Relaxed);

            if buffer.len() >= self.batch_size {
                std::mem::take(&mut *buffer)
            } else {
                Vec::new()
            }
        };

        if !batch.is_empty() {
            self.run_batch(batch)?;
        }
        Ok(true)
    }

    /// Embeds everything still buffered
    ///
    /// Returns the number of vectors forwarded to storage.
    pub fn flush(&self) -> Result<usize, EmbeddingError> {
        let batch = std::mem::take(&mut *self.buffer());
        if batch.is_empty() {
            return Ok(0);
        }
        self.run_batch(batch)
    }

    fn run_batch(&self, batch: Vec<PendingText>) -> Result<usize, EmbeddingError> {
        self.batches.fetch_add(1, Ordering::Relaxed);
        let expected = self.embedder.dimension();
        let mut forwarded = 0;

        let mut items = batch.into_iter();
        while let Some(item) = items.next() {
            let vector = match self.embedder.embed(&item.text) {
                Ok(vector) if vector.len() == expected => vector,
                Ok(vector) => {
                    let err = EmbeddingError::Dimension {
                        expected,
                        actual: vector.len(),
                    };
                    tracing::warn!("Dropping embedding for {}: {}", item.url, err);
                    self.failed.fetch_add(1, Ordering::Relaxed);
                    continue;
                }
                Err(e) => {
                    tracing::warn!("Failed to embed {}: {}", item.url, e);
                    self.failed.fetch_add(1, Ordering::Relaxed);
                    continue;
                }
            };

            let result = self
                .store
                .queue_embedding(EmbeddingRecord::new(item.job_id, item.url, vector));
            // The store keeps a record whose flush failed in its own buffer
            self.embedded.fetch_add(1, Ordering::Relaxed);
            forwarded += 1;

            if let Err(e) = result {
                let unsent: Vec<PendingText> = items.by_ref().collect();
                tracing::error!(
                    "Embedding batch stopped on storage error, re-buffering {} text(s): {}",
                    unsent.len(),
                    e
                );
                let mut buffer = self.buffer();
                let newer = std::mem::replace(&mut *buffer, unsent);
                buffer.extend(newer);
                return Err(e.into());
            }
        }

        tracing::debug!("Embedding batch forwarded {} vector(s)", forwarded);
        Ok(forwarded)
    }

    pub fn stats(&self) -> EmbeddingStats {
        EmbeddingStats {
            queued: self.queued.load(Ordering::Relaxed),
            embedded: self.embedded.load(Ordering::Relaxed),
            failed: self.failed.load(Ordering::Relaxed),
            batches: self.batches.load(Ordering::Relaxed),
        }
    }
}
