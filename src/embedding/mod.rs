//! Embedding support
//!
//! This module provides:
//! - The [`Embedder`] trait the queue calls to turn text into vectors
//! - [`HashingEmbedder`], a deterministic built-in embedder
//! - [`EmbeddingQueue`], which batches texts and forwards vectors to storage

mod hashing;
mod queue;

pub use hashing::HashingEmbedder;
pub use queue::{EmbeddingQueue, EmbeddingStats};

use thiserror::Error;

/// Errors raised while producing embeddings
#[derive(Debug, Error)]
pub enum EmbeddingError {
    #[error("Embedding backend failed: {0}")]
    Backend(String),

    #[error("Expected {expected} dimensions, got {actual}")]
    Dimension { expected: usize, actual: usize },

    #[error("Storage error: {0}")]
    Storage(#[from] crate::storage::StorageError),
}

/// Produces a fixed-dimension vector for a text
pub trait Embedder: Send + Sync {
    fn embed(&self, text: &str) -> Result<Vec<f32>, EmbeddingError>;

    /// Length of every vector returned by [`Embedder::embed`]
    fn dimension(&self) -> usize;
}
