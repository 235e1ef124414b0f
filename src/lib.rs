//! Sumi-Harvest: a polite, bounded crawl engine
//!
//! This crate fetches a bounded set of pages starting from operator-supplied
//! seeds, respects robots.txt and conditional-request etiquette, discovers
//! in-scope links, and persists fetched content and derived embeddings into
//! a SQLite corpus.

pub mod config;
pub mod crawler;
pub mod embedding;
pub mod output;
pub mod robots;
pub mod server;
pub mod storage;
pub mod url;

use thiserror::Error;

/// Main error type for Sumi-Harvest operations
#[derive(Debug, Error)]
pub enum HarvestError {
    #[error("Configuration error: {0}")]
    Config(#[from] ConfigError),

    #[error("seeds_required: at least one seed URL must be supplied")]
    SeedsRequired,

    #[error("invalid_seed: {seed}: {reason}")]
    InvalidSeed { seed: String, reason: String },

    #[error("invalid_max_pages: max_pages must be at least 1")]
    InvalidMaxPages,

    #[error("Storage error: {0}")]
    Storage(#[from] storage::StorageError),

    #[error("Embedding error: {0}")]
    Embedding(#[from] embedding::EmbeddingError),

    #[error("HTTP client error: {0}")]
    Reqwest(#[from] reqwest::Error),

    #[error("Worker failed: {0}")]
    Worker(String),
}

/// Configuration-specific errors
#[derive(Debug, Error)]
pub enum ConfigError {
    #[error("Failed to read config file: {0}")]
    Io(#[from] std::io::Error),

    #[error("Failed to parse TOML: {0}")]
    Parse(#[from] toml::de::Error),

    #[error("Validation error: {0}")]
    Validation(String),
}

/// URL-specific errors
#[derive(Debug, Error)]
pub enum UrlError {
    #[error("Failed to parse URL: {0}")]
    Parse(String),

    #[error("Invalid URL scheme: {0}")]
    InvalidScheme(String),

    #[error("Missing host in URL")]
    MissingHost,
}

/// Result type alias for Sumi-Harvest operations
pub type Result<T> = std::result::Result<T, HarvestError>;

// Re-export commonly used types
pub use config::Config;
pub use crawler::{HttpTransport, Job, JobSnapshot, JobStatus, Scheduler};
pub use embedding::{EmbeddingQueue, HashingEmbedder};
pub use robots::RobotsEvaluator;
pub use storage::{SqliteStore, Storage};
pub use url::normalize_url;
