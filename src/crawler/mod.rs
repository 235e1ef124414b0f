//! Crawler module for bounded, polite crawling
//!
//! This module contains the core crawling logic, including:
//! - HTTP fetching with conditional requests and a byte ceiling
//! - A shared DNS resolution cache
//! - Anchor link extraction and text extraction
//! - The job model (frontier, visited and enqueued sets, stats)
//! - The scheduler that runs a worker pool per job

mod dns;
mod fetcher;
mod job;
mod parser;
mod scheduler;

pub use dns::{CachingResolver, DnsCache, DnsStats};
pub use fetcher::{
    FetchOptions, FetchResponse, HttpTransport, ResourceMetadata, TransportError, TransportStats,
};
pub use job::{normalize_seeds, Dequeue, Job, JobSnapshot, JobStats, JobStatus, UrlOutcome};
pub use parser::{extract_links, extract_text, is_html, text_for_embedding};
pub use scheduler::Scheduler;
