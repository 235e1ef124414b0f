//! Output module for CLI reporting
//!
//! This module handles:
//! - Rendering job snapshots after a foreground crawl
//! - Rendering corpus-wide statistics

pub mod stats;

pub use stats::{
    format_bytes, format_corpus_stats, format_job_summary, print_corpus_stats, print_job_summary,
};
