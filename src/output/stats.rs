//! Console rendering of job and corpus statistics

use crate::crawler::JobSnapshot;
use crate::storage::CorpusStats;

/// Formats a byte count with a binary unit
pub fn format_bytes(bytes: u64) -> String {
    const UNITS: [&str; 4] = ["B", "KiB", "MiB", "GiB"];

    let mut value = bytes as f64;
    let mut unit = 0;
    while value >= 1024.0 && unit < UNITS.len() - 1 {
        value /= 1024.0;
        unit += 1;
    }

    if unit == 0 {
        format!("{} B", bytes)
    } else {
        format!("{:.1} {}", value, UNITS[unit])
    }
}

/// Renders a job snapshot as a human-readable block
pub fn format_job_summary(job: &JobSnapshot) -> String {
    let stats = &job.stats;
    let mut out = format!("=== Job {} ===\n\n", job.id);

    out.push_str(&format!("Status:      {}\n", job.status));
    if let Some(failure) = &job.failure {
        out.push_str(&format!("Failure:     {}\n", failure));
    }
    out.push_str(&format!("Seeds:       {}\n", job.seeds.join(", ")));
    out.push_str(&format!("Hosts:       {}\n", job.allowed_hosts.join(", ")));
    out.push_str(&format!(
        "Budget:      {} page(s){}\n",
        job.max_pages,
        if job.dry_run { " (dry run)" } else { "" }
    ));
    out.push_str(&format!("Duration:    {} ms\n\n", stats.duration_ms));

    out.push_str(&format!(
        "Pages:\n  \
         Fetched:      {}\n  \
         Skipped:      {}\n  \
         Not modified: {}\n  \
         Disallowed:   {}\n  \
         Errors:       {}\n  \
         Queued:       {}\n  \
         Bytes:        {}\n\n",
        stats.fetched,
        stats.skipped,
        stats.not_modified,
        stats.disallowed,
        stats.errors,
        stats.queued,
        format_bytes(stats.bytes)
    ));

    out.push_str(&format!(
        "DNS cache:     {} hit(s), {} miss(es)\n",
        stats.dns_hits, stats.dns_misses
    ));
    out.push_str(&format!(
        "Embeddings:    {} queued, {} embedded, {} failed\n",
        stats.embeddings_queued, stats.embeddings_embedded, stats.embeddings_failed
    ));

    out
}

/// Prints a job snapshot to stdout
pub fn print_job_summary(job: &JobSnapshot) {
    print!("{}", format_job_summary(job));
}

/// Renders corpus-wide counts
pub fn format_corpus_stats(stats: &CorpusStats) -> String {
    format!(
        "=== Corpus Statistics ===\n\n  Pages:      {}\n  Bytes:      {}\n  Embeddings: {}\n",
        stats.pages,
        format_bytes(stats.bytes),
        stats.embeddings
    )
}

/// Prints corpus-wide counts to stdout
pub fn print_corpus_stats(stats: &CorpusStats) {
    print!("{}", format_corpus_stats(stats));
}
