//! URL handling module for Sumi-Harvest
//!
//! This module provides URL normalization plus the small host/origin helpers
//! the scheduler and robots evaluator key their state on.

mod normalize;

pub use normalize::{normalize_parsed, normalize_url};

use url::Url;

/// Returns the hostname of a URL, without port
///
/// # Examples
///
/// ```
/// use sumi_harvest::url::host_of;
/// use url::Url;
///
/// let url = Url::parse("https://docs.example.com:8443/a").unwrap();
/// assert_eq!(host_of(&url), Some("docs.example.com".to_string()));
/// ```
pub fn host_of(url: &Url) -> Option<String> {
    url.host_str().map(|h| h.to_lowercase())
}

/// Returns the origin key (`scheme://host[:port]`) used for per-origin caches
pub fn origin_key(url: &Url) -> String {
    url.origin().ascii_serialization()
}

/// Returns the path plus query, which is what robots.txt rules match against
pub fn path_and_query(url: &Url) -> String {
    match url.query() {
        Some(q) => format!("{}?{}", url.path(), q),
        None => url.path().to_string(),
    }
}
