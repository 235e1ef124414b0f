//! Robots.txt handling module
//!
//! This module provides functionality for fetching, parsing, and caching
//! robots.txt files. The evaluator fails open: any problem obtaining or
//! reading robots.txt results in every path being allowed.

mod cache;
mod parser;

pub use cache::CachedRobots;
pub use parser::{RobotsRule, RobotsRules};

use crate::config::RobotsConfig;
use crate::crawler::{FetchOptions, HttpTransport};
use crate::url::{origin_key, path_and_query};
use lru::LruCache;
use std::collections::HashMap;
use std::num::NonZeroUsize;
use std::sync::{Arc, Mutex, MutexGuard};
use url::Url;

/// Per-origin robots.txt gate shared by every job
pub struct RobotsEvaluator {
    transport: Arc<HttpTransport>,
    identity: String,
    ttl: chrono::Duration,
    cache: Mutex<LruCache<String, CachedRobots>>,
    /// One load lock per origin whose robots.txt is being fetched
    loading: Mutex<HashMap<String, Arc<tokio::sync::Mutex<()>>>>,
}

impl RobotsEvaluator {
    pub fn new(config: &RobotsConfig, transport: Arc<HttpTransport>) -> Self {
        let capacity = NonZeroUsize::new(config.cache_size).unwrap_or(NonZeroUsize::MIN);
        let ttl = chrono::Duration::seconds(config.cache_ttl_secs.min(i64::MAX as u64) as i64);

        Self {
            transport,
            identity: config.identity.clone(),
            ttl,
            cache: Mutex::new(LruCache::new(capacity)),
            loading: Mutex::new(HashMap::new()),
        }
    }

    fn cache(&self) -> MutexGuard<'_, LruCache<String, CachedRobots>> {
        self.cache.lock().unwrap_or_else(|e| e.into_inner())
    }

    /// Checks whether `url` may be fetched
    ///
    /// Never fails. Rules are fetched at most once per origin per TTL.
    pub async fn is_allowed(&self, url: &Url) -> bool {
        let rules = self.rules_for(url).await;
        rules.is_allowed(&path_and_query(url))
    }

    /// Returns the compiled rules for the origin of `url`
    ///
    /// Concurrent callers on a cold origin share a single robots.txt fetch.
    pub async fn rules_for(&self, url: &Url) -> Arc<RobotsRules> {
        let origin = origin_key(url);

        if let Some(cached) = self.cached(&origin) {
            return cached;
        }

        let lock = Arc::clone(
            self.loading
                .lock()
                .unwrap_or_else(|e| e.into_inner())
                .entry(origin.clone())
                .or_default(),
        );
        let _load = lock.lock().await;

        // Loaded by whoever held the lock before us
        if let Some(cached) = self.cached(&origin) {
            return cached;
        }

        let rules = Arc::new(self.fetch_rules(url).await);
        self.cache().put(
            origin.clone(),
            CachedRobots {
                rules: Arc::clone(&rules),
                fetched_at: chrono::Utc::now(),
            },
        );
        self.loading
            .lock()
            .unwrap_or_else(|e| e.into_inner())
            .remove(&origin);
        rules
    }

    fn cached(&self, origin: &str) -> Option<Arc<RobotsRules>> {
        let mut cache = self.cache();

        match cache.get(origin) {
            Some(entry) if !entry.is_stale(self.ttl) => Some(Arc::clone(&entry.rules)),
            Some(_) => {
                cache.pop(origin);
                None
            }
            None => None,
        }
    }

    async fn fetch_rules(&self, url: &Url) -> RobotsRules {
        let robots_url = match url.join("/robots.txt") {
            Ok(u) => u,
            Err(e) => {
                tracing::warn!("Cannot build robots.txt URL for {}: {}", url, e);
                return RobotsRules::allow_all();
            }
        };

        match self.transport.fetch(&robots_url, FetchOptions::default()).await {
            Ok(response) if response.is_success() => {
                let content = String::from_utf8_lossy(&response.body);
                let rules = RobotsRules::parse(&content, &self.identity);
                tracing::debug!("Loaded {} robots rule(s) from {}", rules.rules().len(), robots_url);
                rules
            }
            Ok(response) => {
                tracing::debug!(
                    "robots.txt at {} returned {}, allowing all",
                    robots_url,
                    response.status
                );
                RobotsRules::allow_all()
            }
            Err(e) => {
                tracing::warn!("Failed to fetch {}: {}, allowing all", robots_url, e);
                RobotsRules::allow_all()
            }
        }
    }

    /// Number of origins currently cached
    pub fn cached_origins(&self) -> usize {
        self.cache().len()
    }
}
