//! DNS resolution cache
//!
//! Resolved addresses are kept per hostname in a least-recently-used map with
//! a fixed lifetime per entry. The cache is plugged into reqwest through
//! [`CachingResolver`], so every request issued by the transport (page fetches
//! and robots.txt fetches alike) shares it.

use lru::LruCache;
use reqwest::dns::{Addrs, Name, Resolve, Resolving};
use serde::{Deserialize, Serialize};
use std::io;
use std::net::SocketAddr;
use std::num::NonZeroUsize;
use std::sync::atomic::{AtomicU64, Ordering};
use std::sync::{Arc, Mutex, MutexGuard};
use std::time::{Duration, Instant};

#[derive(Debug, Clone)]
struct DnsEntry {
    addrs: Vec<SocketAddr>,
    expires_at: Instant,
}

/// Hit/miss counters exposed for observability
#[derive(Debug, Clone, Copy, Default, PartialEq, Eq, Serialize, Deserialize)]
pub struct DnsStats {
    pub hits: u64,
    pub misses: u64,
    pub entries: usize,
}

/// LRU cache of hostname resolutions with time-bounded entries
#[derive(Debug)]
pub struct DnsCache {
    entries: Mutex<LruCache<String, DnsEntry>>,
    ttl: Duration,
    hits: AtomicU64,
    misses: AtomicU64,
}

impl DnsCache {
    pub fn new(capacity: usize, ttl: Duration) -> Self {
        let capacity = NonZeroUsize::new(capacity).unwrap_or(NonZeroUsize::MIN);
        Self {
            entries: Mutex::new(LruCache::new(capacity)),
            ttl,
            hits: AtomicU64::new(0),
            misses: AtomicU64::new(0),
        }
    }

    fn entries(&self) -> MutexGuard<'_, LruCache<String, DnsEntry>> {
        self.entries.lock().unwrap_or_else(|e| e.into_inner())
    }

    /// Returns cached addresses for `host` if present and not expired
    ///
    /// Expired entries are evicted on access. Does not touch the counters.
    pub fn get(&self, host: &str) -> Option<Vec<SocketAddr>> {
        let mut entries = self.entries();
        let now = Instant::now();

        match entries.get(host) {
            Some(entry) if entry.expires_at > now => Some(entry.addrs.clone()),
            Some(_) => {
                entries.pop(host);
                None
            }
            None => None,
        }
    }

    /// Stores a resolution, evicting the least recently used host when full
    pub fn insert(&self, host: &str, addrs: Vec<SocketAddr>) {
        let entry = DnsEntry {
            addrs,
            expires_at: Instant::now() + self.ttl,
        };
        self.entries().put(host.to_lowercase(), entry);
    }

    /// Resolves `host`, answering from the cache when possible
    pub async fn resolve_host(&self, host: &str) -> io::Result<Vec<SocketAddr>> {
        let key = host.to_lowercase();

        if let Some(addrs) = self.get(&key) {
            self.hits.fetch_add(1, Ordering::Relaxed);
            return Ok(addrs);
        }

        self.misses.fetch_add(1, Ordering::Relaxed);
        let addrs: Vec<SocketAddr> = tokio::net::lookup_host((key.as_str(), 0)).await?.collect();

        if addrs.is_empty() {
            return Err(io::Error::new(
                io::ErrorKind::NotFound,
                format!("no addresses found for {}", host),
            ));
        }

        tracing::trace!("Resolved {} to {} address(es)", host, addrs.len());
        self.insert(&key, addrs.clone());
        Ok(addrs)
    }

    pub fn stats(&self) -> DnsStats {
        DnsStats {
            hits: self.hits.load(Ordering::Relaxed),
            misses: self.misses.load(Ordering::Relaxed),
            entries: self.entries().len(),
        }
    }
}

/// reqwest resolver backed by a shared [`DnsCache`]
#[derive(Debug, Clone)]
pub struct CachingResolver {
    cache: Arc<DnsCache>,
}

impl CachingResolver {
    pub fn new(cache: Arc<DnsCache>) -> Self {
        Self { cache }
    }
}

impl Resolve for CachingResolver {
    fn resolve(&self, name: Name) -> Resolving {
        let cache = Arc::clone(&self.cache);
        Box::pin(async move {
            let addrs = cache.resolve_host(name.as_str()).await?;
            let addrs: Addrs = Box::new(addrs.into_iter());
            Ok::<Addrs, Box<dyn std::error::Error + Send + Sync>>(addrs)
        })
    }
}
