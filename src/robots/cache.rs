//! Robots.txt caching implementation
//!
//! Compiled rules are cached per origin together with the time they were
//! fetched, so the evaluator can refetch them once they go stale.

use crate::robots::RobotsRules;
use chrono::{DateTime, Duration, Utc};
use std::sync::Arc;

/// Cached robots.txt rules for an origin
#[derive(Debug, Clone)]
pub struct CachedRobots {
    /// The compiled rules
    pub rules: Arc<RobotsRules>,

    /// When the robots.txt was fetched
    pub fetched_at: DateTime<Utc>,
}

impl CachedRobots {
    /// Creates a new CachedRobots instance stamped with the current time
    pub fn new(rules: RobotsRules) -> Self {
        Self {
            rules: Arc::new(rules),
            fetched_at: Utc::now(),
        }
    }

    /// Checks if the entry is older than `ttl`
    ///
    /// # Returns
    ///
    /// * `true` - If the entry should be refetched
    /// * `false` - If the entry is still fresh
    pub fn is_stale(&self, ttl: Duration) -> bool {
        self.age() >= ttl
    }

    /// Returns how long ago the robots.txt was fetched
    pub fn age(&self) -> Duration {
        Utc::now() - self.fetched_at
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_new_cached_robots() {
        let cached = CachedRobots::new(RobotsRules::allow_all());
        assert!(cached.rules.is_allowed("/"));
        assert!(!cached.is_stale(Duration::minutes(30)));
    }

    #[test]
    fn test_is_stale() {
        let mut cached = CachedRobots::new(RobotsRules::allow_all());
        cached.fetched_at = Utc::now() - Duration::minutes(31);

        assert!(cached.is_stale(Duration::minutes(30)));
        assert!(!cached.is_stale(Duration::hours(1)));
    }

    #[test]
    fn test_zero_ttl_is_always_stale() {
        let cached = CachedRobots::new(RobotsRules::allow_all());
        assert!(cached.is_stale(Duration::zero()));
    }

    #[test]
    fn test_age() {
        let mut cached = CachedRobots::new(RobotsRules::allow_all());
        cached.fetched_at = Utc::now() - Duration::hours(2);

        let age = cached.age();
        assert!(age >= Duration::hours(2));
        assert!(age < Duration::hours(2) + Duration::minutes(1));
    }
}
