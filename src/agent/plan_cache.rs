//! Plan cache keyed by semantic cache keys
//!
//! Caches execution plans for repeat queries with the same semantic shape.
//! Keys come from the planner and already encode intent type, measures,
//! dimensions and filters, so lookups are exact only.

use super::planner::ExecutionPlan;
use lru::LruCache;
use std::num::NonZeroUsize;

/// Maximum cache entries
const CACHE_SIZE: usize = 100;

/// LRU cache of finished execution plans
pub struct PlanCache {
    cache: LruCache<String, ExecutionPlan>,
    hits: u64,
    misses: u64,
}

/// Cache statistics snapshot
#[derive(Debug, Clone, Copy)]
pub struct PlanCacheStats {
    pub size: usize,
    pub capacity: usize,
    pub hits: u64,
    pub misses: u64,
}

impl Default for PlanCache {
    fn default() -> Self {
        Self::new()
    }
}

impl PlanCache {
    pub fn new() -> Self {
        Self::with_capacity(CACHE_SIZE)
    }

    pub fn with_capacity(capacity: usize) -> Self {
        Self {
            cache: LruCache::new(NonZeroUsize::new(capacity.max(1)).unwrap()),
            hits: 0,
            misses: 0,
        }
    }

    /// Look up a plan by its cache key
    pub fn get(&mut self, key: &str) -> Option<ExecutionPlan> {
        match self.cache.get(key) {
            Some(plan) => {
                self.hits += 1;
                Some(plan.clone())
            }
            None => {
                self.misses += 1;
                None
            }
        }
    }

    /// Store a plan under its cache key; plans without a key are not cached
    pub fn insert(&mut self, plan: &ExecutionPlan) {
        if let Some(key) = &plan.cache_key {
            self.cache.put(key.clone(), plan.clone());
        }
    }

    pub fn clear(&mut self) {
        self.cache.clear();
        self.hits = 0;
        self.misses = 0;
    }

    pub fn stats(&self) -> PlanCacheStats {
        PlanCacheStats {
            size: self.cache.len(),
            capacity: self.cache.cap().get(),
            hits: self.hits,
            misses: self.misses,
        }
    }
}
