//! Subject-scoped caching
//!
//! Every entry belongs to a subject (user id) so that a role or permission
//! mutation can purge everything derived from that subject in one call.
//! Writes are fenced by a [`Generation`] read before the value was computed:
//! a write computed before an invalidation is refused, which keeps a
//! concurrent evaluation from re-inserting a revoked grant.

pub mod decision;
pub mod memory;
pub mod subject;

pub use decision::{CacheKey, CachedDecision, DecisionCache, DecisionInputs};
pub use memory::MemoryCache;
pub use subject::SubjectCache;

use crate::error::Result;
use serde::{Deserialize, Serialize};
use std::time::Duration;

/// Cached decisions must expire well within this bound
pub const MAX_CACHE_TTL: Duration = Duration::from_secs(3600);

/// Cache configuration
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(default)]
pub struct CacheConfig {
    /// Cache positive decisions
    pub enabled: bool,

    /// Time-to-live for cached decisions, in seconds
    pub ttl_secs: u64,

    /// Time-to-live for cached role/permission lookups, in seconds
    pub grants_ttl_secs: u64,

    /// Maximum number of entries per cache
    pub capacity: usize,
}

impl Default for CacheConfig {
    fn default() -> Self {
        Self {
            enabled: true,
            ttl_secs: 60,
            grants_ttl_secs: 30,
            capacity: 10_000,
        }
    }
}

impl CacheConfig {
    pub fn ttl(&self) -> Duration {
        Duration::from_secs(self.ttl_secs)
    }

    pub fn grants_ttl(&self) -> Duration {
        Duration::from_secs(self.grants_ttl_secs)
    }
}

/// Invalidation epoch observed for a subject
///
/// Combines the global epoch (bumped by `clear`) with the subject's own
/// epoch (bumped by `invalidate`).
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Default)]
pub struct Generation {
    pub global: u64,
    pub subject: u64,
}

/// Cache statistics
#[derive(Debug, Clone, Default, PartialEq, Serialize, Deserialize)]
pub struct CacheStats {
    pub hits: usize,
    pub misses: usize,
    pub expirations: usize,
    pub evictions: usize,
    /// Writes refused because the subject was invalidated meanwhile
    pub stale_writes: usize,
    pub invalidations: usize,
    pub entries: usize,
    pub max_entries: usize,
}

impl CacheStats {
    /// Calculate hit rate
    pub fn hit_rate(&self) -> f64 {
        let total = self.hits + self.misses;
        if total == 0 {
            0.0
        } else {
            self.hits as f64 / total as f64
        }
    }
}

/// Storage behind a subject-scoped cache
///
/// Each operation must be atomic with respect to the others; in particular
/// `put` must compare the generation and insert under one critical section.
pub trait CacheBackend<V>: Send + Sync {
    /// Look up a live entry stored for `subject`
    fn get(&self, subject: &str, key: &str) -> Result<Option<V>>;

    /// Insert unless `subject` was invalidated after `observed` was read;
    /// returns whether the value was stored
    fn put(&self, subject: &str, key: &str, value: V, ttl: Duration, observed: Generation) -> Result<bool>;

    /// Current generation for a subject
    fn generation(&self, subject: &str) -> Result<Generation>;

    /// Drop every entry of a subject; returns how many were removed
    fn invalidate(&self, subject: &str) -> Result<usize>;

    /// Drop everything
    fn clear(&self) -> Result<()>;

    fn stats(&self) -> CacheStats;
}
