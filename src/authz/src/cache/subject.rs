//! Fail-safe wrapper around a cache backend
//!
//! Backend failures never fail a request: a failed lookup is a miss and a
//! failed write is skipped. A failed invalidation is escalated to a full
//! clear, and if that fails too the cache switches into bypass mode where
//! every lookup misses and nothing is stored, since stale grants could no
//! longer be ruled out.

use super::{CacheBackend, CacheStats, Generation};
use crate::error::{AuthzError, Result};
use std::sync::atomic::{AtomicBool, Ordering};
use std::sync::Arc;
use std::time::Duration;
use tracing::{error, warn};

/// Subject-scoped cache with degradation handling
pub struct SubjectCache<V> {
    name: &'static str,
    backend: Arc<dyn CacheBackend<V>>,
    ttl: Duration,
    enabled: bool,
    bypass: AtomicBool,
}

impl<V> SubjectCache<V> {
    pub fn new(name: &'static str, backend: Arc<dyn CacheBackend<V>>, ttl: Duration, enabled: bool) -> Self {
        Self {
            name,
            backend,
            ttl,
            enabled,
            bypass: AtomicBool::new(false),
        }
    }

    pub fn ttl(&self) -> Duration {
        self.ttl
    }

    /// Whether lookups and writes are currently served
    pub fn is_active(&self) -> bool {
        self.enabled && !self.is_bypassed()
    }

    /// Whether a failed invalidation forced the cache out of service
    pub fn is_bypassed(&self) -> bool {
        self.bypass.load(Ordering::Acquire)
    }

    /// Generation to fence a later `put`; `None` disables caching for this pass
    pub fn generation(&self, subject: &str) -> Option<Generation> {
        if !self.is_active() {
            return None;
        }
        match self.backend.generation(subject) {
            Ok(generation) => Some(generation),
            Err(e) => {
                warn!("{} cache generation read failed, skipping cache: {}", self.name, e);
                None
            }
        }
    }

    pub fn get(&self, subject: &str, key: &str) -> Option<V> {
        if !self.is_active() {
            return None;
        }
        match self.backend.get(subject, key) {
            Ok(value) => value,
            Err(e) => {
                warn!("{} cache lookup failed, treating as miss: {}", self.name, e);
                None
            }
        }
    }

    /// Store a value computed after `observed` was read
    pub fn put(&self, subject: &str, key: &str, value: V, observed: Generation) -> bool {
        if !self.is_active() {
            return false;
        }
        match self.backend.put(subject, key, value, self.ttl, observed) {
            Ok(stored) => stored,
            Err(e) => {
                warn!("{} cache write failed, skipping: {}", self.name, e);
                false
            }
        }
    }

    /// Purge a subject before returning
    pub fn invalidate(&self, subject: &str) -> Result<()> {
        if self.is_bypassed() {
            return Ok(());
        }
        match self.backend.invalidate(subject) {
            Ok(_) => Ok(()),
            Err(e) => {
                warn!(
                    "{} cache invalidation for '{}' failed, clearing: {}",
                    self.name, subject, e
                );
                self.clear()
            }
        }
    }

    /// Purge everything
    pub fn clear(&self) -> Result<()> {
        if self.is_bypassed() {
            return Ok(());
        }
        self.backend.clear().map_err(|e| {
            error!("{} cache clear failed, bypassing cache: {}", self.name, e);
            self.bypass.store(true, Ordering::Release);
            AuthzError::Cache(format!("{} cache unavailable: {}", self.name, e))
        })
    }

    pub fn stats(&self) -> CacheStats {
        self.backend.stats()
    }
}
