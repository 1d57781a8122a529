//! In-process LRU backend

use super::{CacheBackend, CacheStats, Generation};
use crate::error::{AuthzError, Result};
use dashmap::DashMap;
use lru::LruCache;
use parking_lot::Mutex;
use std::collections::{HashMap, HashSet};
use std::num::NonZeroUsize;
use std::sync::Arc;
use std::time::{Duration, Instant};

/// Cached entry with TTL
struct CachedEntry<V> {
    subject: String,
    value: V,
    cached_at: Instant,
    ttl: Duration,
}

impl<V> CachedEntry<V> {
    fn is_expired(&self) -> bool {
        self.cached_at.elapsed() > self.ttl
    }
}

struct State<V> {
    entries: LruCache<String, CachedEntry<V>>,
    /// Keys held by each subject
    by_subject: HashMap<String, HashSet<String>>,
    subject_generations: HashMap<String, u64>,
    global_generation: u64,
}

impl<V> State<V> {
    fn generation(&self, subject: &str) -> Generation {
        Generation {
            global: self.global_generation,
            subject: self.subject_generations.get(subject).copied().unwrap_or(0),
        }
    }

    fn unindex(&mut self, subject: &str, key: &str) {
        if let Some(keys) = self.by_subject.get_mut(subject) {
            keys.remove(key);
            if keys.is_empty() {
                self.by_subject.remove(subject);
            }
        }
    }
}

/// LRU cache with a per-subject key index
///
/// All state sits behind one mutex, so every operation is atomic and the
/// lock is never held across an await point.
pub struct MemoryCache<V> {
    state: Mutex<State<V>>,
    capacity: usize,
    stats: Arc<DashMap<&'static str, usize>>,
}

impl<V: Clone + Send> MemoryCache<V> {
    /// Create a cache holding at most `capacity` entries
    pub fn new(capacity: usize) -> Result<Self> {
        let cap = NonZeroUsize::new(capacity)
            .ok_or_else(|| AuthzError::Configuration("cache capacity must be positive".to_string()))?;

        Ok(Self {
            state: Mutex::new(State {
                entries: LruCache::new(cap),
                by_subject: HashMap::new(),
                subject_generations: HashMap::new(),
                global_generation: 0,
            }),
            capacity,
            stats: Arc::new(DashMap::new()),
        })
    }

    pub fn len(&self) -> usize {
        self.state.lock().entries.len()
    }

    pub fn is_empty(&self) -> bool {
        self.len() == 0
    }

    /// Subjects with a live invalidation counter
    pub fn tracked_subjects(&self) -> usize {
        self.state.lock().subject_generations.len()
    }

    fn increment_stat(&self, name: &'static str) {
        self.add_stat(name, 1);
    }

    fn add_stat(&self, name: &'static str, n: usize) {
        *self.stats.entry(name).or_insert(0) += n;
    }

    fn get_stat(&self, name: &'static str) -> usize {
        self.stats.get(name).map(|v| *v).unwrap_or(0)
    }
}

impl<V: Clone + Send> CacheBackend<V> for MemoryCache<V> {
    fn get(&self, subject: &str, key: &str) -> Result<Option<V>> {
        let mut state = self.state.lock();
        let lookup = state
            .entries
            .get(key)
            .filter(|entry| entry.subject == subject)
            .map(|entry| (!entry.is_expired()).then(|| entry.value.clone()));

        match lookup {
            Some(Some(value)) => {
                drop(state);
                self.increment_stat("hits");
                Ok(Some(value))
            }
            Some(None) => {
                if let Some(entry) = state.entries.pop(key) {
                    state.unindex(&entry.subject, key);
                }
                drop(state);
                self.increment_stat("expirations");
                self.increment_stat("misses");
                Ok(None)
            }
            None => {
                drop(state);
                self.increment_stat("misses");
                Ok(None)
            }
        }
    }

    fn put(&self, subject: &str, key: &str, value: V, ttl: Duration, observed: Generation) -> Result<bool> {
        let mut state = self.state.lock();

        if state.generation(subject) != observed {
            drop(state);
            self.increment_stat("stale_writes");
            return Ok(false);
        }

        let entry = CachedEntry {
            subject: subject.to_string(),
            value,
            cached_at: Instant::now(),
            ttl,
        };

        let mut evicted = false;
        if let Some((old_key, old_entry)) = state.entries.push(key.to_string(), entry) {
            // push returns the replaced entry for the same key, or the LRU victim
            if old_key != key || old_entry.subject != subject {
                state.unindex(&old_entry.subject, &old_key);
            }
            evicted = old_key != key;
        }
        state
            .by_subject
            .entry(subject.to_string())
            .or_default()
            .insert(key.to_string());
        drop(state);

        if evicted {
            self.increment_stat("evictions");
        }
        Ok(true)
    }

    fn generation(&self, subject: &str) -> Result<Generation> {
        Ok(self.state.lock().generation(subject))
    }

    fn invalidate(&self, subject: &str) -> Result<usize> {
        let mut state = self.state.lock();

        if state.subject_generations.len() >= self.capacity && !state.subject_generations.contains_key(subject) {
            // Bumping the global epoch fences every outstanding write, so the
            // per-subject counters can start over
            state.global_generation += 1;
            state.subject_generations.clear();
        }
        *state.subject_generations.entry(subject.to_string()).or_insert(0) += 1;

        let keys = state.by_subject.remove(subject).unwrap_or_default();
        let mut removed = 0;
        for key in &keys {
            if state.entries.pop(key.as_str()).is_some() {
                removed += 1;
            }
        }
        drop(state);

        self.increment_stat("invalidations");
        Ok(removed)
    }

    fn clear(&self) -> Result<()> {
        let mut state = self.state.lock();
        state.global_generation += 1;
        state.subject_generations.clear();
        state.entries.clear();
        state.by_subject.clear();
        drop(state);

        self.increment_stat("invalidations");
        Ok(())
    }

    fn stats(&self) -> CacheStats {
        CacheStats {
            hits: self.get_stat("hits"),
            misses: self.get_stat("misses"),
            expirations: self.get_stat("expirations"),
            evictions: self.get_stat("evictions"),
            stale_writes: self.get_stat("stale_writes"),
            invalidations: self.get_stat("invalidations"),
            entries: self.len(),
            max_entries: self.capacity,
        }
    }
}
