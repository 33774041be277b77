//! Per-source last-reading cache shared between host delivery threads and
//! pollers.
//!
//! Every source identity gets its own slot, fixed when the cache is built.
//! A slot holds `Option<Arc<Stamped<R>>>` behind its own lock; a write swaps
//! the whole `Arc`, so a concurrent `poll` sees either the previous record or
//! the new one. There is no cache-wide lock.

use crate::platform::UpdateSink;
use chrono::{DateTime, Utc};
use std::collections::HashMap;
use std::fmt::Debug;
use std::hash::Hash;
use std::sync::{Arc, PoisonError, RwLock};

/// A reading together with the time this process received it.
#[derive(Debug, Clone, PartialEq)]
pub struct Stamped<R> {
    /// Receipt time (set by the cache, not by the host).
    pub received_at: DateTime<Utc>,
    /// The measurement itself.
    pub reading: R,
}

/// A source identity usable as a cache key.
pub trait CacheKey: Copy + Eq + Hash + Debug + Send + Sync + 'static {
    /// Every source the cache should hold a slot for.
    fn all() -> &'static [Self];
}

struct Slot<R> {
    current: RwLock<Option<Arc<Stamped<R>>>>,
}

impl<R> Slot<R> {
    fn new() -> Self {
        Self {
            current: RwLock::new(None),
        }
    }

    fn load(&self) -> Option<Arc<Stamped<R>>> {
        self.current
            .read()
            .unwrap_or_else(PoisonError::into_inner)
            .clone()
    }

    fn store(&self, value: Arc<Stamped<R>>) {
        *self.current.write().unwrap_or_else(PoisonError::into_inner) = Some(value);
    }
}

/// Last-known reading per source.
pub struct ReadingCache<S: CacheKey, R> {
    slots: HashMap<S, Slot<R>>,
}

impl<S: CacheKey, R: Send + Sync + 'static> ReadingCache<S, R> {
    /// Builds a cache with one empty slot per `S::all()` entry.
    #[must_use]
    pub fn new() -> Self {
        Self::for_sources(S::all())
    }

    /// Builds a cache restricted to `sources`.
    #[must_use]
    pub fn for_sources(sources: &[S]) -> Self {
        let slots = sources.iter().map(|s| (*s, Slot::new())).collect();
        Self { slots }
    }

    /// Most recent reading for `source`, or `None` if nothing has arrived yet.
    ///
    /// Never blocks on the host and never triggers a host round-trip.
    #[must_use]
    pub fn poll(&self, source: S) -> Option<Arc<Stamped<R>>> {
        self.slots.get(&source).and_then(Slot::load)
    }

    /// Replaces the slot for `source` with `reading`, stamped now.
    ///
    /// Returns `false` when the cache has no slot for `source`.
    pub fn replace(&self, source: S, reading: R) -> bool {
        match self.slots.get(&source) {
            Some(slot) => {
                slot.store(Arc::new(Stamped {
                    received_at: Utc::now(),
                    reading,
                }));
                true
            }
            None => {
                tracing::debug!(source = ?source, "dropping update for unknown source");
                false
            }
        }
    }

    /// Returns `true` if the cache holds a slot for `source`.
    #[must_use]
    pub fn has_source(&self, source: S) -> bool {
        self.slots.contains_key(&source)
    }
}

impl<S: CacheKey, R: Send + Sync + 'static> Default for ReadingCache<S, R> {
    fn default() -> Self {
        Self::new()
    }
}

impl<S: CacheKey, R: Send + Sync + 'static> UpdateSink<S, R> for ReadingCache<S, R> {
    fn on_update(&self, source: S, reading: R) {
        self.replace(source, reading);
    }
}

#[cfg(test)]
mod tests {
    #![allow(clippy::unwrap_used, clippy::expect_used)]

    use super::*;
    use std::thread;

    #[derive(Debug, Clone, Copy, PartialEq, Eq, Hash)]
    enum Source {
        A,
        B,
    }

    impl CacheKey for Source {
        fn all() -> &'static [Self] {
            &[Self::A, Self::B]
        }
    }

    #[derive(Debug, Clone, PartialEq)]
    struct Pair {
        left: u64,
        right: u64,
    }

    #[test]
    fn poll_before_update_is_none() {
        let cache: ReadingCache<Source, Pair> = ReadingCache::new();
        assert!(cache.poll(Source::A).is_none());
        assert!(cache.poll(Source::B).is_none());
    }

    #[test]
    fn latest_update_wins_per_source() {
        let cache: ReadingCache<Source, Pair> = ReadingCache::new();
        cache.replace(Source::A, Pair { left: 1, right: 1 });
        cache.replace(Source::A, Pair { left: 2, right: 2 });
        cache.replace(Source::B, Pair { left: 9, right: 9 });

        assert_eq!(cache.poll(Source::A).unwrap().reading, Pair { left: 2, right: 2 });
        assert_eq!(cache.poll(Source::B).unwrap().reading, Pair { left: 9, right: 9 });
    }

    #[test]
    fn restricted_cache_ignores_missing_source() {
        let cache: ReadingCache<Source, Pair> = ReadingCache::for_sources(&[Source::A]);
        assert!(!cache.replace(Source::B, Pair { left: 1, right: 1 }));
        assert!(cache.poll(Source::B).is_none());
        assert!(!cache.has_source(Source::B));
    }

    #[test]
    fn concurrent_readers_never_observe_torn_pairs() {
        let cache: Arc<ReadingCache<Source, Pair>> = Arc::new(ReadingCache::new());
        let writer = {
            let cache = Arc::clone(&cache);
            thread::spawn(move || {
                for i in 0..5_000u64 {
                    cache.on_update(Source::A, Pair { left: i, right: i });
                }
            })
        };

        let readers: Vec<_> = (0..4)
            .map(|_| {
                let cache = Arc::clone(&cache);
                thread::spawn(move || {
                    let mut last_seen = 0u64;
                    for _ in 0..5_000 {
                        if let Some(stamped) = cache.poll(Source::A) {
                            assert_eq!(stamped.reading.left, stamped.reading.right);
                            assert!(stamped.reading.left >= last_seen);
                            last_seen = stamped.reading.left;
                        }
                    }
                })
            })
            .collect();

        writer.join().unwrap();
        for r in readers {
            r.join().unwrap();
        }
        assert_eq!(cache.poll(Source::A).unwrap().reading.left, 4_999);
    }
}
