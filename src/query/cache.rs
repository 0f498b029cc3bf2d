//! Memoization of structured-query compilation.

use std::num::NonZeroUsize;
use std::sync::atomic::{AtomicU64, Ordering};
use std::sync::Arc;

use lru::LruCache;
use parking_lot::Mutex;
use tracing::trace;

use crate::error::Result;
use crate::query::ast::StructuredQuery;
use crate::query::cql;

/// Capacity of the process-default compiler cache.
pub const DEFAULT_QUERY_CACHE_CAPACITY: usize = 100;

/// Pure compiler from a structured description to query text.
pub type CompileFn = Arc<dyn Fn(&StructuredQuery) -> Result<String> + Send + Sync>;

/// Strategy for resolving structured queries to raw text.
///
/// Implementations must return identical text for value-equal queries; caching only
/// affects latency.
pub trait QueryCache: Send + Sync {
    /// Returns the compiled text for `query`.
    fn resolve_raw(&self, query: &StructuredQuery) -> Result<Arc<str>>;

    /// Hit/miss counters, when the strategy tracks them.
    fn stats(&self) -> CacheStats {
        CacheStats::default()
    }
}

/// Counters reported by a [`QueryCache`].
#[derive(Clone, Copy, Debug, Default, PartialEq, Eq)]
pub struct CacheStats {
    /// Lookups served from the cache.
    pub hits: u64,
    /// Lookups that compiled.
    pub misses: u64,
    /// Entries currently held.
    pub len: usize,
    /// Maximum entries held.
    pub capacity: usize,
}

/// Least-recently-used cache in front of a [`CompileFn`].
///
/// Compilation happens outside the lock: concurrent misses on the same key may both
/// compile, and the last insert wins with identical text.
pub struct LruQueryCache {
    compile: CompileFn,
    entries: Mutex<LruCache<StructuredQuery, Arc<str>>>,
    hits: AtomicU64,
    misses: AtomicU64,
}

impl LruQueryCache {
    /// Wraps `compile` with an LRU of `capacity` entries (at least one).
    pub fn new(compile: CompileFn, capacity: usize) -> Self {
        let capacity = NonZeroUsize::new(capacity.max(1)).unwrap_or(NonZeroUsize::MIN);
        Self {
            compile,
            entries: Mutex::new(LruCache::new(capacity)),
            hits: AtomicU64::new(0),
            misses: AtomicU64::new(0),
        }
    }

    /// The default CQL renderer with the given capacity.
    pub fn with_capacity(capacity: usize) -> Self {
        Self::new(Arc::new(cql::render), capacity)
    }

    /// Drops every cached entry; counters are kept.
    pub fn clear(&self) {
        self.entries.lock().clear();
    }
}

impl Default for LruQueryCache {
    fn default() -> Self {
        Self::with_capacity(DEFAULT_QUERY_CACHE_CAPACITY)
    }
}

impl QueryCache for LruQueryCache {
    fn resolve_raw(&self, query: &StructuredQuery) -> Result<Arc<str>> {
        if let Some(text) = self.entries.lock().get(query).cloned() {
            self.hits.fetch_add(1, Ordering::Relaxed);
            trace!(table = query.table(), "query cache hit");
            return Ok(text);
        }
        self.misses.fetch_add(1, Ordering::Relaxed);
        trace!(table = query.table(), "query cache miss");
        let text: Arc<str> = (self.compile)(query)?.into();
        self.entries.lock().put(query.clone(), text.clone());
        Ok(text)
    }

    fn stats(&self) -> CacheStats {
        let entries = self.entries.lock();
        CacheStats {
            hits: self.hits.load(Ordering::Relaxed),
            misses: self.misses.load(Ordering::Relaxed),
            len: entries.len(),
            capacity: entries.cap().get(),
        }
    }
}

/// Compiles on every call.
pub struct UncachedQueries {
    compile: CompileFn,
    compiled: AtomicU64,
}

impl UncachedQueries {
    /// Wraps `compile` without memoization.
    pub fn new(compile: CompileFn) -> Self {
        Self {
            compile,
            compiled: AtomicU64::new(0),
        }
    }
}

impl Default for UncachedQueries {
    fn default() -> Self {
        Self::new(Arc::new(cql::render))
    }
}

impl QueryCache for UncachedQueries {
    fn resolve_raw(&self, query: &StructuredQuery) -> Result<Arc<str>> {
        self.compiled.fetch_add(1, Ordering::Relaxed);
        Ok((self.compile)(query)?.into())
    }

    fn stats(&self) -> CacheStats {
        CacheStats {
            misses: self.compiled.load(Ordering::Relaxed),
            ..CacheStats::default()
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::query::builder::select;
    use std::sync::atomic::AtomicUsize;

    fn counting_compiler() -> (CompileFn, Arc<AtomicUsize>) {
        let calls = Arc::new(AtomicUsize::new(0));
        let counter = calls.clone();
        let compile: CompileFn = Arc::new(move |query: &StructuredQuery| {
            counter.fetch_add(1, Ordering::SeqCst);
            cql::render(query)
        });
        (compile, calls)
    }

    #[test]
    fn second_lookup_is_a_hit() {
        let (compile, calls) = counting_compiler();
        let cache = LruQueryCache::new(compile, 4);
        let query: StructuredQuery = select("t").where_eq("id", 42).into();

        let first = cache.resolve_raw(&query).unwrap();
        let second = cache.resolve_raw(&select("t").where_eq("id", 42).into()).unwrap();

        assert_eq!(first, second);
        assert_eq!(calls.load(Ordering::SeqCst), 1);
        let stats = cache.stats();
        assert_eq!((stats.hits, stats.misses, stats.len), (1, 1, 1));
    }

    #[test]
    fn eviction_only_costs_recompilation() {
        let (compile, calls) = counting_compiler();
        let cache = LruQueryCache::new(compile, 2);
        let queries: Vec<StructuredQuery> =
            (0..3).map(|id| select("t").where_eq("id", id).into()).collect();

        let texts: Vec<_> = queries.iter().map(|q| cache.resolve_raw(q).unwrap()).collect();
        // queries[0] was evicted by queries[2]
        let again = cache.resolve_raw(&queries[0]).unwrap();

        assert_eq!(again, texts[0]);
        assert_eq!(calls.load(Ordering::SeqCst), 4);
        assert_eq!(cache.stats().len, 2);
    }

    #[test]
    fn compile_errors_are_not_cached() {
        let (compile, calls) = counting_compiler();
        let cache = LruQueryCache::new(compile, 2);
        let bad: StructuredQuery = crate::query::builder::delete_from("t").into();
        assert!(cache.resolve_raw(&bad).is_err());
        assert!(cache.resolve_raw(&bad).is_err());
        assert_eq!(calls.load(Ordering::SeqCst), 2);
        assert_eq!(cache.stats().len, 0);
    }

    #[test]
    fn zero_capacity_is_clamped() {
        let cache = LruQueryCache::with_capacity(0);
        assert_eq!(cache.stats().capacity, 1);
    }

    #[test]
    fn uncached_strategy_compiles_every_time() {
        let (compile, calls) = counting_compiler();
        let cache = UncachedQueries::new(compile);
        let query: StructuredQuery = select("t").into();
        assert_eq!(cache.resolve_raw(&query).unwrap(), cache.resolve_raw(&query).unwrap());
        assert_eq!(calls.load(Ordering::SeqCst), 2);
        assert_eq!(cache.stats().misses, 2);
    }
}
