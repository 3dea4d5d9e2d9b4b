//! Configuration knobs for the caching engine.

use crate::validity::HeuristicOptions;

/// Configuration for [`crate::exec::CachingExec`]/[`crate::exec::AsyncCachingExec`].
#[derive(Debug, Clone)]
pub struct CacheConfig {
    /// Responses larger than this (bytes) are never stored.
    pub max_object_size: usize,
    /// Upper bound on entries held by the default [`crate::storage::InternalCacheStorage`].
    pub max_cache_entries: usize,
    /// Enables shared-cache semantics (`s-maxage`, `Authorization` gating).
    pub shared_cache: bool,
    /// RFC 7234 §4.2.2 heuristic freshness.
    pub heuristics: HeuristicOptions,
    /// Number of background revalidation workers; `0` disables asynchronous
    /// revalidation entirely (all revalidation runs in the foreground).
    pub asynchronous_workers: usize,
    /// Enables single-flight request collapsing on cold misses.
    pub request_collapsing_enabled: bool,
    /// Agent identifier embedded in the `Via` header on cache-served responses.
    pub agent: String,
}

impl Default for CacheConfig {
    fn default() -> Self {
        Self {
            max_object_size: 8 * 1024 * 1024,
            max_cache_entries: 10_000,
            shared_cache: false,
            heuristics: HeuristicOptions::default(),
            asynchronous_workers: 1,
            request_collapsing_enabled: true,
            agent: concat!("http-cache-core/", env!("CARGO_PKG_VERSION")).to_string(),
        }
    }
}
