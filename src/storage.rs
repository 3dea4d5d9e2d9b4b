//! The storage capability the core consumes, and its in-memory reference
//! implementation.

use std::num::NonZeroUsize;
use std::sync::Arc;

use async_trait::async_trait;
use lru::LruCache;
use tokio::sync::Mutex;

use crate::entry::CacheEntry;
use crate::error::Result;

/// Invoked with `(key, entry)` whenever [`InternalCacheStorage`] evicts an
/// entry, so the caller can release any backend resource (e.g. a file) the
/// entry's [`Resource`](crate::entry::Resource) referred to.
pub type EvictionCallback = Arc<dyn Fn(&str, &CacheEntry) + Send + Sync>;

/// The storage capability consumed by [`crate::exec::CachingExec`]. External
/// collaborators implement this against disk, a remote KV store, etc.; the
/// core only ever talks to this trait.
#[async_trait]
pub trait CacheStorage: Send + Sync {
    /// Fetch the entry stored at `key`, if any.
    async fn get(&self, key: &str) -> Result<Option<Arc<CacheEntry>>>;

    /// Store `entry` at `key`, replacing whatever was there.
    async fn put(&self, key: &str, entry: Arc<CacheEntry>) -> Result<()>;

    /// Remove the entry at `key`, if any.
    async fn remove(&self, key: &str) -> Result<()>;

    /// Atomically read-modify-write the entry at `key`. `f` receives the
    /// current value (or `None`) and returns the value to store; `None`
    /// from `f` removes the entry. Implementations must hold the update
    /// atomic with respect to concurrent `get`/`put`/`update` on the same
    /// key so that, e.g., two concurrent variant registrations against the
    /// same root entry never lose one write.
    async fn update(
        &self,
        key: &str,
        f: Box<dyn FnOnce(Option<Arc<CacheEntry>>) -> Option<Arc<CacheEntry>> + Send>,
    ) -> Result<()>;
}

/// Fixed-capacity LRU reference implementation of [`CacheStorage`].
impl std::fmt::Debug for InternalCacheStorage {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.debug_struct("InternalCacheStorage").finish()
    }
}

pub struct InternalCacheStorage {
    capacity: NonZeroUsize,
    entries: Mutex<LruCache<String, Arc<CacheEntry>>>,
    on_evict: Option<EvictionCallback>,
}

impl InternalCacheStorage {
    /// Create storage bounded to `capacity` entries.
    pub fn new(capacity: NonZeroUsize) -> Self {
        Self { capacity, entries: Mutex::new(LruCache::new(capacity)), on_evict: None }
    }

    /// Create storage that invokes `on_evict` for every entry it evicts.
    pub fn with_eviction_callback(capacity: NonZeroUsize, on_evict: EvictionCallback) -> Self {
        Self { capacity, entries: Mutex::new(LruCache::new(capacity)), on_evict: Some(on_evict) }
    }

    /// Current number of stored entries.
    pub async fn len(&self) -> usize {
        self.entries.lock().await.len()
    }

    /// True when no entries are stored.
    pub async fn is_empty(&self) -> bool {
        self.len().await == 0
    }

    /// Remove every stored entry.
    pub async fn clear(&self) {
        self.entries.lock().await.clear();
    }

    /// The configured capacity.
    pub fn capacity(&self) -> NonZeroUsize {
        self.capacity
    }
}

#[async_trait]
impl CacheStorage for InternalCacheStorage {
    async fn get(&self, key: &str) -> Result<Option<Arc<CacheEntry>>> {
        let mut entries = self.entries.lock().await;
        Ok(entries.get(key).cloned())
    }

    async fn put(&self, key: &str, entry: Arc<CacheEntry>) -> Result<()> {
        let mut entries = self.entries.lock().await;
        log::debug!("storage put {key}");
        if let Some((evicted_key, evicted_entry)) = entries.push(key.to_string(), entry) {
            if evicted_key != key {
                log::debug!("storage evicted {evicted_key} to make room for {key}");
                if let Some(cb) = &self.on_evict {
                    cb(&evicted_key, &evicted_entry);
                }
            }
        }
        Ok(())
    }

    async fn remove(&self, key: &str) -> Result<()> {
        let mut entries = self.entries.lock().await;
        log::debug!("storage remove {key}");
        entries.pop(key);
        Ok(())
    }

    async fn update(
        &self,
        key: &str,
        f: Box<dyn FnOnce(Option<Arc<CacheEntry>>) -> Option<Arc<CacheEntry>> + Send>,
    ) -> Result<()> {
        let mut entries = self.entries.lock().await;
        let current = entries.get(key).cloned();
        match f(current) {
            Some(next) => {
                entries.put(key.to_string(), next);
            }
            None => {
                entries.pop(key);
            }
        }
        Ok(())
    }
}

#[cfg(test)]
mod test {
    use super::*;
    use http::{Method, StatusCode, Version};
    use std::collections::BTreeMap;
    use std::sync::atomic::{AtomicUsize, Ordering};
    use std::time::SystemTime;

    fn entry(uri: &str) -> Arc<CacheEntry> {
        Arc::new(CacheEntry {
            request_instant: SystemTime::now(),
            response_instant: SystemTime::now(),
            status: StatusCode::OK,
            headers: vec![],
            resource: None,
            variant_map: BTreeMap::new(),
            request_method: Method::GET,
            request_uri: uri.to_string(),
            request_version: Version::HTTP_11,
        })
    }

    #[tokio::test]
    async fn get_put_remove_round_trip() {
        let storage = InternalCacheStorage::new(NonZeroUsize::new(4).unwrap());
        storage.put("a", entry("a")).await.unwrap();
        assert!(storage.get("a").await.unwrap().is_some());
        storage.remove("a").await.unwrap();
        assert!(storage.get("a").await.unwrap().is_none());
    }

    #[tokio::test]
    async fn evicts_least_recently_used_beyond_capacity() {
        let evicted = Arc::new(AtomicUsize::new(0));
        let evicted_clone = evicted.clone();
        let storage = InternalCacheStorage::with_eviction_callback(
            NonZeroUsize::new(2).unwrap(),
            Arc::new(move |_, _| {
                evicted_clone.fetch_add(1, Ordering::SeqCst);
            }),
        );
        storage.put("a", entry("a")).await.unwrap();
        storage.put("b", entry("b")).await.unwrap();
        storage.put("c", entry("c")).await.unwrap();
        assert_eq!(storage.len().await, 2);
        assert_eq!(evicted.load(Ordering::SeqCst), 1);
        assert!(storage.get("a").await.unwrap().is_none());
    }

    #[tokio::test]
    async fn update_is_atomic_read_modify_write() {
        let storage = InternalCacheStorage::new(NonZeroUsize::new(4).unwrap());
        storage.put("root", entry("root")).await.unwrap();
        storage
            .update(
                "root",
                Box::new(|current| {
                    let mut e = (*current.unwrap()).clone();
                    e.variant_map.insert("v1".into(), "root:v1".into());
                    Some(Arc::new(e))
                }),
            )
            .await
            .unwrap();
        let updated = storage.get("root").await.unwrap().unwrap();
        assert_eq!(updated.variant_map.get("v1"), Some(&"root:v1".to_string()));
    }
}
