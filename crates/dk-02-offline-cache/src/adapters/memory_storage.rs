//! In-memory `CacheStorage` backed by `DashMap`.

use crate::domain::{CacheEntry, CacheError, EntryMeta};
use crate::ports::CacheStorage;
use dashmap::DashMap;
use std::collections::HashMap;
use std::sync::atomic::{AtomicBool, AtomicU64, Ordering};

struct Slot {
    entry: CacheEntry,
    last_access: u64,
}

/// Named caches held in process memory.
///
/// An optional byte quota applies across all caches; `set_unavailable`
/// makes every call fail, standing in for a storage outage.
pub struct MemoryCacheStorage {
    caches: DashMap<String, HashMap<String, Slot>>,
    access_counter: AtomicU64,
    quota_bytes: Option<usize>,
    unavailable: AtomicBool,
}

impl Default for MemoryCacheStorage {
    fn default() -> Self {
        Self::new()
    }
}

impl MemoryCacheStorage {
    pub fn new() -> Self {
        Self {
            caches: DashMap::new(),
            access_counter: AtomicU64::new(0),
            quota_bytes: None,
            unavailable: AtomicBool::new(false),
        }
    }

    pub fn with_quota(quota_bytes: usize) -> Self {
        Self {
            quota_bytes: Some(quota_bytes),
            ..Self::new()
        }
    }

    pub fn set_unavailable(&self, unavailable: bool) {
        self.unavailable.store(unavailable, Ordering::SeqCst);
    }

    /// Bytes held across all caches
    pub fn used_bytes(&self) -> usize {
        self.caches
            .iter()
            .map(|cache| cache.value().values().map(|s| s.entry.response.size()).sum::<usize>())
            .sum()
    }

    /// Number of keys in one cache
    pub fn len(&self, cache: &str) -> usize {
        self.caches.get(cache).map(|c| c.len()).unwrap_or(0)
    }

    fn check_available(&self) -> Result<(), CacheError> {
        if self.unavailable.load(Ordering::SeqCst) {
            return Err(CacheError::StorageUnavailable("storage offline".into()));
        }
        Ok(())
    }

    fn next_access(&self) -> u64 {
        self.access_counter.fetch_add(1, Ordering::SeqCst) + 1
    }
}

impl CacheStorage for MemoryCacheStorage {
    fn get(&self, cache: &str, key: &str) -> Result<Option<CacheEntry>, CacheError> {
        self.check_available()?;
        Ok(self
            .caches
            .get(cache)
            .and_then(|c| c.get(key).map(|slot| slot.entry.clone())))
    }

    fn put(&self, cache: &str, key: &str, entry: CacheEntry) -> Result<(), CacheError> {
        self.check_available()?;

        if let Some(quota) = self.quota_bytes {
            // Computed before taking the shard lock below
            let replaced = self
                .caches
                .get(cache)
                .and_then(|c| c.get(key).map(|s| s.entry.response.size()))
                .unwrap_or(0);
            let used = self.used_bytes().saturating_sub(replaced);
            let needed = entry.response.size();
            if used + needed > quota {
                return Err(CacheError::QuotaExceeded {
                    needed,
                    available: quota.saturating_sub(used),
                });
            }
        }

        let last_access = self.next_access();
        self.caches
            .entry(cache.to_string())
            .or_default()
            .insert(key.to_string(), Slot { entry, last_access });
        Ok(())
    }

    fn touch(&self, cache: &str, key: &str) -> Result<(), CacheError> {
        self.check_available()?;
        let access = self.next_access();
        if let Some(mut c) = self.caches.get_mut(cache) {
            if let Some(slot) = c.get_mut(key) {
                slot.last_access = access;
            }
        }
        Ok(())
    }

    fn delete(&self, cache: &str, key: &str) -> Result<bool, CacheError> {
        self.check_available()?;
        Ok(self
            .caches
            .get_mut(cache)
            .map(|mut c| c.remove(key).is_some())
            .unwrap_or(false))
    }

    fn entries(&self, cache: &str) -> Result<Vec<EntryMeta>, CacheError> {
        self.check_available()?;
        Ok(self
            .caches
            .get(cache)
            .map(|c| {
                c.iter()
                    .map(|(key, slot)| EntryMeta {
                        key: key.clone(),
                        stored_at: slot.entry.stored_at,
                        last_access: slot.last_access,
                    })
                    .collect()
            })
            .unwrap_or_default())
    }

    fn delete_cache(&self, cache: &str) -> Result<bool, CacheError> {
        self.check_available()?;
        Ok(self.caches.remove(cache).is_some())
    }

    fn cache_names(&self) -> Result<Vec<String>, CacheError> {
        self.check_available()?;
        let mut names: Vec<String> = self.caches.iter().map(|c| c.key().clone()).collect();
        names.sort();
        Ok(names)
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::domain::CachedResponse;

    fn entry(body: &str, stored_at: u64) -> CacheEntry {
        CacheEntry {
            response: CachedResponse::new(200, body.to_string()),
            stored_at,
        }
    }

    #[test]
    fn test_put_get_delete() {
        let storage = MemoryCacheStorage::new();
        storage.put("pages-cache", "k", entry("hello", 1)).unwrap();
        assert_eq!(storage.get("pages-cache", "k").unwrap(), Some(entry("hello", 1)));
        assert_eq!(storage.get("other", "k").unwrap(), None);
        assert!(storage.delete("pages-cache", "k").unwrap());
        assert!(!storage.delete("pages-cache", "k").unwrap());
    }

    #[test]
    fn test_touch_bumps_last_access() {
        let storage = MemoryCacheStorage::new();
        storage.put("c", "a", entry("1", 1)).unwrap();
        storage.put("c", "b", entry("2", 1)).unwrap();
        storage.touch("c", "a").unwrap();

        let mut metas = storage.entries("c").unwrap();
        metas.sort_by_key(|m| m.last_access);
        assert_eq!(metas.last().unwrap().key, "a");
    }

    #[test]
    fn test_quota_counts_replacement_once() {
        let storage = MemoryCacheStorage::with_quota(10);
        storage.put("c", "a", entry("12345678", 1)).unwrap();
        // Replacing the same key frees its old size first
        storage.put("c", "a", entry("1234567890", 2)).unwrap();

        let err = storage.put("c", "b", entry("x", 3)).unwrap_err();
        assert_eq!(
            err,
            CacheError::QuotaExceeded {
                needed: 1,
                available: 0
            }
        );
    }

    #[test]
    fn test_unavailable_fails_every_call() {
        let storage = MemoryCacheStorage::new();
        storage.set_unavailable(true);
        assert!(matches!(
            storage.get("c", "k"),
            Err(CacheError::StorageUnavailable(_))
        ));
        assert!(storage.cache_names().is_err());
    }

    #[test]
    fn test_cache_names_sorted() {
        let storage = MemoryCacheStorage::new();
        storage.put("pages-cache", "k", entry("x", 1)).unwrap();
        storage.put("api-cache", "k", entry("x", 1)).unwrap();
        assert_eq!(storage.cache_names().unwrap(), vec!["api-cache", "pages-cache"]);
        assert!(storage.delete_cache("api-cache").unwrap());
        assert_eq!(storage.cache_names().unwrap(), vec!["pages-cache"]);
    }
}
