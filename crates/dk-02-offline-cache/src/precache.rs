//! Precache: install the build manifest, purge stale revisions on activate.

use crate::domain::config::PRECACHE_MARKER;
use crate::domain::precache::{cache_key_for, url_variations};
use crate::domain::{CacheEntry, CacheError, CacheRequest, PrecacheManifest};
use crate::ports::{CacheStorage, Clock, Network};
use std::collections::{BTreeMap, HashSet};
use tracing::{debug, info, warn};
use url::Url;

/// Outcome of an install.
#[derive(Debug, Clone, Default, PartialEq, Eq)]
pub struct InstallReport {
    /// URLs fetched and written
    pub updated: Vec<String>,
    /// URLs whose current revision was already cached
    pub not_updated: Vec<String>,
}

/// URL to cache key mapping for one build.
#[derive(Debug, Clone)]
pub struct PrecacheController {
    cache_name: String,
    scope: Url,
    url_to_key: BTreeMap<String, String>,
}

impl PrecacheController {
    pub fn new(cache_name: impl Into<String>, scope: Url) -> Self {
        Self {
            cache_name: cache_name.into(),
            scope,
            url_to_key: BTreeMap::new(),
        }
    }

    pub fn cache_name(&self) -> &str {
        &self.cache_name
    }

    /// Register manifest entries. The same URL with two revisions is an error.
    pub fn add_to_cache_list(&mut self, manifest: &PrecacheManifest) -> Result<(), CacheError> {
        for entry in &manifest.entries {
            let (url, key) = cache_key_for(&self.scope, entry)?;
            match self.url_to_key.get(&url) {
                Some(existing) if *existing != key => {
                    return Err(CacheError::ConflictingPrecacheEntries { url });
                }
                Some(_) => {}
                None => {
                    self.url_to_key.insert(url, key);
                }
            }
        }
        Ok(())
    }

    pub fn len(&self) -> usize {
        self.url_to_key.len()
    }

    pub fn is_empty(&self) -> bool {
        self.url_to_key.is_empty()
    }

    /// Cache key serving `url`, trying the usual URL variations.
    pub fn key_for_url(&self, url: &Url) -> Option<&str> {
        url_variations(url)
            .iter()
            .find_map(|candidate| self.url_to_key.get(candidate))
            .map(String::as_str)
    }

    /// Fetch and store every entry not already cached under its key.
    ///
    /// Any failed fetch or write fails the install.
    pub async fn install(
        &self,
        storage: &dyn CacheStorage,
        network: &dyn Network,
        clock: &dyn Clock,
    ) -> Result<InstallReport, CacheError> {
        let mut report = InstallReport::default();

        for (url, key) in &self.url_to_key {
            if storage.get(&self.cache_name, key)?.is_some() {
                report.not_updated.push(url.clone());
                continue;
            }

            let request = CacheRequest::get(url)?;
            let response = network.fetch(&request).await?;
            if !(200..400).contains(&response.status) {
                return Err(CacheError::BadPrecacheResponse {
                    url: url.clone(),
                    status: response.status,
                });
            }

            storage.put(
                &self.cache_name,
                key,
                CacheEntry {
                    response,
                    stored_at: clock.now_millis(),
                },
            )?;
            debug!(url = %url, "Precached");
            report.updated.push(url.clone());
        }

        info!(
            cache = %self.cache_name,
            updated = report.updated.len(),
            not_updated = report.not_updated.len(),
            "Precache installed"
        );
        Ok(report)
    }

    /// Delete precache keys that are not part of this build.
    pub fn activate(&self, storage: &dyn CacheStorage) -> Result<Vec<String>, CacheError> {
        let expected: HashSet<&str> = self.url_to_key.values().map(String::as_str).collect();
        let mut deleted = Vec::new();

        for meta in storage.entries(&self.cache_name)? {
            if !expected.contains(meta.key.as_str()) {
                storage.delete(&self.cache_name, &meta.key)?;
                deleted.push(meta.key);
            }
        }

        if !deleted.is_empty() {
            info!(cache = %self.cache_name, purged = deleted.len(), "Purged stale precache entries");
        }
        Ok(deleted)
    }
}

/// Delete precache caches of other generations.
pub fn cleanup_outdated_caches(
    storage: &dyn CacheStorage,
    current: &str,
) -> Result<Vec<String>, CacheError> {
    let mut deleted = Vec::new();
    for name in storage.cache_names()? {
        if name.contains(PRECACHE_MARKER) && name != current && storage.delete_cache(&name)? {
            deleted.push(name);
        }
    }
    if !deleted.is_empty() {
        warn!(caches = ?deleted, "Deleted outdated precache caches");
    }
    Ok(deleted)
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::adapters::MemoryCacheStorage;
    use crate::domain::{CachedResponse, PrecacheEntry};
    use crate::ports::ManualClock;
    use async_trait::async_trait;
    use parking_lot::Mutex;

    #[derive(Default)]
    struct RecordingNetwork {
        fetched: Mutex<Vec<String>>,
        status: u16,
    }

    #[async_trait]
    impl Network for RecordingNetwork {
        async fn fetch(&self, request: &CacheRequest) -> Result<CachedResponse, CacheError> {
            self.fetched.lock().push(request.url.to_string());
            Ok(CachedResponse::new(self.status, request.url.path().to_string()))
        }
    }

    fn ok_network() -> RecordingNetwork {
        RecordingNetwork {
            status: 200,
            ..Default::default()
        }
    }

    fn controller(entries: &[(&str, &str)]) -> PrecacheController {
        let mut controller = PrecacheController::new(
            "workbox-precache-v2",
            Url::parse("https://app.example.com/").unwrap(),
        );
        let manifest = PrecacheManifest::new(
            entries
                .iter()
                .map(|(url, rev)| PrecacheEntry::new(*url, Some(rev.to_string())))
                .collect(),
        );
        controller.add_to_cache_list(&manifest).unwrap();
        controller
    }

    #[tokio::test]
    async fn test_install_then_reinstall_skips_cached() {
        let storage = MemoryCacheStorage::new();
        let network = ok_network();
        let clock = ManualClock::new(0);
        let build = controller(&[("/app.js", "r1"), ("/app.css", "r1")]);

        let report = build.install(&storage, &network, &clock).await.unwrap();
        assert_eq!(report.updated.len(), 2);

        let report = build.install(&storage, &network, &clock).await.unwrap();
        assert_eq!(report.not_updated.len(), 2);
        assert_eq!(network.fetched.lock().len(), 2);
    }

    #[tokio::test]
    async fn test_activate_purges_stale_revisions() {
        let storage = MemoryCacheStorage::new();
        let network = ok_network();
        let clock = ManualClock::new(0);

        let old = controller(&[("/app.js", "r1"), ("/legacy.js", "r1")]);
        old.install(&storage, &network, &clock).await.unwrap();

        let new = controller(&[("/app.js", "r2")]);
        new.install(&storage, &network, &clock).await.unwrap();
        let deleted = new.activate(&storage).unwrap();

        assert_eq!(deleted.len(), 2);
        assert!(deleted.iter().all(|k| k.contains("__WB_REVISION__=r1")));
        let remaining = storage.entries("workbox-precache-v2").unwrap();
        assert_eq!(remaining.len(), 1);
        assert!(remaining[0].key.ends_with("__WB_REVISION__=r2"));
    }

    #[tokio::test]
    async fn test_bad_status_fails_install() {
        let storage = MemoryCacheStorage::new();
        let network = RecordingNetwork {
            status: 404,
            ..Default::default()
        };
        let clock = ManualClock::new(0);
        let build = controller(&[("/missing.js", "r1")]);

        let err = build.install(&storage, &network, &clock).await.unwrap_err();
        assert!(matches!(err, CacheError::BadPrecacheResponse { status: 404, .. }));
    }

    #[test]
    fn test_conflicting_revisions_rejected() {
        let mut build = controller(&[("/app.js", "r1")]);
        let manifest = PrecacheManifest::new(vec![PrecacheEntry::new("/app.js", Some("r2".into()))]);
        assert!(matches!(
            build.add_to_cache_list(&manifest),
            Err(CacheError::ConflictingPrecacheEntries { .. })
        ));
    }

    #[test]
    fn test_key_lookup_variations() {
        let build = controller(&[("/index.html", "r1"), ("/app.js", "r1")]);
        let root = Url::parse("https://app.example.com/").unwrap();
        assert!(build.key_for_url(&root).unwrap().contains("index.html"));

        let tracked = Url::parse("https://app.example.com/app.js?utm_campaign=x").unwrap();
        assert!(build.key_for_url(&tracked).is_some());

        let other = Url::parse("https://app.example.com/other.js").unwrap();
        assert!(build.key_for_url(&other).is_none());
    }

    #[test]
    fn test_cleanup_outdated_caches() {
        let storage = MemoryCacheStorage::new();
        let entry = || CacheEntry {
            response: CachedResponse::new(200, "x"),
            stored_at: 0,
        };
        storage.put("workbox-precache-v1", "k", entry()).unwrap();
        storage.put("workbox-precache-v2", "k", entry()).unwrap();
        storage.put("pages-cache", "k", entry()).unwrap();

        let deleted = cleanup_outdated_caches(&storage, "workbox-precache-v2").unwrap();
        assert_eq!(deleted, vec!["workbox-precache-v1"]);
        assert_eq!(
            storage.cache_names().unwrap(),
            vec!["pages-cache", "workbox-precache-v2"]
        );
    }
}
