//! Caching strategies and lazy expiration.
//!
//! Storage failures never fail a request: a read error is a miss, a write
//! error leaves the response uncached.

use crate::domain::{
    CacheEntry, CacheError, CacheRequest, CacheRule, CachedResponse, ExpirationPolicy, Strategy,
};
use crate::ports::{CacheStorage, Clock, Network};
use std::time::Duration;
use tracing::{debug, warn};

/// Runs one rule's strategy against the ports.
pub struct StrategyHandler<'a> {
    storage: &'a dyn CacheStorage,
    network: &'a dyn Network,
    clock: &'a dyn Clock,
}

impl<'a> StrategyHandler<'a> {
    pub fn new(storage: &'a dyn CacheStorage, network: &'a dyn Network, clock: &'a dyn Clock) -> Self {
        Self {
            storage,
            network,
            clock,
        }
    }

    /// Answer `request` with `rule`.
    ///
    /// Errors only when neither the network nor the cache can produce a
    /// response.
    pub async fn handle(
        &self,
        rule: &CacheRule,
        request: &CacheRequest,
    ) -> Result<CachedResponse, CacheError> {
        match rule.strategy {
            Strategy::NetworkFirst { timeout } => self.network_first(rule, request, timeout).await,
            Strategy::CacheFirst => self.cache_first(rule, request).await,
        }
    }

    async fn network_first(
        &self,
        rule: &CacheRule,
        request: &CacheRequest,
        timeout: Duration,
    ) -> Result<CachedResponse, CacheError> {
        let key = request.cache_key();
        let fetch = self.network.fetch(request);
        tokio::pin!(fetch);

        let result = match tokio::time::timeout(timeout, &mut fetch).await {
            Ok(result) => result,
            Err(_) => {
                if let Some(cached) = self.lookup(&rule.cache_name, &key, &rule.expiration) {
                    debug!(cache = %rule.cache_name, url = %key, "Network timed out, serving cache");
                    return Ok(cached);
                }
                // Nothing to fall back to: keep waiting for the network
                warn!(
                    cache = %rule.cache_name,
                    url = %key,
                    timeout_ms = timeout.as_millis() as u64,
                    "Network timed out with no cached entry"
                );
                fetch.await
            }
        };

        match result {
            Ok(response) => {
                if response.is_ok() || response.is_opaque() {
                    self.store(&rule.cache_name, &key, &response, &rule.expiration);
                }
                Ok(response)
            }
            Err(e) => match self.lookup(&rule.cache_name, &key, &rule.expiration) {
                Some(cached) => {
                    warn!(cache = %rule.cache_name, url = %key, error = %e, "Network failed, serving cache");
                    Ok(cached)
                }
                None => Err(e),
            },
        }
    }

    async fn cache_first(
        &self,
        rule: &CacheRule,
        request: &CacheRequest,
    ) -> Result<CachedResponse, CacheError> {
        let key = request.cache_key();
        if let Some(cached) = self.lookup(&rule.cache_name, &key, &rule.expiration) {
            return Ok(cached);
        }

        let response = self.network.fetch(request).await?;
        if response.is_ok() {
            self.store(&rule.cache_name, &key, &response, &rule.expiration);
        }
        Ok(response)
    }

    /// Fresh entry for `key`, if any. Expired entries are removed.
    pub fn lookup(&self, cache: &str, key: &str, policy: &ExpirationPolicy) -> Option<CachedResponse> {
        let entry = match self.storage.get(cache, key) {
            Ok(Some(entry)) => entry,
            Ok(None) => return None,
            Err(e) => {
                warn!(cache = %cache, url = %key, error = %e, "Cache read failed, treating as miss");
                return None;
            }
        };

        if policy.is_expired(entry.stored_at, self.clock.now_millis()) {
            debug!(cache = %cache, url = %key, "Cached entry expired");
            if let Err(e) = self.storage.delete(cache, key) {
                warn!(cache = %cache, url = %key, error = %e, "Failed to drop expired entry");
            }
            return None;
        }

        if let Err(e) = self.storage.touch(cache, key) {
            debug!(cache = %cache, error = %e, "Failed to record cache hit");
        }
        Some(entry.response)
    }

    /// Write `response` and enforce the bucket limits.
    pub fn store(&self, cache: &str, key: &str, response: &CachedResponse, policy: &ExpirationPolicy) {
        let now = self.clock.now_millis();
        let entry = CacheEntry {
            response: response.clone(),
            stored_at: now,
        };

        if let Err(e) = self.storage.put(cache, key, entry) {
            warn!(cache = %cache, url = %key, error = %e, "Cache write failed, response not cached");
            return;
        }

        if let Err(e) = expire_entries(self.storage, cache, policy, now) {
            warn!(cache = %cache, error = %e, "Cache expiration failed");
        }
    }
}

/// Drop entries older than `max_age`, then the least recently used ones
/// beyond `max_entries`. Returns the number removed.
pub fn expire_entries(
    storage: &dyn CacheStorage,
    cache: &str,
    policy: &ExpirationPolicy,
    now: u64,
) -> Result<usize, CacheError> {
    let mut entries = storage.entries(cache)?;
    let mut doomed = Vec::new();

    entries.retain(|meta| {
        if policy.is_expired(meta.stored_at, now) {
            doomed.push(meta.key.clone());
            false
        } else {
            true
        }
    });

    if entries.len() > policy.max_entries {
        entries.sort_by(|a, b| b.last_access.cmp(&a.last_access));
        doomed.extend(entries.drain(policy.max_entries..).map(|meta| meta.key));
    }

    for key in &doomed {
        storage.delete(cache, key)?;
    }
    if !doomed.is_empty() {
        debug!(cache = %cache, removed = doomed.len(), "Expired cache entries");
    }
    Ok(doomed.len())
}
