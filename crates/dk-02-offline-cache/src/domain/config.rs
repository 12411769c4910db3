//! Cache controller configuration.
//!
//! Bucket names, limits and the navigation timeout. Defaults mirror the
//! deployed worker: pages and API responses network-first with a 3 second
//! timeout, static assets and images cache-first.

use super::errors::CacheError;
use super::routing::ExpirationPolicy;
use serde::{Deserialize, Serialize};
use std::collections::HashSet;
use std::time::Duration;
use url::Url;

const DAY_SECONDS: u64 = 24 * 60 * 60;

/// Name prefix shared by every precache generation
pub const PRECACHE_MARKER: &str = "-precache-";

/// One named cache bucket and its expiration limits.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct BucketConfig {
    pub cache_name: String,
    pub max_entries: usize,
    pub max_age_seconds: u64,
}

impl BucketConfig {
    pub fn new(cache_name: &str, max_entries: usize, max_age_seconds: u64) -> Self {
        Self {
            cache_name: cache_name.to_string(),
            max_entries,
            max_age_seconds,
        }
    }

    pub fn expiration(&self) -> ExpirationPolicy {
        ExpirationPolicy {
            max_entries: self.max_entries,
            max_age: Duration::from_secs(self.max_age_seconds),
        }
    }
}

/// Service worker cache configuration
#[derive(Debug, Clone, Serialize, Deserialize)]
#[serde(default)]
pub struct CacheControllerConfig {
    /// Registration scope; relative precache URLs resolve against it
    pub scope: String,
    /// Network-first race timeout
    pub network_timeout_seconds: u64,
    /// Current precache generation
    pub precache_cache: String,
    pub pages: BucketConfig,
    pub api: BucketConfig,
    /// Path prefixes owned by the API bucket
    pub api_prefixes: Vec<String>,
    pub static_assets: BucketConfig,
    pub images: BucketConfig,
}

impl Default for CacheControllerConfig {
    fn default() -> Self {
        Self {
            scope: "http://localhost:3000/".to_string(),
            network_timeout_seconds: 3,
            precache_cache: "workbox-precache-v2".to_string(),
            pages: BucketConfig::new("pages-cache", 50, DAY_SECONDS),
            api: BucketConfig::new("api-cache", 100, DAY_SECONDS),
            api_prefixes: vec!["/api/".to_string(), "/bff/".to_string()],
            static_assets: BucketConfig::new("static-assets", 100, 7 * DAY_SECONDS),
            images: BucketConfig::new("images-cache", 50, 30 * DAY_SECONDS),
        }
    }
}

impl CacheControllerConfig {
    pub fn network_timeout(&self) -> Duration {
        Duration::from_secs(self.network_timeout_seconds)
    }

    /// Parsed registration scope
    pub fn scope_url(&self) -> Result<Url, CacheError> {
        let url = Url::parse(&self.scope)
            .map_err(|e| CacheError::InvalidConfig(format!("scope {}: {}", self.scope, e)))?;
        if url.cannot_be_a_base() {
            return Err(CacheError::InvalidConfig(format!(
                "scope {} cannot resolve relative URLs",
                self.scope
            )));
        }
        Ok(url)
    }

    pub fn buckets(&self) -> [&BucketConfig; 4] {
        [&self.pages, &self.api, &self.static_assets, &self.images]
    }

    /// Validate configuration
    pub fn validate(&self) -> Result<(), CacheError> {
        self.scope_url()?;

        if self.network_timeout_seconds == 0 {
            return Err(CacheError::InvalidConfig(
                "network_timeout_seconds must be > 0".into(),
            ));
        }

        if !self.precache_cache.contains(PRECACHE_MARKER) {
            return Err(CacheError::InvalidConfig(format!(
                "precache cache name must contain '{}'",
                PRECACHE_MARKER
            )));
        }

        let mut names = HashSet::new();
        names.insert(self.precache_cache.as_str());
        for bucket in self.buckets() {
            if bucket.cache_name.is_empty() || bucket.cache_name.contains(PRECACHE_MARKER) {
                return Err(CacheError::InvalidConfig(format!(
                    "invalid bucket name '{}'",
                    bucket.cache_name
                )));
            }
            if !names.insert(bucket.cache_name.as_str()) {
                return Err(CacheError::InvalidConfig(format!(
                    "duplicate cache name '{}'",
                    bucket.cache_name
                )));
            }
            if bucket.max_entries == 0 || bucket.max_age_seconds == 0 {
                return Err(CacheError::InvalidConfig(format!(
                    "bucket '{}' needs non-zero limits",
                    bucket.cache_name
                )));
            }
        }

        if self.api_prefixes.iter().any(|p| !p.starts_with('/')) {
            return Err(CacheError::InvalidConfig(
                "api prefixes must be absolute paths".into(),
            ));
        }

        Ok(())
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_defaults() {
        let config = CacheControllerConfig::default();
        assert!(config.validate().is_ok());
        assert_eq!(config.network_timeout(), Duration::from_secs(3));
        assert_eq!(config.pages.max_entries, 50);
        assert_eq!(config.api.max_entries, 100);
        assert_eq!(config.static_assets.max_age_seconds, 604_800);
        assert_eq!(config.images.max_age_seconds, 2_592_000);
    }

    #[test]
    fn test_duplicate_bucket_rejected() {
        let mut config = CacheControllerConfig::default();
        config.images.cache_name = "pages-cache".into();
        assert!(matches!(
            config.validate(),
            Err(CacheError::InvalidConfig(_))
        ));
    }

    #[test]
    fn test_precache_name_must_be_marked() {
        let config = CacheControllerConfig {
            precache_cache: "assets".into(),
            ..Default::default()
        };
        assert!(config.validate().is_err());
    }

    #[test]
    fn test_partial_json_fills_defaults() {
        let config: CacheControllerConfig =
            serde_json::from_str(r#"{"network_timeout_seconds": 5}"#).unwrap();
        assert_eq!(config.network_timeout_seconds, 5);
        assert_eq!(config.api.cache_name, "api-cache");
    }
}
