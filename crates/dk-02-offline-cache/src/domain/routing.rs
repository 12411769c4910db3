//! Ordered routing table: the first matching rule owns the request.

use super::config::CacheControllerConfig;
use super::entities::{CacheRequest, RequestDestination, RequestMethod, RequestMode};
use std::time::Duration;

/// How a rule answers a request
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum Strategy {
    /// Race the network against `timeout`; fall back to the cache
    NetworkFirst { timeout: Duration },
    /// Serve a fresh cache hit without touching the network
    CacheFirst,
}

/// Bucket limits. Checked lazily on write and on read.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub struct ExpirationPolicy {
    pub max_entries: usize,
    pub max_age: Duration,
}

impl ExpirationPolicy {
    pub fn is_expired(&self, stored_at: u64, now: u64) -> bool {
        let max_age_ms = u64::try_from(self.max_age.as_millis()).unwrap_or(u64::MAX);
        now.saturating_sub(stored_at) > max_age_ms
    }
}

/// Request predicate
#[derive(Debug, Clone, PartialEq, Eq)]
pub enum RouteMatcher {
    /// `mode == navigate`
    Navigation,
    /// Path starts with any prefix
    PathPrefixes(Vec<String>),
    /// Destination is one of the listed
    Destinations(Vec<RequestDestination>),
}

impl RouteMatcher {
    pub fn matches(&self, request: &CacheRequest) -> bool {
        match self {
            RouteMatcher::Navigation => request.mode == RequestMode::Navigate,
            RouteMatcher::PathPrefixes(prefixes) => {
                let path = request.url.path();
                prefixes.iter().any(|p| path.starts_with(p.as_str()))
            }
            RouteMatcher::Destinations(destinations) => {
                destinations.contains(&request.destination)
            }
        }
    }
}

/// One routing table row
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct CacheRule {
    pub cache_name: String,
    pub matcher: RouteMatcher,
    pub strategy: Strategy,
    pub expiration: ExpirationPolicy,
}

/// Rules evaluated top to bottom.
#[derive(Debug, Clone, Default)]
pub struct RoutingTable {
    rules: Vec<CacheRule>,
}

impl RoutingTable {
    pub fn new(rules: Vec<CacheRule>) -> Self {
        Self { rules }
    }

    /// Pages, API, static assets, images, in that order.
    pub fn from_config(config: &CacheControllerConfig) -> Self {
        let network_first = Strategy::NetworkFirst {
            timeout: config.network_timeout(),
        };

        Self::new(vec![
            CacheRule {
                cache_name: config.pages.cache_name.clone(),
                matcher: RouteMatcher::Navigation,
                strategy: network_first,
                expiration: config.pages.expiration(),
            },
            CacheRule {
                cache_name: config.api.cache_name.clone(),
                matcher: RouteMatcher::PathPrefixes(config.api_prefixes.clone()),
                strategy: network_first,
                expiration: config.api.expiration(),
            },
            CacheRule {
                cache_name: config.static_assets.cache_name.clone(),
                matcher: RouteMatcher::Destinations(vec![
                    RequestDestination::Style,
                    RequestDestination::Script,
                    RequestDestination::Font,
                ]),
                strategy: Strategy::CacheFirst,
                expiration: config.static_assets.expiration(),
            },
            CacheRule {
                cache_name: config.images.cache_name.clone(),
                matcher: RouteMatcher::Destinations(vec![RequestDestination::Image]),
                strategy: Strategy::CacheFirst,
                expiration: config.images.expiration(),
            },
        ])
    }

    pub fn rules(&self) -> &[CacheRule] {
        &self.rules
    }

    /// First rule matching a `GET`; other methods are never routed.
    pub fn route(&self, request: &CacheRequest) -> Option<&CacheRule> {
        if request.method != RequestMethod::Get {
            return None;
        }
        self.rules.iter().find(|rule| rule.matcher.matches(request))
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    fn table() -> RoutingTable {
        RoutingTable::from_config(&CacheControllerConfig::default())
    }

    fn routed(request: &CacheRequest) -> Option<String> {
        table().route(request).map(|r| r.cache_name.clone())
    }

    #[test]
    fn test_bucket_order() {
        let navigate = CacheRequest::get("https://app.example.com/dashboard")
            .unwrap()
            .navigate();
        assert_eq!(routed(&navigate).as_deref(), Some("pages-cache"));

        let api = CacheRequest::get("https://app.example.com/api/habits").unwrap();
        assert_eq!(routed(&api).as_deref(), Some("api-cache"));

        let bff = CacheRequest::get("https://app.example.com/bff/user").unwrap();
        assert_eq!(routed(&bff).as_deref(), Some("api-cache"));

        let script = CacheRequest::get("https://app.example.com/assets/app.js")
            .unwrap()
            .with_destination(RequestDestination::Script);
        assert_eq!(routed(&script).as_deref(), Some("static-assets"));

        let image = CacheRequest::get("https://app.example.com/logo192.png")
            .unwrap()
            .with_destination(RequestDestination::Image);
        assert_eq!(routed(&image).as_deref(), Some("images-cache"));
    }

    #[test]
    fn test_navigation_to_api_path_belongs_to_pages() {
        let request = CacheRequest::get("https://app.example.com/bff/login")
            .unwrap()
            .navigate();
        assert_eq!(routed(&request).as_deref(), Some("pages-cache"));
    }

    #[test]
    fn test_script_under_api_prefix_belongs_to_api() {
        let request = CacheRequest::get("https://app.example.com/api/widget.js")
            .unwrap()
            .with_destination(RequestDestination::Script);
        assert_eq!(routed(&request).as_deref(), Some("api-cache"));
    }

    #[test]
    fn test_non_get_and_unmatched_not_routed() {
        let post = CacheRequest::get("https://app.example.com/api/habits")
            .unwrap()
            .with_method(RequestMethod::Post);
        assert_eq!(routed(&post), None);

        let manifest = CacheRequest::get("https://app.example.com/manifest.webmanifest")
            .unwrap()
            .with_destination(RequestDestination::Manifest);
        assert_eq!(routed(&manifest), None);
    }

    #[test]
    fn test_expiration_boundary() {
        let policy = ExpirationPolicy {
            max_entries: 1,
            max_age: Duration::from_secs(10),
        };
        assert!(!policy.is_expired(1_000, 11_000));
        assert!(policy.is_expired(1_000, 11_001));
    }
}
