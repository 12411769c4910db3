//! CSRF token lifecycle.
//!
//! One current anti-forgery token per process: empty at startup, populated by
//! a successful fetch, stamped on mutating calls, cleared on logout. Reads
//! and writes are last-write-wins; the backend owns expiry and correctness.

use crate::domain::error::RelayError;
use crate::domain::headers::CSRF_HEADER;
use crate::middleware::RelayMetrics;
use async_trait::async_trait;
use axum::http::{HeaderMap, HeaderValue, Method};
use parking_lot::RwLock;
use std::sync::Arc;
use tracing::{debug, warn};

/// Shared cell holding the current token.
#[derive(Clone, Default)]
pub struct CsrfTokenStore {
    inner: Arc<RwLock<Option<String>>>,
}

impl CsrfTokenStore {
    pub fn new() -> Self {
        Self::default()
    }

    /// Replace the current token. An empty string clears it.
    pub fn set(&self, token: impl Into<String>) {
        let token = token.into();
        *self.inner.write() = if token.is_empty() { None } else { Some(token) };
    }

    pub fn get(&self) -> Option<String> {
        self.inner.read().clone()
    }

    pub fn clear(&self) {
        *self.inner.write() = None;
    }
}

/// A token issued by the backend together with the cookies that bind it.
#[derive(Debug, Clone)]
pub struct AntiforgeryGrant {
    pub request_token: String,
    /// Backend `Set-Cookie` lines, to be forwarded verbatim
    pub set_cookie: Vec<HeaderValue>,
}

/// Where anti-forgery tokens come from.
#[async_trait]
pub trait TokenSource: Send + Sync {
    /// Fetch a fresh token for the session identified by `session` headers.
    async fn fetch_antiforgery(&self, session: &HeaderMap) -> Result<AntiforgeryGrant, RelayError>;
}

/// Token lifecycle: fetch, read, stamp, clear.
#[derive(Clone)]
pub struct CsrfLifecycle {
    store: CsrfTokenStore,
    source: Arc<dyn TokenSource>,
    metrics: Option<Arc<RelayMetrics>>,
}

impl CsrfLifecycle {
    pub fn new(source: Arc<dyn TokenSource>) -> Self {
        Self {
            store: CsrfTokenStore::new(),
            source,
            metrics: None,
        }
    }

    /// Count fetches and failures in relay metrics
    pub fn with_metrics(mut self, metrics: Arc<RelayMetrics>) -> Self {
        self.metrics = Some(metrics);
        self
    }

    /// Underlying token cell
    pub fn store(&self) -> &CsrfTokenStore {
        &self.store
    }

    /// Fetch a token and make it current.
    ///
    /// Failures are logged and yield `None`; the previous token stays current.
    pub async fn fetch_grant(&self, session: &HeaderMap) -> Option<AntiforgeryGrant> {
        let result = self.source.fetch_antiforgery(session).await;

        let grant = match result {
            Ok(grant) if !grant.request_token.is_empty() => grant,
            Ok(_) => {
                warn!("Anti-forgery endpoint returned an empty token");
                self.record(false);
                return None;
            }
            Err(e) => {
                warn!(error = %e, "Failed to fetch CSRF token");
                self.record(false);
                return None;
            }
        };

        self.store.set(grant.request_token.clone());
        self.record(true);
        debug!("CSRF token refreshed");
        Some(grant)
    }

    /// Fetch a token and make it current, returning only the token.
    pub async fn fetch_token(&self, session: &HeaderMap) -> Option<String> {
        self.fetch_grant(session).await.map(|g| g.request_token)
    }

    /// Current token; never fetches.
    pub fn get_token(&self) -> Option<String> {
        self.store.get()
    }

    /// Forget the current token (logout, explicit invalidation).
    pub fn clear_token(&self) {
        self.store.clear();
    }

    /// Attach `X-CSRF-TOKEN` to a mutating call when a token is present.
    ///
    /// Returns whether the header was set. Without a token the header is
    /// omitted and the backend decides.
    pub fn stamp(&self, headers: &mut HeaderMap, method: &Method) -> bool {
        if !is_mutating(method) {
            return false;
        }
        stamp_token(headers, self.store.get().as_deref())
    }

    fn record(&self, success: bool) {
        if let Some(metrics) = &self.metrics {
            metrics.record_csrf_fetch(success);
        }
    }
}

/// Insert `X-CSRF-TOKEN: token` if the token is a valid header value.
pub fn stamp_token(headers: &mut HeaderMap, token: Option<&str>) -> bool {
    let Some(value) = token
        .filter(|t| !t.is_empty())
        .and_then(|t| HeaderValue::from_str(t).ok())
    else {
        return false;
    };
    headers.insert(CSRF_HEADER, value);
    true
}

/// Methods that change backend state and therefore need the token.
pub fn is_mutating(method: &Method) -> bool {
    !matches!(
        *method,
        Method::GET | Method::HEAD | Method::OPTIONS | Method::TRACE
    )
}

#[cfg(test)]
mod tests {
    use super::*;
    use axum::http::StatusCode;
    use std::sync::atomic::{AtomicUsize, Ordering};

    /// Hands out `token-1`, `token-2`, ... or fails when told to.
    struct SequenceSource {
        calls: AtomicUsize,
        fail: bool,
    }

    impl SequenceSource {
        fn ok() -> Arc<Self> {
            Arc::new(Self {
                calls: AtomicUsize::new(0),
                fail: false,
            })
        }

        fn failing() -> Arc<Self> {
            Arc::new(Self {
                calls: AtomicUsize::new(0),
                fail: true,
            })
        }
    }

    #[async_trait]
    impl TokenSource for SequenceSource {
        async fn fetch_antiforgery(&self, _session: &HeaderMap) -> Result<AntiforgeryGrant, RelayError> {
            let n = self.calls.fetch_add(1, Ordering::SeqCst) + 1;
            if self.fail {
                return Err(RelayError::UnexpectedStatus {
                    status: StatusCode::UNAUTHORIZED,
                });
            }
            Ok(AntiforgeryGrant {
                request_token: format!("token-{}", n),
                set_cookie: vec![HeaderValue::from_static("__Host-X-XSRF=abc; Path=/")],
            })
        }
    }

    #[tokio::test]
    async fn test_fetch_then_get() {
        let lifecycle = CsrfLifecycle::new(SequenceSource::ok());
        assert_eq!(lifecycle.get_token(), None);

        let token = lifecycle.fetch_token(&HeaderMap::new()).await;
        assert_eq!(token.as_deref(), Some("token-1"));
        assert_eq!(lifecycle.get_token().as_deref(), Some("token-1"));
    }

    #[tokio::test]
    async fn test_clear_then_get() {
        let lifecycle = CsrfLifecycle::new(SequenceSource::ok());
        lifecycle.fetch_token(&HeaderMap::new()).await;
        lifecycle.clear_token();
        assert_eq!(lifecycle.get_token(), None);
    }

    #[tokio::test]
    async fn test_refresh_replaces_token() {
        let lifecycle = CsrfLifecycle::new(SequenceSource::ok());
        lifecycle.fetch_token(&HeaderMap::new()).await;
        lifecycle.fetch_token(&HeaderMap::new()).await;
        assert_eq!(lifecycle.get_token().as_deref(), Some("token-2"));
    }

    #[tokio::test]
    async fn test_failed_fetch_keeps_previous_token() {
        let metrics = Arc::new(RelayMetrics::new());
        let lifecycle = CsrfLifecycle::new(SequenceSource::failing()).with_metrics(Arc::clone(&metrics));
        lifecycle.store().set("existing");

        assert_eq!(lifecycle.fetch_token(&HeaderMap::new()).await, None);
        assert_eq!(lifecycle.get_token().as_deref(), Some("existing"));
        assert_eq!(metrics.csrf_fetch_failures.load(Ordering::Relaxed), 1);
    }

    #[tokio::test]
    async fn test_get_never_fetches() {
        let source = SequenceSource::ok();
        let lifecycle = CsrfLifecycle::new(source.clone());
        assert_eq!(lifecycle.get_token(), None);
        assert_eq!(source.calls.load(Ordering::SeqCst), 0);
    }

    #[test]
    fn test_stamp_only_mutating_calls() {
        let lifecycle = CsrfLifecycle::new(SequenceSource::ok());
        lifecycle.store().set("abc");

        let mut headers = HeaderMap::new();
        assert!(!lifecycle.stamp(&mut headers, &Method::GET));
        assert!(headers.get(CSRF_HEADER).is_none());

        assert!(lifecycle.stamp(&mut headers, &Method::POST));
        assert_eq!(headers.get("X-CSRF-TOKEN").unwrap(), "abc");
    }

    #[test]
    fn test_stamp_without_token_omits_header() {
        let lifecycle = CsrfLifecycle::new(SequenceSource::ok());
        let mut headers = HeaderMap::new();
        assert!(!lifecycle.stamp(&mut headers, &Method::DELETE));
        assert!(headers.is_empty());
    }

    #[test]
    fn test_empty_string_clears_store() {
        let store = CsrfTokenStore::new();
        store.set("abc");
        store.set("");
        assert_eq!(store.get(), None);
    }
}
