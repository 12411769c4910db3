//! Requests seen by the worker and the responses it stores.

use super::errors::CacheError;
use bytes::Bytes;
use url::Url;

/// HTTP request method
#[derive(Debug, Clone, Copy, PartialEq, Eq, Default)]
pub enum RequestMethod {
    #[default]
    Get,
    Head,
    Post,
    Put,
    Delete,
    Patch,
    Options,
}

/// Request destination as reported by the browser
#[derive(Debug, Clone, Copy, PartialEq, Eq, Default)]
pub enum RequestDestination {
    /// `fetch()`/XHR and anything without a destination
    #[default]
    Empty,
    Document,
    Style,
    Script,
    Font,
    Image,
    Manifest,
    Worker,
}

/// Request mode
#[derive(Debug, Clone, Copy, PartialEq, Eq, Default)]
pub enum RequestMode {
    SameOrigin,
    #[default]
    NoCors,
    Cors,
    /// Top-level page navigation
    Navigate,
}

/// A request intercepted by the fetch handler.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct CacheRequest {
    pub url: Url,
    pub method: RequestMethod,
    pub destination: RequestDestination,
    pub mode: RequestMode,
}

impl CacheRequest {
    /// Plain `GET` for an absolute URL
    pub fn get(url: &str) -> Result<Self, CacheError> {
        let url = Url::parse(url).map_err(|e| CacheError::InvalidUrl(format!("{}: {}", url, e)))?;
        Ok(Self::for_url(url))
    }

    pub fn for_url(url: Url) -> Self {
        Self {
            url,
            method: RequestMethod::Get,
            destination: RequestDestination::Empty,
            mode: RequestMode::Cors,
        }
    }

    /// Mark as a top-level navigation
    pub fn navigate(mut self) -> Self {
        self.mode = RequestMode::Navigate;
        self.destination = RequestDestination::Document;
        self
    }

    pub fn with_destination(mut self, destination: RequestDestination) -> Self {
        self.destination = destination;
        self
    }

    pub fn with_method(mut self, method: RequestMethod) -> Self {
        self.method = method;
        self
    }

    /// Key under which the response is stored: the URL without fragment.
    pub fn cache_key(&self) -> String {
        let mut url = self.url.clone();
        url.set_fragment(None);
        url.into()
    }
}

/// A response as stored in (or served from) a cache bucket.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct CachedResponse {
    /// `0` for opaque cross-origin responses
    pub status: u16,
    pub headers: Vec<(String, String)>,
    pub body: Bytes,
}

impl CachedResponse {
    pub fn new(status: u16, body: impl Into<Bytes>) -> Self {
        Self {
            status,
            headers: Vec::new(),
            body: body.into(),
        }
    }

    /// Opaque response to a `no-cors` request
    pub fn opaque() -> Self {
        Self::new(0, Bytes::new())
    }

    pub fn with_header(mut self, name: impl Into<String>, value: impl Into<String>) -> Self {
        self.headers.push((name.into(), value.into()));
        self
    }

    pub fn header(&self, name: &str) -> Option<&str> {
        self.headers
            .iter()
            .find(|(n, _)| n.eq_ignore_ascii_case(name))
            .map(|(_, v)| v.as_str())
    }

    pub fn is_ok(&self) -> bool {
        self.status == 200
    }

    pub fn is_opaque(&self) -> bool {
        self.status == 0
    }

    /// Approximate storage footprint in bytes
    pub fn size(&self) -> usize {
        self.body.len()
            + self
                .headers
                .iter()
                .map(|(n, v)| n.len() + v.len())
                .sum::<usize>()
    }
}

/// A stored response plus the time it was written (ms since epoch).
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct CacheEntry {
    pub response: CachedResponse,
    pub stored_at: u64,
}

/// Bookkeeping for one key, used by expiration.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct EntryMeta {
    pub key: String,
    pub stored_at: u64,
    /// Monotonic counter bumped on every write and hit
    pub last_access: u64,
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_cache_key_drops_fragment_keeps_query() {
        let req = CacheRequest::get("https://app.example.com/api/habits?day=3#top").unwrap();
        assert_eq!(req.cache_key(), "https://app.example.com/api/habits?day=3");
    }

    #[test]
    fn test_relative_url_rejected() {
        assert!(matches!(
            CacheRequest::get("/dashboard"),
            Err(CacheError::InvalidUrl(_))
        ));
    }

    #[test]
    fn test_navigate_sets_document_destination() {
        let req = CacheRequest::get("https://app.example.com/").unwrap().navigate();
        assert_eq!(req.mode, RequestMode::Navigate);
        assert_eq!(req.destination, RequestDestination::Document);
    }

    #[test]
    fn test_header_lookup_is_case_insensitive() {
        let resp = CachedResponse::new(200, "x").with_header("Content-Type", "text/html");
        assert_eq!(resp.header("content-type"), Some("text/html"));
        assert!(resp.is_ok());
        assert!(CachedResponse::opaque().is_opaque());
    }
}
