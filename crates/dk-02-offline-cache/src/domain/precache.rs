//! Precache manifest entries and their cache keys.

use super::errors::CacheError;
use serde::{Deserialize, Serialize};
use url::Url;

/// Query parameter carrying the revision in a precache key
pub const REVISION_PARAM: &str = "__WB_REVISION__";

/// Query parameters ignored when matching a request to a precached URL
fn is_ignored_param(name: &str) -> bool {
    name.starts_with("utm_") || name == "fbclid"
}

/// One build asset: URL relative to the scope plus a content revision.
#[derive(Debug, Clone, PartialEq, Eq, PartialOrd, Ord, Serialize, Deserialize)]
pub struct PrecacheEntry {
    pub url: String,
    /// `None` when the URL itself is content-hashed
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub revision: Option<String>,
}

impl PrecacheEntry {
    pub fn new(url: impl Into<String>, revision: Option<String>) -> Self {
        Self {
            url: url.into(),
            revision,
        }
    }
}

/// The list injected into the worker at build time.
#[derive(Debug, Clone, Default, PartialEq, Eq, Serialize, Deserialize)]
#[serde(transparent)]
pub struct PrecacheManifest {
    pub entries: Vec<PrecacheEntry>,
}

impl PrecacheManifest {
    pub fn new(entries: Vec<PrecacheEntry>) -> Self {
        Self { entries }
    }

    pub fn len(&self) -> usize {
        self.entries.len()
    }

    pub fn is_empty(&self) -> bool {
        self.entries.is_empty()
    }

    pub fn to_json_pretty(&self) -> Result<String, serde_json::Error> {
        serde_json::to_string_pretty(self)
    }
}

/// Absolute URL and cache key for an entry.
///
/// A revisioned entry is stored under `url?__WB_REVISION__=<rev>` so that a
/// new build with changed content never reuses the old response.
pub fn cache_key_for(scope: &Url, entry: &PrecacheEntry) -> Result<(String, String), CacheError> {
    let mut url = scope
        .join(&entry.url)
        .map_err(|e| CacheError::InvalidUrl(format!("{}: {}", entry.url, e)))?;
    url.set_fragment(None);

    let plain = url.to_string();
    let key = match entry.revision.as_deref().filter(|r| !r.is_empty()) {
        Some(revision) => {
            url.query_pairs_mut().append_pair(REVISION_PARAM, revision);
            url.to_string()
        }
        None => plain.clone(),
    };
    Ok((plain, key))
}

/// Forms of a request URL tried against the precache list, in order:
/// exact, tracking parameters removed, directory index.
pub fn url_variations(url: &Url) -> Vec<String> {
    let mut exact = url.clone();
    exact.set_fragment(None);
    let mut variations = vec![exact.to_string()];

    if exact.query().is_some() {
        let kept: Vec<(String, String)> = exact
            .query_pairs()
            .filter(|(name, _)| !is_ignored_param(name))
            .map(|(n, v)| (n.into_owned(), v.into_owned()))
            .collect();
        let mut stripped = exact.clone();
        if kept.is_empty() {
            stripped.set_query(None);
        } else {
            stripped.query_pairs_mut().clear().extend_pairs(kept);
        }
        let stripped = stripped.to_string();
        if !variations.contains(&stripped) {
            variations.push(stripped);
        }
    }

    if exact.path().ends_with('/') {
        let mut index = exact.clone();
        index.set_query(None);
        let path = format!("{}index.html", exact.path());
        index.set_path(&path);
        variations.push(index.to_string());
    }

    variations
}

#[cfg(test)]
mod tests {
    use super::*;

    fn scope() -> Url {
        Url::parse("https://app.example.com/").unwrap()
    }

    #[test]
    fn test_revisioned_key() {
        let entry = PrecacheEntry::new("/favicon.ico", Some("abc123".into()));
        let (url, key) = cache_key_for(&scope(), &entry).unwrap();
        assert_eq!(url, "https://app.example.com/favicon.ico");
        assert_eq!(key, "https://app.example.com/favicon.ico?__WB_REVISION__=abc123");
    }

    #[test]
    fn test_unrevisioned_key_is_url() {
        let entry = PrecacheEntry::new("assets/app-3f2a.js", None);
        let (url, key) = cache_key_for(&scope(), &entry).unwrap();
        assert_eq!(url, key);
        assert_eq!(url, "https://app.example.com/assets/app-3f2a.js");
    }

    #[test]
    fn test_manifest_json_is_a_plain_array() {
        let manifest = PrecacheManifest::new(vec![
            PrecacheEntry::new("/a.js", Some("1".into())),
            PrecacheEntry::new("/b.css", None),
        ]);
        let json = serde_json::to_value(&manifest).unwrap();
        assert_eq!(
            json,
            serde_json::json!([{"url": "/a.js", "revision": "1"}, {"url": "/b.css"}])
        );
    }

    #[test]
    fn test_url_variations() {
        let url = Url::parse("https://app.example.com/?utm_source=push&x=1#frag").unwrap();
        assert_eq!(
            url_variations(&url),
            vec![
                "https://app.example.com/?utm_source=push&x=1".to_string(),
                "https://app.example.com/?x=1".to_string(),
                "https://app.example.com/index.html".to_string(),
            ]
        );
    }
}
