//! # Outbound Ports (Driven Ports)
//!
//! What the worker needs from its host: cache storage, the network, a clock
//! and the notification/window APIs.

use crate::domain::{
    CacheEntry, CacheError, CacheRequest, CachedResponse, EntryMeta, Notification, PushError,
    WindowClient,
};
use async_trait::async_trait;
use parking_lot::Mutex;
use std::sync::atomic::{AtomicU64, Ordering};
use std::time::Duration;

/// Named caches of request key to stored response.
///
/// Production: the browser Cache API.
/// Testing: `MemoryCacheStorage` (adapters/memory_storage.rs)
pub trait CacheStorage: Send + Sync {
    /// Look up one key.
    fn get(&self, cache: &str, key: &str) -> Result<Option<CacheEntry>, CacheError>;

    /// Store or replace one key, creating the cache if needed.
    fn put(&self, cache: &str, key: &str, entry: CacheEntry) -> Result<(), CacheError>;

    /// Record a read of `key` for least-recently-used eviction.
    fn touch(&self, cache: &str, key: &str) -> Result<(), CacheError>;

    /// Remove one key. Returns whether it existed.
    fn delete(&self, cache: &str, key: &str) -> Result<bool, CacheError>;

    /// Bookkeeping for every key in a cache.
    fn entries(&self, cache: &str) -> Result<Vec<EntryMeta>, CacheError>;

    /// Drop a whole cache. Returns whether it existed.
    fn delete_cache(&self, cache: &str) -> Result<bool, CacheError>;

    /// Names of all caches.
    fn cache_names(&self) -> Result<Vec<String>, CacheError>;
}

/// Network access for cache misses and network-first routes.
#[async_trait]
pub trait Network: Send + Sync {
    /// Perform the request. HTTP error statuses are responses, not errors.
    async fn fetch(&self, request: &CacheRequest) -> Result<CachedResponse, CacheError>;
}

/// Wall clock in milliseconds since the epoch (for testability).
pub trait Clock: Send + Sync {
    fn now_millis(&self) -> u64;
}

/// Notification and window-client APIs of the worker's host.
#[async_trait]
pub trait NotificationHost: Send + Sync {
    /// Display a notification, replacing any visible one with the same tag.
    async fn show_notification(&self, notification: &Notification) -> Result<(), PushError>;

    /// Dismiss a notification.
    async fn close_notification(&self, notification: &Notification);

    /// Open windows, including ones this worker does not control yet.
    async fn match_window_clients(&self) -> Result<Vec<WindowClient>, PushError>;

    async fn focus(&self, client: &WindowClient) -> Result<(), PushError>;

    async fn open_window(&self, url: &str) -> Result<(), PushError>;
}

// =============================================================================
// ADAPTER IMPLEMENTATIONS
// =============================================================================

/// System wall clock
#[derive(Default)]
pub struct SystemClock;

impl Clock for SystemClock {
    fn now_millis(&self) -> u64 {
        std::time::SystemTime::now()
            .duration_since(std::time::UNIX_EPOCH)
            .map(|d| u64::try_from(d.as_millis()).unwrap_or(u64::MAX))
            .unwrap_or(0)
    }
}

/// Clock moved by hand in tests
#[derive(Default)]
pub struct ManualClock {
    now: AtomicU64,
}

impl ManualClock {
    pub fn new(start_millis: u64) -> Self {
        Self {
            now: AtomicU64::new(start_millis),
        }
    }

    pub fn advance(&self, by: Duration) {
        let ms = u64::try_from(by.as_millis()).unwrap_or(u64::MAX);
        self.now.fetch_add(ms, Ordering::SeqCst);
    }
}

impl Clock for ManualClock {
    fn now_millis(&self) -> u64 {
        self.now.load(Ordering::SeqCst)
    }
}

#[derive(Default)]
struct HostState {
    visible: Vec<Notification>,
    shown: usize,
    clients: Vec<WindowClient>,
    focused: Vec<String>,
    opened: Vec<String>,
}

/// In-memory notification host for tests and headless runs.
///
/// Tracks visible notifications (one per tag), window clients, and every
/// focus/open call.
#[derive(Default)]
pub struct InMemoryNotificationHost {
    state: Mutex<HostState>,
}

impl InMemoryNotificationHost {
    pub fn new() -> Self {
        Self::default()
    }

    pub fn with_clients(clients: Vec<WindowClient>) -> Self {
        let host = Self::default();
        host.state.lock().clients = clients;
        host
    }

    pub fn visible(&self) -> Vec<Notification> {
        self.state.lock().visible.clone()
    }

    /// Number of `show_notification` calls
    pub fn shown_count(&self) -> usize {
        self.state.lock().shown
    }

    pub fn focused(&self) -> Vec<String> {
        self.state.lock().focused.clone()
    }

    pub fn opened(&self) -> Vec<String> {
        self.state.lock().opened.clone()
    }
}

#[async_trait]
impl NotificationHost for InMemoryNotificationHost {
    async fn show_notification(&self, notification: &Notification) -> Result<(), PushError> {
        let mut state = self.state.lock();
        state.visible.retain(|n| n.tag() != notification.tag());
        state.visible.push(notification.clone());
        state.shown += 1;
        Ok(())
    }

    async fn close_notification(&self, notification: &Notification) {
        self.state
            .lock()
            .visible
            .retain(|n| n.tag() != notification.tag());
    }

    async fn match_window_clients(&self) -> Result<Vec<WindowClient>, PushError> {
        Ok(self.state.lock().clients.clone())
    }

    async fn focus(&self, client: &WindowClient) -> Result<(), PushError> {
        let mut state = self.state.lock();
        if !state.clients.iter().any(|c| c.id == client.id) {
            return Err(PushError::Host(format!("no client {}", client.id)));
        }
        state.focused.push(client.id.clone());
        Ok(())
    }

    async fn open_window(&self, url: &str) -> Result<(), PushError> {
        let mut state = self.state.lock();
        let id = format!("window-{}", state.clients.len() + 1);
        state.clients.push(WindowClient {
            id,
            url: url.to_string(),
        });
        state.opened.push(url.to_string());
        Ok(())
    }
}
