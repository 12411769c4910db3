//! DK-02 Offline Cache - the habit tracker's service worker as a library.
//!
//! # Architecture
//!
//! ```text
//! ┌──────────────────────────────────────────────────────────────────┐
//! │                     OFFLINE CACHE (dk-02)                         │
//! ├──────────────────────────────────────────────────────────────────┤
//! │  install ──► PrecacheController ──► workbox-precache-v2           │
//! │  activate ─► purge stale revisions, drop old precache caches      │
//! │                                                                  │
//! │  fetch ──► precache hit? ──► RoutingTable (first match wins)      │
//! │              1. navigation        NetworkFirst 3s  pages-cache    │
//! │              2. /api/, /bff/      NetworkFirst 3s  api-cache      │
//! │              3. style/script/font CacheFirst       static-assets  │
//! │              4. image             CacheFirst       images-cache   │
//! │                                                                  │
//! │  push ──────────────► NotificationHost (one per tag)              │
//! │  notificationclick ─► focus matching window or open one           │
//! └──────────────────────────────────────────────────────────────────┘
//! ```
//!
//! Host capabilities come in through `ports`: cache storage, network,
//! clock and the notification/window APIs. Every event handler resolves;
//! failures become cache misses, pass-throughs or silently skipped
//! notifications.

#![warn(clippy::all)]
#![deny(unsafe_code)]

pub mod adapters;
pub mod domain;
pub mod manifest;
pub mod notifications;
pub mod ports;
pub mod precache;
pub mod service;
pub mod strategy;

pub use adapters::MemoryCacheStorage;
pub use domain::{
    BucketConfig, CacheControllerConfig, CacheError, CacheRequest, CacheRule, CachedResponse,
    ExpirationPolicy, ManifestError, Notification, NotificationData, PrecacheEntry,
    PrecacheManifest, PushError, PushPayload, RequestDestination, RequestMethod, RequestMode,
    RouteMatcher, RoutingTable, Strategy, WindowClient, WorkerState,
};
pub use manifest::{ManifestBuilder, ManifestReport};
pub use notifications::{on_notification_click, on_push, ClickOutcome};
pub use ports::{CacheStorage, Clock, Network, NotificationHost, SystemClock};
pub use precache::{InstallReport, PrecacheController};
pub use service::{ActivateReport, EventOutcome, FetchOutcome, ServiceWorker, WorkerEvent, WorkerPorts};
pub use strategy::StrategyHandler;

/// Crate version
pub const VERSION: &str = env!("CARGO_PKG_VERSION");
