//! Domain types for the offline cache controller. No I/O happens here.

pub mod config;
pub mod entities;
pub mod errors;
pub mod lifecycle;
pub mod precache;
pub mod push;
pub mod routing;

pub use config::{BucketConfig, CacheControllerConfig};
pub use entities::{
    CacheEntry, CacheRequest, CachedResponse, EntryMeta, RequestDestination, RequestMethod,
    RequestMode,
};
pub use errors::{CacheError, ManifestError, PushError};
pub use lifecycle::WorkerState;
pub use precache::{PrecacheEntry, PrecacheManifest};
pub use push::{Notification, NotificationData, NotificationOptions, PushPayload, WindowClient};
pub use routing::{CacheRule, ExpirationPolicy, RouteMatcher, RoutingTable, Strategy};
