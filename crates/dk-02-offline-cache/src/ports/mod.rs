//! Ports (hexagonal architecture).

pub mod outbound;

pub use outbound::{
    CacheStorage, Clock, InMemoryNotificationHost, ManualClock, Network, NotificationHost,
    SystemClock,
};
