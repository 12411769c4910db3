//! Middleware for the relay router.
//!
//! Layer order: Request → Tracing → BodyLimit → Handler

pub mod metrics;
pub mod tracing;

pub use metrics::{RelayMetrics, RequestTimer};
pub use tracing::RelayTracingLayer;
