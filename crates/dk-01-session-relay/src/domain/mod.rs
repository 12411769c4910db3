//! Domain types for the session relay.
//!
//! Configuration, errors, header rules and backend wire types. Nothing in
//! here performs I/O.

pub mod config;
pub mod correlation;
pub mod error;
pub mod headers;
pub mod types;

pub use config::{ConfigError, RelayConfig};
pub use correlation::RelayId;
pub use error::{error_redirect, GatewayError, RelayError};
pub use headers::{BodyMode, ForwardingContext, CSRF_HEADER};
pub use types::{AntiforgeryResponse, BffClaim, BffUser};
