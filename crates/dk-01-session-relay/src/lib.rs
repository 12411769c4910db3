#![allow(missing_docs)]

//! DK-01 Session Relay - BFF edge proxy for the habit tracker front end.
//!
//! The browser only ever talks to this origin. Session cookies and CSRF
//! tokens belong to the backend; the relay moves them across unchanged.
//!
//! # Architecture
//!
//! ```text
//! ┌─────────────────────────────────────────────────────────────────────┐
//! │                      SESSION RELAY (dk-01)                           │
//! ├─────────────────────────────────────────────────────────────────────┤
//! │   browser ──► RelayTracingLayer ──► RequestBodyLimitLayer            │
//! │                        │                                             │
//! │        ┌───────────────┼──────────────────────┐                      │
//! │        ▼               ▼                      ▼                      │
//! │   /health       /bff/*  /signin-oidc    /_server/*                   │
//! │   /metrics      /signout-callback-oidc  (BackendClient)              │
//! │                        │                      │                      │
//! │                 SessionRelay                  │                      │
//! │   host rewrite, x-forwarded-*, manual 3xx     │                      │
//! │                        └──────────┬───────────┘                      │
//! └───────────────────────────────────┼─────────────────────────────────┘
//!                                     ▼
//!                              BACKEND_URL origin
//! ```
//!
//! # Failure handling
//!
//! - Backend unreachable or timed out: `302` to `/error?message=<reason>`
//! - Inbound body over the limit: `413`
//! - Anything the backend answers (4xx/5xx/3xx included) is relayed verbatim
//!
//! # Usage
//!
//! ```ignore
//! use dk_01_session_relay::{EdgeRelayService, RelayConfig};
//!
//! let mut config = RelayConfig::default();
//! config.apply_env()?;
//! let service = EdgeRelayService::new(config)?;
//! service.start(async { let _ = tokio::signal::ctrl_c().await; }).await?;
//! ```

#![warn(clippy::all)]
#![deny(unsafe_code)]

pub mod client;
pub mod csrf;
pub mod domain;
pub mod middleware;
pub mod relay;
pub mod service;

pub use client::{BackendClient, CookieRelay};
pub use csrf::{is_mutating, stamp_token, AntiforgeryGrant, CsrfLifecycle, CsrfTokenStore, TokenSource};
pub use domain::{
    error_redirect, AntiforgeryResponse, BffClaim, BffUser, BodyMode, ConfigError,
    ForwardingContext, GatewayError, RelayConfig, RelayError, RelayId, CSRF_HEADER,
};
pub use middleware::{RelayMetrics, RelayTracingLayer, RequestTimer};
pub use relay::{build_backend_client, SessionRelay};
pub use service::EdgeRelayService;

/// Crate version
pub const VERSION: &str = env!("CARGO_PKG_VERSION");
