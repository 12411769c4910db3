//! Header rewriting across the browser/backend trust boundary.
//!
//! Inbound headers are copied except the hop-by-hop set, `host` is pointed at
//! the backend and the `x-forwarded-*` trio is filled in from the original
//! request. A forwarding header that already arrived from an upstream hop is
//! kept as-is.

use axum::http::{
    header::{self, HeaderName},
    HeaderMap, HeaderValue,
};
use std::net::IpAddr;

/// Anti-forgery header stamped on mutating backend calls.
pub const CSRF_HEADER: HeaderName = HeaderName::from_static("x-csrf-token");
pub const X_FORWARDED_HOST: HeaderName = HeaderName::from_static("x-forwarded-host");
pub const X_FORWARDED_PROTO: HeaderName = HeaderName::from_static("x-forwarded-proto");
pub const X_FORWARDED_FOR: HeaderName = HeaderName::from_static("x-forwarded-for");

/// Never relayed in either direction.
pub const HOP_BY_HOP: [HeaderName; 3] = [header::HOST, header::CONNECTION, header::TRANSFER_ENCODING];

/// Dropped when the relay builds the outbound body itself.
pub const BODY_FRAMING: [HeaderName; 2] = [header::CONTENT_LENGTH, header::CONTENT_TYPE];

/// Who owns the outbound body.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum BodyMode {
    /// Inbound body bytes are forwarded unchanged
    PassThrough,
    /// The relay serializes a new body; framing headers are recomputed
    Rewritten,
}

/// Facts about the original request needed for forwarding headers.
#[derive(Debug, Clone, Default)]
pub struct ForwardingContext {
    /// Host the browser addressed (inbound `host` or URI authority)
    pub original_host: Option<String>,
    /// Scheme the browser used
    pub scheme: Option<String>,
    /// Peer address of the inbound connection
    pub peer_ip: Option<IpAddr>,
}

/// Build the header map sent to the backend.
pub fn outbound_headers(
    inbound: &HeaderMap,
    backend_host: &HeaderValue,
    ctx: &ForwardingContext,
    mode: BodyMode,
) -> HeaderMap {
    let mut headers = HeaderMap::with_capacity(inbound.len() + 4);

    for (name, value) in inbound.iter() {
        if is_hop_by_hop(name) {
            continue;
        }
        if mode == BodyMode::Rewritten && BODY_FRAMING.contains(name) {
            continue;
        }
        headers.append(name.clone(), value.clone());
    }

    headers.insert(header::HOST, backend_host.clone());

    if !headers.contains_key(X_FORWARDED_HOST) {
        let host = ctx.original_host.as_deref().unwrap_or_default();
        if let Ok(value) = HeaderValue::from_str(host) {
            headers.insert(X_FORWARDED_HOST, value);
        }
    }

    if !headers.contains_key(X_FORWARDED_PROTO) {
        let scheme = ctx.scheme.as_deref().unwrap_or("http");
        if let Ok(value) = HeaderValue::from_str(scheme) {
            headers.insert(X_FORWARDED_PROTO, value);
        }
    }

    if !headers.contains_key(X_FORWARDED_FOR) {
        if let Some(ip) = ctx.peer_ip {
            if let Ok(value) = HeaderValue::from_str(&ip.to_string()) {
                headers.insert(X_FORWARDED_FOR, value);
            }
        }
    }

    headers
}

/// Copy backend response headers for the browser.
///
/// Multi-valued headers stay multi-valued, so every `Set-Cookie` line is
/// relayed as its own header.
pub fn inbound_response_headers(backend: &HeaderMap) -> HeaderMap {
    let mut headers = HeaderMap::with_capacity(backend.len());
    for (name, value) in backend.iter() {
        if is_hop_by_hop(name) {
            continue;
        }
        headers.append(name.clone(), value.clone());
    }
    headers
}

/// All `Set-Cookie` lines of a backend response, in order.
pub fn set_cookie_lines(headers: &HeaderMap) -> Vec<HeaderValue> {
    headers.get_all(header::SET_COOKIE).iter().cloned().collect()
}

/// `host` header value for a backend URL: host plus explicit port.
pub fn backend_host_value(backend: &url::Url) -> Option<HeaderValue> {
    let host = backend.host_str()?;
    // IPv6 hosts come back bracketed from `host_str`
    let authority = match backend.port() {
        Some(port) => format!("{}:{}", host, port),
        None => host.to_string(),
    };
    HeaderValue::from_str(&authority).ok()
}

fn is_hop_by_hop(name: &HeaderName) -> bool {
    HOP_BY_HOP.contains(name)
}
