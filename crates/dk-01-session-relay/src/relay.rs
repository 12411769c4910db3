//! Edge proxy: relays a browser request to the backend origin and the
//! backend's answer back to the browser.
//!
//! Only the origin is substituted; path and query travel unchanged. Redirects
//! are never followed here because login/logout depend on the browser seeing
//! the backend's 3xx. POSTs are not retried.

use crate::domain::config::RelayConfig;
use crate::domain::error::{GatewayError, RelayError};
use crate::domain::headers::{
    backend_host_value, inbound_response_headers, outbound_headers, BodyMode, ForwardingContext,
};
use crate::middleware::{RelayMetrics, RequestTimer};
use axum::{
    body::Body,
    extract::ConnectInfo,
    http::{header, request::Parts, HeaderValue, Method, Request, Uri},
    response::Response,
};
use std::net::SocketAddr;
use std::sync::Arc;
use std::time::Duration;
use tracing::{debug, error, warn};

/// Build the outbound HTTP client shared by the relay and server functions.
///
/// Redirect following is disabled: 3xx answers are relayed verbatim. No
/// whole-request deadline is set on the client; a stalled read fails after
/// the backend timeout.
pub fn build_backend_client(config: &RelayConfig) -> Result<reqwest::Client, RelayError> {
    reqwest::Client::builder()
        .redirect(reqwest::redirect::Policy::none())
        .connect_timeout(config.timeouts.connect)
        .read_timeout(config.timeouts.backend)
        .build()
        .map_err(|e| RelayError::Client(e.to_string()))
}

/// Backend origin as used for string concatenation with inbound paths.
pub(crate) fn backend_base(config: &RelayConfig) -> String {
    config.backend_url.trim().trim_end_matches('/').to_string()
}

/// Relay between the browser and the backend origin.
pub struct SessionRelay {
    client: reqwest::Client,
    backend_base: String,
    backend_host: HeaderValue,
    error_page: String,
    max_request_size: usize,
    backend_timeout: Duration,
    metrics: Arc<RelayMetrics>,
}

impl SessionRelay {
    /// Create a relay for the configured backend
    pub fn new(config: &RelayConfig, metrics: Arc<RelayMetrics>) -> Result<Self, GatewayError> {
        let origin = config.backend_origin()?;
        let backend_host = backend_host_value(&origin).ok_or_else(|| {
            GatewayError::Config(format!("backend host not usable: {}", config.backend_url))
        })?;
        let client =
            build_backend_client(config).map_err(|e| GatewayError::Config(e.to_string()))?;

        Ok(Self {
            client,
            backend_base: backend_base(config),
            backend_host,
            error_page: config.routes.error_page.clone(),
            max_request_size: config.limits.max_request_size,
            backend_timeout: config.timeouts.backend,
            metrics,
        })
    }

    /// `backendOrigin + originalPath + originalQuery`
    pub fn target_url(&self, uri: &Uri) -> String {
        let path_and_query = uri.path_and_query().map(|pq| pq.as_str()).unwrap_or("/");
        format!("{}{}", self.backend_base, path_and_query)
    }

    /// `host` value sent to the backend
    pub fn backend_host(&self) -> &HeaderValue {
        &self.backend_host
    }

    /// Relay one request. Never fails: proxy-layer errors become responses.
    pub async fn relay(&self, request: Request<Body>) -> Response {
        let timer = RequestTimer::new(Arc::clone(&self.metrics));
        let method = request.method().clone();
        let path = request.uri().path().to_string();

        match self.forward(request).await {
            Ok(response) => {
                debug!(
                    method = %method,
                    path = %path,
                    status = response.status().as_u16(),
                    "Relayed backend response"
                );
                timer.finish(response.status());
                response
            }
            Err(e @ RelayError::BodyTooLarge(_)) => {
                warn!(method = %method, path = %path, error = %e, "Rejected inbound body");
                self.metrics.record_rejected_body();
                e.into_response_for(&self.error_page)
            }
            Err(e) => {
                error!(
                    method = %method,
                    path = %path,
                    error = %e,
                    "Backend request failed, redirecting to error page"
                );
                timer.fail();
                e.into_response_for(&self.error_page)
            }
        }
    }

    async fn forward(&self, request: Request<Body>) -> Result<Response, RelayError> {
        let (parts, body) = request.into_parts();

        let ctx = forwarding_context(&parts);
        let headers = outbound_headers(&parts.headers, &self.backend_host, &ctx, BodyMode::PassThrough);
        let target = self.target_url(&parts.uri);

        let mut outbound = self
            .client
            .request(parts.method.clone(), &target)
            .headers(headers);

        if carries_body(&parts.method) {
            let bytes = axum::body::to_bytes(body, self.max_request_size)
                .await
                .map_err(|e| RelayError::BodyTooLarge(e.to_string()))?;
            outbound = outbound.body(bytes);
        }

        // Only waiting for the response head is bounded; the body streams
        let response = tokio::time::timeout(self.backend_timeout, outbound.send())
            .await
            .map_err(|_| {
                RelayError::BackendUnreachable(format!(
                    "no response within {}ms",
                    self.backend_timeout.as_millis()
                ))
            })?
            .map_err(RelayError::from_transport)?;
        Ok(into_browser_response(response))
    }
}

/// GET and HEAD never forward a body.
pub fn carries_body(method: &Method) -> bool {
    method != Method::GET && method != Method::HEAD
}

/// Gather what the forwarding headers need from the inbound request.
pub fn forwarding_context(parts: &Parts) -> ForwardingContext {
    let original_host = parts
        .headers
        .get(header::HOST)
        .and_then(|v| v.to_str().ok())
        .map(str::to_string)
        .or_else(|| parts.uri.authority().map(|a| a.as_str().to_string()));

    let peer_ip = parts
        .extensions
        .get::<ConnectInfo<SocketAddr>>()
        .map(|ConnectInfo(addr)| addr.ip());

    ForwardingContext {
        original_host,
        scheme: parts.uri.scheme_str().map(str::to_string),
        peer_ip,
    }
}

/// Status, headers (every `Set-Cookie` line individually) and a streamed body.
///
/// The reason phrase is the canonical one for the status code.
fn into_browser_response(backend: reqwest::Response) -> Response {
    let status = backend.status();
    let headers = inbound_response_headers(backend.headers());

    let mut response = Response::new(Body::from_stream(backend.bytes_stream()));
    *response.status_mut() = status;
    *response.headers_mut() = headers;
    response
}

#[cfg(test)]
mod tests {
    use super::*;

    fn relay(backend_url: &str) -> SessionRelay {
        let config = RelayConfig {
            backend_url: backend_url.to_string(),
            ..Default::default()
        };
        SessionRelay::new(&config, Arc::new(RelayMetrics::new())).unwrap()
    }

    #[test]
    fn test_target_url_keeps_path_and_query() {
        let relay = relay("http://backend:5224");
        let uri: Uri = "/bff/user?returnUrl=%2Fdashboard".parse().unwrap();
        assert_eq!(
            relay.target_url(&uri),
            "http://backend:5224/bff/user?returnUrl=%2Fdashboard"
        );
        assert_eq!(relay.backend_host(), "backend:5224");
    }

    #[test]
    fn test_target_url_trailing_slash_origin() {
        let relay = relay("http://backend:5224/");
        let uri: Uri = "/signin-oidc".parse().unwrap();
        assert_eq!(relay.target_url(&uri), "http://backend:5224/signin-oidc");
    }

    #[test]
    fn test_carries_body() {
        assert!(!carries_body(&Method::GET));
        assert!(!carries_body(&Method::HEAD));
        assert!(carries_body(&Method::POST));
        assert!(carries_body(&Method::DELETE));
        assert!(carries_body(&Method::OPTIONS));
    }

    #[test]
    fn test_forwarding_context_from_parts() {
        let mut request = Request::builder()
            .uri("/bff/user")
            .header(header::HOST, "app.example.com")
            .body(())
            .unwrap();
        request
            .extensions_mut()
            .insert(ConnectInfo("192.0.2.10:51000".parse::<SocketAddr>().unwrap()));
        let (parts, _) = request.into_parts();

        let ctx = forwarding_context(&parts);
        assert_eq!(ctx.original_host.as_deref(), Some("app.example.com"));
        assert_eq!(ctx.peer_ip, Some("192.0.2.10".parse().unwrap()));
        assert_eq!(ctx.scheme, None);
    }

    #[test]
    fn test_invalid_backend_rejected() {
        let config = RelayConfig {
            backend_url: "localhost".to_string(),
            ..Default::default()
        };
        assert!(SessionRelay::new(&config, Arc::new(RelayMetrics::new())).is_err());
    }
}
