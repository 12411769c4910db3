//! Session relay service: HTTP router and server lifecycle.

use crate::client::BackendClient;
use crate::domain::config::RelayConfig;
use crate::domain::error::{GatewayError, RelayError};
use crate::domain::headers::CSRF_HEADER;
use crate::domain::types::AntiforgeryResponse;
use crate::middleware::{RelayMetrics, RelayTracingLayer};
use crate::relay::SessionRelay;
use axum::{
    body::Body,
    extract::{Request, State},
    http::{header, HeaderMap, HeaderValue, StatusCode},
    response::{IntoResponse, Response},
    routing::get,
    Json, Router,
};
use std::future::Future;
use std::net::SocketAddr;
use std::sync::Arc;
use tokio::net::TcpListener;
use tower::ServiceBuilder;
use tower_http::limit::RequestBodyLimitLayer;
use tracing::{info, warn};

/// Edge relay service
pub struct EdgeRelayService {
    config: RelayConfig,
    relay: Arc<SessionRelay>,
    backend: Arc<BackendClient>,
    metrics: Arc<RelayMetrics>,
}

impl EdgeRelayService {
    /// Create a new relay service from a validated configuration
    pub fn new(config: RelayConfig) -> Result<Self, GatewayError> {
        config.validate()?;

        let metrics = Arc::new(RelayMetrics::new());
        let relay = Arc::new(SessionRelay::new(&config, Arc::clone(&metrics))?);
        let backend = Arc::new(BackendClient::new(&config)?);

        Ok(Self {
            config,
            relay,
            backend,
            metrics,
        })
    }

    /// Bind the configured address and serve until `shutdown` resolves.
    pub async fn start<F>(&self, shutdown: F) -> Result<(), GatewayError>
    where
        F: Future<Output = ()> + Send + 'static,
    {
        let addr = self.config.http_addr();
        let listener = TcpListener::bind(addr)
            .await
            .map_err(|e| GatewayError::Bind(format!("{}: {}", addr, e)))?;
        self.serve(listener, shutdown).await
    }

    /// Serve on an already bound listener until `shutdown` resolves.
    pub async fn serve<F>(&self, listener: TcpListener, shutdown: F) -> Result<(), GatewayError>
    where
        F: Future<Output = ()> + Send + 'static,
    {
        let local = listener
            .local_addr()
            .map_err(|e| GatewayError::Bind(e.to_string()))?;
        info!(
            addr = %local,
            backend = %self.config.backend_url,
            "Session relay listening"
        );

        axum::serve(
            listener,
            self.router()
                .into_make_service_with_connect_info::<SocketAddr>(),
        )
        .with_graceful_shutdown(shutdown)
        .await
        .map_err(|e| GatewayError::Serve(e.to_string()))?;

        info!("Session relay stopped");
        Ok(())
    }

    /// Get metrics
    pub fn metrics(&self) -> Arc<RelayMetrics> {
        Arc::clone(&self.metrics)
    }

    /// Build the HTTP router.
    ///
    /// Local routes (`/health`, `/metrics`, `/_server/*`) are answered here;
    /// the BFF prefix and the OIDC callbacks are relayed to the backend.
    pub fn router(&self) -> Router {
        let state = RelayState {
            relay: Arc::clone(&self.relay),
            backend: Arc::clone(&self.backend),
            metrics: Arc::clone(&self.metrics),
            error_page: Arc::from(self.config.routes.error_page.as_str()),
        };

        let middleware = ServiceBuilder::new()
            .layer(RelayTracingLayer::new())
            .layer(RequestBodyLimitLayer::new(self.config.limits.max_request_size));

        let relay_methods = || {
            get(relay_handler)
                .post(relay_handler)
                .put(relay_handler)
                .delete(relay_handler)
                .patch(relay_handler)
                .options(relay_handler)
        };

        // `/*rest` does not match an empty tail, so `{prefix}/` is mounted too
        let prefix = self.config.routes.prefix();
        let mut router = Router::new()
            .route("/health", get(health_check))
            .route("/metrics", get(metrics_handler))
            .route("/_server/user", get(current_user_handler))
            .route("/_server/antiforgery", get(antiforgery_handler))
            .route("/_server/logout", axum::routing::post(logout_handler))
            .route(prefix, relay_methods())
            .route(&format!("{}/", prefix), relay_methods())
            .route(&format!("{}/*rest", prefix), relay_methods());

        #[cfg(feature = "metrics")]
        {
            router = router.route("/metrics/prometheus", get(prometheus_handler));
        }

        // OIDC callbacks: GET and POST only, axum answers 405 otherwise
        for path in &self.config.routes.oidc_paths {
            router = router.route(path, get(relay_handler).post(relay_handler));
        }

        router.layer(middleware).with_state(state)
    }
}

/// Application state shared across handlers
#[derive(Clone)]
struct RelayState {
    relay: Arc<SessionRelay>,
    backend: Arc<BackendClient>,
    metrics: Arc<RelayMetrics>,
    error_page: Arc<str>,
}

async fn relay_handler(State(state): State<RelayState>, request: Request<Body>) -> Response {
    state.relay.relay(request).await
}

async fn health_check() -> impl IntoResponse {
    Json(serde_json::json!({
        "status": "ok",
        "service": "dk-session-relay",
        "version": crate::VERSION,
    }))
}

async fn metrics_handler(State(state): State<RelayState>) -> impl IntoResponse {
    Json(state.metrics.to_json())
}

#[cfg(feature = "metrics")]
async fn prometheus_handler(State(state): State<RelayState>) -> Response {
    match state.metrics.to_prometheus() {
        Ok(text) => (
            [(header::CONTENT_TYPE, prometheus::TEXT_FORMAT)],
            text,
        )
            .into_response(),
        Err(e) => {
            warn!(error = %e, "Prometheus export failed");
            StatusCode::INTERNAL_SERVER_ERROR.into_response()
        }
    }
}

async fn current_user_handler(State(state): State<RelayState>, headers: HeaderMap) -> Response {
    match state.backend.current_user(&headers).await {
        Ok(user) => Json(user).into_response(),
        Err(e) => {
            warn!(error = %e, "Current user lookup failed");
            e.into_response_for(&state.error_page)
        }
    }
}

async fn antiforgery_handler(State(state): State<RelayState>, headers: HeaderMap) -> Response {
    match state.backend.antiforgery(&headers).await {
        Ok(grant) => {
            state.metrics.record_csrf_fetch(true);
            let body = AntiforgeryResponse {
                request_token: grant.request_token,
            };
            with_cookies(Json(body).into_response(), grant.set_cookie)
        }
        Err(e) => {
            state.metrics.record_csrf_fetch(false);
            warn!(error = %e, "Anti-forgery token fetch failed");
            server_fn_error(e)
        }
    }
}

async fn logout_handler(State(state): State<RelayState>, headers: HeaderMap) -> Response {
    let token = headers
        .get(CSRF_HEADER)
        .and_then(|v| v.to_str().ok())
        .map(str::to_string);

    // The token travels in its own argument
    let mut session = headers;
    session.remove(CSRF_HEADER);

    match state.backend.logout(&session, token.as_deref()).await {
        Ok(relay) => with_cookies(StatusCode::NO_CONTENT.into_response(), relay.set_cookie),
        Err(e) => {
            warn!(error = %e, "Logout failed");
            server_fn_error(e)
        }
    }
}

/// Append every `Set-Cookie` line as its own header.
fn with_cookies(mut response: Response, set_cookie: Vec<HeaderValue>) -> Response {
    for line in set_cookie {
        response.headers_mut().append(header::SET_COOKIE, line);
    }
    response
}

/// Server-function failures are JSON so callers can surface them in place.
fn server_fn_error(e: RelayError) -> Response {
    let status = match e {
        RelayError::UnexpectedStatus { status } if status.is_client_error() => status,
        _ => StatusCode::BAD_GATEWAY,
    };
    (status, Json(serde_json::json!({ "error": e.to_string() }))).into_response()
}
