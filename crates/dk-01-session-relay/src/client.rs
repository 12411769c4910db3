//! Typed server functions against the backend's BFF and API endpoints.
//!
//! Every call carries the browser's session headers through the same rewrite
//! rules as the relay, so cookies and forwarding headers reach the backend
//! exactly as they would on a proxied request.

use crate::csrf::{stamp_token, AntiforgeryGrant, TokenSource};
use crate::domain::config::RelayConfig;
use crate::domain::error::{GatewayError, RelayError};
use crate::domain::headers::{
    backend_host_value, outbound_headers, set_cookie_lines, BodyMode, ForwardingContext,
};
use crate::domain::types::{AntiforgeryResponse, BffUser};
use crate::relay::{backend_base, build_backend_client};
use async_trait::async_trait;
use axum::http::{header, HeaderMap, HeaderValue, Method};
use serde::de::DeserializeOwned;
use serde::Serialize;
use std::time::Duration;
use tracing::{debug, warn};

/// Outcome of a backend call whose cookies must reach the browser.
#[derive(Debug, Clone, Default)]
pub struct CookieRelay {
    pub set_cookie: Vec<HeaderValue>,
}

/// Server-side client for backend endpoints.
pub struct BackendClient {
    client: reqwest::Client,
    backend_base: String,
    backend_host: HeaderValue,
    /// Whole-call deadline; server functions buffer the backend body
    timeout: Duration,
}

impl BackendClient {
    /// Create a client for the configured backend
    pub fn new(config: &RelayConfig) -> Result<Self, GatewayError> {
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
            timeout: config.timeouts.backend,
        })
    }

    fn headers_for(&self, session: &HeaderMap, mode: BodyMode) -> HeaderMap {
        let ctx = ForwardingContext {
            original_host: session
                .get(header::HOST)
                .and_then(|v| v.to_str().ok())
                .map(str::to_string),
            ..Default::default()
        };
        outbound_headers(session, &self.backend_host, &ctx, mode)
    }

    fn url(&self, path: &str) -> String {
        format!("{}{}", self.backend_base, path)
    }

    /// `GET /bff/user`. Anything but 2xx means "not signed in".
    pub async fn current_user(&self, session: &HeaderMap) -> Result<Option<BffUser>, RelayError> {
        let response = self
            .client
            .get(self.url("/bff/user"))
            .timeout(self.timeout)
            .headers(self.headers_for(session, BodyMode::PassThrough))
            .send()
            .await
            .map_err(RelayError::from_transport)?;

        if !response.status().is_success() {
            debug!(status = response.status().as_u16(), "No authenticated user");
            return Ok(None);
        }

        let user = response
            .json::<BffUser>()
            .await
            .map_err(|e| RelayError::InvalidPayload(e.to_string()))?;
        Ok(Some(user))
    }

    /// `GET /bff/antiforgery`: the request token plus the cookie binding it.
    pub async fn antiforgery(&self, session: &HeaderMap) -> Result<AntiforgeryGrant, RelayError> {
        let response = self
            .client
            .get(self.url("/bff/antiforgery"))
            .timeout(self.timeout)
            .headers(self.headers_for(session, BodyMode::PassThrough))
            .send()
            .await
            .map_err(RelayError::from_transport)?;

        if !response.status().is_success() {
            return Err(RelayError::UnexpectedStatus {
                status: response.status(),
            });
        }

        let set_cookie = set_cookie_lines(response.headers());
        let body = response
            .json::<AntiforgeryResponse>()
            .await
            .map_err(|e| RelayError::InvalidPayload(e.to_string()))?;

        Ok(AntiforgeryGrant {
            request_token: body.request_token,
            set_cookie,
        })
    }

    /// `POST /bff/logout`, stamped with the anti-forgery token.
    pub async fn logout(
        &self,
        session: &HeaderMap,
        csrf_token: Option<&str>,
    ) -> Result<CookieRelay, RelayError> {
        let mut headers = self.headers_for(session, BodyMode::Rewritten);
        stamp_token(&mut headers, csrf_token);

        let response = self
            .client
            .post(self.url("/bff/logout"))
            .timeout(self.timeout)
            .headers(headers)
            .send()
            .await
            .map_err(RelayError::from_transport)?;

        // The backend may answer the logout with a redirect to the IdP
        if !(response.status().is_success() || response.status().is_redirection()) {
            warn!(status = response.status().as_u16(), "Logout rejected by backend");
            return Err(RelayError::UnexpectedStatus {
                status: response.status(),
            });
        }

        Ok(CookieRelay {
            set_cookie: set_cookie_lines(response.headers()),
        })
    }

    /// CSRF-stamped JSON call to an API endpoint.
    ///
    /// The body is serialized here, so inbound `content-length`/`content-type`
    /// are dropped and recomputed.
    pub async fn mutate<B, R>(
        &self,
        session: &HeaderMap,
        method: Method,
        path: &str,
        body: &B,
        csrf_token: Option<&str>,
    ) -> Result<R, RelayError>
    where
        B: Serialize + ?Sized,
        R: DeserializeOwned,
    {
        let mut headers = self.headers_for(session, BodyMode::Rewritten);
        stamp_token(&mut headers, csrf_token);

        let response = self
            .client
            .request(method, self.url(path))
            .timeout(self.timeout)
            .headers(headers)
            .json(body)
            .send()
            .await
            .map_err(RelayError::from_transport)?;

        if !response.status().is_success() {
            return Err(RelayError::UnexpectedStatus {
                status: response.status(),
            });
        }

        response
            .json::<R>()
            .await
            .map_err(|e| RelayError::InvalidPayload(e.to_string()))
    }
}

#[async_trait]
impl TokenSource for BackendClient {
    async fn fetch_antiforgery(&self, session: &HeaderMap) -> Result<AntiforgeryGrant, RelayError> {
        self.antiforgery(session).await
    }
}
