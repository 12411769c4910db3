//! Relay error types.
//!
//! Proxy-layer failures never reach the browser as a raw 500: a backend that
//! cannot be reached becomes a 302 to the error page, everything the backend
//! itself answers is relayed untouched.

use axum::{
    http::{header, HeaderValue, StatusCode},
    response::{IntoResponse, Response},
};

/// Error page used when no route configuration is at hand.
pub const DEFAULT_ERROR_PAGE: &str = "/error";

/// Errors raised while relaying a request to the backend
#[derive(Debug, thiserror::Error)]
pub enum RelayError {
    /// DNS failure, refused connection, TLS failure or timeout
    #[error("backend unreachable: {0}")]
    BackendUnreachable(String),

    /// Inbound body exceeded the configured limit or could not be read
    #[error("request body rejected: {0}")]
    BodyTooLarge(String),

    /// Backend answered, but not with what the caller expected
    #[error("unexpected backend response: {status}")]
    UnexpectedStatus {
        /// Status returned by the backend
        status: StatusCode,
    },

    /// Backend body could not be decoded
    #[error("invalid backend payload: {0}")]
    InvalidPayload(String),

    /// Outbound client could not be built
    #[error("http client error: {0}")]
    Client(String),
}

impl RelayError {
    /// Map a reqwest failure from `send()`/body reads.
    pub fn from_transport(err: reqwest::Error) -> Self {
        if err.is_decode() {
            RelayError::InvalidPayload(err.to_string())
        } else {
            RelayError::BackendUnreachable(err.to_string())
        }
    }

    /// Convert into the response sent to the browser, redirecting to
    /// `error_page` for failures that happened at the proxy layer.
    pub fn into_response_for(self, error_page: &str) -> Response {
        match self {
            RelayError::BodyTooLarge(message) => {
                (StatusCode::PAYLOAD_TOO_LARGE, message).into_response()
            }
            other => error_redirect(error_page, &other.to_string()),
        }
    }
}

impl IntoResponse for RelayError {
    fn into_response(self) -> Response {
        self.into_response_for(DEFAULT_ERROR_PAGE)
    }
}

/// Build `302 Found` to `{error_page}?message=<reason>`.
pub fn error_redirect(error_page: &str, message: &str) -> Response {
    let encoded: String = url::form_urlencoded::byte_serialize(message.as_bytes()).collect();
    let location = format!("{}?message={}", error_page, encoded);

    let mut response = StatusCode::FOUND.into_response();
    match HeaderValue::from_str(&location) {
        Ok(value) => {
            response.headers_mut().insert(header::LOCATION, value);
        }
        Err(_) => {
            // Encoded output is always visible ASCII; keep a usable fallback anyway
            response
                .headers_mut()
                .insert(header::LOCATION, HeaderValue::from_static(DEFAULT_ERROR_PAGE));
        }
    }
    response
}

/// Gateway-level errors (startup and serving)
#[derive(Debug, thiserror::Error)]
pub enum GatewayError {
    /// Configuration error
    #[error("configuration error: {0}")]
    Config(String),

    /// Server socket bind error
    #[error("server bind error: {0}")]
    Bind(String),

    /// Server terminated with an I/O error
    #[error("server error: {0}")]
    Serve(String),
}

impl From<crate::domain::config::ConfigError> for GatewayError {
    fn from(e: crate::domain::config::ConfigError) -> Self {
        GatewayError::Config(e.to_string())
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    fn location(response: &Response) -> &str {
        response
            .headers()
            .get(header::LOCATION)
            .and_then(|v| v.to_str().ok())
            .unwrap_or_default()
    }

    #[test]
    fn test_unreachable_redirects_to_error_page() {
        let err = RelayError::BackendUnreachable("connection refused".into());
        let response = err.into_response_for("/error");
        assert_eq!(response.status(), StatusCode::FOUND);
        assert_eq!(
            location(&response),
            "/error?message=backend+unreachable%3A+connection+refused"
        );
    }

    #[test]
    fn test_custom_error_page() {
        let response = error_redirect("/oops", "a&b=c");
        assert_eq!(location(&response), "/oops?message=a%26b%3Dc");
    }

    #[test]
    fn test_body_too_large_is_413() {
        let response = RelayError::BodyTooLarge("length limit exceeded".into()).into_response();
        assert_eq!(response.status(), StatusCode::PAYLOAD_TOO_LARGE);
    }

    #[test]
    fn test_default_into_response_uses_default_page() {
        let response = RelayError::Client("tls".into()).into_response();
        assert_eq!(response.status(), StatusCode::FOUND);
        assert!(location(&response).starts_with("/error?message="));
    }
}
