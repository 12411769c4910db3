//! Per-request tracing spans for the relay.
//!
//! Every request gets a `relay_request` span carrying a fresh [`RelayId`]; an
//! incoming W3C `traceparent` is linked as a follows-from span.

use crate::domain::RelayId;
use axum::{
    body::Body,
    http::{Request, Response},
};
use std::task::{Context, Poll};
use tower::{Layer, Service};
use tracing::{info_span, Instrument, Span};

/// Tracing layer that creates spans for each request
#[derive(Clone, Default)]
pub struct RelayTracingLayer;

impl RelayTracingLayer {
    pub fn new() -> Self {
        Self
    }
}

impl<S> Layer<S> for RelayTracingLayer {
    type Service = RelayTracingService<S>;

    fn layer(&self, inner: S) -> Self::Service {
        RelayTracingService { inner }
    }
}

/// Tracing service
#[derive(Clone)]
pub struct RelayTracingService<S> {
    inner: S,
}

impl<S, ResBody> Service<Request<Body>> for RelayTracingService<S>
where
    S: Service<Request<Body>, Response = Response<ResBody>> + Clone + Send + 'static,
    S::Future: Send,
    ResBody: Send + 'static,
{
    type Response = Response<ResBody>;
    type Error = S::Error;
    type Future = std::pin::Pin<
        Box<dyn std::future::Future<Output = Result<Self::Response, Self::Error>> + Send>,
    >;

    fn poll_ready(&mut self, cx: &mut Context<'_>) -> Poll<Result<(), Self::Error>> {
        self.inner.poll_ready(cx)
    }

    fn call(&mut self, mut req: Request<Body>) -> Self::Future {
        let mut inner = self.inner.clone();

        let parent_context = extract_trace_context(&req);

        let relay_id = RelayId::new();
        req.extensions_mut().insert(relay_id);

        let span = info_span!(
            "relay_request",
            relay.id = %relay_id,
            http.method = %req.method(),
            http.target = %req.uri().path(),
            http.status_code = tracing::field::Empty,
            otel.kind = "server",
            otel.status_code = tracing::field::Empty,
        );

        if let Some(parent) = parent_context {
            span.follows_from(parent);
        }

        Box::pin(
            async move {
                let result = inner.call(req).await;

                match &result {
                    Ok(response) => {
                        let status = response.status();
                        let current = Span::current();
                        current.record("http.status_code", status.as_u16());
                        // Relayed redirects are part of the auth flow, not errors
                        current.record(
                            "otel.status_code",
                            if status.is_server_error() { "ERROR" } else { "OK" },
                        );
                    }
                    Err(_) => {
                        Span::current().record("otel.status_code", "ERROR");
                    }
                }

                result
            }
            .instrument(span),
        )
    }
}

/// Extract trace context from request headers (W3C Trace Context)
fn extract_trace_context<B>(req: &Request<B>) -> Option<Span> {
    let traceparent = req.headers().get("traceparent")?.to_str().ok()?;

    // version-trace_id-parent_id-trace_flags
    let parts: Vec<&str> = traceparent.split('-').collect();
    if parts.len() != 4 {
        return None;
    }

    let trace_id = parts[1];
    let parent_id = parts[2];

    Some(info_span!(
        "parent_trace",
        trace_id = trace_id,
        parent_span_id = parent_id
    ))
}

#[cfg(test)]
mod tests {
    use super::*;
    use axum::http::StatusCode;
    use std::convert::Infallible;
    use tower::ServiceExt;

    #[test]
    fn test_traceparent_parsing() {
        let req = Request::builder()
            .header(
                "traceparent",
                "00-0af7651916cd43dd8448eb211c80319c-b7ad6b7169203331-01",
            )
            .body(Body::empty())
            .unwrap();

        assert!(extract_trace_context(&req).is_some());
    }

    #[test]
    fn test_invalid_traceparent() {
        let req = Request::builder()
            .header("traceparent", "invalid")
            .body(Body::empty())
            .unwrap();

        assert!(extract_trace_context(&req).is_none());
    }

    #[tokio::test]
    async fn test_relay_id_attached() {
        let inner = tower::service_fn(|req: Request<Body>| async move {
            let status = if req.extensions().get::<RelayId>().is_some() {
                StatusCode::OK
            } else {
                StatusCode::INTERNAL_SERVER_ERROR
            };
            let mut response = Response::new(Body::empty());
            *response.status_mut() = status;
            Ok::<_, Infallible>(response)
        });

        let service = RelayTracingLayer::new().layer(inner);
        let response = service
            .oneshot(Request::builder().uri("/bff/user").body(Body::empty()).unwrap())
            .await
            .unwrap();
        assert_eq!(response.status(), StatusCode::OK);
    }
}
