//! Request logging middleware.
//!
//! Each request runs inside an `http_request` span and logs one line when it
//! starts and one when it completes. Server errors are logged at `warn`.

use std::{
    future::Future,
    pin::Pin,
    task::{Context, Poll},
    time::Instant,
};

use axum::http::{Request, Response};
use tower::{Layer, Service};
use tracing::{field::Empty, info, info_span, warn, Instrument, Span};

use super::request_id::request_id_of;

/// Log target for HTTP access lines.
pub const HTTP_LOG_TARGET: &str = "barscan::http";

/// Layer that logs HTTP requests and responses.
#[derive(Clone, Default)]
pub struct RequestLoggingLayer;

impl RequestLoggingLayer {
    pub fn new() -> Self {
        Self
    }
}

impl<S> Layer<S> for RequestLoggingLayer {
    type Service = RequestLoggingService<S>;

    fn layer(&self, inner: S) -> Self::Service {
        RequestLoggingService { inner }
    }
}

/// Service that logs request/response details.
#[derive(Clone)]
pub struct RequestLoggingService<S> {
    inner: S,
}

impl<S, ReqBody, ResBody> Service<Request<ReqBody>> for RequestLoggingService<S>
where
    S: Service<Request<ReqBody>, Response = Response<ResBody>> + Clone + Send + 'static,
    S::Future: Send,
    ReqBody: Send + 'static,
    ResBody: Send + 'static,
{
    type Response = S::Response;
    type Error = S::Error;
    type Future = Pin<Box<dyn Future<Output = Result<Self::Response, Self::Error>> + Send>>;

    fn poll_ready(&mut self, cx: &mut Context<'_>) -> Poll<Result<(), Self::Error>> {
        self.inner.poll_ready(cx)
    }

    fn call(&mut self, request: Request<ReqBody>) -> Self::Future {
        let method = request.method().clone();
        let uri = request.uri().clone();
        let request_id = request_id_of(request.headers())
            .unwrap_or_default()
            .to_string();

        let span = info_span!(
            "http_request",
            method = %method,
            uri = %uri,
            request_id = %request_id,
            status = Empty,
        );

        let start = Instant::now();
        let clone = self.inner.clone();
        let mut inner = std::mem::replace(&mut self.inner, clone);

        Box::pin(
            async move {
                info!(target: HTTP_LOG_TARGET, "request started");

                let response = inner.call(request).await?;
                let status = response.status();
                let duration_ms = start.elapsed().as_millis() as u64;
                Span::current().record("status", status.as_u16());

                if status.is_server_error() {
                    warn!(
                        target: HTTP_LOG_TARGET,
                        status = status.as_u16(),
                        duration_ms,
                        "request failed"
                    );
                } else {
                    info!(
                        target: HTTP_LOG_TARGET,
                        status = status.as_u16(),
                        duration_ms,
                        "request completed"
                    );
                }

                Ok(response)
            }
            .instrument(span),
        )
    }
}
