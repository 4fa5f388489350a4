//! Per-request structured logging.
//!
//! [`RequestLogger::wrap`] puts a handler behind a layer that assigns a
//! request ID, records a `Request started` event, runs the handler, and
//! records `Request completed` with the status, duration and body size.
//! The response is passed through untouched.

use std::net::SocketAddr;
use std::sync::atomic::{AtomicU64, Ordering};
use std::sync::Arc;
use std::time::Instant;

use http::{header, Method};
use hyper::body::Body as _;

use crate::handler::{remote_addr, BoxFuture, Handler, HttpRequest, HttpResponse, SharedHandler};

static NEXT_REQUEST_ID: AtomicU64 = AtomicU64::new(1);

/// Returns a request ID unique within this process (`req-1`, `req-2`, ...).
pub fn next_request_id() -> String {
    format!("req-{}", NEXT_REQUEST_ID.fetch_add(1, Ordering::Relaxed))
}

/// Per-request fields, available to inner handlers through the request
/// extensions.
#[derive(Debug, Clone)]
pub struct RequestContext {
    /// Unique request identifier.
    pub request_id: String,
    /// HTTP method.
    pub method: Method,
    /// Request path as received.
    pub path: String,
    /// Peer address, when known.
    pub remote_addr: Option<SocketAddr>,
    /// When the request entered the logging layer.
    pub start_time: Instant,
}

impl RequestContext {
    /// Creates the context for a request.
    pub fn from_request(request: &HttpRequest) -> Self {
        Self {
            request_id: next_request_id(),
            method: request.method().clone(),
            path: request.uri().path().to_string(),
            remote_addr: remote_addr(request),
            start_time: Instant::now(),
        }
    }

    /// Returns the context attached to a request, if it passed through a
    /// logging layer.
    pub fn of(request: &HttpRequest) -> Option<&Self> {
        request.extensions().get::<Self>()
    }

    fn remote_addr_display(&self) -> String {
        self.remote_addr
            .map_or_else(|| "-".to_string(), |addr| addr.to_string())
    }
}

/// Wraps handlers with request logging.
#[derive(Debug, Clone, Copy, Default)]
pub struct RequestLogger;

impl RequestLogger {
    /// Creates a request logger.
    pub fn new() -> Self {
        Self
    }

    /// Wraps a handler.
    pub fn wrap(&self, inner: SharedHandler) -> SharedHandler {
        Arc::new(LoggedHandler { inner })
    }
}

struct LoggedHandler {
    inner: SharedHandler,
}

impl Handler for LoggedHandler {
    fn call(&self, mut request: HttpRequest) -> BoxFuture<'_, HttpResponse> {
        let context = RequestContext::from_request(&request);
        let remote = context.remote_addr_display();
        let user_agent = request
            .headers()
            .get(header::USER_AGENT)
            .and_then(|v| v.to_str().ok())
            .unwrap_or("")
            .to_string();

        tracing::info!(
            request_id = %context.request_id,
            method = %context.method,
            path = %context.path,
            remote_addr = %remote,
            user_agent = %user_agent,
            "Request started"
        );

        request.extensions_mut().insert(context.clone());

        Box::pin(async move {
            let response = self.inner.call(request).await;

            let duration_ms =
                u64::try_from(context.start_time.elapsed().as_millis()).unwrap_or(u64::MAX);
            let bytes = body_size(&response);

            tracing::info!(
                request_id = %context.request_id,
                method = %context.method,
                path = %context.path,
                remote_addr = %remote,
                status_code = response.status().as_u16(),
                duration_ms,
                bytes,
                "Request completed"
            );

            response
        })
    }
}

/// Body size in bytes: exact for in-memory bodies, the declared
/// `Content-Length` for streamed ones.
fn body_size(response: &HttpResponse) -> u64 {
    response.body().size_hint().exact().unwrap_or_else(|| {
        response
            .headers()
            .get(header::CONTENT_LENGTH)
            .and_then(|value| value.to_str().ok())
            .and_then(|value| value.parse().ok())
            .unwrap_or(0)
    })
}
