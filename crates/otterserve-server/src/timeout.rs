//! Response deadline for mounted handlers.
//!
//! [`ResponseTimeout::wrap`] bounds how long a handler may take to produce
//! a response. A handler that misses the deadline is dropped and the
//! client gets `503 Service Unavailable`. The layer sits inside the
//! request logger, so a timed-out request is still logged as completed.

use std::sync::Arc;
use std::time::Duration;

use http::StatusCode;

use crate::error::error_response;
use crate::handler::{BoxFuture, Handler, HttpRequest, HttpResponse, SharedHandler};

/// Default time a handler may take to produce a response.
pub const DEFAULT_RESPONSE_TIMEOUT: Duration = Duration::from_secs(30);

/// Wraps handlers with a response deadline.
#[derive(Debug, Clone, Copy)]
pub struct ResponseTimeout {
    limit: Duration,
}

impl Default for ResponseTimeout {
    fn default() -> Self {
        Self::new(DEFAULT_RESPONSE_TIMEOUT)
    }
}

impl ResponseTimeout {
    /// Creates a layer with the given deadline.
    pub fn new(limit: Duration) -> Self {
        Self { limit }
    }

    /// Returns the deadline.
    pub fn limit(&self) -> Duration {
        self.limit
    }

    /// Wraps a handler.
    pub fn wrap(&self, inner: SharedHandler) -> SharedHandler {
        Arc::new(TimedHandler {
            inner,
            limit: self.limit,
        })
    }
}

struct TimedHandler {
    inner: SharedHandler,
    limit: Duration,
}

impl Handler for TimedHandler {
    fn call(&self, request: HttpRequest) -> BoxFuture<'_, HttpResponse> {
        let method = request.method().clone();
        let path = request.uri().path().to_string();

        Box::pin(async move {
            match tokio::time::timeout(self.limit, self.inner.call(request)).await {
                Ok(response) => response,
                Err(_) => {
                    tracing::warn!(
                        method = %method,
                        path = %path,
                        timeout = ?self.limit,
                        "Request handling timed out"
                    );
                    error_response(StatusCode::SERVICE_UNAVAILABLE)
                }
            }
        })
    }
}
