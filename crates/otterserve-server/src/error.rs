//! Error types for request handling and the server lifecycle.

use std::io;
use std::time::Duration;

use bytes::Bytes;
use http::{header, HeaderValue, Response, StatusCode};
use thiserror::Error;

use crate::handler::{full_body, HttpResponse};
use crate::server::ServerState;

/// Why a single request could not be served.
///
/// Each variant maps to one HTTP status. The response body is the status
/// line only, so no filesystem detail reaches the client.
#[derive(Debug, Error)]
pub enum ServeError {
    /// The request path escapes the mount root, or the OS denied access.
    #[error("403 Forbidden")]
    Forbidden,

    /// Nothing exists at the resolved path.
    #[error("404 Not Found")]
    NotFound,

    /// The request path could not be decoded.
    #[error("400 Bad Request")]
    BadRequest,

    /// Only `GET` and `HEAD` are served.
    #[error("405 Method Not Allowed")]
    MethodNotAllowed,

    /// `If-Unmodified-Since` did not hold.
    #[error("412 Precondition Failed")]
    PreconditionFailed,

    /// The requested byte range starts past the end of the file.
    #[error("416 Range Not Satisfiable")]
    RangeNotSatisfiable {
        /// Full size of the file.
        size: u64,
    },

    /// Any other I/O failure.
    #[error("500 Internal Server Error")]
    Internal(#[source] io::Error),
}

impl ServeError {
    /// Classifies a failure to look up a path.
    #[must_use]
    pub fn from_lookup(err: io::Error) -> Self {
        match err.kind() {
            io::ErrorKind::NotFound => Self::NotFound,
            io::ErrorKind::PermissionDenied => Self::Forbidden,
            _ => Self::Internal(err),
        }
    }

    /// Classifies a failure to open or read a path that was already found.
    #[must_use]
    pub fn from_read(err: io::Error) -> Self {
        match err.kind() {
            io::ErrorKind::PermissionDenied => Self::Forbidden,
            _ => Self::Internal(err),
        }
    }

    /// Returns the HTTP status code for this error.
    #[must_use]
    pub fn status_code(&self) -> StatusCode {
        match self {
            Self::Forbidden => StatusCode::FORBIDDEN,
            Self::NotFound => StatusCode::NOT_FOUND,
            Self::BadRequest => StatusCode::BAD_REQUEST,
            Self::MethodNotAllowed => StatusCode::METHOD_NOT_ALLOWED,
            Self::PreconditionFailed => StatusCode::PRECONDITION_FAILED,
            Self::RangeNotSatisfiable { .. } => StatusCode::RANGE_NOT_SATISFIABLE,
            Self::Internal(_) => StatusCode::INTERNAL_SERVER_ERROR,
        }
    }

    /// Builds the plain-text response for this error.
    #[must_use]
    pub fn into_response(self) -> HttpResponse {
        let mut response = error_response(self.status_code());
        let headers = response.headers_mut();

        match self {
            Self::MethodNotAllowed => {
                headers.insert(header::ALLOW, HeaderValue::from_static("GET, HEAD"));
            }
            Self::RangeNotSatisfiable { size } => {
                if let Ok(value) = HeaderValue::from_str(&format!("bytes */{size}")) {
                    headers.insert(header::CONTENT_RANGE, value);
                }
            }
            _ => {}
        }

        response
    }
}

/// Builds a `text/plain` response whose body is `"{code} {reason}\n"`.
#[must_use]
pub fn error_response(status: StatusCode) -> HttpResponse {
    let body = format!(
        "{} {}\n",
        status.as_u16(),
        status.canonical_reason().unwrap_or("Unknown")
    );
    plain_text(status, body)
}

/// Builds a `text/plain; charset=utf-8` response.
#[must_use]
pub fn plain_text(status: StatusCode, body: impl Into<Bytes>) -> HttpResponse {
    let mut response = Response::new(full_body(body));
    *response.status_mut() = status;
    let headers = response.headers_mut();
    headers.insert(
        header::CONTENT_TYPE,
        HeaderValue::from_static("text/plain; charset=utf-8"),
    );
    headers.insert(
        header::X_CONTENT_TYPE_OPTIONS,
        HeaderValue::from_static("nosniff"),
    );
    response
}

/// Errors from configuring, starting or stopping a [`Server`](crate::Server).
#[derive(Debug, Error)]
pub enum ServerError {
    /// The route table was empty.
    #[error("no routes configured")]
    NoRoutesConfigured,

    /// A route entry was rejected.
    #[error("failed to register route {index} ({path:?}): {reason}")]
    InvalidRoute {
        /// Position of the route in the configured list.
        index: usize,
        /// Mount path as configured.
        path: String,
        /// Why it was rejected.
        reason: String,
    },

    /// The listener could not be bound.
    #[error("failed to bind to {addr}: {source}")]
    Bind {
        /// Address as configured (`host:port`).
        addr: String,
        /// Underlying socket error.
        #[source]
        source: io::Error,
    },

    /// An operation was attempted in the wrong lifecycle state.
    #[error("invalid server state: expected {expected}, found {actual}")]
    InvalidState {
        /// State the operation requires.
        expected: ServerState,
        /// State the server was in.
        actual: ServerState,
    },

    /// Connections were still open when the stop deadline passed.
    #[error("shutdown deadline of {deadline:?} exceeded with {remaining} connection(s) still open")]
    ShutdownTimeout {
        /// Deadline given to `stop`.
        deadline: Duration,
        /// Connections that were forcibly closed.
        remaining: usize,
    },
}

impl ServerError {
    /// Creates an invalid-route error.
    pub fn invalid_route(index: usize, path: impl Into<String>, reason: impl Into<String>) -> Self {
        Self::InvalidRoute {
            index,
            path: path.into(),
            reason: reason.into(),
        }
    }

    /// Returns `true` if the route configuration itself was rejected.
    #[must_use]
    pub fn is_configuration_rejected(&self) -> bool {
        matches!(self, Self::NoRoutesConfigured | Self::InvalidRoute { .. })
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use http_body_util::BodyExt;

    async fn body_string(response: HttpResponse) -> String {
        let bytes = response.into_body().collect().await.unwrap().to_bytes();
        String::from_utf8(bytes.to_vec()).unwrap()
    }

    #[test]
    fn test_from_lookup_classification() {
        let not_found = io::Error::from(io::ErrorKind::NotFound);
        let denied = io::Error::from(io::ErrorKind::PermissionDenied);
        let other = io::Error::other("disk on fire");

        assert!(matches!(ServeError::from_lookup(not_found), ServeError::NotFound));
        assert!(matches!(ServeError::from_lookup(denied), ServeError::Forbidden));
        assert!(matches!(ServeError::from_lookup(other), ServeError::Internal(_)));
    }

    #[test]
    fn test_from_read_never_reports_not_found() {
        let vanished = io::Error::from(io::ErrorKind::NotFound);
        assert!(matches!(ServeError::from_read(vanished), ServeError::Internal(_)));
    }

    #[test]
    fn test_status_codes() {
        assert_eq!(ServeError::Forbidden.status_code(), StatusCode::FORBIDDEN);
        assert_eq!(ServeError::NotFound.status_code(), StatusCode::NOT_FOUND);
        assert_eq!(
            ServeError::RangeNotSatisfiable { size: 3 }.status_code(),
            StatusCode::RANGE_NOT_SATISFIABLE
        );
    }

    #[tokio::test]
    async fn test_forbidden_response() {
        let response = ServeError::Forbidden.into_response();
        assert_eq!(response.status(), StatusCode::FORBIDDEN);
        assert_eq!(
            response.headers()[header::CONTENT_TYPE],
            "text/plain; charset=utf-8"
        );
        assert_eq!(body_string(response).await, "403 Forbidden\n");
    }

    #[test]
    fn test_method_not_allowed_sets_allow() {
        let response = ServeError::MethodNotAllowed.into_response();
        assert_eq!(response.headers()[header::ALLOW], "GET, HEAD");
    }

    #[test]
    fn test_range_not_satisfiable_sets_content_range() {
        let response = ServeError::RangeNotSatisfiable { size: 42 }.into_response();
        assert_eq!(response.headers()[header::CONTENT_RANGE], "bytes */42");
    }

    #[test]
    fn test_server_error_display() {
        assert_eq!(ServerError::NoRoutesConfigured.to_string(), "no routes configured");

        let err = ServerError::invalid_route(2, "", "route path cannot be empty");
        assert_eq!(
            err.to_string(),
            "failed to register route 2 (\"\"): route path cannot be empty"
        );
        assert!(err.is_configuration_rejected());
    }
}
