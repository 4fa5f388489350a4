//! The request handler abstraction.
//!
//! Every layer of the request pipeline (file serving, authentication,
//! request logging, custom mounts) implements [`Handler`], so layers can
//! wrap and delegate to each other without knowing what they wrap.
//!
//! # Example
//!
//! ```rust
//! use otterserve_server::handler::{handler_fn, plain_text};
//! use http::StatusCode;
//!
//! let hello = handler_fn(|_request| async { plain_text(StatusCode::OK, "hello\n") });
//! ```

use std::borrow::Cow;
use std::future::Future;
use std::net::SocketAddr;
use std::pin::Pin;
use std::sync::Arc;

use bytes::Bytes;
use http::{Request, Response};
use http_body_util::combinators::UnsyncBoxBody;
use http_body_util::{BodyExt, Empty, Full};
use percent_encoding::percent_decode_str;

use crate::error::ServeError;

pub use crate::error::{error_response, plain_text};

/// Type alias for HTTP response body.
///
/// Boxed so file contents can be streamed while generated pages and error
/// bodies stay in memory.
pub type ResponseBody = UnsyncBoxBody<Bytes, std::io::Error>;

/// Type alias for the HTTP response.
pub type HttpResponse = Response<ResponseBody>;

/// Inbound request as seen by handlers. The body is never read.
pub type HttpRequest = Request<()>;

/// Wraps in-memory bytes as a [`ResponseBody`].
pub fn full_body(data: impl Into<Bytes>) -> ResponseBody {
    Full::new(data.into())
        .map_err(|never| match never {})
        .boxed_unsync()
}

/// Returns a [`ResponseBody`] with no content.
pub fn empty_body() -> ResponseBody {
    Empty::new().map_err(|never| match never {}).boxed_unsync()
}

/// A boxed future that is `Send`.
pub type BoxFuture<'a, T> = Pin<Box<dyn Future<Output = T> + Send + 'a>>;

/// Something that turns a request into a response.
///
/// Handlers never fail: every error is already rendered as a response.
pub trait Handler: Send + Sync + 'static {
    /// Handles one request.
    fn call(&self, request: HttpRequest) -> BoxFuture<'_, HttpResponse>;
}

/// A shareable, type-erased handler.
pub type SharedHandler = Arc<dyn Handler>;

/// Adapts an async closure into a [`Handler`].
pub struct FnHandler<F> {
    f: F,
}

impl<F, Fut> Handler for FnHandler<F>
where
    F: Fn(HttpRequest) -> Fut + Send + Sync + 'static,
    Fut: Future<Output = HttpResponse> + Send + 'static,
{
    fn call(&self, request: HttpRequest) -> BoxFuture<'_, HttpResponse> {
        Box::pin((self.f)(request))
    }
}

/// Wraps an async closure as a [`SharedHandler`].
pub fn handler_fn<F, Fut>(f: F) -> SharedHandler
where
    F: Fn(HttpRequest) -> Fut + Send + Sync + 'static,
    Fut: Future<Output = HttpResponse> + Send + 'static,
{
    Arc::new(FnHandler { f })
}

/// Peer address of the connection a request arrived on.
///
/// Stored in the request extensions by the server.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub struct RemoteAddr(pub SocketAddr);

/// Returns the peer address recorded for a request, if any.
pub fn remote_addr(request: &HttpRequest) -> Option<SocketAddr> {
    request.extensions().get::<RemoteAddr>().map(|addr| addr.0)
}

/// Returns the percent-decoded request path.
///
/// # Errors
///
/// Returns `ServeError::BadRequest` if the decoded bytes are not UTF-8.
pub fn decoded_path(request: &HttpRequest) -> Result<Cow<'_, str>, ServeError> {
    percent_decode_str(request.uri().path())
        .decode_utf8()
        .map_err(|_| ServeError::BadRequest)
}

#[cfg(test)]
mod tests {
    use super::*;
    use http::StatusCode;
    use http_body_util::BodyExt;

    fn request(uri: &str) -> HttpRequest {
        Request::builder().uri(uri).body(()).unwrap()
    }

    #[tokio::test]
    async fn test_handler_fn() {
        let handler = handler_fn(|request: HttpRequest| async move {
            plain_text(StatusCode::OK, request.uri().path().to_string())
        });

        let response = handler.call(request("/echo")).await;
        assert_eq!(response.status(), StatusCode::OK);

        let body = response.into_body().collect().await.unwrap().to_bytes();
        assert_eq!(&body[..], b"/echo");
    }

    #[test]
    fn test_remote_addr_extension() {
        let mut req = request("/");
        assert_eq!(remote_addr(&req), None);

        let addr: SocketAddr = "127.0.0.1:4000".parse().unwrap();
        req.extensions_mut().insert(RemoteAddr(addr));
        assert_eq!(remote_addr(&req), Some(addr));
    }

    #[test]
    fn test_decoded_path() {
        assert_eq!(decoded_path(&request("/static/a%20b.txt")).unwrap(), "/static/a b.txt");
        assert_eq!(decoded_path(&request("/static/%2e%2e/x")).unwrap(), "/static/../x");
        assert!(matches!(
            decoded_path(&request("/static/%ff")),
            Err(ServeError::BadRequest)
        ));
    }
}
