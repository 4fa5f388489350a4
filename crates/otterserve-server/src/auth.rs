//! HTTP Basic authentication.
//!
//! [`Authenticator`] is chosen once from an [`AuthPolicy`]: either a
//! pass-through or a single-credential Basic check. Credentials are compared
//! in constant time, and a rejected request never reaches the wrapped
//! handler.
//!
//! # Example
//!
//! ```rust
//! use otterserve_server::{AuthPolicy, Authenticator};
//!
//! let auth = Authenticator::from_policy(&AuthPolicy::basic("admin", "secret"), "Otterserve");
//! assert!(auth.is_enabled());
//! assert!(auth.authenticate("admin", "secret"));
//! assert!(!auth.authenticate("admin", "wrong"));
//! ```

use std::sync::Arc;

use base64::engine::general_purpose::STANDARD;
use base64::Engine;
use http::{header, HeaderValue, StatusCode};
use subtle::ConstantTimeEq;

use crate::error::plain_text;
use crate::handler::{remote_addr, BoxFuture, Handler, HttpRequest, HttpResponse, SharedHandler};

/// Realm sent in the `WWW-Authenticate` challenge unless configured otherwise.
pub const DEFAULT_REALM: &str = "Otterserve";

/// Authentication settings.
#[derive(Debug, Clone, Default, PartialEq, Eq)]
pub struct AuthPolicy {
    /// Whether requests must authenticate.
    pub enabled: bool,
    /// Expected user name.
    pub username: String,
    /// Expected password.
    pub password: String,
}

impl AuthPolicy {
    /// A policy that lets every request through.
    pub fn disabled() -> Self {
        Self::default()
    }

    /// A policy requiring the given credentials.
    pub fn basic(username: impl Into<String>, password: impl Into<String>) -> Self {
        Self {
            enabled: true,
            username: username.into(),
            password: password.into(),
        }
    }
}

/// Credential check applied in front of a handler.
#[derive(Clone)]
pub enum Authenticator {
    /// Every request is allowed.
    NoOp,
    /// Requests must carry the configured Basic credentials.
    Basic(BasicAuthenticator),
}

impl std::fmt::Debug for Authenticator {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        match self {
            Self::NoOp => f.write_str("NoOp"),
            Self::Basic(basic) => f
                .debug_struct("Basic")
                .field("username", &basic.username)
                .field("realm", &basic.realm)
                .finish_non_exhaustive(),
        }
    }
}

impl Authenticator {
    /// Selects the variant for a policy.
    pub fn from_policy(policy: &AuthPolicy, realm: impl Into<String>) -> Self {
        if policy.enabled {
            Self::Basic(BasicAuthenticator::new(
                policy.username.clone(),
                policy.password.clone(),
                realm,
            ))
        } else {
            Self::NoOp
        }
    }

    /// Returns `true` for the Basic variant.
    pub fn is_enabled(&self) -> bool {
        matches!(self, Self::Basic(_))
    }

    /// Checks a user name and password.
    pub fn authenticate(&self, username: &str, password: &str) -> bool {
        match self {
            Self::NoOp => true,
            Self::Basic(basic) => basic.authenticate(username, password),
        }
    }

    /// Wraps a handler with the credential check.
    ///
    /// The no-op variant returns the handler unchanged.
    pub fn wrap(&self, inner: SharedHandler) -> SharedHandler {
        match self {
            Self::NoOp => inner,
            Self::Basic(basic) => Arc::new(RequireBasicAuth {
                auth: basic.clone(),
                inner,
            }),
        }
    }
}

/// Single-credential Basic authentication.
#[derive(Clone)]
pub struct BasicAuthenticator {
    username: Arc<str>,
    password: Arc<str>,
    realm: Arc<str>,
}

impl BasicAuthenticator {
    /// Creates an authenticator for one user name and password.
    pub fn new(
        username: impl Into<String>,
        password: impl Into<String>,
        realm: impl Into<String>,
    ) -> Self {
        Self {
            username: Arc::from(username.into()),
            password: Arc::from(password.into()),
            realm: Arc::from(realm.into()),
        }
    }

    /// Compares both fields in constant time. Both must match.
    pub fn authenticate(&self, username: &str, password: &str) -> bool {
        let user_ok = username.as_bytes().ct_eq(self.username.as_bytes());
        let pass_ok = password.as_bytes().ct_eq(self.password.as_bytes());
        (user_ok & pass_ok).into()
    }

    /// Value of the `WWW-Authenticate` challenge.
    pub fn challenge(&self) -> String {
        format!("Basic realm=\"{}\"", self.realm.replace('"', "'"))
    }

    fn unauthorized(&self) -> HttpResponse {
        let mut response = plain_text(StatusCode::UNAUTHORIZED, "401 Unauthorized\n");
        if let Ok(value) = HeaderValue::from_str(&self.challenge()) {
            response.headers_mut().insert(header::WWW_AUTHENTICATE, value);
        }
        response
    }
}

/// Credentials carried by a request.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct Credentials {
    /// User name (before the first colon).
    pub username: String,
    /// Password (after the first colon, may be empty or contain colons).
    pub password: String,
}

/// Why credentials could not be read from a request.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum CredentialsError {
    /// No `Authorization` header.
    Missing,
    /// The header is not a well-formed Basic credential.
    Malformed,
}

impl CredentialsError {
    fn as_str(self) -> &'static str {
        match self {
            Self::Missing => "missing credentials",
            Self::Malformed => "malformed credentials",
        }
    }
}

/// Extracts Basic credentials from the `Authorization` header.
///
/// The scheme is matched case-insensitively; the decoded value is split on
/// its first colon only.
///
/// # Errors
///
/// `Missing` without a header, `Malformed` for any other scheme, invalid
/// base64, non-UTF-8 content, or a value without a colon.
pub fn extract_credentials(request: &HttpRequest) -> Result<Credentials, CredentialsError> {
    let value = request
        .headers()
        .get(header::AUTHORIZATION)
        .ok_or(CredentialsError::Missing)?
        .to_str()
        .map_err(|_| CredentialsError::Malformed)?;

    let (scheme, encoded) = value.trim().split_once(' ').ok_or(CredentialsError::Malformed)?;
    if !scheme.eq_ignore_ascii_case("basic") {
        return Err(CredentialsError::Malformed);
    }

    let decoded = STANDARD
        .decode(encoded.trim())
        .map_err(|_| CredentialsError::Malformed)?;
    let decoded = String::from_utf8(decoded).map_err(|_| CredentialsError::Malformed)?;

    let (username, password) = decoded.split_once(':').ok_or(CredentialsError::Malformed)?;
    Ok(Credentials {
        username: username.to_string(),
        password: password.to_string(),
    })
}

struct RequireBasicAuth {
    auth: BasicAuthenticator,
    inner: SharedHandler,
}

impl Handler for RequireBasicAuth {
    fn call(&self, request: HttpRequest) -> BoxFuture<'_, HttpResponse> {
        let outcome = extract_credentials(&request).map(|credentials| {
            self.auth
                .authenticate(&credentials.username, &credentials.password)
        });

        match outcome {
            Ok(true) => self.inner.call(request),
            rejected => {
                let reason = match rejected {
                    Err(e) => e.as_str(),
                    _ => "invalid credentials",
                };
                tracing::debug!(
                    path = %request.uri().path(),
                    remote_addr = ?remote_addr(&request),
                    reason,
                    "Authentication failed"
                );
                let response = self.auth.unauthorized();
                Box::pin(async move { response })
            }
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::handler::handler_fn;
    use http::Request;
    use http_body_util::BodyExt;
    use std::sync::atomic::{AtomicUsize, Ordering};

    fn basic_header(user_pass: &str) -> String {
        format!("Basic {}", STANDARD.encode(user_pass))
    }

    fn request(authorization: Option<&str>) -> HttpRequest {
        let mut builder = Request::builder().uri("/secret.txt");
        if let Some(value) = authorization {
            builder = builder.header(header::AUTHORIZATION, value);
        }
        builder.body(()).unwrap()
    }

    fn counting_handler() -> (SharedHandler, Arc<AtomicUsize>) {
        let calls = Arc::new(AtomicUsize::new(0));
        let counter = Arc::clone(&calls);
        let handler = handler_fn(move |_| {
            counter.fetch_add(1, Ordering::SeqCst);
            async { plain_text(StatusCode::OK, "ok") }
        });
        (handler, calls)
    }

    #[test]
    fn test_noop_always_authenticates() {
        let auth = Authenticator::from_policy(&AuthPolicy::disabled(), DEFAULT_REALM);
        assert!(!auth.is_enabled());
        assert!(auth.authenticate("", ""));
        assert!(auth.authenticate("anyone", "anything"));
    }

    #[test]
    fn test_basic_authenticate() {
        let auth = Authenticator::from_policy(&AuthPolicy::basic("admin", "secret"), DEFAULT_REALM);
        assert!(auth.is_enabled());
        assert!(auth.authenticate("admin", "secret"));
        assert!(!auth.authenticate("admin", "wrong"));
        assert!(!auth.authenticate("root", "secret"));
        assert!(!auth.authenticate("admin", "secret2"));
        assert!(!auth.authenticate("", ""));
    }

    #[test]
    fn test_degenerate_policy() {
        let auth = Authenticator::from_policy(&AuthPolicy::basic("", ""), DEFAULT_REALM);
        assert!(auth.is_enabled());
        assert!(auth.authenticate("", ""));
        assert!(!auth.authenticate("admin", ""));
    }

    #[test]
    fn test_extract_credentials() {
        let creds = extract_credentials(&request(Some(&basic_header("admin:secret")))).unwrap();
        assert_eq!(creds.username, "admin");
        assert_eq!(creds.password, "secret");

        let creds = extract_credentials(&request(Some(&basic_header("admin:a:b:c")))).unwrap();
        assert_eq!(creds.password, "a:b:c");

        let creds = extract_credentials(&request(Some(&basic_header("admin:")))).unwrap();
        assert_eq!(creds.password, "");

        let lower = format!("basic {}", STANDARD.encode("admin:secret"));
        assert!(extract_credentials(&request(Some(&lower))).is_ok());
    }

    #[test]
    fn test_extract_credentials_rejections() {
        assert_eq!(
            extract_credentials(&request(None)),
            Err(CredentialsError::Missing)
        );

        for value in [
            "Bearer abc".to_string(),
            "Basic".to_string(),
            "Basic !!!not-base64!!!".to_string(),
            basic_header("no-colon"),
            format!("Basic {}", STANDARD.encode([0xff, 0xfe, b':'])),
        ] {
            assert_eq!(
                extract_credentials(&request(Some(&value))),
                Err(CredentialsError::Malformed),
                "{value}"
            );
        }
    }

    #[tokio::test]
    async fn test_wrap_noop_passes_through() {
        let (inner, calls) = counting_handler();
        let handler = Authenticator::NoOp.wrap(inner);

        let response = handler.call(request(None)).await;
        assert_eq!(response.status(), StatusCode::OK);
        assert_eq!(calls.load(Ordering::SeqCst), 1);
    }

    #[tokio::test]
    async fn test_wrap_basic_accepts_valid_credentials() {
        let (inner, calls) = counting_handler();
        let auth = Authenticator::from_policy(&AuthPolicy::basic("admin", "secret"), DEFAULT_REALM);
        let handler = auth.wrap(inner);

        let response = handler
            .call(request(Some(&basic_header("admin:secret"))))
            .await;
        assert_eq!(response.status(), StatusCode::OK);
        assert_eq!(calls.load(Ordering::SeqCst), 1);
    }

    #[tokio::test]
    async fn test_wrap_basic_rejects_without_calling_inner() {
        let (inner, calls) = counting_handler();
        let auth = Authenticator::from_policy(&AuthPolicy::basic("admin", "secret"), "Files");
        let handler = auth.wrap(inner);

        for value in [None, Some(basic_header("admin:wrong")), Some("Digest x".to_string())] {
            let response = handler.call(request(value.as_deref())).await;
            assert_eq!(response.status(), StatusCode::UNAUTHORIZED);
            assert_eq!(
                response.headers()[header::WWW_AUTHENTICATE],
                "Basic realm=\"Files\""
            );
            assert!(response.headers()[header::CONTENT_TYPE]
                .to_str()
                .unwrap()
                .starts_with("text/plain"));

            let body = response.into_body().collect().await.unwrap().to_bytes();
            assert_eq!(&body[..], b"401 Unauthorized\n");
        }

        assert_eq!(calls.load(Ordering::SeqCst), 0);
    }

    #[test]
    fn test_debug_hides_password() {
        let auth = Authenticator::from_policy(&AuthPolicy::basic("admin", "hunter2"), DEFAULT_REALM);
        let debug = format!("{auth:?}");
        assert!(debug.contains("admin"));
        assert!(!debug.contains("hunter2"));
    }
}
