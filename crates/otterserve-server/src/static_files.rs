//! Static file serving for a single route.
//!
//! [`StaticFileHandler`] resolves a request against its route's root
//! directory and answers with the file, the directory's index file, or a
//! generated listing. File responses honor `Range`, `If-Range`,
//! `If-Modified-Since` and `If-Unmodified-Since`, and their bodies are
//! streamed from disk in chunks of at most [`CHUNK_SIZE`] bytes.
//!
//! # Example
//!
//! ```rust,ignore
//! use otterserve_server::StaticFileHandler;
//!
//! let files = StaticFileHandler::new("/static/", "./public");
//! let response = files.handle(&request);
//! ```

use std::fs::{File, Metadata};
use std::io::{Seek, SeekFrom};
use std::path::{Path, PathBuf};
use std::time::SystemTime;

use futures_util::TryStreamExt;
use http::{header, HeaderMap, HeaderValue, Method, Response, StatusCode};
use http_body_util::{BodyExt, StreamBody};
use hyper::body::Frame;
use tokio::io::AsyncReadExt;
use tokio_util::io::ReaderStream;

use crate::content_type::type_of;
use crate::error::{error_response, ServeError};
use crate::handler::{
    decoded_path, empty_body, BoxFuture, Handler, HttpRequest, HttpResponse, ResponseBody,
};
use crate::listing;
use crate::path::PathResolver;

/// Index file names probed, in order, when a directory is requested.
pub const DEFAULT_INDEX_FILES: [&str; 3] = ["index.html", "index.htm", "default.html"];

/// Largest chunk read from disk per body frame when streaming a file.
pub const CHUNK_SIZE: usize = 64 * 1024;

/// An inclusive byte range within a file.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub struct ByteRange {
    /// First byte offset.
    pub start: u64,
    /// Last byte offset (inclusive).
    pub end: u64,
}

impl ByteRange {
    /// Number of bytes covered.
    pub fn len(&self) -> u64 {
        self.end - self.start + 1
    }

    /// Always `false`; a parsed range covers at least one byte.
    pub fn is_empty(&self) -> bool {
        false
    }
}

/// Serves files from one route's directory.
#[derive(Debug, Clone)]
pub struct StaticFileHandler {
    resolver: PathResolver,
    index_files: Vec<String>,
}

impl StaticFileHandler {
    /// Creates a handler for a normalized mount path and its directory.
    pub fn new(mount_path: impl Into<String>, root: impl Into<PathBuf>) -> Self {
        Self {
            resolver: PathResolver::new(mount_path, root),
            index_files: DEFAULT_INDEX_FILES.iter().map(ToString::to_string).collect(),
        }
    }

    /// Replaces the index file candidates.
    #[must_use]
    pub fn with_index_files<I, S>(mut self, names: I) -> Self
    where
        I: IntoIterator<Item = S>,
        S: Into<String>,
    {
        self.index_files = names.into_iter().map(Into::into).collect();
        self
    }

    /// Returns the mount path this handler serves.
    pub fn mount_path(&self) -> &str {
        self.resolver.mount_path()
    }

    /// Returns the directory this handler serves from.
    pub fn root(&self) -> &Path {
        self.resolver.root()
    }

    /// Serves a request. Performs blocking filesystem I/O.
    pub fn handle(&self, request: &HttpRequest) -> HttpResponse {
        match self.try_handle(request) {
            Ok(response) => response,
            Err(err) => {
                match &err {
                    ServeError::Internal(source) => tracing::error!(
                        path = %request.uri().path(),
                        error = %source,
                        "Failed to serve file"
                    ),
                    other => tracing::debug!(
                        path = %request.uri().path(),
                        status_code = other.status_code().as_u16(),
                        "File request rejected"
                    ),
                }
                err.into_response()
            }
        }
    }

    fn try_handle(&self, request: &HttpRequest) -> Result<HttpResponse, ServeError> {
        if request.method() != Method::GET && request.method() != Method::HEAD {
            return Err(ServeError::MethodNotAllowed);
        }

        let path = decoded_path(request)?;
        let target = self.resolver.resolve(&path)?;

        if !target.is_directory {
            return serve_file(&target.path, &target.metadata, request);
        }

        if !path.ends_with('/') {
            return Ok(redirect_to_slash(request));
        }

        if let Some((index_path, metadata)) = self.find_index(&target.path) {
            return serve_file(&index_path, &metadata, request);
        }

        listing::list(&target.path, &path)
    }

    fn find_index(&self, directory: &Path) -> Option<(PathBuf, Metadata)> {
        self.index_files.iter().find_map(|name| {
            let candidate = directory.join(name);
            std::fs::metadata(&candidate)
                .ok()
                .filter(Metadata::is_file)
                .map(|metadata| (candidate, metadata))
        })
    }
}

impl Handler for StaticFileHandler {
    fn call(&self, request: HttpRequest) -> BoxFuture<'_, HttpResponse> {
        let handler = self.clone();
        Box::pin(async move {
            match tokio::task::spawn_blocking(move || handler.handle(&request)).await {
                Ok(response) => response,
                Err(e) => {
                    tracing::error!(error = %e, "File serving task failed");
                    error_response(StatusCode::INTERNAL_SERVER_ERROR)
                }
            }
        })
    }
}

/// Builds a `301` to the same path with a trailing slash, keeping the query.
pub fn redirect_to_slash(request: &HttpRequest) -> HttpResponse {
    let location = match request.uri().query() {
        Some(query) => format!("{}/?{query}", request.uri().path()),
        None => format!("{}/", request.uri().path()),
    };

    let mut response = error_response(StatusCode::MOVED_PERMANENTLY);
    if let Ok(value) = HeaderValue::from_str(&location) {
        response.headers_mut().insert(header::LOCATION, value);
    }
    response
}

/// Outcome of evaluating conditional request headers.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
enum Precondition {
    Proceed,
    NotModified,
    Failed,
}

fn header_date(headers: &HeaderMap, name: header::HeaderName) -> Option<SystemTime> {
    headers
        .get(name)
        .and_then(|value| value.to_str().ok())
        .and_then(|value| httpdate::parse_http_date(value).ok())
}

fn unix_secs(time: SystemTime) -> Option<u64> {
    time.duration_since(SystemTime::UNIX_EPOCH)
        .ok()
        .map(|d| d.as_secs())
        .filter(|secs| *secs > 0)
}

fn check_preconditions(headers: &HeaderMap, modified: Option<SystemTime>) -> Precondition {
    // HTTP dates have one-second resolution
    let Some(modified) = modified.and_then(unix_secs) else {
        return Precondition::Proceed;
    };

    if let Some(since) = header_date(headers, header::IF_UNMODIFIED_SINCE).and_then(unix_secs) {
        if modified > since {
            return Precondition::Failed;
        }
    }

    if headers.contains_key(header::IF_NONE_MATCH) {
        return Precondition::Proceed;
    }

    if let Some(since) = header_date(headers, header::IF_MODIFIED_SINCE).and_then(unix_secs) {
        if modified <= since {
            return Precondition::NotModified;
        }
    }

    Precondition::Proceed
}

/// `If-Range` only keeps the range when it names the current modification time.
fn range_applies(headers: &HeaderMap, modified: Option<SystemTime>) -> bool {
    let Some(if_range) = headers.get(header::IF_RANGE) else {
        return true;
    };

    let validator = if_range
        .to_str()
        .ok()
        .and_then(|value| httpdate::parse_http_date(value).ok())
        .and_then(unix_secs);

    matches!((validator, modified.and_then(unix_secs)), (Some(a), Some(b)) if a == b)
}

/// Parses a single-range `Range` header.
///
/// Headers that are not a single well-formed `bytes=` range are ignored
/// (`Ok(None)`) and the full file is served.
///
/// # Errors
///
/// Returns `ServeError::RangeNotSatisfiable` when the range starts at or
/// past the end of the file, or asks for an empty suffix.
pub fn parse_range_header(headers: &HeaderMap, size: u64) -> Result<Option<ByteRange>, ServeError> {
    let Some(ranges) = headers
        .get(header::RANGE)
        .and_then(|value| value.to_str().ok())
        .and_then(|value| value.trim().strip_prefix("bytes="))
    else {
        return Ok(None);
    };

    if ranges.contains(',') {
        return Ok(None);
    }

    let Some((first, last)) = ranges.trim().split_once('-') else {
        return Ok(None);
    };
    let unsatisfiable = || ServeError::RangeNotSatisfiable { size };

    if first.is_empty() {
        let Ok(suffix) = last.parse::<u64>() else {
            return Ok(None);
        };
        if suffix == 0 || size == 0 {
            return Err(unsatisfiable());
        }
        return Ok(Some(ByteRange {
            start: size.saturating_sub(suffix),
            end: size - 1,
        }));
    }

    let Ok(start) = first.parse::<u64>() else {
        return Ok(None);
    };
    let end = if last.is_empty() {
        None
    } else {
        match last.parse::<u64>() {
            Ok(end) if end >= start => Some(end),
            _ => return Ok(None),
        }
    };

    if start >= size {
        return Err(unsatisfiable());
    }

    Ok(Some(ByteRange {
        start,
        end: end.map_or(size - 1, |end| end.min(size - 1)),
    }))
}

fn file_body(mut file: File, start: u64, len: u64) -> Result<ResponseBody, ServeError> {
    file.seek(SeekFrom::Start(start))
        .map_err(ServeError::from_read)?;

    let reader = tokio::fs::File::from_std(file).take(len);
    let frames = ReaderStream::with_capacity(reader, CHUNK_SIZE).map_ok(Frame::data);
    Ok(StreamBody::new(frames).boxed_unsync())
}

fn serve_file(
    path: &Path,
    metadata: &Metadata,
    request: &HttpRequest,
) -> Result<HttpResponse, ServeError> {
    let file = File::open(path).map_err(ServeError::from_read)?;
    let headers = request.headers();
    let size = metadata.len();
    let modified = metadata.modified().ok();

    match check_preconditions(headers, modified) {
        Precondition::Proceed => {}
        Precondition::NotModified => return Ok(not_modified_response(modified)),
        Precondition::Failed => return Err(ServeError::PreconditionFailed),
    }

    let range = if range_applies(headers, modified) {
        parse_range_header(headers, size)?
    } else {
        None
    };

    let (status, start, content_length) = match range {
        Some(range) => (StatusCode::PARTIAL_CONTENT, range.start, range.len()),
        None => (StatusCode::OK, 0, size),
    };

    let body = if request.method() == Method::HEAD {
        empty_body()
    } else {
        file_body(file, start, content_length)?
    };

    let mut builder = Response::builder()
        .status(status)
        .header(header::CONTENT_TYPE, type_of(path))
        .header(header::ACCEPT_RANGES, "bytes")
        .header(header::CONTENT_LENGTH, content_length);

    if let Some(modified) = modified {
        builder = builder.header(header::LAST_MODIFIED, httpdate::fmt_http_date(modified));
    }

    if let Some(range) = range {
        builder = builder.header(
            header::CONTENT_RANGE,
            format!("bytes {}-{}/{}", range.start, range.end, size),
        );
    }

    builder
        .body(body)
        .map_err(|e| ServeError::Internal(std::io::Error::other(e)))
}

fn not_modified_response(modified: Option<SystemTime>) -> HttpResponse {
    let mut response = Response::new(empty_body());
    *response.status_mut() = StatusCode::NOT_MODIFIED;

    if let Some(value) =
        modified.and_then(|m| HeaderValue::from_str(&httpdate::fmt_http_date(m)).ok())
    {
        response.headers_mut().insert(header::LAST_MODIFIED, value);
    }
    response
}
