//! Request path resolution.
//!
//! Turns a request path into a filesystem path under a route's root
//! directory. Cleaning is purely lexical: `.` and empty segments are
//! dropped and `..` pops the previous segment. A cleaned path that still
//! begins with `..` would climb above the root and is rejected with
//! [`ServeError::Forbidden`] before the filesystem is touched.

use std::borrow::Cow;
use std::fs::{self, Metadata};
use std::path::{Path, PathBuf};

use crate::error::ServeError;

const PARENT_DIR: &str = "..";

/// Lexically cleans a `/`-separated path.
///
/// Rooted paths stay rooted and cannot climb above `/`. Relative paths keep
/// any leading `..` segments that have nothing left to pop. An empty result
/// is `.` (relative) or `/` (rooted).
///
/// # Example
///
/// ```rust
/// use otterserve_server::path::clean_path;
///
/// assert_eq!(clean_path("a/./b//c/../d"), "a/b/d");
/// assert_eq!(clean_path("a/../../etc"), "../etc");
/// assert_eq!(clean_path("/../etc"), "/etc");
/// ```
pub fn clean_path(path: &str) -> String {
    let path: Cow<'_, str> = if cfg!(windows) {
        Cow::Owned(path.replace('\\', "/"))
    } else {
        Cow::Borrowed(path)
    };

    let rooted = path.starts_with('/');
    let mut parts: Vec<&str> = Vec::new();

    for segment in path.split('/') {
        match segment {
            "" | "." => {}
            PARENT_DIR => {
                if parts.last().is_some_and(|last| *last != PARENT_DIR) {
                    parts.pop();
                } else if !rooted {
                    parts.push(PARENT_DIR);
                }
            }
            name => parts.push(name),
        }
    }

    let joined = parts.join("/");
    if rooted {
        format!("/{joined}")
    } else if joined.is_empty() {
        ".".to_string()
    } else {
        joined
    }
}

/// Returns `true` if a cleaned path climbs above its starting point.
pub fn escapes_root(cleaned: &str) -> bool {
    cleaned == PARENT_DIR || cleaned.starts_with("../")
}

/// A request path resolved to an existing filesystem entry.
#[derive(Debug, Clone)]
pub struct ResolvedTarget {
    /// Root directory joined with the cleaned request remainder.
    pub path: PathBuf,

    /// Whether the entry is a directory.
    pub is_directory: bool,

    /// Stat result the resolution was based on.
    pub metadata: Metadata,
}

/// Resolves request paths for one route.
#[derive(Debug, Clone)]
pub struct PathResolver {
    mount_path: String,
    root: PathBuf,
}

impl PathResolver {
    /// Creates a resolver for a normalized mount path and its directory.
    pub fn new(mount_path: impl Into<String>, root: impl Into<PathBuf>) -> Self {
        Self {
            mount_path: mount_path.into(),
            root: root.into(),
        }
    }

    /// Returns the mount path.
    pub fn mount_path(&self) -> &str {
        &self.mount_path
    }

    /// Returns the root directory.
    pub fn root(&self) -> &Path {
        &self.root
    }

    /// Strips the mount path and cleans the remainder.
    ///
    /// # Errors
    ///
    /// `NotFound` if the request path is outside the mount path,
    /// `Forbidden` if the remainder escapes the root.
    pub fn clean_remainder(&self, request_path: &str) -> Result<String, ServeError> {
        let remainder = request_path
            .strip_prefix(self.mount_path.as_str())
            .ok_or(ServeError::NotFound)?;

        let remainder = if remainder.is_empty() { "/" } else { remainder };
        let cleaned = clean_path(remainder);

        if escapes_root(&cleaned) {
            tracing::warn!(
                path = %request_path,
                mount_path = %self.mount_path,
                "Rejected path traversal attempt"
            );
            return Err(ServeError::Forbidden);
        }

        Ok(cleaned)
    }

    /// Returns the filesystem path for a request without touching the disk.
    ///
    /// # Errors
    ///
    /// See [`clean_remainder`](Self::clean_remainder).
    pub fn candidate_path(&self, request_path: &str) -> Result<PathBuf, ServeError> {
        let cleaned = self.clean_remainder(request_path)?;

        let mut path = self.root.clone();
        for segment in cleaned.split('/').filter(|s| !s.is_empty() && *s != ".") {
            path.push(segment);
        }
        Ok(path)
    }

    /// Resolves a request path and stats the result.
    ///
    /// # Errors
    ///
    /// `Forbidden` for traversal attempts and permission errors, `NotFound`
    /// for missing entries, `Internal` for any other I/O failure.
    pub fn resolve(&self, request_path: &str) -> Result<ResolvedTarget, ServeError> {
        let path = self.candidate_path(request_path)?;
        let metadata = fs::metadata(&path).map_err(ServeError::from_lookup)?;

        Ok(ResolvedTarget {
            is_directory: metadata.is_dir(),
            path,
            metadata,
        })
    }
}
