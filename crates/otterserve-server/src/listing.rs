//! Generated directory listings.
//!
//! Used when a directory is requested and holds no index file. Entries are
//! listed directories first, then files, each group ordered by name.

use std::cmp::Ordering;
use std::fs;
use std::path::Path;
use std::time::SystemTime;

use chrono::{DateTime, Local};
use http::{header, HeaderValue, Response, StatusCode};
use maud::{html, DOCTYPE};
use percent_encoding::{utf8_percent_encode, AsciiSet, CONTROLS};

use crate::error::ServeError;
use crate::handler::{full_body, HttpResponse};

/// Content type of every listing page.
pub const LISTING_CONTENT_TYPE: &str = "text/html; charset=utf-8";

const LISTING_STYLE: &str = "\
body { font-family: sans-serif; margin: 2em; }
table { border-collapse: collapse; width: 100%; }
th, td { text-align: left; padding: 0.4em 0.8em; border-bottom: 1px solid #ddd; }
td.size { text-align: right; }
a.dir { font-weight: bold; }
";

/// Characters escaped in an entry link. `/` and `:` are included so a name
/// can never turn into a nested path or a scheme.
const LINK_ESCAPES: &AsciiSet = &CONTROLS
    .add(b' ')
    .add(b'"')
    .add(b'#')
    .add(b'%')
    .add(b'&')
    .add(b'\'')
    .add(b'/')
    .add(b':')
    .add(b'<')
    .add(b'>')
    .add(b'?')
    .add(b'\\')
    .add(b'`')
    .add(b'{')
    .add(b'}');

/// One row of a listing.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct DirectoryEntry {
    /// File name within the directory.
    pub name: String,
    /// Size in bytes.
    pub size: u64,
    /// Last modification time, when the platform reports one.
    pub modified_at: Option<SystemTime>,
    /// Whether the entry is a directory.
    pub is_directory: bool,
}

impl DirectoryEntry {
    /// Human-readable size, `-` for directories.
    pub fn display_size(&self) -> String {
        if self.is_directory {
            "-".to_string()
        } else {
            format_size(self.size)
        }
    }

    /// Modification time as `YYYY-MM-DD HH:MM:SS` local time.
    pub fn display_modified(&self) -> String {
        self.modified_at.map_or_else(
            || "-".to_string(),
            |time| {
                DateTime::<Local>::from(time)
                    .format("%Y-%m-%d %H:%M:%S")
                    .to_string()
            },
        )
    }

    fn listing_order(&self, other: &Self) -> Ordering {
        other
            .is_directory
            .cmp(&self.is_directory)
            .then_with(|| self.name.cmp(&other.name))
    }
}

/// Formats a byte count with binary units and one decimal above bytes.
///
/// # Example
///
/// ```rust
/// use otterserve_server::listing::format_size;
///
/// assert_eq!(format_size(512), "512 B");
/// assert_eq!(format_size(1536), "1.5 KB");
/// assert_eq!(format_size(5 * 1024 * 1024), "5.0 MB");
/// ```
pub fn format_size(size: u64) -> String {
    const UNIT: u64 = 1024;
    const PREFIXES: [char; 6] = ['K', 'M', 'G', 'T', 'P', 'E'];

    if size < UNIT {
        return format!("{size} B");
    }

    let mut divisor = UNIT;
    let mut exponent = 0;
    let mut n = size / UNIT;
    while n >= UNIT {
        divisor *= UNIT;
        exponent += 1;
        n /= UNIT;
    }

    format!(
        "{:.1} {}B",
        size as f64 / divisor as f64,
        PREFIXES[exponent]
    )
}

/// Reads and sorts the entries of a directory.
///
/// Entries that cannot be stat'ed are skipped.
///
/// # Errors
///
/// `Forbidden` if the directory cannot be read for lack of permission,
/// `Internal` for any other failure.
pub fn read_entries(directory: &Path) -> Result<Vec<DirectoryEntry>, ServeError> {
    let reader = fs::read_dir(directory).map_err(ServeError::from_read)?;

    let mut entries: Vec<DirectoryEntry> = reader
        .filter_map(Result::ok)
        .filter_map(|entry| {
            let metadata = entry.metadata().ok()?;
            let is_directory = entry.file_type().map_or(false, |t| t.is_dir());
            Some(DirectoryEntry {
                name: entry.file_name().to_string_lossy().into_owned(),
                size: metadata.len(),
                modified_at: metadata.modified().ok(),
                is_directory,
            })
        })
        .collect();

    sort_entries(&mut entries);
    Ok(entries)
}

/// Sorts entries directories first, then by name.
pub fn sort_entries(entries: &mut [DirectoryEntry]) {
    entries.sort_by(DirectoryEntry::listing_order);
}

/// Renders the listing page for `request_path`. Names and paths are
/// escaped by the template.
pub fn render(request_path: &str, entries: &[DirectoryEntry]) -> String {
    let heading = format!("Directory listing for {request_path}");

    html! {
        (DOCTYPE)
        html {
            head {
                meta charset="utf-8";
                title { (heading) }
                style { (LISTING_STYLE) }
            }
            body {
                h1 { (heading) }
                table {
                    thead {
                        tr { th { "Name" } th { "Size" } th { "Last Modified" } }
                    }
                    tbody {
                        @if request_path != "/" {
                            tr {
                                td { a.dir href="../" { "../" } }
                                td.size { "-" }
                                td { "-" }
                            }
                        }
                        @for entry in entries {
                            @let suffix = if entry.is_directory { "/" } else { "" };
                            @let link = format!("{}{suffix}", utf8_percent_encode(&entry.name, LINK_ESCAPES));
                            tr {
                                td { a.dir[entry.is_directory] href=(link) { (entry.name) (suffix) } }
                                td.size { (entry.display_size()) }
                                td { (entry.display_modified()) }
                            }
                        }
                    }
                }
            }
        }
    }
    .into_string()
}

/// Builds the listing response for a directory.
///
/// # Errors
///
/// See [`read_entries`].
pub fn list(directory: &Path, request_path: &str) -> Result<HttpResponse, ServeError> {
    let entries = read_entries(directory)?;
    let page = render(request_path, &entries);

    tracing::debug!(
        path = %request_path,
        entries = entries.len(),
        "Rendered directory listing"
    );

    let mut response = Response::new(full_body(page));
    *response.status_mut() = StatusCode::OK;
    response.headers_mut().insert(
        header::CONTENT_TYPE,
        HeaderValue::from_static(LISTING_CONTENT_TYPE),
    );
    Ok(response)
}
