//! File name to MIME type mapping.

use std::path::Path;

/// Content type used when the extension is unknown or absent.
pub const DEFAULT_CONTENT_TYPE: &str = "application/octet-stream";

/// Returns the MIME type for a file name.
///
/// Text types carry an explicit `charset=utf-8` parameter.
///
/// # Example
///
/// ```rust
/// use otterserve_server::content_type::type_of;
///
/// assert_eq!(type_of("notes.txt"), "text/plain; charset=utf-8");
/// assert_eq!(type_of("logo.png"), "image/png");
/// assert_eq!(type_of("LICENSE"), "application/octet-stream");
/// ```
pub fn type_of(file_name: impl AsRef<Path>) -> String {
    match mime_guess::from_path(file_name.as_ref()).first_raw() {
        Some(mime) if mime.starts_with("text/") && !mime.contains("charset") => {
            format!("{mime}; charset=utf-8")
        }
        Some(mime) => mime.to_string(),
        None => DEFAULT_CONTENT_TYPE.to_string(),
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_common_types() {
        assert_eq!(type_of("index.html"), "text/html; charset=utf-8");
        assert_eq!(type_of("style.css"), "text/css; charset=utf-8");
        assert_eq!(type_of("data.json"), "application/json");
        assert_eq!(type_of("photo.JPG"), "image/jpeg");
        assert_eq!(type_of("archive.zip"), "application/zip");
    }

    #[test]
    fn test_uses_only_the_file_name() {
        assert_eq!(type_of("/srv/files.d/readme.txt"), "text/plain; charset=utf-8");
    }

    #[test]
    fn test_unknown_extension() {
        assert_eq!(type_of("blob.unknownext"), DEFAULT_CONTENT_TYPE);
        assert_eq!(type_of("Makefile"), DEFAULT_CONTENT_TYPE);
        assert_eq!(type_of(""), DEFAULT_CONTENT_TYPE);
    }
}
