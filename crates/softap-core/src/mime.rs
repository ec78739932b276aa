//! Content-type lookup by file extension.
//!
//! The table is deliberately small: it covers what a device landing page
//! ships (markup, styles, scripts, images). Matching is case-sensitive.

/// Content type used when the extension is missing or unknown.
pub const DEFAULT_CONTENT_TYPE: &str = "text/plain";

/// Substring after the last `.` of `path`, if any.
///
/// The whole path is searched, not just the file name, so a dot in a
/// directory name followed by an extension-less file yields that directory
/// suffix.
pub fn extension_of(path: &str) -> Option<&str> {
    path.rfind('.').map(|idx| &path[idx + 1..])
}

/// Content type for `path`, falling back to [`DEFAULT_CONTENT_TYPE`].
pub fn content_type_for(path: &str) -> &'static str {
    match extension_of(path) {
        Some("html") => "text/html",
        Some("css") => "text/css",
        Some("js") => "text/javascript",
        Some("png") => "image/png",
        Some("jpg") => "image/jpeg",
        _ => DEFAULT_CONTENT_TYPE,
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_known_extensions() {
        assert_eq!(content_type_for("/spiffs/index.html"), "text/html");
        assert_eq!(content_type_for("/spiffs/style.css"), "text/css");
        assert_eq!(content_type_for("/spiffs/app.js"), "text/javascript");
        assert_eq!(content_type_for("/spiffs/logo.png"), "image/png");
        assert_eq!(content_type_for("/spiffs/photo.jpg"), "image/jpeg");
    }

    #[test]
    fn test_matching_is_case_sensitive() {
        assert_eq!(content_type_for("a.CSS"), "text/plain");
        assert_eq!(content_type_for("a.Html"), "text/plain");
    }

    #[test]
    fn test_fallbacks() {
        assert_eq!(content_type_for("noext"), "text/plain");
        assert_eq!(content_type_for("/spiffs/readme.txt"), "text/plain");
        assert_eq!(content_type_for("/spiffs/photo.jpeg"), "text/plain");
        assert_eq!(content_type_for("/spiffs/trailing."), "text/plain");
    }

    #[test]
    fn test_last_dot_wins() {
        assert_eq!(extension_of("/spiffs/archive.tar.gz"), Some("gz"));
        assert_eq!(extension_of("/spiffs/v1.2/readme"), Some("2/readme"));
        assert_eq!(content_type_for("/spiffs/v1.2/readme"), "text/plain");
        assert_eq!(extension_of("/spiffs/readme"), None);
    }
}
