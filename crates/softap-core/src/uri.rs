//! URI template matching.
//!
//! Templates follow the ESP-IDF HTTP server wildcard rules so a handler
//! registered on the host behaves the same as on the device:
//! - `*` at the end matches any suffix (`/*` matches every path)
//! - `?` makes the preceding character optional (`/path/?` matches `/path`)
//! - `?*` combines both (`/path/?*` matches `/path`, `/path/` and
//!   `/path/anything`, but not `/pathological`)
//! - anything else must match exactly
//!
//! Matching works on plain string slices without regex to keep the code
//! usable on the ESP32.

/// Path part of a request URI, without any query string.
pub fn path_of(uri: &str) -> &str {
    match uri.find('?') {
        Some(idx) => &uri[..idx],
        None => uri,
    }
}

/// Check whether `uri` (path only) matches `template`.
pub fn matches_wildcard(template: &str, uri: &str) -> bool {
    let (body, wildcard) = match template.strip_suffix('*') {
        Some(body) => (body, true),
        None => (template, false),
    };

    let (exact, optional) = match body.strip_suffix('?') {
        Some(rest) => match rest.chars().last() {
            Some(c) => (&rest[..rest.len() - c.len_utf8()], Some(c)),
            None => (rest, None),
        },
        None => (body, None),
    };

    let Some(rest) = uri.strip_prefix(exact) else {
        return false;
    };

    match optional {
        Some(c) => {
            if rest.is_empty() {
                return true;
            }
            match rest.strip_prefix(c) {
                Some(after) => wildcard || after.is_empty(),
                None => false,
            }
        }
        None => wildcard || rest.is_empty(),
    }
}
