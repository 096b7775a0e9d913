//! Helpers for keeping uploader paths and signed URLs out of logs and spans.

use std::path::Path;

use crate::processor::source::is_remote;

/// Returns only the filename component of a path.
pub fn redact_path(path: &Path) -> String {
    path.file_name()
        .and_then(|n| n.to_str())
        .unwrap_or("<unknown>")
        .to_string()
}

/// Strips userinfo, query string and fragment from a URL.
///
/// Storage URLs are often pre-signed, so the query carries the credential.
/// - `https://user:pw@cdn.example.com/a.pdf?sig=x` → `https://****@cdn.example.com/a.pdf`
pub fn redact_url(url: &str) -> String {
    let without_query = url.split(['?', '#']).next().unwrap_or(url);

    if let Some(scheme_end) = without_query.find("://") {
        let after_scheme = &without_query[scheme_end + 3..];
        let authority_end = after_scheme.find('/').unwrap_or(after_scheme.len());
        if let Some(at_pos) = after_scheme[..authority_end].rfind('@') {
            let scheme = &without_query[..scheme_end + 3];
            return format!("{}****@{}", scheme, &after_scheme[at_pos + 1..]);
        }
    }

    without_query.to_string()
}

/// Redacts a document location that may be either a URL or a local path.
pub fn redact_location(location: &str) -> String {
    if is_remote(location) {
        redact_url(location)
    } else {
        redact_path(Path::new(location))
    }
}

/// Truncates free text (error messages, model output) for log lines.
pub fn truncate_for_log(text: &str, max_chars: usize) -> String {
    match text.char_indices().nth(max_chars) {
        Some((idx, _)) => format!("{}…", &text[..idx]),
        None => text.to_string(),
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_redact_path_returns_filename() {
        assert_eq!(
            redact_path(Path::new("/srv/uploads/user-42/midterm.pdf")),
            "midterm.pdf"
        );
        assert_eq!(redact_path(Path::new("/")), "<unknown>");
    }

    #[test]
    fn test_redact_url_strips_query_and_userinfo() {
        assert_eq!(
            redact_url("https://cdn.example.com/a.pdf?X-Goog-Signature=abc"),
            "https://cdn.example.com/a.pdf"
        );
        assert_eq!(
            redact_url("https://user:pw@cdn.example.com/a.pdf#page=2"),
            "https://****@cdn.example.com/a.pdf"
        );
        assert_eq!(
            redact_url("https://cdn.example.com/u@x/a.pdf"),
            "https://cdn.example.com/u@x/a.pdf"
        );
    }

    #[test]
    fn test_redact_location() {
        assert_eq!(redact_location("/tmp/scan.png"), "scan.png");
        assert_eq!(
            redact_location("http://host/doc.pdf?token=1"),
            "http://host/doc.pdf"
        );
        assert_eq!(
            redact_location("HTTPS://user:pw@host/exam.pdf?X-Amz-Signature=abc"),
            "HTTPS://****@host/exam.pdf"
        );
    }

    #[test]
    fn test_truncate_for_log_char_boundary() {
        assert_eq!(truncate_for_log("short", 10), "short");
        assert_eq!(truncate_for_log("ééééé", 2), "éé…");
    }
}
