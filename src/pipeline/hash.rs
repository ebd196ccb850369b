//! Content hashing over the textually relevant subset of a page
//!
//! Change detection must not fire on rotated ads, session tokens in
//! comments, or attribute churn, so the hash covers only the visible text:
//! markup is stripped, script/style bodies are discarded, and whitespace is
//! collapsed. The extraction is a single linear scan so the fetch path can
//! afford it without a DOM parse.

use sha2::{Digest, Sha256};

/// Extracts the text a reader would see from raw HTML
///
/// Tags are dropped, `<script>`/`<style>`/`<noscript>` subtrees are skipped
/// entirely, comments are ignored, and runs of whitespace collapse to a
/// single space.
pub fn relevant_text(html: &str) -> String {
    let bytes = html.as_bytes();
    let mut text = String::with_capacity(html.len() / 4);
    let mut i = 0;
    let mut skip_until: Option<&'static str> = None;
    let mut last_was_space = true;

    while i < bytes.len() {
        if bytes[i] == b'<' {
            let rest = &html[i..];

            // Comments
            if rest.starts_with("<!--") {
                i += rest.find("-->").map(|p| p + 3).unwrap_or(rest.len());
                continue;
            }

            // Close of a skipped subtree
            if let Some(close) = skip_until {
                if rest.len() >= close.len() && rest[..close.len()].eq_ignore_ascii_case(close) {
                    skip_until = None;
                    i += rest.find('>').map(|p| p + 1).unwrap_or(rest.len());
                } else {
                    i += 1;
                }
                continue;
            }

            // Open of a skipped subtree
            let lower = rest.get(..10).map(str::to_ascii_lowercase).unwrap_or_default();
            if lower.starts_with("<script") {
                skip_until = Some("</script");
            } else if lower.starts_with("<style") {
                skip_until = Some("</style");
            } else if lower.starts_with("<noscript") {
                skip_until = Some("</noscript");
            }

            // Skip the tag itself
            i += rest.find('>').map(|p| p + 1).unwrap_or(rest.len());
            if !last_was_space {
                text.push(' ');
                last_was_space = true;
            }
            continue;
        }

        if skip_until.is_some() {
            i += 1;
            continue;
        }

        let ch = html[i..].chars().next().unwrap_or(' ');
        if ch.is_whitespace() {
            if !last_was_space {
                text.push(' ');
                last_was_space = true;
            }
        } else {
            text.push(ch);
            last_was_space = false;
        }
        i += ch.len_utf8();
    }

    text.trim().to_string()
}

/// SHA-256 hex digest of the page's relevant text
pub fn content_hash(html: &str) -> String {
    hash_text(&relevant_text(html))
}

/// SHA-256 hex digest of already-extracted text
pub fn hash_text(text: &str) -> String {
    let mut hasher = Sha256::new();
    hasher.update(text.as_bytes());
    hex::encode(hasher.finalize())
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_strips_tags() {
        let html = "<html><body><p>Hello <b>world</b></p></body></html>";
        assert_eq!(relevant_text(html), "Hello world");
    }

    #[test]
    fn test_skips_script_and_style() {
        let html = r#"<html><head><style>body { color: red }</style>
            <script>var x = "hidden";</script></head>
            <body>Visible text</body></html>"#;
        assert_eq!(relevant_text(html), "Visible text");
    }

    #[test]
    fn test_skips_comments() {
        let html = "<body><!-- secret -->shown</body>";
        assert_eq!(relevant_text(html), "shown");
    }

    #[test]
    fn test_collapses_whitespace() {
        let html = "<body>a\n\n   b\t\tc</body>";
        assert_eq!(relevant_text(html), "a b c");
    }

    #[test]
    fn test_identical_text_identical_hash() {
        let a = "<html><body><p>Same content</p></body></html>";
        let b = "<html><body><div><p>Same   content</p></div></body></html>";
        assert_eq!(content_hash(a), content_hash(b));
    }

    #[test]
    fn test_markup_only_changes_do_not_change_hash() {
        let a = r#"<body><script>token("abc")</script><p>Stable</p></body>"#;
        let b = r#"<body><script>token("xyz")</script><p>Stable</p></body>"#;
        assert_eq!(content_hash(a), content_hash(b));
    }

    #[test]
    fn test_text_change_changes_hash() {
        assert_ne!(
            content_hash("<body>version one</body>"),
            content_hash("<body>version two</body>")
        );
    }

    #[test]
    fn test_hash_is_hex_sha256() {
        let hash = content_hash("<body>x</body>");
        assert_eq!(hash.len(), 64);
        assert!(hash.chars().all(|c| c.is_ascii_hexdigit()));
    }

    #[test]
    fn test_unclosed_script_does_not_panic() {
        let html = "<body><script>var x = 1;";
        assert_eq!(relevant_text(html), "");
    }

    #[test]
    fn test_case_insensitive_script_close() {
        let html = "<body><SCRIPT>x</SCRIPT>after</body>";
        assert_eq!(relevant_text(html), "after");
    }
}
