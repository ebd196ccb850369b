//! Content quality gate
//!
//! Run by fetch workers on every 200 body before an HTML task is produced.
//! Rejects bodies that are out of the size bounds, carry no HTML structure,
//! or contain too little actual text to be worth storing.

/// Bodies smaller than this are noise (error stubs, empty shells)
pub const MIN_BODY_BYTES: usize = 128;

/// Why a page failed the quality gate
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum QualityVerdict {
    Acceptable,
    TooSmall,
    TooLarge,
    NotHtml,
    TooLittleText,
}

impl QualityVerdict {
    pub fn is_acceptable(&self) -> bool {
        matches!(self, Self::Acceptable)
    }
}

/// Checks a fetched body against the quality rules
///
/// # Arguments
///
/// * `html` - The raw body
/// * `text` - The already-extracted relevant text (see `pipeline::hash`)
/// * `max_body_bytes` - Upper size bound from the limits config
/// * `min_text_chars` - Minimum alphanumeric characters in the text
pub fn check_quality(
    html: &str,
    text: &str,
    max_body_bytes: usize,
    min_text_chars: usize,
) -> QualityVerdict {
    if html.len() < MIN_BODY_BYTES {
        return QualityVerdict::TooSmall;
    }
    if html.len() > max_body_bytes {
        return QualityVerdict::TooLarge;
    }
    if !has_html_markers(html) {
        return QualityVerdict::NotHtml;
    }

    let alnum = text.chars().filter(|c| c.is_alphanumeric()).count();
    if alnum < min_text_chars {
        return QualityVerdict::TooLittleText;
    }

    QualityVerdict::Acceptable
}

/// Looks for basic HTML structure markers in the first few KB
fn has_html_markers(html: &str) -> bool {
    let head = &html[..html.len().min(4096)];
    let lower = head.to_ascii_lowercase();
    lower.contains("<html") || lower.contains("<!doctype html") || lower.contains("<body")
}

#[cfg(test)]
mod tests {
    use super::*;

    fn page(body_text: &str) -> String {
        format!(
            "<html><head><title>T</title></head><body><p>{}</p></body></html>",
            body_text
        )
    }

    #[test]
    fn test_acceptable_page() {
        let text = "real readable content ".repeat(20);
        let html = page(&text);
        assert_eq!(
            check_quality(&html, &text, 1 << 20, 100),
            QualityVerdict::Acceptable
        );
    }

    #[test]
    fn test_too_small() {
        assert_eq!(
            check_quality("<html></html>", "", 1 << 20, 10),
            QualityVerdict::TooSmall
        );
    }

    #[test]
    fn test_too_large() {
        let text = "x".repeat(2000);
        let html = page(&text);
        assert_eq!(
            check_quality(&html, &text, 1024, 10),
            QualityVerdict::TooLarge
        );
    }

    #[test]
    fn test_not_html() {
        let body = "{\"key\": \"value\"}".repeat(20);
        assert_eq!(
            check_quality(&body, &body, 1 << 20, 10),
            QualityVerdict::NotHtml
        );
    }

    #[test]
    fn test_too_little_text() {
        let html = page("hi");
        assert_eq!(
            check_quality(&html, "hi", 1 << 20, 100),
            QualityVerdict::TooLittleText
        );
    }

    #[test]
    fn test_doctype_counts_as_marker() {
        let filler = "words and more words ".repeat(20);
        let html = format!("<!DOCTYPE html><div>{}</div>", filler);
        assert_eq!(
            check_quality(&html, &filler, 1 << 20, 50),
            QualityVerdict::Acceptable
        );
    }
}
