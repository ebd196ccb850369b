//! Fast English-language filter
//!
//! The corpus is English-only, so non-English pages are dropped before
//! storage. A full language-ID model is far too slow for the hot path;
//! instead the filter scores the density of high-frequency English function
//! words in the extracted text, which separates English from other
//! languages reliably at crawl speeds.

/// Function words that appear in virtually all English prose
const STOPWORDS: &[&str] = &[
    "the", "and", "for", "are", "but", "not", "you", "all", "with", "this",
    "that", "from", "they", "have", "was", "his", "her", "she", "will",
    "would", "there", "their", "what", "about", "which", "when", "were",
    "your", "can", "has", "more", "one", "out", "other", "into", "than",
    "its", "our", "who", "been", "had", "also",
];

/// Texts shorter than this many words are accepted unjudged
const MIN_WORDS_TO_JUDGE: usize = 20;

/// Minimum fraction of words that must be English function words
const STOPWORD_THRESHOLD: f64 = 0.06;

/// Judges whether extracted page text is probably English
///
/// Very short texts pass (there is nothing to judge); otherwise at least
/// [`STOPWORD_THRESHOLD`] of the words must be common English function
/// words. Returns `true` to keep the page.
pub fn is_probably_english(text: &str) -> bool {
    let mut words = 0usize;
    let mut hits = 0usize;

    for raw_word in text.split_whitespace() {
        let word: String = raw_word
            .chars()
            .filter(|c| c.is_alphabetic())
            .flat_map(|c| c.to_lowercase())
            .collect();
        if word.is_empty() {
            continue;
        }
        words += 1;
        if STOPWORDS.contains(&word.as_str()) {
            hits += 1;
        }
    }

    if words < MIN_WORDS_TO_JUDGE {
        return true;
    }

    (hits as f64 / words as f64) >= STOPWORD_THRESHOLD
}
