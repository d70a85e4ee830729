use std::sync::LazyLock;

use regex::Regex;
use tracing::warn;

static SENTENCE_RE: LazyLock<Regex> =
    LazyLock::new(|| Regex::new(r"(?s)([^.!?]+[.!?]+)|([^.!?]+$)").expect("valid sentence regex"));

/// Split text into trimmed sentences, keeping terminal punctuation.
pub fn split_sentences(text: &str) -> Vec<String> {
    let sentences: Vec<String> = SENTENCE_RE
        .find_iter(text)
        .map(|m| m.as_str().split_whitespace().collect::<Vec<_>>().join(" "))
        .filter(|s| !s.is_empty() && s.chars().any(char::is_alphanumeric))
        .collect();
    if sentences.is_empty() && !text.trim().is_empty() {
        warn!("No sentence breaks found; returning whole text as one sentence");
        return vec![text.split_whitespace().collect::<Vec<_>>().join(" ")];
    }
    sentences
}

pub fn word_count(text: &str) -> usize {
    text.split_whitespace().count()
}

/// Slice text into runs of `size` words; the last run may be shorter.
pub fn chunk_words(text: &str, size: usize) -> Vec<String> {
    let words: Vec<&str> = text.split_whitespace().collect();
    words
        .chunks(size.max(1))
        .map(|chunk| chunk.join(" "))
        .collect()
}

/// Spoken length of `words` at a fixed speaking rate.
pub fn spoken_seconds(words: usize, words_per_second: f64) -> f64 {
    words as f64 / words_per_second
}
