//! Offline stand-ins for the language-model collaborators.

use std::collections::HashMap;
use std::sync::LazyLock;

use async_trait::async_trait;
use regex::Regex;
use tracing::{debug, warn};

use crate::assets::{DEFAULT_IMAGE_RATIO, DEFAULT_VIDEO_RATIO};
use crate::collaborators::{MediaAnalysis, MediaAnalyzer, ShortenRequest, TextShortener};
use crate::utils::{split_sentences, word_count};

static WORD_RE: LazyLock<Regex> =
    LazyLock::new(|| Regex::new(r"[A-Za-z][A-Za-z'-]+").expect("valid word regex"));

const STOP_WORDS: &[&str] = &[
    "about", "above", "after", "again", "also", "always", "among", "and", "another", "any", "are",
    "because", "been", "before", "being", "between", "both", "but", "can", "could", "does",
    "doing", "down", "during", "each", "even", "every", "few", "for", "from", "further", "get",
    "gets", "had", "has", "have", "having", "her", "here", "hers", "him", "his", "how", "into",
    "its", "itself", "just", "like", "make", "makes", "many", "more", "most", "much", "must",
    "not", "now", "off", "once", "one", "only", "other", "our", "ours", "out", "over", "own",
    "same", "she", "should", "some", "such", "than", "that", "the", "their", "them", "then",
    "there", "these", "they", "this", "those", "through", "too", "under", "until", "very", "was",
    "way", "well", "were", "what", "when", "where", "which", "while", "who", "whom", "why",
    "will", "with", "would", "you", "your", "yours",
];

const MOTION_WORDS: &[&str] = &[
    "action", "dynamic", "energy", "fast", "flow", "growth", "journey", "launch", "motion", "move",
    "moving", "race", "run", "running", "speed", "sport", "travel", "wave",
];

const TERMS_PER_KIND: usize = 3;

/// Picks search terms by word frequency and leans towards video for
/// motion-heavy briefs.
#[derive(Debug, Clone, Default)]
pub struct KeywordAnalyzer;

impl KeywordAnalyzer {
    pub fn new() -> Self {
        Self
    }

    /// Content words ranked by frequency, first occurrence breaking ties.
    pub fn ranked_terms(text: &str) -> Vec<String> {
        let mut counts: HashMap<String, (usize, usize)> = HashMap::new();
        for (position, m) in WORD_RE.find_iter(text).enumerate() {
            let word = m.as_str().to_ascii_lowercase();
            if word.len() < 4 || STOP_WORDS.contains(&word.as_str()) {
                continue;
            }
            counts.entry(word).or_insert((0, position)).0 += 1;
        }
        let mut ranked: Vec<(String, (usize, usize))> = counts.into_iter().collect();
        ranked.sort_by(|a, b| b.1.0.cmp(&a.1.0).then(a.1.1.cmp(&b.1.1)));
        ranked.into_iter().map(|(word, _)| word).collect()
    }
}

#[async_trait]
impl MediaAnalyzer for KeywordAnalyzer {
    async fn analyze(&self, text: &str) -> anyhow::Result<MediaAnalysis> {
        let terms = Self::ranked_terms(text);
        if terms.is_empty() {
            anyhow::bail!("no content words to search for");
        }
        let static_terms: Vec<String> = terms.iter().take(TERMS_PER_KIND).cloned().collect();
        let mut dynamic_terms: Vec<String> = terms
            .iter()
            .skip(TERMS_PER_KIND)
            .take(TERMS_PER_KIND)
            .cloned()
            .collect();
        if dynamic_terms.is_empty() {
            dynamic_terms = static_terms.clone();
        }

        let motion = WORD_RE
            .find_iter(text)
            .filter(|m| MOTION_WORDS.contains(&m.as_str().to_ascii_lowercase().as_str()))
            .count();
        let video_ratio = (DEFAULT_VIDEO_RATIO + 0.05 * motion as f64).min(0.5);
        let image_ratio = DEFAULT_IMAGE_RATIO + DEFAULT_VIDEO_RATIO - video_ratio;
        debug!(
            "Keyword analysis: {} motion words, terms {:?} / {:?}",
            motion, static_terms, dynamic_terms
        );
        Ok(MediaAnalysis {
            image_ratio,
            video_ratio,
            static_terms,
            dynamic_terms,
        })
    }
}

/// Shortens by keeping whole leading sentences within the spoken budget.
#[derive(Debug, Clone)]
pub struct WordBudgetShortener {
    words_per_second: f64,
}

impl WordBudgetShortener {
    pub fn new(words_per_second: f64) -> Self {
        Self { words_per_second }
    }
}

#[async_trait]
impl TextShortener for WordBudgetShortener {
    async fn shorten(&self, request: &ShortenRequest<'_>) -> anyhow::Result<String> {
        let budget = (request.target_seconds * self.words_per_second).floor().max(1.0) as usize;
        let mut kept = String::new();
        let mut used = 0;
        for sentence in split_sentences(request.text) {
            let words = word_count(&sentence);
            if used + words > budget {
                break;
            }
            if !kept.is_empty() {
                kept.push(' ');
            }
            kept.push_str(&sentence);
            used += words;
        }
        if kept.is_empty() {
            // First sentence alone is over budget; cut it at the word limit.
            warn!("First sentence exceeds {} words; truncating mid-sentence", budget);
            kept = request
                .text
                .split_whitespace()
                .take(budget)
                .collect::<Vec<_>>()
                .join(" ");
        }
        Ok(kept)
    }
}
