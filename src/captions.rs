//! Caption cue scheduling.
//!
//! Cues come either from the final narration text, one cue per sentence, or
//! verbatim from caller-supplied timing. Rendering is left to the caption
//! burner; this module only decides text and time windows.

use serde::{Deserialize, Serialize};
use tracing::{debug, info};

use crate::error::{PipelineError, PipelineResult};
use crate::utils::{split_sentences, word_count};

/// Reading rate used to size sentence cues.
pub const CAPTION_WORDS_PER_SECOND: f64 = 3.0;
pub const MIN_CUE_SECONDS: f64 = 2.0;
pub const MAX_CUE_SECONDS: f64 = 5.0;

#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct CaptionCue {
    pub text: String,
    pub start: f64,
    pub end: f64,
}

#[derive(Debug, Clone, Copy, PartialEq, Eq, Default, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum CaptionPosition {
    Top,
    #[default]
    Bottom,
    Center,
}

impl std::str::FromStr for CaptionPosition {
    type Err = String;

    fn from_str(s: &str) -> Result<Self, Self::Err> {
        match s.trim().to_ascii_lowercase().as_str() {
            "top" => Ok(CaptionPosition::Top),
            "bottom" => Ok(CaptionPosition::Bottom),
            "center" | "centre" => Ok(CaptionPosition::Center),
            other => Err(format!("unknown caption position '{other}'")),
        }
    }
}

/// How burned-in captions look.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(default)]
pub struct CaptionStyle {
    pub position: CaptionPosition,
    pub font_size: u32,
    /// `#rrggbb`
    pub color: String,
    pub font: String,
    /// `#rrggbb`
    pub background_color: String,
    /// 0.0 (transparent) to 1.0 (opaque).
    pub background_opacity: f64,
}

impl Default for CaptionStyle {
    fn default() -> Self {
        Self {
            position: CaptionPosition::Bottom,
            font_size: 24,
            color: "#ffffff".to_string(),
            font: "Arial".to_string(),
            background_color: "#000000".to_string(),
            background_opacity: 0.7,
        }
    }
}

impl CaptionStyle {
    pub fn validate(&self) -> PipelineResult<()> {
        if !(10..=48).contains(&self.font_size) {
            return Err(PipelineError::validation(format!(
                "caption font size must be between 10 and 48, got {}",
                self.font_size
            )));
        }
        if !(0.0..=1.0).contains(&self.background_opacity) {
            return Err(PipelineError::validation(format!(
                "caption background opacity must be between 0 and 1, got {}",
                self.background_opacity
            )));
        }
        for color in [&self.color, &self.background_color] {
            if parse_hex_color(color).is_none() {
                return Err(PipelineError::validation(format!(
                    "caption color '{color}' is not #rrggbb"
                )));
            }
        }
        Ok(())
    }
}

/// Parse `#rrggbb` into its components.
pub fn parse_hex_color(color: &str) -> Option<(u8, u8, u8)> {
    let hex = color.strip_prefix('#')?;
    if hex.len() != 6 || !hex.is_ascii() {
        return None;
    }
    let channel = |i: usize| u8::from_str_radix(&hex[i..i + 2], 16).ok();
    Some((channel(0)?, channel(2)?, channel(4)?))
}

#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum SegmentKind {
    Intro,
    Main,
    Conclusion,
}

#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct CaptionChunk {
    pub text: String,
    pub start: f64,
    pub end: f64,
}

/// Caller-computed caption timing for one part of the video.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct CaptionTiming {
    pub kind: SegmentKind,
    pub start: f64,
    pub end: f64,
    pub chunks: Vec<CaptionChunk>,
}

#[derive(Debug, Clone, Copy)]
pub enum CaptionSource<'a> {
    /// Derive cues from the exact narration text.
    Narration(&'a str),
    /// Use caller timing as-is.
    Supplied(&'a [CaptionTiming]),
}

#[derive(Debug, Clone, Default)]
pub struct CaptionScheduler;

impl CaptionScheduler {
    pub fn new() -> Self {
        Self
    }

    /// Build cues for an audio track of `audio_duration` seconds.
    pub fn schedule(&self, source: CaptionSource<'_>, audio_duration: f64) -> Vec<CaptionCue> {
        let cues = match source {
            CaptionSource::Narration(text) => sentence_cues(text, audio_duration),
            CaptionSource::Supplied(timing) => supplied_cues(timing),
        };
        info!("Scheduled {} caption cues", cues.len());
        cues
    }
}

pub fn cue_seconds(sentence: &str) -> f64 {
    (word_count(sentence) as f64 / CAPTION_WORDS_PER_SECOND).clamp(MIN_CUE_SECONDS, MAX_CUE_SECONDS)
}

/// One cue per sentence, chained from zero.
///
/// A cue that would run past the audio is shortened to end with it, unless
/// that leaves less than the minimum cue length, in which case it and every
/// later sentence is left uncaptioned.
fn sentence_cues(text: &str, audio_duration: f64) -> Vec<CaptionCue> {
    let mut cues = Vec::new();
    let mut cursor = 0.0;
    for sentence in split_sentences(text) {
        let mut end = cursor + cue_seconds(&sentence);
        if end > audio_duration {
            if audio_duration - cursor < MIN_CUE_SECONDS {
                debug!("Caption '{}' does not fit before {:.2}s; stopping", sentence, audio_duration);
                break;
            }
            end = audio_duration;
        }
        cues.push(CaptionCue {
            text: sentence,
            start: cursor,
            end,
        });
        cursor = end;
    }
    cues
}

fn supplied_cues(timing: &[CaptionTiming]) -> Vec<CaptionCue> {
    timing
        .iter()
        .flat_map(|segment| segment.chunks.iter())
        .map(|chunk| CaptionCue {
            text: chunk.text.clone(),
            start: chunk.start,
            end: chunk.end,
        })
        .collect()
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn sentence_cues_chain_from_zero() {
        let text = "Short one. This sentence has exactly nine words in it now. \
                    Here is a much longer sentence that keeps going well past fifteen words so it clamps.";
        let cues = CaptionScheduler::new().schedule(CaptionSource::Narration(text), 60.0);
        assert_eq!(cues.len(), 3);
        assert_eq!(cues[0].start, 0.0);
        assert!((cues[0].end - 2.0).abs() < 1e-9);
        assert!((cues[1].end - cues[1].start - 3.0).abs() < 1e-9);
        assert!((cues[2].end - cues[2].start - 5.0).abs() < 1e-9);
        for pair in cues.windows(2) {
            assert_eq!(pair[1].start, pair[0].end);
        }
        assert_eq!(cues[1].text, "This sentence has exactly nine words in it now.");
    }

    #[test]
    fn cue_durations_stay_in_bounds() {
        let text = "A. Bb cc dd ee ff gg hh ii jj kk ll mm nn oo pp qq rr ss tt uu. Ok then, seven words right here.";
        let cues = CaptionScheduler::new().schedule(CaptionSource::Narration(text), 100.0);
        for cue in &cues {
            let d = cue.end - cue.start;
            assert!((MIN_CUE_SECONDS..=MAX_CUE_SECONDS).contains(&d), "{d}");
        }
    }

    #[test]
    fn cues_never_outlast_audio() {
        let text = "One two three. Four five six. Seven eight nine. Ten eleven twelve.";
        let cues = CaptionScheduler::new().schedule(CaptionSource::Narration(text), 7.0);
        assert_eq!(cues.len(), 3);
        assert!(cues.last().unwrap().end <= 7.0);
        let last = cues.last().unwrap();
        assert!(last.end - last.start >= MIN_CUE_SECONDS);
    }

    #[test]
    fn supplied_timing_is_used_verbatim() {
        let timing = vec![
            CaptionTiming {
                kind: SegmentKind::Intro,
                start: 0.0,
                end: 3.0,
                chunks: vec![CaptionChunk { text: "Hello".into(), start: 0.25, end: 1.75 }],
            },
            CaptionTiming {
                kind: SegmentKind::Main,
                start: 3.0,
                end: 9.0,
                chunks: vec![
                    CaptionChunk { text: "Middle".into(), start: 3.1, end: 5.0 },
                    CaptionChunk { text: "End".into(), start: 5.5, end: 8.9 },
                ],
            },
        ];
        let cues = CaptionScheduler::new().schedule(CaptionSource::Supplied(&timing), 10.0);
        assert_eq!(cues.len(), 3);
        assert_eq!(cues[0], CaptionCue { text: "Hello".into(), start: 0.25, end: 1.75 });
        assert_eq!(cues[2].start, 5.5);
    }

    #[test]
    fn empty_text_gives_no_cues() {
        assert!(CaptionScheduler::new().schedule(CaptionSource::Narration(""), 10.0).is_empty());
    }

    #[test]
    fn style_validation() {
        assert!(CaptionStyle::default().validate().is_ok());
        let bad_size = CaptionStyle { font_size: 60, ..CaptionStyle::default() };
        assert!(bad_size.validate().is_err());
        let bad_color = CaptionStyle { color: "white".into(), ..CaptionStyle::default() };
        assert!(bad_color.validate().is_err());
        assert_eq!(parse_hex_color("#ff8000"), Some((255, 128, 0)));
    }
}
