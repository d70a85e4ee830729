//! The normalized generation request.
//!
//! Callers build one [`VideoRequest`] at the boundary and validate it before
//! submission. The engine never looks at raw caller input.

use std::fmt;
use std::str::FromStr;

use serde::{Deserialize, Serialize};

use crate::captions::{CaptionStyle, CaptionTiming};
use crate::error::{PipelineError, PipelineResult};
use crate::timeline::TransitionStyle;

pub const MIN_DURATION_SECONDS: f64 = 10.0;
pub const MAX_DURATION_SECONDS: f64 = 300.0;
pub const MAX_TRANSITION_SECONDS: f64 = 2.0;

/// Visual mood; drives transition selection when no explicit style is set.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Default, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum Mood {
    #[default]
    Professional,
    Casual,
    Dynamic,
}

impl FromStr for Mood {
    type Err = String;

    fn from_str(s: &str) -> Result<Self, Self::Err> {
        match s.trim().to_ascii_lowercase().as_str() {
            "professional" => Ok(Mood::Professional),
            "casual" => Ok(Mood::Casual),
            "dynamic" => Ok(Mood::Dynamic),
            other => Err(format!(
                "unknown style '{other}', expected professional, casual or dynamic"
            )),
        }
    }
}

impl fmt::Display for Mood {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(match self {
            Mood::Professional => "professional",
            Mood::Casual => "casual",
            Mood::Dynamic => "dynamic",
        })
    }
}

#[derive(Debug, Clone, Copy, PartialEq, Eq, Default, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum AspectRatio {
    #[default]
    Square,
    Landscape,
    Portrait,
    Vertical,
}

impl AspectRatio {
    /// Output frame size in pixels.
    pub fn resolution(self) -> (u32, u32) {
        match self {
            AspectRatio::Square => (1080, 1080),
            AspectRatio::Landscape => (1920, 1080),
            AspectRatio::Portrait => (1080, 1350),
            AspectRatio::Vertical => (1080, 1920),
        }
    }
}

impl FromStr for AspectRatio {
    type Err = String;

    fn from_str(s: &str) -> Result<Self, Self::Err> {
        match s.trim().to_ascii_lowercase().as_str() {
            "square" => Ok(AspectRatio::Square),
            "landscape" => Ok(AspectRatio::Landscape),
            "portrait" => Ok(AspectRatio::Portrait),
            "vertical" => Ok(AspectRatio::Vertical),
            other => Err(format!("unknown aspect ratio '{other}'")),
        }
    }
}

#[derive(Debug, Clone, Default, PartialEq, Serialize, Deserialize)]
pub struct TransitionPreferences {
    /// Applied uniformly to every boundary when set.
    pub style: Option<TransitionStyle>,
    /// Seconds; the engine default applies when unset.
    pub duration: Option<f64>,
}

#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct AudioPreferences {
    pub fade_in: f64,
    pub fade_out: f64,
}

impl Default for AudioPreferences {
    fn default() -> Self {
        Self {
            fade_in: 2.0,
            fade_out: 2.0,
        }
    }
}

#[derive(Debug, Clone, Default, PartialEq, Serialize, Deserialize)]
pub struct CaptionPreferences {
    pub enabled: bool,
    #[serde(default)]
    pub style: CaptionStyle,
    /// Pre-computed timing; used verbatim instead of deriving cues.
    pub timing: Option<Vec<CaptionTiming>>,
}

/// Caller-provided stock item already mapped to a content URL.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct StockMedia {
    pub id: String,
    pub url: String,
}

#[derive(Debug, Clone, Default, PartialEq, Serialize, Deserialize)]
pub struct MediaSources {
    pub explicit: Vec<StockMedia>,
    pub upload_ids: Vec<String>,
}

#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct VideoRequest {
    pub content: String,
    /// Total video length in seconds.
    pub duration: f64,
    #[serde(default)]
    pub mood: Mood,
    pub voice: Option<String>,
    #[serde(default)]
    pub aspect_ratio: AspectRatio,
    #[serde(default)]
    pub transition: TransitionPreferences,
    #[serde(default)]
    pub audio: AudioPreferences,
    #[serde(default)]
    pub captions: CaptionPreferences,
    #[serde(default)]
    pub media: MediaSources,
}

impl VideoRequest {
    pub fn new(content: impl Into<String>, duration: f64) -> Self {
        Self {
            content: content.into(),
            duration,
            mood: Mood::default(),
            voice: None,
            aspect_ratio: AspectRatio::default(),
            transition: TransitionPreferences::default(),
            audio: AudioPreferences::default(),
            captions: CaptionPreferences::default(),
            media: MediaSources::default(),
        }
    }

    pub fn with_mood(mut self, mood: Mood) -> Self {
        self.mood = mood;
        self
    }

    pub fn with_transition(mut self, style: Option<TransitionStyle>, duration: Option<f64>) -> Self {
        self.transition = TransitionPreferences { style, duration };
        self
    }

    pub fn with_captions(mut self, captions: CaptionPreferences) -> Self {
        self.captions = captions;
        self
    }

    pub fn with_explicit_media(mut self, media: Vec<StockMedia>) -> Self {
        self.media.explicit = media;
        self
    }

    pub fn with_upload_ids(mut self, ids: Vec<String>) -> Self {
        self.media.upload_ids = ids;
        self
    }

    /// Reject malformed input before a job is created.
    pub fn validate(&self) -> PipelineResult<()> {
        if self.content.trim().is_empty() {
            return Err(PipelineError::validation("content must not be empty"));
        }
        if !self.duration.is_finite()
            || !(MIN_DURATION_SECONDS..=MAX_DURATION_SECONDS).contains(&self.duration)
        {
            return Err(PipelineError::validation(format!(
                "duration must be between {MIN_DURATION_SECONDS} and {MAX_DURATION_SECONDS} seconds, got {}",
                self.duration
            )));
        }
        if let Some(t) = self.transition.duration {
            if !t.is_finite() || !(0.0..=MAX_TRANSITION_SECONDS).contains(&t) {
                return Err(PipelineError::validation(format!(
                    "transition duration must be between 0 and {MAX_TRANSITION_SECONDS} seconds, got {t}"
                )));
            }
        }
        for fade in [self.audio.fade_in, self.audio.fade_out] {
            if !fade.is_finite() || fade < 0.0 || fade > self.duration {
                return Err(PipelineError::validation(format!(
                    "audio fade of {fade}s does not fit a {}s video",
                    self.duration
                )));
            }
        }
        for item in &self.media.explicit {
            if item.id.trim().is_empty() {
                return Err(PipelineError::validation("stock media id must not be empty"));
            }
            if !(item.url.starts_with("http://")
                || item.url.starts_with("https://")
                || item.url.starts_with("file://"))
            {
                return Err(PipelineError::validation(format!(
                    "stock media '{}' has unsupported url '{}'",
                    item.id, item.url
                )));
            }
        }
        if self.media.upload_ids.iter().any(|id| id.trim().is_empty()) {
            return Err(PipelineError::validation("upload ids must not be empty"));
        }
        self.captions.style.validate()?;
        if let Some(timing) = &self.captions.timing {
            for segment in timing {
                for chunk in &segment.chunks {
                    if !(chunk.start.is_finite() && chunk.end.is_finite())
                        || chunk.start < 0.0
                        || chunk.end <= chunk.start
                    {
                        return Err(PipelineError::validation(format!(
                            "caption chunk '{}' has an invalid window {}..{}",
                            chunk.text, chunk.start, chunk.end
                        )));
                    }
                }
            }
        }
        Ok(())
    }
}
