//! Capability traits for everything the engine does not do itself.
//!
//! Each trait is one capability ("anything that can fetch", "anything that
//! can synthesize"). Implementations report failures as `anyhow::Error`; the
//! engine decides what a failure means for the job.

use std::path::{Path, PathBuf};
use std::sync::Arc;

use async_trait::async_trait;
use serde::{Deserialize, Serialize};

use crate::assets::AssetKind;
use crate::captions::{CaptionCue, CaptionStyle};
use crate::job::{Job, JobId};
use crate::narration::NarrationTrack;
use crate::request::AudioPreferences;
use crate::timeline::TimelineSegment;

/// Resolves user-upload ids to content URLs.
#[async_trait]
pub trait StorageLookup: Send + Sync {
    /// `Ok(None)` when the id is unknown.
    async fn resolve(&self, id: &str) -> anyhow::Result<Option<String>>;
}

#[async_trait]
pub trait Downloader: Send + Sync {
    /// Fetch `url` into `dest_dir` and return the local path.
    async fn fetch(&self, url: &str, dest_dir: &Path) -> anyhow::Result<PathBuf>;
}

#[derive(Debug, Clone, PartialEq)]
pub struct SearchConstraints {
    pub kind: AssetKind,
    pub count: usize,
    /// Accepted clip length for video results, in seconds.
    pub clip_seconds: Option<(f64, f64)>,
}

#[async_trait]
pub trait SearchProvider: Send + Sync {
    /// Content URLs for `term`, best first.
    async fn search(&self, term: &str, constraints: &SearchConstraints) -> anyhow::Result<Vec<String>>;
}

/// Proposed media mix and search terms for a brief.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct MediaAnalysis {
    pub image_ratio: f64,
    pub video_ratio: f64,
    pub static_terms: Vec<String>,
    pub dynamic_terms: Vec<String>,
}

#[async_trait]
pub trait MediaAnalyzer: Send + Sync {
    async fn analyze(&self, text: &str) -> anyhow::Result<MediaAnalysis>;
}

#[derive(Debug, Clone, PartialEq)]
pub struct ShortenRequest<'a> {
    pub text: &'a str,
    pub target_seconds: f64,
    /// Conciseness instruction; grows stricter with each attempt.
    pub guidance: &'a str,
}

#[async_trait]
pub trait TextShortener: Send + Sync {
    async fn shorten(&self, request: &ShortenRequest<'_>) -> anyhow::Result<String>;
}

#[async_trait]
pub trait SpeechSynthesizer: Send + Sync {
    /// Write speech for `text` as a WAV file at `out_path`.
    async fn synthesize(&self, text: &str, voice: Option<&str>, out_path: &Path) -> anyhow::Result<PathBuf>;
}

/// Everything the compositor needs for one render.
#[derive(Debug, Clone)]
pub struct CompositionPlan<'a> {
    pub segments: &'a [TimelineSegment],
    pub audio: &'a NarrationTrack,
    pub resolution: (u32, u32),
    pub audio_fades: &'a AudioPreferences,
    pub total_duration: f64,
    pub output: PathBuf,
}

#[async_trait]
pub trait Compositor: Send + Sync {
    async fn compose(&self, plan: &CompositionPlan<'_>) -> anyhow::Result<PathBuf>;
}

#[async_trait]
pub trait CaptionBurner: Send + Sync {
    async fn burn(
        &self,
        video: &Path,
        cues: &[CaptionCue],
        style: &CaptionStyle,
        output: &Path,
    ) -> anyhow::Result<PathBuf>;
}

#[async_trait]
pub trait Uploader: Send + Sync {
    /// Publish the artifact and return its public URL.
    async fn upload(&self, path: &Path, job_id: &JobId) -> anyhow::Result<String>;
}

/// Job-keyed snapshot storage. Each job only writes its own key.
#[async_trait]
pub trait StatusStore: Send + Sync {
    async fn put(&self, job: &Job) -> anyhow::Result<()>;
    async fn get(&self, job_id: &JobId) -> anyhow::Result<Option<Job>>;
}

/// The full set of collaborators one engine works with.
#[derive(Clone)]
pub struct Collaborators {
    pub storage: Arc<dyn StorageLookup>,
    pub downloader: Arc<dyn Downloader>,
    pub search: Arc<dyn SearchProvider>,
    pub analyzer: Arc<dyn MediaAnalyzer>,
    pub shortener: Arc<dyn TextShortener>,
    pub tts: Arc<dyn SpeechSynthesizer>,
    pub compositor: Arc<dyn Compositor>,
    pub caption_burner: Arc<dyn CaptionBurner>,
    pub uploader: Arc<dyn Uploader>,
    pub status: Arc<dyn StatusStore>,
}
