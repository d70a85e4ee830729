//! Job identity, lifecycle states and the read-only snapshot.

use std::fmt;
use std::str::FromStr;

use chrono::{DateTime, Utc};
use serde::{Deserialize, Serialize};
use uuid::Uuid;

use crate::error::{ErrorKind, PipelineError};
use crate::request::VideoRequest;

#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize, Deserialize)]
#[serde(transparent)]
pub struct JobId(Uuid);

impl JobId {
    pub fn new() -> Self {
        Self(Uuid::new_v4())
    }

    /// Status-store key for this job.
    pub fn status_key(&self) -> String {
        format!("job:{}:status", self.0)
    }
}

impl Default for JobId {
    fn default() -> Self {
        Self::new()
    }
}

impl fmt::Display for JobId {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        self.0.fmt(f)
    }
}

impl FromStr for JobId {
    type Err = uuid::Error;

    fn from_str(s: &str) -> Result<Self, Self::Err> {
        Uuid::parse_str(s.trim()).map(Self)
    }
}

/// Lifecycle states, in processing order.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum JobStatus {
    Queued,
    FetchingMedia,
    MediaReady,
    SynthesizingAudio,
    AudioReady,
    Composing,
    Composed,
    Captioning,
    Uploading,
    Completed,
    Failed,
}

impl JobStatus {
    fn rank(self) -> u8 {
        match self {
            JobStatus::Queued => 0,
            JobStatus::FetchingMedia => 1,
            JobStatus::MediaReady => 2,
            JobStatus::SynthesizingAudio => 3,
            JobStatus::AudioReady => 4,
            JobStatus::Composing => 5,
            JobStatus::Composed => 6,
            JobStatus::Captioning => 7,
            JobStatus::Uploading => 8,
            JobStatus::Completed => 9,
            JobStatus::Failed => 10,
        }
    }

    /// Coarse progress for the stage. `None` for `Failed`, which keeps the
    /// progress reached before the failure.
    pub fn progress(self) -> Option<u8> {
        match self {
            JobStatus::Queued => Some(0),
            JobStatus::FetchingMedia => Some(10),
            JobStatus::MediaReady => Some(20),
            JobStatus::SynthesizingAudio => Some(30),
            JobStatus::AudioReady => Some(40),
            JobStatus::Composing => Some(50),
            JobStatus::Composed => Some(70),
            JobStatus::Captioning => Some(80),
            JobStatus::Uploading => Some(90),
            JobStatus::Completed => Some(100),
            JobStatus::Failed => None,
        }
    }

    pub fn step_message(self) -> &'static str {
        match self {
            JobStatus::Queued => "Waiting to start",
            JobStatus::FetchingMedia => "Collecting media assets",
            JobStatus::MediaReady => "Media assets ready",
            JobStatus::SynthesizingAudio => "Generating narration",
            JobStatus::AudioReady => "Narration ready",
            JobStatus::Composing => "Composing video",
            JobStatus::Composed => "Video composed",
            JobStatus::Captioning => "Adding captions",
            JobStatus::Uploading => "Uploading video",
            JobStatus::Completed => "Video ready",
            JobStatus::Failed => "Video generation failed",
        }
    }

    pub fn is_terminal(self) -> bool {
        matches!(self, JobStatus::Completed | JobStatus::Failed)
    }

    /// Transitions only move forward. Stages may be skipped, and any live
    /// state may fail.
    pub fn can_transition_to(self, next: JobStatus) -> bool {
        if self.is_terminal() {
            return false;
        }
        next == JobStatus::Failed || next.rank() > self.rank()
    }

    pub fn as_str(self) -> &'static str {
        match self {
            JobStatus::Queued => "queued",
            JobStatus::FetchingMedia => "fetching_media",
            JobStatus::MediaReady => "media_ready",
            JobStatus::SynthesizingAudio => "synthesizing_audio",
            JobStatus::AudioReady => "audio_ready",
            JobStatus::Composing => "composing",
            JobStatus::Composed => "composed",
            JobStatus::Captioning => "captioning",
            JobStatus::Uploading => "uploading",
            JobStatus::Completed => "completed",
            JobStatus::Failed => "failed",
        }
    }
}

impl fmt::Display for JobStatus {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(self.as_str())
    }
}

/// Partial results recorded as stages finish.
#[derive(Debug, Clone, Default, PartialEq, Serialize, Deserialize)]
pub struct JobDetails {
    pub asset_count: Option<usize>,
    pub segment_count: Option<usize>,
    pub narration_seconds: Option<f64>,
    pub silent_narration: Option<bool>,
    pub caption_count: Option<usize>,
    pub upload_attempts: Option<u32>,
}

/// Snapshot of one job as stored and returned to callers.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct Job {
    pub id: JobId,
    pub status: JobStatus,
    pub step_message: String,
    pub progress: u8,
    pub request: VideoRequest,
    pub video_url: Option<String>,
    pub error: Option<String>,
    pub error_kind: Option<ErrorKind>,
    #[serde(default)]
    pub details: JobDetails,
    pub created_at: DateTime<Utc>,
    pub updated_at: DateTime<Utc>,
}

impl Job {
    pub fn new(id: JobId, request: VideoRequest) -> Self {
        let now = Utc::now();
        Self {
            id,
            status: JobStatus::Queued,
            step_message: JobStatus::Queued.step_message().to_string(),
            progress: 0,
            request,
            video_url: None,
            error: None,
            error_kind: None,
            details: JobDetails::default(),
            created_at: now,
            updated_at: now,
        }
    }

    fn touch(&mut self) {
        self.updated_at = Utc::now().max(self.updated_at);
    }

    /// Move to `next`. Backward moves are refused.
    pub(crate) fn advance(&mut self, next: JobStatus) -> Result<(), PipelineError> {
        if !self.status.can_transition_to(next) {
            return Err(PipelineError::status(format!(
                "illegal transition {} -> {} for job {}",
                self.status, next, self.id
            )));
        }
        self.status = next;
        self.step_message = next.step_message().to_string();
        if let Some(progress) = next.progress() {
            self.progress = self.progress.max(progress);
        }
        self.touch();
        Ok(())
    }

    pub(crate) fn complete(&mut self, video_url: String) -> Result<(), PipelineError> {
        self.advance(JobStatus::Completed)?;
        self.video_url = Some(video_url);
        Ok(())
    }

    pub(crate) fn fail(&mut self, error: &PipelineError) -> Result<(), PipelineError> {
        self.advance(JobStatus::Failed)?;
        self.error = Some(error.to_string());
        self.error_kind = Some(error.kind());
        Ok(())
    }
}
