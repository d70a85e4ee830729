//! Job orchestration.
//!
//! One job runs start to finish on one task: media, narration, timeline,
//! composition, captions, upload. Every state change is written to the
//! status store before work on the next stage begins, and the job's work
//! directory is removed on every exit path.

use std::any::Any;
use std::panic::AssertUnwindSafe;
use std::path::{Path, PathBuf};
use std::sync::Arc;

use futures::FutureExt;
use tracing::{Instrument, debug, error, info, info_span, warn};

use crate::assets::AssetResolver;
use crate::captions::{CaptionScheduler, CaptionSource};
use crate::collaborators::{Collaborators, CompositionPlan};
use crate::config::EngineConfig;
use crate::error::{PipelineError, PipelineResult};
use crate::job::{Job, JobId, JobStatus};
use crate::narration::{FitOutcome, NarrationFitter, NarrationTrack};
use crate::request::VideoRequest;
use crate::retry::RetryPolicy;
use crate::timeline::{TimelineBuilder, TransitionPolicy};
use crate::workspace::JobWorkspace;

/// Retry budget for the final snapshot; pollers only stop on a terminal one.
const TERMINAL_WRITE_RETRY: RetryPolicy = RetryPolicy {
    max_attempts: 3,
    base_delay_ms: 200,
};

/// Accepts requests and runs them as independent jobs.
#[derive(Clone)]
pub struct Orchestrator {
    engine: Arc<Engine>,
}

struct Engine {
    config: EngineConfig,
    collaborators: Collaborators,
    resolver: AssetResolver,
    fitter: NarrationFitter,
    timeline: TimelineBuilder,
    captions: CaptionScheduler,
}

impl Orchestrator {
    pub fn new(config: EngineConfig, collaborators: Collaborators) -> Self {
        let resolver = AssetResolver::new(
            collaborators.storage.clone(),
            collaborators.downloader.clone(),
            collaborators.search.clone(),
            collaborators.analyzer.clone(),
            config.parallel_downloads,
        );
        let fitter = NarrationFitter::new(
            collaborators.shortener.clone(),
            collaborators.tts.clone(),
            config.fit_settings(),
        );
        let timeline = TimelineBuilder::new(config.min_segment_seconds);
        Self {
            engine: Arc::new(Engine {
                config,
                collaborators,
                resolver,
                fitter,
                timeline,
                captions: CaptionScheduler::new(),
            }),
        }
    }

    /// Validate and enqueue `request`; processing continues in the background.
    ///
    /// Must be called from within a tokio runtime.
    pub async fn submit(&self, request: VideoRequest) -> PipelineResult<JobId> {
        let job = self.engine.accept(request).await?;
        let id = job.id;
        let engine = Arc::clone(&self.engine);
        tokio::spawn(async move {
            engine.process_guarded(job).await;
        });
        Ok(id)
    }

    /// Validate and process `request` on the current task, returning the
    /// terminal snapshot.
    pub async fn run_job(&self, request: VideoRequest) -> PipelineResult<Job> {
        let job = self.engine.accept(request).await?;
        Ok(self.engine.process_guarded(job).await)
    }

    /// Latest stored snapshot. Read-only.
    pub async fn status(&self, job_id: &JobId) -> PipelineResult<Job> {
        self.engine
            .collaborators
            .status
            .get(job_id)
            .await
            .map_err(|e| PipelineError::status(format!("{e:#}")))?
            .ok_or_else(|| PipelineError::NotFound(job_id.to_string()))
    }
}

impl Engine {
    async fn accept(&self, request: VideoRequest) -> PipelineResult<Job> {
        request.validate()?;
        let job = Job::new(JobId::new(), request);
        self.persist(&job).await?;
        info!(job_id = %job.id, duration = job.request.duration, "Job queued");
        Ok(job)
    }

    /// Run `process`, failing the job if any stage panics.
    async fn process_guarded(&self, job: Job) -> Job {
        let accepted = job.clone();
        match AssertUnwindSafe(self.process(job)).catch_unwind().await {
            Ok(job) => job,
            Err(panic) => {
                let message = panic_message(panic.as_ref());
                error!(job_id = %accepted.id, "Job task panicked: {}", message);
                let mut job = match self.collaborators.status.get(&accepted.id).await {
                    Ok(Some(stored)) => stored,
                    _ => accepted,
                };
                if job.status.is_terminal() {
                    return job;
                }
                match job.fail(&PipelineError::Internal(format!("job task panicked: {message}"))) {
                    Ok(()) => self.persist_terminal(&job).await,
                    Err(e) => error!("Could not fail job {}: {}", job.id, e),
                }
                job
            }
        }
    }

    async fn process(&self, mut job: Job) -> Job {
        let span = info_span!("job", job_id = %job.id);
        async move {
            info!("Starting video generation");
            let outcome = match JobWorkspace::create(&self.config.work_root, &job.id) {
                Ok(workspace) => {
                    let outcome = self.run_stages(&mut job, &workspace).await;
                    drop(workspace);
                    outcome
                }
                Err(e) => Err(e),
            };

            let finished = match outcome {
                Ok(url) => job.complete(url),
                Err(e) => {
                    error!(kind = %e.kind(), "Job failed: {}", e);
                    job.fail(&e)
                }
            };
            match finished {
                Ok(()) => {
                    self.persist_terminal(&job).await;
                    info!(status = %job.status, progress = job.progress, "Job finished");
                }
                Err(e) => error!("Could not finish job: {}", e),
            }
            job
        }
        .instrument(span)
        .await
    }

    async fn run_stages(&self, job: &mut Job, workspace: &JobWorkspace) -> PipelineResult<String> {
        let request = job.request.clone();
        let duration = request.duration;

        self.transition(job, JobStatus::FetchingMedia).await?;
        let resolved = self.resolver.resolve(&request, &workspace.assets_dir()).await?;
        job.details.asset_count = Some(resolved.assets.len());
        self.transition(job, JobStatus::MediaReady).await?;

        self.transition(job, JobStatus::SynthesizingAudio).await?;
        let fitted = self.fitter.fit(&request.content, duration).await?;
        if !fitted.fits {
            warn!(
                "Narration still estimated at {:.1}s for a {:.1}s target after {} attempts",
                fitted.estimated_seconds, fitted.target_seconds, fitted.attempts
            );
        }
        let track = self
            .fitter
            .synthesize(&fitted.text, request.voice.as_deref(), duration, &workspace.audio_dir())
            .await?;
        job.details.narration_seconds = Some(track.duration);
        job.details.silent_narration = Some(track.silent);
        self.transition(job, JobStatus::AudioReady).await?;

        self.transition(job, JobStatus::Composing).await?;
        let transition = request
            .transition
            .duration
            .unwrap_or(self.config.default_transition_duration);
        let policy = TransitionPolicy::new(request.transition.style, request.mood);
        let timeline = self
            .timeline
            .build(resolved.assets, resolved.source, duration, transition, policy)?;
        job.details.segment_count = Some(timeline.segments.len());
        for (i, segment) in timeline.segments.iter().enumerate() {
            debug!(
                "Segment {}: {:.2}s-{:.2}s {:?} {}",
                i,
                segment.start,
                segment.end,
                segment.transition,
                segment.asset.path.display()
            );
        }
        let plan = CompositionPlan {
            segments: &timeline.segments,
            audio: &track,
            resolution: request.aspect_ratio.resolution(),
            audio_fades: &request.audio,
            total_duration: duration,
            output: workspace.file("composed.mp4"),
        };
        let composed = self
            .collaborators
            .compositor
            .compose(&plan)
            .await
            .map_err(|e| PipelineError::composition(format!("{e:#}")))?;
        self.transition(job, JobStatus::Composed).await?;

        let video = if self.config.captions_enabled && request.captions.enabled {
            self.transition(job, JobStatus::Captioning).await?;
            self.caption(job, &request, &fitted, &track, composed, workspace).await
        } else {
            debug!("Captions disabled; skipping");
            composed
        };

        self.transition(job, JobStatus::Uploading).await?;
        self.upload(job, &video).await
    }

    /// Burn captions into `video`. Any failure keeps the uncaptioned video.
    async fn caption(
        &self,
        job: &mut Job,
        request: &VideoRequest,
        fitted: &FitOutcome,
        track: &NarrationTrack,
        video: PathBuf,
        workspace: &JobWorkspace,
    ) -> PathBuf {
        let spoken;
        let source = match &request.captions.timing {
            Some(timing) => CaptionSource::Supplied(timing),
            None if track.silent => CaptionSource::Narration(&fitted.text),
            None => {
                spoken = track.spoken_text();
                CaptionSource::Narration(&spoken)
            }
        };
        let cues = self.captions.schedule(source, track.duration);
        job.details.caption_count = Some(cues.len());
        if cues.is_empty() {
            warn!("No caption cues produced; leaving video uncaptioned");
            return video;
        }
        let output = workspace.file("captioned.mp4");
        match self
            .collaborators
            .caption_burner
            .burn(&video, &cues, &request.captions.style, &output)
            .await
        {
            Ok(path) => path,
            Err(e) => {
                warn!("Caption burn-in failed: {:#}; using uncaptioned video", e);
                video
            }
        }
    }

    async fn upload(&self, job: &mut Job, video: &Path) -> PipelineResult<String> {
        let uploader = &self.collaborators.uploader;
        let job_id = job.id;
        let mut used = 0;
        let result = self
            .config
            .upload_retry
            .run("upload", |attempt| {
                used = attempt;
                info!(attempt, "Uploading {}", video.display());
                uploader.upload(video, &job_id)
            })
            .await;
        job.details.upload_attempts = Some(used);
        let url = result.map_err(|e| PipelineError::Upload {
            attempts: e.attempts,
            message: format!("{:#}", e.source),
        })?;
        info!("Uploaded to {}", url);
        Ok(url)
    }

    async fn transition(&self, job: &mut Job, next: JobStatus) -> PipelineResult<()> {
        job.advance(next)?;
        info!(status = %next, progress = job.progress, "{}", job.step_message);
        self.persist(job).await
    }

    async fn persist_terminal(&self, job: &Job) {
        let status = &self.collaborators.status;
        let written = TERMINAL_WRITE_RETRY
            .run("terminal status write", |_| status.put(job))
            .await;
        if let Err(e) = written {
            error!("Could not record terminal state {} for job {}: {}", job.status, job.id, e);
        }
    }

    async fn persist(&self, job: &Job) -> PipelineResult<()> {
        self.collaborators
            .status
            .put(job)
            .await
            .map_err(|e| PipelineError::status(format!("failed to store snapshot for job {}: {e:#}", job.id)))
    }
}

fn panic_message(panic: &(dyn Any + Send)) -> String {
    if let Some(message) = panic.downcast_ref::<&str>() {
        message.to_string()
    } else if let Some(message) = panic.downcast_ref::<String>() {
        message.clone()
    } else {
        "unknown panic".to_string()
    }
}
