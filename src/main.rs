mod args;

use std::fs;
use std::sync::Arc;
use std::time::Duration;

use anyhow::Context;
use clap::Parser;
use tokio::time::{Instant, sleep};
use tracing::{info, warn};
use tracing_subscriber::EnvFilter;

use narrated::captions::{CaptionStyle, CaptionTiming};
use narrated::collaborators::Collaborators;
use narrated::config::EngineConfig;
use narrated::download::HttpDownloader;
use narrated::ffmpeg::{FfmpegCaptionBurner, FfmpegCompositor};
use narrated::heuristics::{KeywordAnalyzer, WordBudgetShortener};
use narrated::local::{DirectoryStorage, LocalPublisher, MemoryStatusStore};
use narrated::pexels::PexelsSearch;
use narrated::request::{AudioPreferences, CaptionPreferences, StockMedia};
use narrated::tts::PiperTts;
use narrated::{JobStatus, Orchestrator, VideoRequest};

use args::Args;

#[tokio::main]
async fn main() -> anyhow::Result<()> {
    let args = Args::parse();

    let filter = match &args.log_level {
        Some(level) => EnvFilter::new(level),
        None => EnvFilter::try_from_default_env().unwrap_or_else(|_| EnvFilter::new("info")),
    };
    tracing_subscriber::fmt().with_env_filter(filter).init();

    info!("Starting narrated video generation");

    let config = match &args.config {
        Some(path) => EngineConfig::load(path)?,
        None => EngineConfig::default(),
    };

    let request = build_request(&args)?;
    let collaborators = build_collaborators(&args, &config);
    let orchestrator = Orchestrator::new(config, collaborators);

    let job_id = orchestrator.submit(request).await?;
    info!("Submitted job {}", job_id);

    let deadline = Instant::now() + Duration::from_secs(args.max_wait_secs);
    let mut last = None;
    let job = loop {
        let job = orchestrator.status(&job_id).await?;
        if last != Some(job.status) {
            info!("[{:>3}%] {} ({})", job.progress, job.step_message, job.status);
            last = Some(job.status);
        }
        if job.status.is_terminal() {
            break job;
        }
        if Instant::now() >= deadline {
            anyhow::bail!(
                "job {} still {} after {}s; giving up",
                job.id,
                job.status,
                args.max_wait_secs
            );
        }
        sleep(Duration::from_millis(args.poll_ms)).await;
    };

    match job.status {
        JobStatus::Completed => {
            let url = job.video_url.unwrap_or_default();
            info!("Video ready: {}", url);
            println!("{url}");
            Ok(())
        }
        _ => anyhow::bail!(
            "job {} failed: {}",
            job.id,
            job.error.unwrap_or_else(|| "unknown error".to_string())
        ),
    }
}

fn build_request(args: &Args) -> anyhow::Result<VideoRequest> {
    let content = match (&args.content, &args.content_file) {
        (Some(text), _) => text.clone(),
        (None, Some(path)) => fs::read_to_string(path)
            .with_context(|| format!("failed to read {}", path.display()))?,
        (None, None) => anyhow::bail!("either --content or --content-file is required"),
    };

    let timing = match &args.caption_timing {
        Some(path) => {
            let data = fs::read_to_string(path)
                .with_context(|| format!("failed to read {}", path.display()))?;
            let timing: Vec<CaptionTiming> = serde_json::from_str(&data)
                .with_context(|| format!("invalid caption timing in {}", path.display()))?;
            Some(timing)
        }
        None => None,
    };

    let mut request = VideoRequest::new(content, args.duration)
        .with_mood(args.style)
        .with_transition(args.transition, args.transition_duration)
        .with_captions(CaptionPreferences {
            enabled: args.captions,
            style: CaptionStyle {
                position: args.caption_position,
                font_size: args.caption_font_size,
                color: args.caption_color.clone(),
                font: args.caption_font.clone(),
                background_color: args.caption_background.clone(),
                background_opacity: args.caption_opacity,
            },
            timing,
        })
        .with_explicit_media(
            args.media_urls
                .iter()
                .enumerate()
                .map(|(i, url)| StockMedia {
                    id: format!("media-{}", i + 1),
                    url: url.clone(),
                })
                .collect(),
        )
        .with_upload_ids(args.upload_ids.clone());
    request.voice = args.voice.clone();
    request.aspect_ratio = args.aspect;
    request.audio = AudioPreferences {
        fade_in: args.fade_in,
        fade_out: args.fade_out,
    };
    Ok(request)
}

fn build_collaborators(args: &Args, config: &EngineConfig) -> Collaborators {
    let api_key = args.pexels_api_key.clone().unwrap_or_else(|| {
        warn!("PEXELS_API_KEY not set; stock search will fail unless media is supplied");
        String::new()
    });
    Collaborators {
        storage: Arc::new(DirectoryStorage::new(&args.uploads_dir)),
        downloader: Arc::new(HttpDownloader::new()),
        search: Arc::new(PexelsSearch::new(api_key)),
        analyzer: Arc::new(KeywordAnalyzer::new()),
        shortener: Arc::new(WordBudgetShortener::new(config.words_per_second)),
        tts: Arc::new(PiperTts::new(&args.piper_model)),
        compositor: Arc::new(FfmpegCompositor::new()),
        caption_burner: Arc::new(FfmpegCaptionBurner::new()),
        uploader: Arc::new(LocalPublisher::new(&args.out_dir)),
        status: Arc::new(MemoryStatusStore::new()),
    }
}
