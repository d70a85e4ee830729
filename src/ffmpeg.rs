//! ffmpeg-backed compositor and caption burner.
//!
//! Each timeline segment becomes one ffmpeg input trimmed to its on-screen
//! window. Boundaries are joined with `xfade` at the segment's start time, so
//! the rendered length is exactly the timeline's total duration.

use std::path::{Path, PathBuf};

use anyhow::Context;
use async_trait::async_trait;
use tokio::process::Command;
use tracing::{debug, error, info};

use crate::assets::AssetKind;
use crate::captions::{CaptionCue, CaptionStyle};
use crate::collaborators::{CaptionBurner, CompositionPlan, Compositor};
use crate::subtitle::{force_style, write_srt};
use crate::timeline::TransitionStyle;

const FRAME_RATE: u32 = 30;

/// ffmpeg `xfade` transition name.
pub fn xfade_name(style: TransitionStyle) -> &'static str {
    match style {
        TransitionStyle::Crossfade => "fade",
        TransitionStyle::Fade => "fadeblack",
        TransitionStyle::SlideLeft => "slideleft",
        TransitionStyle::SlideRight => "slideright",
        TransitionStyle::Zoom => "zoomin",
    }
}

/// Full ffmpeg argument list for one render.
pub fn compose_args(plan: &CompositionPlan<'_>) -> Vec<String> {
    let (width, height) = plan.resolution;
    let mut args: Vec<String> = vec!["-y".into(), "-hide_banner".into()];
    for segment in plan.segments {
        let clip = format!("{:.3}", segment.clip_length());
        match segment.asset.kind {
            AssetKind::Image => args.extend(["-loop".into(), "1".into()]),
            AssetKind::Video => args.extend(["-stream_loop".into(), "-1".into()]),
        }
        args.extend(["-t".into(), clip, "-i".into(), segment.asset.path.display().to_string()]);
    }
    let audio_input = plan.segments.len();
    args.extend(["-i".into(), plan.audio.path.display().to_string()]);

    let mut graph = Vec::new();
    for (i, segment) in plan.segments.iter().enumerate() {
        graph.push(format!(
            "[{i}:v]scale={width}:{height}:force_original_aspect_ratio=decrease,\
             pad={width}:{height}:(ow-iw)/2:(oh-ih)/2,setsar=1,fps={FRAME_RATE},format=yuv420p,\
             trim=duration={:.3},setpts=PTS-STARTPTS[v{i}]",
            segment.clip_length()
        ));
    }

    let joined_with_xfade = plan.segments.len() > 1
        && plan.segments.iter().skip(1).all(|s| s.transition_duration > 0.0);
    let video_label = if plan.segments.len() == 1 {
        "v0".to_string()
    } else if joined_with_xfade {
        let mut previous = "v0".to_string();
        for (i, segment) in plan.segments.iter().enumerate().skip(1) {
            let style = segment.transition.unwrap_or(TransitionStyle::Crossfade);
            let label = format!("x{i}");
            graph.push(format!(
                "[{previous}][v{i}]xfade=transition={}:duration={:.3}:offset={:.3}[{label}]",
                xfade_name(style),
                segment.transition_duration,
                segment.start
            ));
            previous = label;
        }
        previous
    } else {
        let inputs: String = (0..plan.segments.len()).map(|i| format!("[v{i}]")).collect();
        graph.push(format!("{inputs}concat=n={}:v=1:a=0[vcat]", plan.segments.len()));
        "vcat".to_string()
    };

    let total = plan.total_duration;
    let fade_in = plan.audio_fades.fade_in.min(total);
    let fade_out = plan.audio_fades.fade_out.min(total);
    graph.push(format!(
        "[{audio_input}:a]apad,atrim=0:{total:.3},asetpts=PTS-STARTPTS,\
         afade=t=in:st=0:d={fade_in:.3},afade=t=out:st={:.3}:d={fade_out:.3}[aout]",
        total - fade_out
    ));

    args.extend([
        "-filter_complex".into(),
        graph.join(";"),
        "-map".into(),
        format!("[{video_label}]"),
        "-map".into(),
        "[aout]".into(),
        "-c:v".into(),
        "libx264".into(),
        "-pix_fmt".into(),
        "yuv420p".into(),
        "-r".into(),
        FRAME_RATE.to_string(),
        "-c:a".into(),
        "aac".into(),
        "-t".into(),
        format!("{total:.3}"),
        plan.output.display().to_string(),
    ]);
    args
}

/// Escape a path for use inside an ffmpeg filter argument.
fn filter_path(path: &Path) -> String {
    path.display()
        .to_string()
        .replace('\\', "\\\\")
        .replace(':', "\\:")
        .replace('\'', "\\'")
}

pub fn burn_args(video: &Path, srt: &Path, style: &CaptionStyle, output: &Path) -> Vec<String> {
    vec![
        "-y".into(),
        "-hide_banner".into(),
        "-i".into(),
        video.display().to_string(),
        "-vf".into(),
        format!("subtitles={}:force_style='{}'", filter_path(srt), force_style(style)),
        "-c:v".into(),
        "libx264".into(),
        "-c:a".into(),
        "copy".into(),
        output.display().to_string(),
    ]
}

async fn run_ffmpeg(program: &str, args: &[String], what: &str) -> anyhow::Result<()> {
    debug!("{} {}", program, args.join(" "));
    let output = Command::new(program)
        .args(args)
        .kill_on_drop(true)
        .output()
        .await
        .with_context(|| format!("failed to run {program}"))?;
    if !output.status.success() {
        let stderr = String::from_utf8_lossy(&output.stderr);
        let tail: Vec<&str> = stderr.lines().rev().take(5).collect();
        error!("ffmpeg failed to {}", what);
        anyhow::bail!(
            "ffmpeg failed to {} ({}): {}",
            what,
            output.status,
            tail.into_iter().rev().collect::<Vec<_>>().join(" | ")
        );
    }
    Ok(())
}

#[derive(Debug, Clone)]
pub struct FfmpegCompositor {
    program: String,
}

impl FfmpegCompositor {
    pub fn new() -> Self {
        Self {
            program: "ffmpeg".to_string(),
        }
    }
}

impl Default for FfmpegCompositor {
    fn default() -> Self {
        Self::new()
    }
}

#[async_trait]
impl Compositor for FfmpegCompositor {
    async fn compose(&self, plan: &CompositionPlan<'_>) -> anyhow::Result<PathBuf> {
        if plan.segments.is_empty() {
            anyhow::bail!("nothing to compose");
        }
        info!(
            "Composing {} segments ({}x{}, {:.1}s) into {}",
            plan.segments.len(),
            plan.resolution.0,
            plan.resolution.1,
            plan.total_duration,
            plan.output.display()
        );
        run_ffmpeg(&self.program, &compose_args(plan), "compose video").await?;
        Ok(plan.output.clone())
    }
}

#[derive(Debug, Clone)]
pub struct FfmpegCaptionBurner {
    program: String,
}

impl FfmpegCaptionBurner {
    pub fn new() -> Self {
        Self {
            program: "ffmpeg".to_string(),
        }
    }
}

impl Default for FfmpegCaptionBurner {
    fn default() -> Self {
        Self::new()
    }
}

#[async_trait]
impl CaptionBurner for FfmpegCaptionBurner {
    async fn burn(
        &self,
        video: &Path,
        cues: &[CaptionCue],
        style: &CaptionStyle,
        output: &Path,
    ) -> anyhow::Result<PathBuf> {
        let srt = output.with_extension("srt");
        write_srt(&srt, cues)?;
        info!("Burning {} captions into {}", cues.len(), output.display());
        run_ffmpeg(&self.program, &burn_args(video, &srt, style, output), "burn captions").await?;
        Ok(output.to_path_buf())
    }
}
