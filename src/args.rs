use std::path::PathBuf;

use clap::Parser;

use narrated::captions::CaptionPosition;
use narrated::request::{AspectRatio, Mood};
use narrated::timeline::TransitionStyle;

/// Generate a narrated video from a text brief.
#[derive(Parser, Debug)]
#[clap(version, about)]
pub struct Args {
    /// Narration text.
    #[clap(long, conflicts_with = "content_file", required_unless_present = "content_file")]
    pub content: Option<String>,

    /// Read the narration text from a file.
    #[clap(long)]
    pub content_file: Option<PathBuf>,

    /// Video length in seconds (10-300).
    #[clap(long, default_value_t = 30.0)]
    pub duration: f64,

    /// professional, casual or dynamic.
    #[clap(long, default_value = "professional")]
    pub style: Mood,

    /// Force one transition at every boundary (crossfade, fade, slide_left, slide_right, zoom).
    #[clap(long)]
    pub transition: Option<TransitionStyle>,

    /// Transition length in seconds (0-2).
    #[clap(long)]
    pub transition_duration: Option<f64>,

    /// square, landscape, portrait or vertical.
    #[clap(long, default_value = "square")]
    pub aspect: AspectRatio,

    /// Piper model to speak with instead of --piper-model.
    #[clap(long)]
    pub voice: Option<String>,

    #[clap(long, default_value_t = 2.0)]
    pub fade_in: f64,

    #[clap(long, default_value_t = 2.0)]
    pub fade_out: f64,

    /// Burn captions into the video.
    #[clap(long)]
    pub captions: bool,

    /// JSON file with pre-computed caption timing.
    #[clap(long)]
    pub caption_timing: Option<PathBuf>,

    #[clap(long, default_value = "bottom")]
    pub caption_position: CaptionPosition,

    #[clap(long, default_value_t = 24)]
    pub caption_font_size: u32,

    #[clap(long, default_value = "#ffffff")]
    pub caption_color: String,

    #[clap(long, default_value = "Arial")]
    pub caption_font: String,

    #[clap(long, default_value = "#000000")]
    pub caption_background: String,

    #[clap(long, default_value_t = 0.7)]
    pub caption_opacity: f64,

    /// Stock media URL to use verbatim; repeat for more.
    #[clap(long = "media")]
    pub media_urls: Vec<String>,

    /// Uploaded media id, resolved in --uploads-dir; repeat for more.
    #[clap(long = "upload-id")]
    pub upload_ids: Vec<String>,

    #[clap(long, default_value = "./uploads")]
    pub uploads_dir: PathBuf,

    /// Engine settings (TOML).
    #[clap(long)]
    pub config: Option<PathBuf>,

    /// Where finished videos are published.
    #[clap(long, default_value = "./out")]
    pub out_dir: PathBuf,

    #[clap(long, default_value = "./tts/en_US-hfc_male-medium.onnx")]
    pub piper_model: String,

    #[clap(long, env = "PEXELS_API_KEY", hide_env_values = true)]
    pub pexels_api_key: Option<String>,

    /// Log filter; overrides RUST_LOG.
    #[clap(long)]
    pub log_level: Option<String>,

    /// Status polling interval in milliseconds.
    #[clap(long, default_value_t = 500)]
    pub poll_ms: u64,

    /// Give up waiting for the job after this many seconds.
    #[clap(long, default_value_t = 3600)]
    pub max_wait_secs: u64,
}
