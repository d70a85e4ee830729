//! Narrated video generation engine.
//!
//! Turns a text brief into a short narrated video: media is resolved, the
//! narration is fitted to the target length and synthesized, a timeline is
//! laid out over the media, captions are scheduled against the narration,
//! and the composed result is uploaded. The [`orchestrator::Orchestrator`]
//! drives one job through these stages and records every transition in a
//! status store. All external work (downloads, search, speech, ffmpeg,
//! storage) goes through the traits in [`collaborators`].

pub mod assets;
pub mod audio;
pub mod captions;
pub mod collaborators;
pub mod config;
pub mod download;
pub mod error;
pub mod ffmpeg;
pub mod heuristics;
pub mod job;
pub mod local;
pub mod narration;
pub mod orchestrator;
pub mod pexels;
pub mod request;
pub mod retry;
pub mod subtitle;
pub mod timeline;
pub mod tts;
pub mod utils;
pub mod workspace;

pub use error::{ErrorKind, PipelineError, PipelineResult};
pub use job::{Job, JobId, JobStatus};
pub use orchestrator::Orchestrator;
pub use request::VideoRequest;
