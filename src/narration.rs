//! Narration fitting and synthesis.
//!
//! The brief is shortened until its estimated spoken length fits the video,
//! then synthesized in fixed-size word chunks. Chunk timing is estimated from
//! word counts at one speaking rate and is the source of truth for the track
//! length, so caption timing never depends on how the audio was encoded.

use std::path::{Path, PathBuf};
use std::sync::Arc;

use serde::{Deserialize, Serialize};
use tracing::{debug, info, warn};

use crate::audio::{self, SILENCE_SAMPLE_RATE};
use crate::collaborators::{ShortenRequest, SpeechSynthesizer, TextShortener};
use crate::error::{PipelineError, PipelineResult};
use crate::utils::{chunk_words, spoken_seconds, word_count};

/// Share of the video the narration should fill.
pub const NARRATION_SHARE: f64 = 0.9;

const GUIDANCE: [&str; 3] = [
    "Summarize concisely while keeping the key message.",
    "Be very concise: keep only the essential points in short sentences.",
    "Be extremely brief: one or two short sentences with the core message only.",
];

#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct TranscriptChunk {
    pub text: String,
    pub start: f64,
    pub end: f64,
    /// Synthesized audio for this chunk alone.
    pub audio: Option<PathBuf>,
}

#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct NarrationTrack {
    pub path: PathBuf,
    /// Sum of chunk durations; not re-measured from the file.
    pub duration: f64,
    pub chunks: Vec<TranscriptChunk>,
    /// True when every chunk failed and the track is silence.
    pub silent: bool,
}

impl NarrationTrack {
    /// The text actually spoken, in presentation order.
    pub fn spoken_text(&self) -> String {
        self.chunks
            .iter()
            .map(|c| c.text.as_str())
            .collect::<Vec<_>>()
            .join(" ")
    }
}

#[derive(Debug, Clone, PartialEq)]
pub struct FitOutcome {
    pub text: String,
    pub estimated_seconds: f64,
    pub target_seconds: f64,
    pub attempts: u32,
    /// True when the estimate is within tolerance of the target.
    pub fits: bool,
}

#[derive(Debug, Clone, Copy)]
pub struct FitSettings {
    pub words_per_second: f64,
    pub chunk_words: usize,
    pub tolerance_seconds: f64,
    pub max_attempts: u32,
}

pub struct NarrationFitter {
    shortener: Arc<dyn TextShortener>,
    tts: Arc<dyn SpeechSynthesizer>,
    settings: FitSettings,
}

impl NarrationFitter {
    pub fn new(shortener: Arc<dyn TextShortener>, tts: Arc<dyn SpeechSynthesizer>, settings: FitSettings) -> Self {
        Self {
            shortener,
            tts,
            settings,
        }
    }

    pub fn estimate_seconds(&self, text: &str) -> f64 {
        spoken_seconds(word_count(text), self.settings.words_per_second)
    }

    /// Shorten `text` until it fits `NARRATION_SHARE * duration`.
    ///
    /// Stops early, keeping the best text so far, when a rewrite fails or is
    /// not strictly shorter. Never returns empty text.
    pub async fn fit(&self, text: &str, duration: f64) -> PipelineResult<FitOutcome> {
        let text = text.split_whitespace().collect::<Vec<_>>().join(" ");
        if text.is_empty() {
            return Err(PipelineError::validation("narration text is empty"));
        }
        let target = NARRATION_SHARE * duration;
        let mut current = text;
        let mut estimate = self.estimate_seconds(&current);
        let mut attempts = 0;
        info!("Narration estimate {:.1}s for target {:.1}s", estimate, target);

        while estimate > target + self.settings.tolerance_seconds && attempts < self.settings.max_attempts {
            attempts += 1;
            let scale = 1.0 + 0.3 * attempts as f64;
            let attempt_target = target / scale;
            let guidance = GUIDANCE[(attempts as usize - 1).min(GUIDANCE.len() - 1)];
            let request = ShortenRequest {
                text: &current,
                target_seconds: attempt_target,
                guidance,
            };
            let rewrite = match self.shortener.shorten(&request).await {
                Ok(rewrite) => rewrite.split_whitespace().collect::<Vec<_>>().join(" "),
                Err(e) => {
                    warn!("Shortening attempt {} failed: {:#}; keeping current text", attempts, e);
                    break;
                }
            };
            let rewrite_words = word_count(&rewrite);
            if rewrite_words == 0 || rewrite_words >= word_count(&current) {
                warn!(
                    "Shortening attempt {} made no progress ({} words); keeping current text",
                    attempts, rewrite_words
                );
                break;
            }
            current = rewrite;
            estimate = self.estimate_seconds(&current);
            info!(
                "Shortening attempt {} (target {:.1}s): estimate now {:.1}s",
                attempts, attempt_target, estimate
            );
        }

        Ok(FitOutcome {
            fits: estimate <= target + self.settings.tolerance_seconds,
            text: current,
            estimated_seconds: estimate,
            target_seconds: target,
            attempts,
        })
    }

    /// Split into word chunks stamped with cumulative estimated timing.
    pub fn plan_chunks(&self, text: &str) -> Vec<TranscriptChunk> {
        let mut cursor = 0.0;
        chunk_words(text, self.settings.chunk_words)
            .into_iter()
            .map(|chunk| {
                let start = cursor;
                cursor += self.estimate_seconds(&chunk);
                TranscriptChunk {
                    text: chunk,
                    start,
                    end: cursor,
                    audio: None,
                }
            })
            .collect()
    }

    /// Synthesize each chunk and join them into `work_dir/narration.wav`.
    ///
    /// Failed chunks are dropped and the survivors re-timed back to back. If
    /// nothing succeeds the track is silence spanning `duration`.
    pub async fn synthesize(
        &self,
        text: &str,
        voice: Option<&str>,
        duration: f64,
        work_dir: &Path,
    ) -> PipelineResult<NarrationTrack> {
        let planned = self.plan_chunks(text);
        let total = planned.len();
        let mut spoken = Vec::with_capacity(total);
        for (i, chunk) in planned.into_iter().enumerate() {
            let out = work_dir.join(format!("part_{:03}.wav", i));
            info!("Generating TTS chunk {}/{} ({} words)", i + 1, total, word_count(&chunk.text));
            debug!("Chunk text: {}", chunk.text);
            match self.tts.synthesize(&chunk.text, voice, &out).await {
                Ok(path) => spoken.push(TranscriptChunk {
                    audio: Some(path),
                    ..chunk
                }),
                Err(e) => warn!("TTS chunk {} failed: {:#}; dropping it from the track", i + 1, e),
            }
        }

        let path = work_dir.join("narration.wav");
        if spoken.is_empty() {
            warn!("No TTS chunk succeeded; using {:.1}s of silence", duration);
            return silent_track(path, duration);
        }
        if spoken.len() < total {
            warn!("{} of {} TTS chunks dropped", total - spoken.len(), total);
        }

        let mut cursor = 0.0;
        for chunk in spoken.iter_mut() {
            let length = chunk.end - chunk.start;
            chunk.start = cursor;
            chunk.end = cursor + length;
            cursor = chunk.end;
        }

        let inputs: Vec<&Path> = spoken.iter().filter_map(|c| c.audio.as_deref()).collect();
        let measured = match audio::concat_wavs(&inputs, &path) {
            Ok(measured) => measured,
            Err(e) => {
                warn!("Could not join narration chunks: {:#}; using {:.1}s of silence", e, duration);
                return silent_track(path, duration);
            }
        };
        debug!("Narration estimated {:.2}s, file measures {:.2}s", cursor, measured);

        Ok(NarrationTrack {
            path,
            duration: cursor,
            chunks: spoken,
            silent: false,
        })
    }
}

fn silent_track(path: PathBuf, duration: f64) -> PipelineResult<NarrationTrack> {
    audio::write_silence(&path, duration, SILENCE_SAMPLE_RATE)
        .map_err(|e| PipelineError::synthesis(format!("{e:#}")))?;
    Ok(NarrationTrack {
        path,
        duration,
        chunks: Vec::new(),
        silent: true,
    })
}

#[cfg(test)]
mod tests {
    use super::*;
    use async_trait::async_trait;
    use std::collections::HashSet;
    use std::sync::Mutex;

    /// Replays canned rewrites in order.
    struct ScriptedShortener {
        replies: Mutex<Vec<String>>,
        seen_targets: Mutex<Vec<f64>>,
    }

    impl ScriptedShortener {
        fn new(replies: &[&str]) -> Self {
            Self {
                replies: Mutex::new(replies.iter().rev().map(|s| s.to_string()).collect()),
                seen_targets: Mutex::new(Vec::new()),
            }
        }
    }

    #[async_trait]
    impl TextShortener for ScriptedShortener {
        async fn shorten(&self, request: &ShortenRequest<'_>) -> anyhow::Result<String> {
            self.seen_targets.lock().unwrap().push(request.target_seconds);
            self.replies
                .lock()
                .unwrap()
                .pop()
                .ok_or_else(|| anyhow::anyhow!("out of replies"))
        }
    }

    struct FakeTts {
        failing: HashSet<usize>,
        calls: Mutex<usize>,
    }

    #[async_trait]
    impl SpeechSynthesizer for FakeTts {
        async fn synthesize(&self, text: &str, _voice: Option<&str>, out_path: &Path) -> anyhow::Result<PathBuf> {
            let index = {
                let mut calls = self.calls.lock().unwrap();
                *calls += 1;
                *calls - 1
            };
            if self.failing.contains(&index) {
                anyhow::bail!("voice crashed");
            }
            audio::write_silence(out_path, word_count(text) as f64 / 2.5, 8_000)?;
            Ok(out_path.to_path_buf())
        }
    }

    fn settings() -> FitSettings {
        FitSettings {
            words_per_second: 2.5,
            chunk_words: 10,
            tolerance_seconds: 0.5,
            max_attempts: 3,
        }
    }

    fn words(n: usize) -> String {
        (0..n).map(|i| format!("w{i}")).collect::<Vec<_>>().join(" ")
    }

    fn fitter(shortener: Arc<dyn TextShortener>, failing: &[usize]) -> NarrationFitter {
        let tts = FakeTts {
            failing: failing.iter().copied().collect(),
            calls: Mutex::new(0),
        };
        NarrationFitter::new(shortener, Arc::new(tts), settings())
    }

    #[tokio::test]
    async fn short_text_needs_no_rewrite() {
        let shortener = Arc::new(ScriptedShortener::new(&[]));
        let f = fitter(shortener.clone(), &[]);
        let out = f.fit(&words(20), 15.0).await.unwrap();
        assert_eq!(out.attempts, 0);
        assert!(out.fits);
        assert!(shortener.seen_targets.lock().unwrap().is_empty());
    }

    #[tokio::test]
    async fn rewrites_until_within_tolerance() {
        // target 13.5s -> at most 35 words at 2.5 w/s
        let shortener = Arc::new(ScriptedShortener::new(&[&words(60), &words(34), &words(10)]));
        let f = fitter(shortener.clone(), &[]);
        let out = f.fit(&words(100), 15.0).await.unwrap();
        assert_eq!(out.attempts, 2);
        assert!(out.fits);
        assert_eq!(word_count(&out.text), 34);
        let targets = shortener.seen_targets.lock().unwrap().clone();
        assert!((targets[0] - 13.5 / 1.3).abs() < 1e-9);
        assert!((targets[1] - 13.5 / 1.6).abs() < 1e-9);
    }

    #[tokio::test]
    async fn stops_when_rewrite_does_not_shrink() {
        let shortener = Arc::new(ScriptedShortener::new(&[&words(80), &words(80)]));
        let f = fitter(shortener, &[]);
        let out = f.fit(&words(100), 15.0).await.unwrap();
        assert_eq!(out.attempts, 2);
        assert!(!out.fits);
        assert_eq!(word_count(&out.text), 80);
    }

    #[tokio::test]
    async fn gives_up_after_three_attempts() {
        let shortener = Arc::new(ScriptedShortener::new(&[&words(90), &words(80), &words(70), &words(5)]));
        let f = fitter(shortener, &[]);
        let out = f.fit(&words(100), 15.0).await.unwrap();
        assert_eq!(out.attempts, 3);
        assert_eq!(word_count(&out.text), 70);
        assert!(!out.text.is_empty());
    }

    #[tokio::test]
    async fn shortener_error_keeps_original() {
        let shortener = Arc::new(ScriptedShortener::new(&[]));
        let f = fitter(shortener, &[]);
        let out = f.fit(&words(100), 15.0).await.unwrap();
        assert_eq!(out.attempts, 1);
        assert_eq!(word_count(&out.text), 100);
    }

    #[tokio::test]
    async fn empty_rewrite_is_no_progress() {
        let shortener = Arc::new(ScriptedShortener::new(&["   "]));
        let f = fitter(shortener, &[]);
        let out = f.fit(&words(100), 15.0).await.unwrap();
        assert_eq!(word_count(&out.text), 100);
    }

    #[test]
    fn chunks_are_stamped_cumulatively() {
        let f = fitter(Arc::new(ScriptedShortener::new(&[])), &[]);
        let chunks = f.plan_chunks(&words(25));
        assert_eq!(chunks.len(), 3);
        assert_eq!(chunks[0].start, 0.0);
        assert!((chunks[0].end - 4.0).abs() < 1e-9);
        assert!((chunks[1].start - 4.0).abs() < 1e-9);
        assert!((chunks[2].end - 10.0).abs() < 1e-9);
    }

    #[tokio::test]
    async fn failed_chunk_is_dropped_and_track_retimed() {
        let dir = tempfile::tempdir().unwrap();
        let f = fitter(Arc::new(ScriptedShortener::new(&[])), &[1]);
        let track = f.synthesize(&words(25), None, 15.0, dir.path()).await.unwrap();
        assert!(!track.silent);
        assert_eq!(track.chunks.len(), 2);
        assert!((track.chunks[1].start - 4.0).abs() < 1e-9);
        assert!((track.duration - 6.0).abs() < 1e-9);
        assert!(track.spoken_text().starts_with("w0 "));
        assert!(!track.spoken_text().contains("w10"));
        let measured = audio::wav_duration_seconds(&track.path).unwrap();
        assert!((measured - 6.0).abs() < 1e-3);
    }

    #[tokio::test]
    async fn all_chunks_failing_yields_silent_track() {
        let dir = tempfile::tempdir().unwrap();
        let f = fitter(Arc::new(ScriptedShortener::new(&[])), &[0, 1, 2]);
        let track = f.synthesize(&words(25), None, 15.0, dir.path()).await.unwrap();
        assert!(track.silent);
        assert!(track.chunks.is_empty());
        assert_eq!(track.duration, 15.0);
        let measured = audio::wav_duration_seconds(&track.path).unwrap();
        assert!((measured - 15.0).abs() < 1e-3);
    }

    /// Alternates sample rates so the chunks cannot be joined.
    struct MixedRateTts {
        calls: Mutex<u32>,
    }

    #[async_trait]
    impl SpeechSynthesizer for MixedRateTts {
        async fn synthesize(&self, text: &str, _voice: Option<&str>, out_path: &Path) -> anyhow::Result<PathBuf> {
            let rate = {
                let mut calls = self.calls.lock().unwrap();
                *calls += 1;
                if *calls % 2 == 0 { 16_000 } else { 8_000 }
            };
            audio::write_silence(out_path, word_count(text) as f64 / 2.5, rate)?;
            Ok(out_path.to_path_buf())
        }
    }

    #[tokio::test]
    async fn unjoinable_chunks_fall_back_to_silence() {
        let dir = tempfile::tempdir().unwrap();
        let tts = MixedRateTts { calls: Mutex::new(0) };
        let f = NarrationFitter::new(Arc::new(ScriptedShortener::new(&[])), Arc::new(tts), settings());
        let track = f.synthesize(&words(25), None, 15.0, dir.path()).await.unwrap();
        assert!(track.silent);
        assert_eq!(track.duration, 15.0);
        let measured = audio::wav_duration_seconds(&track.path).unwrap();
        assert!((measured - 15.0).abs() < 1e-3);
    }
}
