use std::path::{Path, PathBuf};
use std::process::Stdio;

use async_trait::async_trait;
use tokio::io::AsyncWriteExt;
use tokio::process::Command;
use tracing::error;

use crate::collaborators::SpeechSynthesizer;

/// Speech via the `piper` command-line synthesizer.
///
/// A request's voice, when set, names the piper model to use instead of the
/// default one.
#[derive(Debug, Clone)]
pub struct PiperTts {
    program: String,
    model: String,
}

impl PiperTts {
    pub fn new(model: impl Into<String>) -> Self {
        Self {
            program: "piper".to_string(),
            model: model.into(),
        }
    }

    pub fn with_program(mut self, program: impl Into<String>) -> Self {
        self.program = program.into();
        self
    }
}

#[async_trait]
impl SpeechSynthesizer for PiperTts {
    async fn synthesize(&self, text: &str, voice: Option<&str>, out_path: &Path) -> anyhow::Result<PathBuf> {
        let model = voice.unwrap_or(&self.model);
        let mut child = Command::new(&self.program)
            .arg("--model")
            .arg(model)
            .arg("--output_file")
            .arg(out_path)
            .stdin(Stdio::piped())
            .stdout(Stdio::null())
            .stderr(Stdio::piped())
            .kill_on_drop(true)
            .spawn()
            .map_err(|e| anyhow::anyhow!("failed to spawn {}: {}", self.program, e))?;

        {
            let mut stdin = child
                .stdin
                .take()
                .ok_or_else(|| anyhow::anyhow!("piper stdin unavailable"))?;
            stdin.write_all(text.as_bytes()).await?;
        }

        let output = child.wait_with_output().await?;
        if !output.status.success() {
            error!("Piper TTS command failed for chunk: {}", out_path.display());
            anyhow::bail!(
                "piper exited with {}: {}",
                output.status,
                String::from_utf8_lossy(&output.stderr).trim()
            );
        }
        if !out_path.exists() {
            anyhow::bail!("piper produced no audio at {}", out_path.display());
        }
        Ok(out_path.to_path_buf())
    }
}
