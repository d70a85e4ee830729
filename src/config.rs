//! Engine settings.
//!
//! Everything the engine would otherwise read from process-wide state is an
//! explicit field here, handed to the [`crate::orchestrator::Orchestrator`]
//! at construction.

use std::fs;
use std::io;
use std::path::{Path, PathBuf};

use serde::{Deserialize, Serialize};
use thiserror::Error;

use crate::narration::FitSettings;
use crate::retry::RetryPolicy;

#[derive(Error, Debug)]
pub enum ConfigError {
    #[error("failed to read config file {path}: {source}")]
    Read {
        path: PathBuf,
        #[source]
        source: io::Error,
    },

    #[error("failed to parse config file {path}: {source}")]
    Parse {
        path: PathBuf,
        #[source]
        source: toml::de::Error,
    },

    #[error("invalid config: {0}")]
    Invalid(String),
}

#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(default)]
pub struct EngineConfig {
    /// Master switch; a request must also ask for captions.
    pub captions_enabled: bool,
    /// Parent directory of per-job work directories.
    pub work_root: PathBuf,
    pub default_transition_duration: f64,
    /// Shortest slot an auto-fetched asset may get.
    pub min_segment_seconds: f64,
    pub words_per_second: f64,
    pub chunk_words: usize,
    pub fit_tolerance_seconds: f64,
    pub max_fit_attempts: u32,
    /// Concurrent downloads per job.
    pub parallel_downloads: usize,
    pub upload_retry: RetryPolicy,
}

impl Default for EngineConfig {
    fn default() -> Self {
        Self {
            captions_enabled: true,
            work_root: std::env::temp_dir().join("narrated"),
            default_transition_duration: 0.5,
            min_segment_seconds: 2.5,
            words_per_second: 2.5,
            chunk_words: 10,
            fit_tolerance_seconds: 0.5,
            max_fit_attempts: 3,
            parallel_downloads: 4,
            upload_retry: RetryPolicy::default(),
        }
    }
}

impl EngineConfig {
    /// Read a TOML file. Missing keys keep their defaults.
    pub fn load(path: &Path) -> Result<Self, ConfigError> {
        let content = fs::read_to_string(path).map_err(|source| ConfigError::Read {
            path: path.to_path_buf(),
            source,
        })?;
        let config: EngineConfig = toml::from_str(&content).map_err(|source| ConfigError::Parse {
            path: path.to_path_buf(),
            source,
        })?;
        config.validate()?;
        Ok(config)
    }

    pub fn validate(&self) -> Result<(), ConfigError> {
        if !(self.words_per_second > 0.0) {
            return Err(ConfigError::Invalid(format!(
                "words_per_second must be positive, got {}",
                self.words_per_second
            )));
        }
        if self.chunk_words == 0 {
            return Err(ConfigError::Invalid("chunk_words must be at least 1".into()));
        }
        if !(self.min_segment_seconds > 0.0) {
            return Err(ConfigError::Invalid(format!(
                "min_segment_seconds must be positive, got {}",
                self.min_segment_seconds
            )));
        }
        if !(0.0..=2.0).contains(&self.default_transition_duration) {
            return Err(ConfigError::Invalid(format!(
                "default_transition_duration must be within 0-2s, got {}",
                self.default_transition_duration
            )));
        }
        if self.upload_retry.max_attempts == 0 {
            return Err(ConfigError::Invalid("upload_retry.max_attempts must be at least 1".into()));
        }
        Ok(())
    }

    pub fn fit_settings(&self) -> FitSettings {
        FitSettings {
            words_per_second: self.words_per_second,
            chunk_words: self.chunk_words,
            tolerance_seconds: self.fit_tolerance_seconds,
            max_attempts: self.max_fit_attempts,
        }
    }
}
