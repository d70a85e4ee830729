//! Error taxonomy for the generation pipeline.
//!
//! Collaborators report failures as `anyhow::Error`; the engine converts
//! them into one of these classes at the call site, where it also decides
//! whether the failure is skipped, retried, or fatal for the job.

use std::fmt;
use std::io;

use serde::{Deserialize, Serialize};
use thiserror::Error;

/// Failure class, used for matching without inspecting messages.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum ErrorKind {
    Validation,
    AssetFetch,
    Synthesis,
    Composition,
    Upload,
    Status,
    NotFound,
    Io,
    Internal,
}

impl fmt::Display for ErrorKind {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        let name = match self {
            ErrorKind::Validation => "validation",
            ErrorKind::AssetFetch => "asset_fetch",
            ErrorKind::Synthesis => "synthesis",
            ErrorKind::Composition => "composition",
            ErrorKind::Upload => "upload",
            ErrorKind::Status => "status",
            ErrorKind::NotFound => "not_found",
            ErrorKind::Io => "io",
            ErrorKind::Internal => "internal",
        };
        f.write_str(name)
    }
}

#[derive(Error, Debug)]
pub enum PipelineError {
    /// Malformed request, rejected before a job exists.
    #[error("invalid request: {0}")]
    Validation(String),

    /// No usable media could be resolved.
    #[error("media acquisition failed: {0}")]
    AssetFetch(String),

    /// Narration could not be produced.
    #[error("speech synthesis failed: {0}")]
    Synthesis(String),

    /// The compositor could not produce the video.
    #[error("composition failed: {0}")]
    Composition(String),

    /// Upload still failing after the retry budget.
    #[error("upload failed after {attempts} attempts: {message}")]
    Upload { attempts: u32, message: String },

    /// The status store rejected a snapshot.
    #[error("status store error: {0}")]
    Status(String),

    #[error("job {0} not found")]
    NotFound(String),

    #[error("I/O error in {operation}: {source}")]
    Io {
        operation: String,
        #[source]
        source: io::Error,
    },

    /// A stage panicked; the job is failed instead of left in flight.
    #[error("internal error: {0}")]
    Internal(String),
}

impl PipelineError {
    pub fn validation(message: impl Into<String>) -> Self {
        Self::Validation(message.into())
    }

    pub fn asset_fetch(message: impl Into<String>) -> Self {
        Self::AssetFetch(message.into())
    }

    pub fn synthesis(message: impl Into<String>) -> Self {
        Self::Synthesis(message.into())
    }

    pub fn composition(message: impl Into<String>) -> Self {
        Self::Composition(message.into())
    }

    pub fn status(message: impl Into<String>) -> Self {
        Self::Status(message.into())
    }

    pub fn io(operation: impl Into<String>, source: io::Error) -> Self {
        Self::Io {
            operation: operation.into(),
            source,
        }
    }

    pub fn kind(&self) -> ErrorKind {
        match self {
            PipelineError::Validation(_) => ErrorKind::Validation,
            PipelineError::AssetFetch(_) => ErrorKind::AssetFetch,
            PipelineError::Synthesis(_) => ErrorKind::Synthesis,
            PipelineError::Composition(_) => ErrorKind::Composition,
            PipelineError::Upload { .. } => ErrorKind::Upload,
            PipelineError::Status(_) => ErrorKind::Status,
            PipelineError::NotFound(_) => ErrorKind::NotFound,
            PipelineError::Io { .. } => ErrorKind::Io,
            PipelineError::Internal(_) => ErrorKind::Internal,
        }
    }
}

pub type PipelineResult<T> = Result<T, PipelineError>;
