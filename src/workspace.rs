use std::fs;
use std::path::{Path, PathBuf};

use tracing::{debug, warn};

use crate::error::{PipelineError, PipelineResult};
use crate::job::JobId;

/// Per-job scratch directory, removed when dropped.
#[derive(Debug)]
pub struct JobWorkspace {
    root: PathBuf,
}

impl JobWorkspace {
    /// Create `<base>/<job id>` with `assets/` and `audio/` inside.
    pub fn create(base: &Path, job_id: &JobId) -> PipelineResult<Self> {
        let root = base.join(job_id.to_string());
        if root.exists() {
            fs::remove_dir_all(&root).map_err(|e| PipelineError::io("clear stale work dir", e))?;
        }
        let workspace = Self { root };
        for dir in [workspace.assets_dir(), workspace.audio_dir()] {
            fs::create_dir_all(&dir).map_err(|e| PipelineError::io("create work dir", e))?;
        }
        debug!("Created work dir {}", workspace.root.display());
        Ok(workspace)
    }

    pub fn root(&self) -> &Path {
        &self.root
    }

    pub fn assets_dir(&self) -> PathBuf {
        self.root.join("assets")
    }

    pub fn audio_dir(&self) -> PathBuf {
        self.root.join("audio")
    }

    pub fn file(&self, name: &str) -> PathBuf {
        self.root.join(name)
    }
}

impl Drop for JobWorkspace {
    fn drop(&mut self) {
        match fs::remove_dir_all(&self.root) {
            Ok(()) => debug!("Removed work dir {}", self.root.display()),
            Err(e) if e.kind() == std::io::ErrorKind::NotFound => {}
            Err(e) => warn!("Failed to remove work dir {}: {}", self.root.display(), e),
        }
    }
}
