//! Filesystem and in-memory collaborators for running without cloud services.

use std::collections::HashMap;
use std::path::{Path, PathBuf};

use anyhow::Context;
use async_trait::async_trait;
use chrono::{Datelike, Utc};
use tokio::fs;
use tokio::sync::RwLock;
use tracing::{debug, info};

use crate::collaborators::{StatusStore, StorageLookup, Uploader};
use crate::job::{Job, JobId};

/// Object key for a finished video: `videos/YYYY/MM/DD/<job id>.mp4`.
pub fn video_key(job_id: &JobId) -> String {
    let today = Utc::now();
    format!(
        "videos/{:04}/{:02}/{:02}/{}.mp4",
        today.year(),
        today.month(),
        today.day(),
        job_id
    )
}

/// "Uploads" by copying into a local directory tree.
#[derive(Debug, Clone)]
pub struct LocalPublisher {
    root: PathBuf,
}

impl LocalPublisher {
    pub fn new(root: impl Into<PathBuf>) -> Self {
        Self { root: root.into() }
    }
}

#[async_trait]
impl Uploader for LocalPublisher {
    async fn upload(&self, path: &Path, job_id: &JobId) -> anyhow::Result<String> {
        let dest = self.root.join(video_key(job_id));
        if let Some(parent) = dest.parent() {
            fs::create_dir_all(parent)
                .await
                .with_context(|| format!("failed to create {}", parent.display()))?;
        }
        fs::copy(path, &dest)
            .await
            .with_context(|| format!("failed to publish {}", path.display()))?;
        let dest = fs::canonicalize(&dest).await.unwrap_or(dest);
        info!("Published {}", dest.display());
        Ok(format!("file://{}", dest.display()))
    }
}

/// Resolves upload ids to files named `<id>.*` in one directory.
#[derive(Debug, Clone)]
pub struct DirectoryStorage {
    dir: PathBuf,
}

impl DirectoryStorage {
    pub fn new(dir: impl Into<PathBuf>) -> Self {
        Self { dir: dir.into() }
    }
}

#[async_trait]
impl StorageLookup for DirectoryStorage {
    async fn resolve(&self, id: &str) -> anyhow::Result<Option<String>> {
        if id.contains(['/', '\\']) || id.starts_with('.') {
            anyhow::bail!("invalid upload id '{id}'");
        }
        let mut entries = match fs::read_dir(&self.dir).await {
            Ok(entries) => entries,
            Err(e) if e.kind() == std::io::ErrorKind::NotFound => return Ok(None),
            Err(e) => return Err(e).with_context(|| format!("failed to list {}", self.dir.display())),
        };
        while let Some(entry) = entries.next_entry().await? {
            let path = entry.path();
            if path.file_stem().and_then(|s| s.to_str()) == Some(id) && path.is_file() {
                let path = fs::canonicalize(&path).await.unwrap_or(path);
                debug!("Upload '{}' resolved to {}", id, path.display());
                return Ok(Some(format!("file://{}", path.display())));
            }
        }
        Ok(None)
    }
}

/// Job snapshots held as JSON strings under `job:<id>:status`.
#[derive(Debug, Default)]
pub struct MemoryStatusStore {
    entries: RwLock<HashMap<String, String>>,
}

impl MemoryStatusStore {
    pub fn new() -> Self {
        Self::default()
    }
}

#[async_trait]
impl StatusStore for MemoryStatusStore {
    async fn put(&self, job: &Job) -> anyhow::Result<()> {
        let json = serde_json::to_string(job)?;
        self.entries.write().await.insert(job.id.status_key(), json);
        Ok(())
    }

    async fn get(&self, job_id: &JobId) -> anyhow::Result<Option<Job>> {
        let entries = self.entries.read().await;
        match entries.get(&job_id.status_key()) {
            Some(json) => Ok(Some(serde_json::from_str(json)?)),
            None => Ok(None),
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::job::JobStatus;
    use crate::request::VideoRequest;

    #[tokio::test]
    async fn publisher_copies_under_dated_key() {
        let out = tempfile::tempdir().unwrap();
        let src_dir = tempfile::tempdir().unwrap();
        let src = src_dir.path().join("final.mp4");
        std::fs::write(&src, b"video").unwrap();
        let id = JobId::new();

        let url = LocalPublisher::new(out.path()).upload(&src, &id).await.unwrap();
        assert!(url.starts_with("file://"));
        assert!(url.ends_with(&format!("{id}.mp4")));
        let key = video_key(&id);
        assert!(key.starts_with("videos/"));
        assert_eq!(std::fs::read(out.path().join(key)).unwrap(), b"video");
    }

    #[tokio::test]
    async fn directory_storage_matches_stem() {
        let dir = tempfile::tempdir().unwrap();
        std::fs::write(dir.path().join("abc123.png"), b"img").unwrap();
        let storage = DirectoryStorage::new(dir.path());
        let url = storage.resolve("abc123").await.unwrap().unwrap();
        assert!(url.starts_with("file://") && url.ends_with("abc123.png"));
        assert!(storage.resolve("missing").await.unwrap().is_none());
        assert!(storage.resolve("../etc").await.is_err());
    }

    #[tokio::test]
    async fn status_store_round_trips_snapshots() {
        let store = MemoryStatusStore::new();
        let mut job = Job::new(JobId::new(), VideoRequest::new("Brief.", 12.0));
        assert!(store.get(&job.id).await.unwrap().is_none());
        store.put(&job).await.unwrap();
        job.advance(JobStatus::FetchingMedia).unwrap();
        store.put(&job).await.unwrap();
        let stored = store.get(&job.id).await.unwrap().unwrap();
        assert_eq!(stored.status, JobStatus::FetchingMedia);
        assert_eq!(stored.progress, 10);
        assert_eq!(store.get(&job.id).await.unwrap().unwrap(), stored);
    }
}
