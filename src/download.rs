use std::path::{Path, PathBuf};

use anyhow::Context;
use async_trait::async_trait;
use reqwest::header::{CONTENT_TYPE, USER_AGENT};
use tokio::fs::{self, File};
use tokio::io::AsyncWriteExt;
use tracing::debug;
use uuid::Uuid;

use crate::collaborators::Downloader;

const KNOWN_EXTENSIONS: [&str; 11] = [
    "jpg", "jpeg", "png", "webp", "gif", "mp4", "mov", "webm", "mkv", "avi", "m4v",
];

/// Streams `http(s)://` URLs to disk and copies `file://` URLs.
#[derive(Debug, Clone)]
pub struct HttpDownloader {
    client: reqwest::Client,
}

impl HttpDownloader {
    pub fn new() -> Self {
        Self {
            client: reqwest::Client::new(),
        }
    }
}

impl Default for HttpDownloader {
    fn default() -> Self {
        Self::new()
    }
}

#[async_trait]
impl Downloader for HttpDownloader {
    async fn fetch(&self, url: &str, dest_dir: &Path) -> anyhow::Result<PathBuf> {
        fs::create_dir_all(dest_dir)
            .await
            .with_context(|| format!("failed to create {}", dest_dir.display()))?;

        if let Some(source) = url.strip_prefix("file://") {
            let source = Path::new(source);
            let ext = extension_from_url(url).unwrap_or("bin");
            let dest = unique_path(dest_dir, ext);
            fs::copy(source, &dest)
                .await
                .with_context(|| format!("failed to copy {}", source.display()))?;
            return Ok(dest);
        }

        let mut response = self
            .client
            .get(url)
            .header(USER_AGENT, "narrated/0.1")
            .send()
            .await?
            .error_for_status()?;

        let ext = extension_from_url(url)
            .or_else(|| {
                response
                    .headers()
                    .get(CONTENT_TYPE)
                    .and_then(|v| v.to_str().ok())
                    .and_then(extension_from_content_type)
            })
            .unwrap_or("bin");
        let dest = unique_path(dest_dir, ext);

        let mut file = File::create(&dest)
            .await
            .with_context(|| format!("failed to create {}", dest.display()))?;
        let mut written = 0usize;
        while let Some(chunk) = response.chunk().await? {
            file.write_all(&chunk).await?;
            written += chunk.len();
        }
        file.flush().await?;
        if written == 0 {
            anyhow::bail!("empty response body from {url}");
        }
        debug!("Downloaded {} bytes from {}", written, url);
        Ok(dest)
    }
}

fn unique_path(dir: &Path, ext: &str) -> PathBuf {
    dir.join(format!("{}.{}", Uuid::new_v4().simple(), ext))
}

/// Media extension of the URL path, if it has a recognised one.
pub fn extension_from_url(url: &str) -> Option<&'static str> {
    let path = url.split(['?', '#']).next().unwrap_or(url);
    let last = path.rsplit('/').next()?;
    let (_, ext) = last.rsplit_once('.')?;
    let ext = ext.to_ascii_lowercase();
    KNOWN_EXTENSIONS.iter().copied().find(|known| *known == ext)
}

pub fn extension_from_content_type(content_type: &str) -> Option<&'static str> {
    let mime = content_type.split(';').next()?.trim().to_ascii_lowercase();
    match mime.as_str() {
        "image/jpeg" | "image/jpg" => Some("jpg"),
        "image/png" => Some("png"),
        "image/webp" => Some("webp"),
        "image/gif" => Some("gif"),
        "video/mp4" => Some("mp4"),
        "video/quicktime" => Some("mov"),
        "video/webm" => Some("webm"),
        "video/x-matroska" => Some("mkv"),
        _ => None,
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn extension_from_url_ignores_query() {
        assert_eq!(extension_from_url("https://cdn/x/photo.JPEG?w=1080"), Some("jpeg"));
        assert_eq!(extension_from_url("https://cdn/clip.mp4#t=3"), Some("mp4"));
        assert_eq!(extension_from_url("https://cdn/download"), None);
        assert_eq!(extension_from_url("https://cdn.example/path/file.exe"), None);
    }

    #[test]
    fn extension_from_mime() {
        assert_eq!(extension_from_content_type("image/png; charset=binary"), Some("png"));
        assert_eq!(extension_from_content_type("video/quicktime"), Some("mov"));
        assert_eq!(extension_from_content_type("text/html"), None);
    }

    #[tokio::test]
    async fn copies_file_urls() {
        let src_dir = tempfile::tempdir().unwrap();
        let src = src_dir.path().join("upload.png");
        std::fs::write(&src, b"png bytes").unwrap();
        let dest_dir = tempfile::tempdir().unwrap();

        let url = format!("file://{}", src.display());
        let path = HttpDownloader::new().fetch(&url, dest_dir.path()).await.unwrap();
        assert_eq!(path.extension().and_then(|e| e.to_str()), Some("png"));
        assert_eq!(std::fs::read(&path).unwrap(), b"png bytes");
    }

    #[tokio::test]
    async fn missing_file_url_fails() {
        let dest_dir = tempfile::tempdir().unwrap();
        let result = HttpDownloader::new()
            .fetch("file:///definitely/not/here.jpg", dest_dir.path())
            .await;
        assert!(result.is_err());
    }
}
