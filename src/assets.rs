//! Media acquisition.
//!
//! Exactly one source is used per job, in priority order: explicit stock
//! URLs, then user uploads, then auto-fetch driven by the brief. Individual
//! download failures are logged and skipped; only an empty result fails.

use std::collections::{HashSet, VecDeque};
use std::path::{Path, PathBuf};
use std::sync::Arc;

use futures::stream::{self, StreamExt};
use serde::{Deserialize, Serialize};
use tracing::{debug, info, warn};

use crate::collaborators::{
    Downloader, MediaAnalysis, MediaAnalyzer, SearchConstraints, SearchProvider, StorageLookup,
};
use crate::error::{PipelineError, PipelineResult};
use crate::request::VideoRequest;

const VIDEO_EXTENSIONS: [&str; 6] = ["mp4", "mov", "webm", "mkv", "avi", "m4v"];

pub const DEFAULT_IMAGE_RATIO: f64 = 0.7;
pub const DEFAULT_VIDEO_RATIO: f64 = 0.3;
const FALLBACK_TERMS: [&str; 3] = ["modern office", "technology", "business professional"];

const MIN_IMAGES: usize = 3;
const MAX_IMAGES: usize = 7;
const MIN_VIDEOS: usize = 1;
const MAX_VIDEOS: usize = 3;
const SECONDS_PER_ITEM: f64 = 3.0;
const STOCK_CLIP_SECONDS: (f64, f64) = (3.0, 10.0);

#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum AssetKind {
    Image,
    Video,
}

impl AssetKind {
    /// Guess the kind from a path or URL extension; images by default.
    pub fn from_path(path: &str) -> Self {
        let trimmed = path.split(['?', '#']).next().unwrap_or(path);
        let ext = Path::new(trimmed)
            .extension()
            .and_then(|e| e.to_str())
            .map(|e| e.to_ascii_lowercase());
        match ext {
            Some(ext) if VIDEO_EXTENSIONS.contains(&ext.as_str()) => AssetKind::Video,
            _ => AssetKind::Image,
        }
    }
}

#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum AssetSource {
    ExplicitStock,
    UserUpload,
    AutoFetched,
}

#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct MediaAsset {
    pub path: PathBuf,
    pub kind: AssetKind,
    pub source: AssetSource,
}

#[derive(Debug, Clone, PartialEq)]
pub struct ResolvedAssets {
    pub assets: Vec<MediaAsset>,
    pub source: AssetSource,
}

/// Target image and video counts for auto-fetch.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub struct MediaPlan {
    pub images: usize,
    pub videos: usize,
}

impl MediaPlan {
    /// Roughly one item per three seconds, split by the ratio and bounded.
    pub fn for_duration(duration: f64, image_ratio: f64, video_ratio: f64) -> Self {
        let (image_ratio, video_ratio) = normalize_ratio(image_ratio, video_ratio);
        let total = (duration / SECONDS_PER_ITEM).round().max(1.0);
        let images = ((total * image_ratio).round() as usize).clamp(MIN_IMAGES, MAX_IMAGES);
        let videos = ((total * video_ratio).round() as usize).clamp(MIN_VIDEOS, MAX_VIDEOS);
        Self { images, videos }
    }
}

fn normalize_ratio(image: f64, video: f64) -> (f64, f64) {
    let sum = image + video;
    if !(image.is_finite() && video.is_finite()) || image < 0.0 || video < 0.0 || sum <= 0.0 {
        return (DEFAULT_IMAGE_RATIO, DEFAULT_VIDEO_RATIO);
    }
    (image / sum, video / sum)
}

impl MediaAnalysis {
    /// Used whenever the analyzer fails.
    pub fn fallback() -> Self {
        let terms: Vec<String> = FALLBACK_TERMS.iter().map(|t| t.to_string()).collect();
        Self {
            image_ratio: DEFAULT_IMAGE_RATIO,
            video_ratio: DEFAULT_VIDEO_RATIO,
            static_terms: terms.clone(),
            dynamic_terms: terms,
        }
    }

    /// Replace unusable parts of an analysis with the fallback.
    fn sanitized(mut self) -> Self {
        let (image, video) = normalize_ratio(self.image_ratio, self.video_ratio);
        self.image_ratio = image;
        self.video_ratio = video;
        self.static_terms = distinct_terms(self.static_terms);
        self.dynamic_terms = distinct_terms(self.dynamic_terms);
        if self.static_terms.is_empty() {
            self.static_terms = Self::fallback().static_terms;
        }
        if self.dynamic_terms.is_empty() {
            self.dynamic_terms = self.static_terms.clone();
        }
        self
    }
}

fn distinct_terms(terms: Vec<String>) -> Vec<String> {
    let mut seen = HashSet::new();
    terms
        .into_iter()
        .map(|t| t.trim().to_string())
        .filter(|t| !t.is_empty() && seen.insert(t.to_lowercase()))
        .collect()
}

pub struct AssetResolver {
    storage: Arc<dyn StorageLookup>,
    downloader: Arc<dyn Downloader>,
    search: Arc<dyn SearchProvider>,
    analyzer: Arc<dyn MediaAnalyzer>,
    parallel_downloads: usize,
}

impl AssetResolver {
    pub fn new(
        storage: Arc<dyn StorageLookup>,
        downloader: Arc<dyn Downloader>,
        search: Arc<dyn SearchProvider>,
        analyzer: Arc<dyn MediaAnalyzer>,
        parallel_downloads: usize,
    ) -> Self {
        Self {
            storage,
            downloader,
            search,
            analyzer,
            parallel_downloads: parallel_downloads.max(1),
        }
    }

    /// Resolve the request's media into local files under `dest`.
    pub async fn resolve(&self, request: &VideoRequest, dest: &Path) -> PipelineResult<ResolvedAssets> {
        let resolved = if !request.media.explicit.is_empty() {
            info!("Using {} explicit stock media items", request.media.explicit.len());
            let urls: Vec<String> = request.media.explicit.iter().map(|m| m.url.clone()).collect();
            ResolvedAssets {
                assets: self.download_all(&urls, AssetSource::ExplicitStock, dest).await,
                source: AssetSource::ExplicitStock,
            }
        } else if !request.media.upload_ids.is_empty() {
            info!("Resolving {} uploaded media ids", request.media.upload_ids.len());
            let urls = self.lookup_uploads(&request.media.upload_ids).await;
            ResolvedAssets {
                assets: self.download_all(&urls, AssetSource::UserUpload, dest).await,
                source: AssetSource::UserUpload,
            }
        } else {
            ResolvedAssets {
                assets: self.auto_fetch(request, dest).await,
                source: AssetSource::AutoFetched,
            }
        };

        if resolved.assets.is_empty() {
            return Err(PipelineError::asset_fetch(format!(
                "no media assets could be resolved from {:?} sources",
                resolved.source
            )));
        }
        info!("Resolved {} media assets", resolved.assets.len());
        Ok(resolved)
    }

    async fn lookup_uploads(&self, ids: &[String]) -> Vec<String> {
        let mut urls = Vec::with_capacity(ids.len());
        for id in ids {
            match self.storage.resolve(id).await {
                Ok(Some(url)) => urls.push(url),
                Ok(None) => warn!("Uploaded media '{}' not found; skipping", id),
                Err(e) => warn!("Lookup of uploaded media '{}' failed: {:#}; skipping", id, e),
            }
        }
        urls
    }

    /// Download every URL, keeping input order and dropping failures.
    async fn download_all(&self, urls: &[String], source: AssetSource, dest: &Path) -> Vec<MediaAsset> {
        // Built up front so the stream holds plain futures and stays `Send`
        // for spawned jobs.
        let downloads: Vec<_> = urls
            .iter()
            .map(|url| self.download_one(url, source, dest))
            .collect();
        stream::iter(downloads)
            .buffered(self.parallel_downloads)
            .filter_map(|asset| async move { asset })
            .collect()
            .await
    }

    async fn download_one(&self, url: &str, source: AssetSource, dest: &Path) -> Option<MediaAsset> {
        match self.downloader.fetch(url, dest).await {
            Ok(path) => {
                debug!("Downloaded {} to {}", url, path.display());
                let kind = AssetKind::from_path(&path.to_string_lossy());
                Some(MediaAsset { path, kind, source })
            }
            Err(e) => {
                warn!("Download of {} failed: {:#}; skipping", url, e);
                None
            }
        }
    }

    async fn auto_fetch(&self, request: &VideoRequest, dest: &Path) -> Vec<MediaAsset> {
        let analysis = match self.analyzer.analyze(&request.content).await {
            Ok(analysis) => analysis.sanitized(),
            Err(e) => {
                warn!("Media analysis failed: {:#}; using default 70:30 mix", e);
                MediaAnalysis::fallback()
            }
        };
        let plan = MediaPlan::for_duration(request.duration, analysis.image_ratio, analysis.video_ratio);
        info!(
            "Auto-fetching {} images and {} videos (terms: {:?} / {:?})",
            plan.images, plan.videos, analysis.static_terms, analysis.dynamic_terms
        );

        let images = self
            .fetch_kind(&analysis.static_terms, AssetKind::Image, plan.images, dest)
            .await;
        let videos = self
            .fetch_kind(&analysis.dynamic_terms, AssetKind::Video, plan.videos, dest)
            .await;
        interleave(images, videos)
    }

    /// Search every term, then download candidates round-robin across terms
    /// until `target` succeed or the candidates run out.
    async fn fetch_kind(&self, terms: &[String], kind: AssetKind, target: usize, dest: &Path) -> Vec<MediaAsset> {
        let constraints = SearchConstraints {
            kind,
            count: target,
            clip_seconds: (kind == AssetKind::Video).then_some(STOCK_CLIP_SECONDS),
        };
        let mut per_term = Vec::with_capacity(terms.len());
        for term in terms {
            match self.search.search(term, &constraints).await {
                Ok(urls) => {
                    debug!("Search '{}' returned {} {:?} results", term, urls.len(), kind);
                    per_term.push(VecDeque::from(urls));
                }
                Err(e) => warn!("Search for '{}' failed: {:#}; skipping term", term, e),
            }
        }
        let candidates = round_robin(per_term);

        let mut fetched = Vec::with_capacity(target);
        let mut remaining = candidates.as_slice();
        while fetched.len() < target && !remaining.is_empty() {
            let take = (target - fetched.len()).min(remaining.len());
            let (batch, rest) = remaining.split_at(take);
            remaining = rest;
            let assets = self.download_all(batch, AssetSource::AutoFetched, dest).await;
            fetched.extend(assets.into_iter().map(|mut a| {
                a.kind = kind;
                a
            }));
        }
        if fetched.len() < target {
            warn!("Only {} of {} {:?} assets could be fetched", fetched.len(), target, kind);
        }
        fetched
    }
}

/// One URL from each term in turn, without duplicates.
fn round_robin(mut queues: Vec<VecDeque<String>>) -> Vec<String> {
    let mut seen = HashSet::new();
    let mut out = Vec::new();
    loop {
        let mut progressed = false;
        for queue in queues.iter_mut() {
            if let Some(url) = queue.pop_front() {
                progressed = true;
                if seen.insert(url.clone()) {
                    out.push(url);
                }
            }
        }
        if !progressed {
            return out;
        }
    }
}

/// Alternate images and videos, starting with an image.
fn interleave(images: Vec<MediaAsset>, videos: Vec<MediaAsset>) -> Vec<MediaAsset> {
    let mut out = Vec::with_capacity(images.len() + videos.len());
    let mut images = images.into_iter();
    let mut videos = videos.into_iter();
    loop {
        match (images.next(), videos.next()) {
            (None, None) => return out,
            (image, video) => {
                out.extend(image);
                out.extend(video);
            }
        }
    }
}
