use async_trait::async_trait;
use reqwest::header::{AUTHORIZATION, USER_AGENT};
use serde::Deserialize;
use tracing::{debug, info};

use crate::assets::AssetKind;
use crate::collaborators::{SearchConstraints, SearchProvider};

const PHOTO_SEARCH_URL: &str = "https://api.pexels.com/v1/search";
const VIDEO_SEARCH_URL: &str = "https://api.pexels.com/videos/search";
/// Preferred clip length when ranking equally wide videos.
const IDEAL_CLIP_SECONDS: f64 = 6.0;

#[derive(Debug, Deserialize)]
pub struct PhotoListing {
    #[serde(default)]
    pub photos: Vec<Photo>,
}

#[derive(Debug, Deserialize)]
pub struct Photo {
    pub id: u64,
    pub src: PhotoSources,
}

#[derive(Debug, Deserialize)]
pub struct PhotoSources {
    pub original: Option<String>,
    pub large2x: Option<String>,
    pub large: Option<String>,
}

#[derive(Debug, Deserialize)]
pub struct VideoListing {
    #[serde(default)]
    pub videos: Vec<Video>,
}

#[derive(Debug, Deserialize)]
pub struct Video {
    pub id: u64,
    pub duration: f64,
    #[serde(default)]
    pub video_files: Vec<VideoFile>,
}

#[derive(Debug, Deserialize)]
pub struct VideoFile {
    pub link: String,
    pub quality: Option<String>,
    pub width: Option<u32>,
    pub height: Option<u32>,
}

/// Stock search over the Pexels photo and video APIs.
pub struct PexelsSearch {
    client: reqwest::Client,
    api_key: String,
}

impl PexelsSearch {
    pub fn new(api_key: impl Into<String>) -> Self {
        Self {
            client: reqwest::Client::new(),
            api_key: api_key.into(),
        }
    }

    async fn get<T: serde::de::DeserializeOwned>(&self, url: &str, term: &str, per_page: usize) -> anyhow::Result<T> {
        let per_page = per_page.to_string();
        let res = self
            .client
            .get(url)
            .query(&[
                ("query", term),
                ("per_page", per_page.as_str()),
                ("orientation", "landscape"),
            ])
            .header(AUTHORIZATION, &self.api_key)
            .header(USER_AGENT, "narrated/0.1")
            .send()
            .await?
            .error_for_status()?
            .text()
            .await?;
        Ok(serde_json::from_str(&res)?)
    }
}

#[async_trait]
impl SearchProvider for PexelsSearch {
    async fn search(&self, term: &str, constraints: &SearchConstraints) -> anyhow::Result<Vec<String>> {
        let wanted = constraints.count.max(1);
        let urls = match constraints.kind {
            AssetKind::Image => {
                let listing: PhotoListing = self.get(PHOTO_SEARCH_URL, term, wanted).await?;
                photo_urls(listing)
            }
            AssetKind::Video => {
                // Over-fetch; many clips fall outside the length window.
                let listing: VideoListing = self.get(VIDEO_SEARCH_URL, term, wanted * 2).await?;
                video_urls(listing, constraints.clip_seconds, wanted)
            }
        };
        info!("Pexels '{}' gave {} {:?} results", term, urls.len(), constraints.kind);
        Ok(urls)
    }
}

pub fn photo_urls(listing: PhotoListing) -> Vec<String> {
    listing
        .photos
        .into_iter()
        .filter_map(|p| p.src.large2x.or(p.src.large).or(p.src.original))
        .collect()
}

/// Best file of each clip within `clip_seconds`, widest first.
pub fn video_urls(listing: VideoListing, clip_seconds: Option<(f64, f64)>, limit: usize) -> Vec<String> {
    let mut picked: Vec<(u32, f64, String)> = listing
        .videos
        .into_iter()
        .filter(|v| match clip_seconds {
            Some((min, max)) => {
                let fits = (min..=max).contains(&v.duration);
                if !fits {
                    debug!("Skipping Pexels video {} ({:.0}s)", v.id, v.duration);
                }
                fits
            }
            None => true,
        })
        .filter_map(|v| {
            let file = best_file(&v.video_files)?;
            Some((file.width.unwrap_or(0), v.duration, file.link.clone()))
        })
        .collect();
    picked.sort_by(|a, b| {
        b.0.cmp(&a.0).then_with(|| {
            let da = (a.1 - IDEAL_CLIP_SECONDS).abs();
            let db = (b.1 - IDEAL_CLIP_SECONDS).abs();
            da.total_cmp(&db)
        })
    });
    picked.into_iter().take(limit).map(|(_, _, link)| link).collect()
}

/// HD up to 1920 wide, then SD from 640, then whatever comes first.
fn best_file(files: &[VideoFile]) -> Option<&VideoFile> {
    let quality = |f: &VideoFile, q: &str| f.quality.as_deref() == Some(q);
    files
        .iter()
        .find(|f| quality(f, "hd") && matches!(f.width, Some(w) if (720..=1920).contains(&w)))
        .or_else(|| {
            files
                .iter()
                .find(|f| quality(f, "sd") && matches!(f.width, Some(w) if w >= 640))
        })
        .or_else(|| files.first())
}

#[cfg(test)]
mod tests {
    use super::*;

    const VIDEOS: &str = r#"{
        "videos": [
            {"id": 1, "duration": 12, "video_files": [
                {"link": "https://v/1-hd.mp4", "quality": "hd", "width": 1920, "height": 1080}]},
            {"id": 2, "duration": 5, "video_files": [
                {"link": "https://v/2-uhd.mp4", "quality": "uhd", "width": 3840, "height": 2160},
                {"link": "https://v/2-hd.mp4", "quality": "hd", "width": 1280, "height": 720}]},
            {"id": 3, "duration": 8, "video_files": [
                {"link": "https://v/3-sd.mp4", "quality": "sd", "width": 960, "height": 540}]},
            {"id": 4, "duration": 6, "video_files": [
                {"link": "https://v/4-hd.mp4", "quality": "hd", "width": 1920, "height": 1080}]}
        ]
    }"#;

    #[test]
    fn videos_filtered_by_length_and_sorted_by_width() {
        let listing: VideoListing = serde_json::from_str(VIDEOS).unwrap();
        let urls = video_urls(listing, Some((3.0, 10.0)), 5);
        assert_eq!(urls, vec!["https://v/4-hd.mp4", "https://v/2-hd.mp4", "https://v/3-sd.mp4"]);
    }

    #[test]
    fn equal_widths_prefer_clips_near_six_seconds() {
        let listing: VideoListing = serde_json::from_str(VIDEOS).unwrap();
        assert_eq!(
            video_urls(listing, None, 2),
            vec!["https://v/4-hd.mp4", "https://v/1-hd.mp4"]
        );
    }

    #[test]
    fn photo_prefers_large2x() {
        let listing: PhotoListing = serde_json::from_str(
            r#"{"photos": [
                {"id": 1, "src": {"original": "o1", "large2x": "l2x1", "large": "l1"}},
                {"id": 2, "src": {"original": "o2"}}
            ]}"#,
        )
        .unwrap();
        assert_eq!(photo_urls(listing), vec!["l2x1", "o2"]);
    }
}
