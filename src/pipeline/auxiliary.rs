//! Best-effort screenshot and thumbnail extraction.
//!
//! Each step produces `Result<Option<PathBuf>, AuxiliaryWarning>`; a warning is
//! logged and absorbed, never turned into a job failure.

use std::path::{Path, PathBuf};
use std::sync::Arc;

use crate::extractors::direct::image_extension;
use crate::extractors::{FetchedMedia, FrameCapturer, ThumbnailFetcher, VideoMetadata};
use crate::AuxiliaryWarning;

/// Static thumbnail renditions YouTube serves for every video, best first
const THUMBNAIL_RENDITIONS: &[&str] = &[
    "maxresdefault",
    "hqdefault",
    "mqdefault",
    "sddefault",
    "default",
];

/// Well-known thumbnail URLs for a video id, in order of preference
pub fn fallback_thumbnail_urls(video_id: &str) -> Vec<String> {
    THUMBNAIL_RENDITIONS
        .iter()
        .map(|name| format!("https://img.youtube.com/vi/{}/{}.jpg", video_id, name))
        .collect()
}

/// Images produced alongside the audio segment
#[derive(Debug, Clone, Default, PartialEq, Eq)]
pub struct AuxiliaryArtifacts {
    pub screenshot: Option<PathBuf>,
    pub thumbnail: Option<PathBuf>,
}

pub struct AuxiliaryExtractor {
    /// `None` disables screenshot capture
    frames: Option<Arc<dyn FrameCapturer>>,
    thumbnails: Arc<dyn ThumbnailFetcher>,
}

impl AuxiliaryExtractor {
    pub fn new(
        frames: Option<Arc<dyn FrameCapturer>>,
        thumbnails: Arc<dyn ThumbnailFetcher>,
    ) -> Self {
        Self { frames, thumbnails }
    }

    /// Run both steps; failures degrade to absent artifacts
    pub async fn extract(
        &self,
        media: &FetchedMedia,
        video_id: &str,
        at_seconds: u64,
        workspace: &Path,
    ) -> AuxiliaryArtifacts {
        let screenshot = self
            .capture_screenshot(&media.path, at_seconds, workspace)
            .await
            .unwrap_or_else(|warning| {
                tracing::warn!("{}", warning);
                None
            });

        let thumbnail = self
            .download_thumbnail(&media.metadata, video_id, workspace)
            .await
            .map(Some)
            .unwrap_or_else(|warning| {
                tracing::warn!("{}", warning);
                None
            });

        AuxiliaryArtifacts {
            screenshot,
            thumbnail,
        }
    }

    /// Grab the frame at the segment start
    pub async fn capture_screenshot(
        &self,
        media_path: &Path,
        at_seconds: u64,
        workspace: &Path,
    ) -> Result<Option<PathBuf>, AuxiliaryWarning> {
        let Some(frames) = &self.frames else {
            return Ok(None);
        };

        let output = workspace.join("screenshot.jpg");
        frames
            .capture(media_path, at_seconds, &output)
            .await
            .map(Some)
            .map_err(|e| AuxiliaryWarning::Screenshot(format!("{:#}", e)))
    }

    /// Download the thumbnail the source advertised, then fall back to the
    /// well-known renditions for the video id
    pub async fn download_thumbnail(
        &self,
        metadata: &VideoMetadata,
        video_id: &str,
        workspace: &Path,
    ) -> Result<PathBuf, AuxiliaryWarning> {
        let candidates: Vec<String> = metadata
            .thumbnail_url
            .iter()
            .cloned()
            .chain(fallback_thumbnail_urls(video_id))
            .collect();

        let mut last_error = None;
        for url in &candidates {
            let output = workspace.join(format!("thumbnail.{}", image_extension(url)));
            match self.thumbnails.download(url, &output).await {
                Ok(path) => return Ok(path),
                Err(e) => {
                    tracing::debug!("Thumbnail {} unavailable: {:#}", url, e);
                    last_error = Some(e);
                }
            }
        }

        Err(AuxiliaryWarning::Thumbnail(format!(
            "none of {} candidates could be downloaded, last error: {}",
            candidates.len(),
            last_error.map(|e| format!("{:#}", e)).unwrap_or_default()
        )))
    }
}
