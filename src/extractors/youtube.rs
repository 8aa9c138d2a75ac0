use anyhow::Context;
use async_trait::async_trait;
use serde_json::Value;
use std::path::{Path, PathBuf};
use std::process::Stdio;
use tokio::process::Command;

use super::{FetchedMedia, MediaFetcher, VideoMetadata};
use crate::config::FetcherConfig;
use crate::validate::SourceUrl;
use crate::Result;

/// File stem yt-dlp writes the source media under inside a workspace
const SOURCE_STEM: &str = "source";

/// YouTube media fetcher using yt-dlp
pub struct YoutubeFetcher {
    config: FetcherConfig,
}

impl YoutubeFetcher {
    pub fn new(config: FetcherConfig) -> Self {
        Self { config }
    }

    fn build_args(&self, url: &str, workspace: &Path) -> Vec<String> {
        let retries = self.config.retries.to_string();
        let template = workspace.join(format!("{}.%(ext)s", SOURCE_STEM));

        vec![
            "--format".to_string(),
            self.config.format_selector.clone(),
            "--no-playlist".to_string(),
            "--no-warnings".to_string(),
            "--no-cache-dir".to_string(),
            "--no-progress".to_string(),
            // Network resilience
            "--retries".to_string(),
            retries.clone(),
            "--fragment-retries".to_string(),
            retries.clone(),
            "--extractor-retries".to_string(),
            retries,
            "--socket-timeout".to_string(),
            self.config.socket_timeout_secs.to_string(),
            // Look like a regular browser to avoid 403s
            "--user-agent".to_string(),
            self.config.user_agent.clone(),
            "--add-header".to_string(),
            "Accept-Language:en-us,en;q=0.5".to_string(),
            "--output".to_string(),
            template.to_string_lossy().into_owned(),
            // Download and print the info dict in one pass
            "--dump-single-json".to_string(),
            "--no-simulate".to_string(),
            url.to_string(),
        ]
    }

    /// Pull the fields we care about out of the yt-dlp info dict
    fn parse_metadata(info: &Value) -> VideoMetadata {
        let title = info["title"]
            .as_str()
            .filter(|t| !t.is_empty())
            .unwrap_or("Unknown Title")
            .to_string();

        let duration_seconds = info["duration"]
            .as_f64()
            .filter(|d| d.is_finite() && *d > 0.0)
            .map(|d| d.trunc() as u64);

        VideoMetadata {
            title,
            duration_seconds,
            uploader: info["uploader"].as_str().map(|s| s.to_string()),
            view_count: info["view_count"].as_u64(),
            thumbnail_url: info["thumbnail"]
                .as_str()
                .filter(|s| !s.is_empty())
                .map(|s| s.to_string()),
        }
    }

    /// Find the file yt-dlp actually wrote, which may differ from the template
    /// after post-processing
    async fn locate_download(info: &Value, workspace: &Path) -> Result<PathBuf> {
        let reported = info["requested_downloads"][0]["filepath"]
            .as_str()
            .or_else(|| info["filepath"].as_str())
            .or_else(|| info["_filename"].as_str())
            .map(PathBuf::from);

        if let Some(path) = reported {
            if tokio::fs::try_exists(&path).await.unwrap_or(false) {
                return Ok(path);
            }
        }

        let mut entries = tokio::fs::read_dir(workspace)
            .await
            .context("Failed to read workspace")?;
        while let Some(entry) = entries.next_entry().await? {
            let path = entry.path();
            let is_source = path
                .file_stem()
                .and_then(|s| s.to_str())
                .map(|stem| stem == SOURCE_STEM)
                .unwrap_or(false);
            let is_partial = path
                .extension()
                .and_then(|e| e.to_str())
                .map(|ext| ext == "part" || ext == "ytdl")
                .unwrap_or(false);
            if is_source && !is_partial && path.is_file() {
                return Ok(path);
            }
        }

        anyhow::bail!("yt-dlp reported success but no media file was written")
    }
}

#[async_trait]
impl MediaFetcher for YoutubeFetcher {
    async fn fetch(&self, url: &SourceUrl, workspace: &Path) -> Result<FetchedMedia> {
        tracing::debug!("Fetching media for {} into {}", url, workspace.display());

        let output = Command::new(&self.config.yt_dlp_path)
            .args(self.build_args(url.as_str(), workspace))
            .stdout(Stdio::piped())
            .stderr(Stdio::piped())
            .kill_on_drop(true)
            .output()
            .await
            .with_context(|| format!("Failed to run {}", self.config.yt_dlp_path))?;

        if !output.status.success() {
            let error = String::from_utf8_lossy(&output.stderr);
            anyhow::bail!("yt-dlp failed: {}", error.trim());
        }

        let info: Value = serde_json::from_slice(&output.stdout)
            .context("yt-dlp returned malformed metadata")?;

        let metadata = Self::parse_metadata(&info);
        let path = Self::locate_download(&info, workspace).await?;

        tracing::info!(
            "Fetched \"{}\" ({:?}s) by {}",
            metadata.title,
            metadata.duration_seconds,
            metadata.uploader.as_deref().unwrap_or("unknown uploader")
        );

        Ok(FetchedMedia { path, metadata })
    }
}

impl Default for YoutubeFetcher {
    fn default() -> Self {
        Self::new(FetcherConfig::default())
    }
}
