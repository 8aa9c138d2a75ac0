use anyhow::Context;
use async_trait::async_trait;
use futures_util::StreamExt;
use reqwest::Client;
use std::path::{Path, PathBuf};
use std::time::Duration;
use tokio::io::AsyncWriteExt;
use url::Url;

use super::ThumbnailFetcher;
use crate::config::DEFAULT_USER_AGENT;
use crate::Result;

/// Downloads thumbnail images over plain HTTP(S)
pub struct DirectThumbnailFetcher {
    client: Client,
}

impl DirectThumbnailFetcher {
    pub fn new(timeout: Duration) -> Result<Self> {
        let client = Client::builder()
            .timeout(timeout)
            .user_agent(DEFAULT_USER_AGENT)
            .build()
            .context("Failed to build HTTP client")?;

        Ok(Self { client })
    }
}

/// Image extension from the URL path, defaulting to jpg
pub fn image_extension(url: &str) -> &'static str {
    let ext = Url::parse(url)
        .ok()
        .and_then(|parsed| {
            parsed
                .path_segments()
                .and_then(|mut segments| segments.next_back().map(|s| s.to_string()))
        })
        .and_then(|filename| {
            Path::new(&filename)
                .extension()
                .map(|e| e.to_string_lossy().to_lowercase())
        });

    match ext.as_deref() {
        Some("png") => "png",
        Some("webp") => "webp",
        _ => "jpg",
    }
}

#[async_trait]
impl ThumbnailFetcher for DirectThumbnailFetcher {
    async fn download(&self, url: &str, output: &Path) -> Result<PathBuf> {
        tracing::debug!("Downloading thumbnail {}", url);

        let response = self.client.get(url).send().await?;

        if !response.status().is_success() {
            anyhow::bail!("Failed to download thumbnail: HTTP {}", response.status());
        }

        let mut file = tokio::fs::File::create(output)
            .await
            .with_context(|| format!("Failed to create {}", output.display()))?;
        let mut stream = response.bytes_stream();
        let mut written = 0u64;

        while let Some(chunk) = stream.next().await {
            let chunk = chunk?;
            file.write_all(&chunk).await?;
            written += chunk.len() as u64;
        }
        file.flush().await?;

        if written == 0 {
            anyhow::bail!("Thumbnail response was empty");
        }

        Ok(output.to_path_buf())
    }
}
