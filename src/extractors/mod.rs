use async_trait::async_trait;
use serde::{Deserialize, Serialize};
use std::fmt;
use std::path::{Path, PathBuf};
use std::str::FromStr;

pub mod direct;
pub mod ffmpeg;
pub mod youtube;

use crate::validate::{SourceUrl, TimeRange};
use crate::{ExtractError, Result};

/// Descriptive metadata reported by the media fetcher
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct VideoMetadata {
    /// Title of the video
    pub title: String,

    /// Duration in whole seconds, if the source reported one
    pub duration_seconds: Option<u64>,

    /// Channel or uploader name
    pub uploader: Option<String>,

    /// View count at fetch time
    pub view_count: Option<u64>,

    /// Upstream thumbnail image URL
    pub thumbnail_url: Option<String>,
}

/// Raw media fetched into a workspace
#[derive(Debug, Clone)]
pub struct FetchedMedia {
    pub path: PathBuf,
    pub metadata: VideoMetadata,
}

/// Supported output formats
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize, Deserialize)]
#[serde(rename_all = "lowercase")]
pub enum OutputFormat {
    Mp3,
    Wav,
}

impl OutputFormat {
    pub fn as_str(&self) -> &'static str {
        match self {
            OutputFormat::Mp3 => "mp3",
            OutputFormat::Wav => "wav",
        }
    }

    /// Get MIME type for the format
    pub fn mime_type(&self) -> &'static str {
        match self {
            OutputFormat::Mp3 => "audio/mpeg",
            OutputFormat::Wav => "audio/wav",
        }
    }
}

impl Default for OutputFormat {
    fn default() -> Self {
        OutputFormat::Mp3
    }
}

impl FromStr for OutputFormat {
    type Err = ExtractError;

    fn from_str(s: &str) -> std::result::Result<Self, Self::Err> {
        match s.trim().to_lowercase().as_str() {
            "mp3" => Ok(OutputFormat::Mp3),
            "wav" => Ok(OutputFormat::Wav),
            _ => Err(ExtractError::UnsupportedFormat(s.to_string())),
        }
    }
}

impl fmt::Display for OutputFormat {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(self.as_str())
    }
}

/// Retrieves the best available audio stream and its metadata
#[async_trait]
pub trait MediaFetcher: Send + Sync {
    /// Download the media behind `url` into `workspace`
    async fn fetch(&self, url: &SourceUrl, workspace: &Path) -> Result<FetchedMedia>;
}

/// Cuts `[start, end)` out of a local media file and re-encodes it
#[async_trait]
pub trait SegmentTranscoder: Send + Sync {
    async fn transcode(
        &self,
        input: &Path,
        range: TimeRange,
        format: OutputFormat,
        output: &Path,
    ) -> Result<PathBuf>;
}

/// Captures a single still frame from local media
#[async_trait]
pub trait FrameCapturer: Send + Sync {
    async fn capture(&self, input: &Path, at_seconds: u64, output: &Path) -> Result<PathBuf>;
}

/// Downloads a remote thumbnail image
#[async_trait]
pub trait ThumbnailFetcher: Send + Sync {
    async fn download(&self, url: &str, output: &Path) -> Result<PathBuf>;
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_output_format_parsing() {
        assert_eq!("mp3".parse::<OutputFormat>().unwrap(), OutputFormat::Mp3);
        assert_eq!(" WAV ".parse::<OutputFormat>().unwrap(), OutputFormat::Wav);
        for raw in ["flac", "", "ogg", "mp4"] {
            assert_eq!(
                raw.parse::<OutputFormat>(),
                Err(ExtractError::UnsupportedFormat(raw.to_string()))
            );
        }
    }

    #[test]
    fn test_mime_types() {
        assert_eq!(OutputFormat::Mp3.mime_type(), "audio/mpeg");
        assert_eq!(OutputFormat::Wav.mime_type(), "audio/wav");
        assert_eq!(OutputFormat::default(), OutputFormat::Mp3);
    }
}
