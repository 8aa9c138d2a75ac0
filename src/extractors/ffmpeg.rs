use anyhow::Context;
use async_trait::async_trait;
use std::path::{Path, PathBuf};
use tokio::process::Command;

use super::{FrameCapturer, OutputFormat, SegmentTranscoder};
use crate::config::{AuxiliaryConfig, TranscoderConfig};
use crate::validate::TimeRange;
use crate::Result;

/// Loudness normalization followed by gentle dynamics compression
const LOUDNESS_FILTER: &str =
    "loudnorm=I=-16:TP=-1.5:LRA=11,acompressor=threshold=-18dB:ratio=3:attack=20:release=250";

const SAMPLE_RATE: &str = "44100";

/// Segment transcoder backed by the ffmpeg binary
pub struct FfmpegTranscoder {
    config: TranscoderConfig,
}

impl FfmpegTranscoder {
    pub fn new(config: TranscoderConfig) -> Self {
        Self { config }
    }

    fn build_args(
        &self,
        input: &Path,
        range: TimeRange,
        format: OutputFormat,
        output: &Path,
    ) -> Vec<String> {
        let mut args: Vec<String> = vec![
            "-hide_banner".into(),
            "-loglevel".into(),
            "error".into(),
            "-y".into(),
            // Input seeking, then a duration so the cut is [start, end)
            "-ss".into(),
            range.start_seconds().to_string(),
            "-i".into(),
            input.to_string_lossy().into_owned(),
            "-t".into(),
            range.length_seconds().to_string(),
            "-vn".into(),
        ];

        if self.config.loudness_filter {
            args.push("-af".to_string());
            args.push(LOUDNESS_FILTER.to_string());
        }

        let codec = match format {
            OutputFormat::Mp3 => "libmp3lame",
            OutputFormat::Wav => "pcm_s16le",
        };
        args.push("-codec:a".to_string());
        args.push(codec.to_string());
        if format == OutputFormat::Mp3 {
            args.push("-b:a".to_string());
            args.push(self.config.mp3_bitrate.clone());
        }

        args.push("-ar".to_string());
        args.push(SAMPLE_RATE.to_string());
        args.push(output.to_string_lossy().into_owned());
        args
    }
}

#[async_trait]
impl SegmentTranscoder for FfmpegTranscoder {
    async fn transcode(
        &self,
        input: &Path,
        range: TimeRange,
        format: OutputFormat,
        output: &Path,
    ) -> Result<PathBuf> {
        tracing::debug!(
            "Transcoding {} [{}] to {}",
            input.display(),
            range,
            output.display()
        );

        run_ffmpeg(&self.config.ffmpeg_path, self.build_args(input, range, format, output)).await?;

        let size = tokio::fs::metadata(output)
            .await
            .with_context(|| format!("ffmpeg did not produce {}", output.display()))?
            .len();
        if size == 0 {
            anyhow::bail!("ffmpeg produced an empty file: {}", output.display());
        }

        Ok(output.to_path_buf())
    }
}

impl Default for FfmpegTranscoder {
    fn default() -> Self {
        Self::new(TranscoderConfig::default())
    }
}

/// Still frame capture backed by the ffmpeg binary
pub struct FfmpegFrameCapturer {
    ffmpeg_path: String,
    width: u32,
    height: u32,
}

impl FfmpegFrameCapturer {
    pub fn new(ffmpeg_path: impl Into<String>, config: &AuxiliaryConfig) -> Self {
        Self {
            ffmpeg_path: ffmpeg_path.into(),
            width: config.screenshot_width,
            height: config.screenshot_height,
        }
    }

    fn build_args(&self, input: &Path, at_seconds: u64, output: &Path) -> Vec<String> {
        vec![
            "-hide_banner".into(),
            "-loglevel".into(),
            "error".into(),
            "-y".into(),
            "-ss".into(),
            at_seconds.to_string(),
            "-i".into(),
            input.to_string_lossy().into_owned(),
            "-frames:v".into(),
            "1".into(),
            "-vf".into(),
            format!("scale={}:{}", self.width, self.height),
            "-q:v".into(),
            "2".into(),
            output.to_string_lossy().into_owned(),
        ]
    }
}

#[async_trait]
impl FrameCapturer for FfmpegFrameCapturer {
    async fn capture(&self, input: &Path, at_seconds: u64, output: &Path) -> Result<PathBuf> {
        run_ffmpeg(&self.ffmpeg_path, self.build_args(input, at_seconds, output)).await?;

        // ffmpeg exits cleanly without writing anything when the input has no video stream
        if !tokio::fs::try_exists(output).await.unwrap_or(false) {
            anyhow::bail!("no video frame available at {}s", at_seconds);
        }

        Ok(output.to_path_buf())
    }
}

async fn run_ffmpeg(ffmpeg_path: &str, args: Vec<String>) -> Result<()> {
    let output = Command::new(ffmpeg_path)
        .args(&args)
        .kill_on_drop(true)
        .output()
        .await
        .with_context(|| format!("Failed to run {}", ffmpeg_path))?;

    if !output.status.success() {
        let error = String::from_utf8_lossy(&output.stderr);
        anyhow::bail!("ffmpeg exited with {}: {}", output.status, error.trim());
    }

    Ok(())
}

#[cfg(test)]
mod tests {
    use super::*;

    fn value_after<'a>(args: &'a [String], flag: &str) -> Option<&'a str> {
        args.iter()
            .position(|a| a == flag)
            .map(|pos| args[pos + 1].as_str())
    }

    #[test]
    fn test_transcode_args_cut_segment() {
        let transcoder = FfmpegTranscoder::default();
        let range = TimeRange::new(5, 8).unwrap();
        let args = transcoder.build_args(
            Path::new("/ws/source.webm"),
            range,
            OutputFormat::Mp3,
            Path::new("/ws/output.mp3"),
        );

        assert_eq!(value_after(&args, "-ss"), Some("5"));
        assert_eq!(value_after(&args, "-t"), Some("3"));
        assert_eq!(value_after(&args, "-i"), Some("/ws/source.webm"));
        assert_eq!(value_after(&args, "-codec:a"), Some("libmp3lame"));
        assert_eq!(value_after(&args, "-af"), Some(LOUDNESS_FILTER));
        assert_eq!(args.last().map(String::as_str), Some("/ws/output.mp3"));
    }

    #[test]
    fn test_transcode_args_wav_without_filter() {
        let transcoder = FfmpegTranscoder::new(TranscoderConfig {
            loudness_filter: false,
            ..TranscoderConfig::default()
        });
        let args = transcoder.build_args(
            Path::new("in.m4a"),
            TimeRange::new(0, 10).unwrap(),
            OutputFormat::Wav,
            Path::new("out.wav"),
        );

        assert_eq!(value_after(&args, "-codec:a"), Some("pcm_s16le"));
        assert_eq!(value_after(&args, "-af"), None);
        assert_eq!(value_after(&args, "-b:a"), None);
    }

    #[test]
    fn test_frame_args_scale_to_configured_resolution() {
        let capturer = FfmpegFrameCapturer::new("ffmpeg", &AuxiliaryConfig::default());
        let args = capturer.build_args(Path::new("in.mp4"), 42, Path::new("shot.jpg"));

        assert_eq!(value_after(&args, "-ss"), Some("42"));
        assert_eq!(value_after(&args, "-frames:v"), Some("1"));
        assert_eq!(value_after(&args, "-vf"), Some("scale=1280:720"));
    }

    #[tokio::test]
    async fn test_missing_binary_is_an_error() {
        let transcoder = FfmpegTranscoder::new(TranscoderConfig {
            ffmpeg_path: "/nonexistent/ffmpeg".to_string(),
            ..TranscoderConfig::default()
        });
        let result = transcoder
            .transcode(
                Path::new("in.webm"),
                TimeRange::new(0, 1).unwrap(),
                OutputFormat::Mp3,
                Path::new("out.mp3"),
            )
            .await;
        assert!(result.is_err());
    }
}
