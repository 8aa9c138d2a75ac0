use serde::{Deserialize, Serialize};
use std::fmt;
use std::path::{Path, PathBuf};
use std::sync::Arc;
use std::time::Duration;
use tempfile::TempDir;

pub mod auxiliary;

use crate::config::Config;
use crate::extractors::direct::DirectThumbnailFetcher;
use crate::extractors::ffmpeg::{FfmpegFrameCapturer, FfmpegTranscoder};
use crate::extractors::youtube::YoutubeFetcher;
use crate::extractors::{
    FetchedMedia, FrameCapturer, MediaFetcher, OutputFormat, SegmentTranscoder, VideoMetadata,
};
use crate::jobs::ProgressReporter;
use crate::service::FileId;
use crate::utils::sanitize_filename;
use crate::validate::{SourceUrl, TimeRange, TimeValue};
use crate::ExtractError;

pub use auxiliary::{AuxiliaryArtifacts, AuxiliaryExtractor};

/// A request to extract one audio segment
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct ExtractionRequest {
    #[serde(alias = "youtube_url")]
    pub source_url: String,

    pub start_time: TimeValue,

    pub end_time: TimeValue,

    /// `mp3` or `wav`; anything else fails the job
    #[serde(default = "default_output_format")]
    pub output_format: String,
}

fn default_output_format() -> String {
    OutputFormat::default().as_str().to_string()
}

impl ExtractionRequest {
    pub fn new(
        source_url: impl Into<String>,
        start_time: impl Into<TimeValue>,
        end_time: impl Into<TimeValue>,
        output_format: impl Into<String>,
    ) -> Self {
        Self {
            source_url: source_url.into(),
            start_time: start_time.into(),
            end_time: end_time.into(),
            output_format: output_format.into(),
        }
    }
}

/// Outcome of a successful extraction
#[derive(Debug, Clone, PartialEq, Eq, Serialize)]
pub struct ExtractionResult {
    /// Persisted audio segment
    pub audio_path: PathBuf,

    /// Frame captured at the segment start
    pub screenshot_path: Option<PathBuf>,

    /// Upstream thumbnail image
    pub thumbnail_path: Option<PathBuf>,

    pub metadata: VideoMetadata,

    pub range: TimeRange,

    pub format: OutputFormat,
}

impl ExtractionResult {
    /// Human-friendly download name: `<title>_<start>-<end>.<ext>`
    pub fn suggested_filename(&self) -> String {
        let range = self.range.to_string().replace(':', "-");
        let title = sanitize_filename(&self.metadata.title);
        let title = if title.is_empty() {
            "clip".to_string()
        } else {
            title
        };
        format!("{}_{}.{}", title, range, self.format.as_str())
    }
}

/// A finished job's output and the id it can be downloaded under
#[derive(Debug, Clone)]
pub struct CompletedExtraction {
    pub file_id: FileId,
    pub result: ExtractionResult,
}

/// Pipeline states, each reporting a coarse progress figure
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum PipelineStage {
    Validating,
    Fetching,
    NormalizingTimestamps,
    ExtractingAuxiliary,
    Transcoding,
    Finalized,
}

impl PipelineStage {
    pub fn progress(&self) -> u8 {
        match self {
            PipelineStage::Validating => 5,
            PipelineStage::Fetching => 10,
            PipelineStage::NormalizingTimestamps => 30,
            PipelineStage::ExtractingAuxiliary => 50,
            PipelineStage::Transcoding => 70,
            PipelineStage::Finalized => 100,
        }
    }
}

impl fmt::Display for PipelineStage {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        let label = match self {
            PipelineStage::Validating => "VALIDATE",
            PipelineStage::Fetching => "DOWNLOAD",
            PipelineStage::NormalizingTimestamps => "TIMESTAMP",
            PipelineStage::ExtractingAuxiliary => "AUXILIARY",
            PipelineStage::Transcoding => "EXTRACT",
            PipelineStage::Finalized => "FINALIZE",
        };
        f.write_str(label)
    }
}

/// Ephemeral per-job directory, removed when closed or dropped
#[derive(Debug)]
pub struct Workspace {
    dir: TempDir,
}

impl Workspace {
    pub async fn create(parent: Option<&Path>) -> Result<Self, ExtractError> {
        let failed = |e: std::io::Error| {
            ExtractError::Internal(format!("Failed to create workspace: {}", e))
        };

        if let Some(parent) = parent {
            tokio::fs::create_dir_all(parent).await.map_err(failed)?;
        }

        let mut builder = tempfile::Builder::new();
        builder.prefix("clipforge-");
        let dir = match parent {
            Some(parent) => builder.tempdir_in(parent),
            None => builder.tempdir(),
        }
        .map_err(failed)?;

        Ok(Self { dir })
    }

    pub fn path(&self) -> &Path {
        self.dir.path()
    }

    /// Delete the directory now, logging rather than failing on error
    pub fn close(self) {
        let path = self.dir.path().to_path_buf();
        match self.dir.close() {
            Ok(()) => tracing::debug!("Removed workspace {}", path.display()),
            Err(e) => tracing::warn!("Failed to remove workspace {}: {}", path.display(), e),
        }
    }
}

/// Validated inputs, all checked before any network or process work
struct ValidatedRequest {
    url: SourceUrl,
    range: TimeRange,
    format: OutputFormat,
}

/// Runs one extraction from validation to persisted output
pub struct ExtractionPipeline {
    fetcher: Arc<dyn MediaFetcher>,
    transcoder: Arc<dyn SegmentTranscoder>,
    auxiliary: AuxiliaryExtractor,
    work_dir: Option<PathBuf>,
    output_dir: PathBuf,
}

impl ExtractionPipeline {
    /// Pipeline wired to yt-dlp, ffmpeg and HTTP thumbnail download
    pub fn new(config: &Config) -> crate::Result<Self> {
        let frames = config.auxiliary.screenshot.then(|| {
            Arc::new(FfmpegFrameCapturer::new(
                config.transcoder.ffmpeg_path.clone(),
                &config.auxiliary,
            )) as Arc<dyn FrameCapturer>
        });
        let thumbnails = DirectThumbnailFetcher::new(Duration::from_secs(
            config.auxiliary.thumbnail_timeout_secs,
        ))?;

        Ok(Self::with_collaborators(
            Arc::new(YoutubeFetcher::new(config.fetcher.clone())),
            Arc::new(FfmpegTranscoder::new(config.transcoder.clone())),
            AuxiliaryExtractor::new(frames, Arc::new(thumbnails)),
            config.app.work_dir.clone(),
            config.app.output_dir.clone(),
        ))
    }

    pub fn with_collaborators(
        fetcher: Arc<dyn MediaFetcher>,
        transcoder: Arc<dyn SegmentTranscoder>,
        auxiliary: AuxiliaryExtractor,
        work_dir: Option<PathBuf>,
        output_dir: PathBuf,
    ) -> Self {
        Self {
            fetcher,
            transcoder,
            auxiliary,
            work_dir,
            output_dir,
        }
    }

    /// Run the pipeline for one request
    ///
    /// The workspace is gone by the time this returns, whatever the outcome.
    pub async fn run(
        &self,
        request: &ExtractionRequest,
        progress: &ProgressReporter,
    ) -> Result<CompletedExtraction, ExtractError> {
        let job_id = progress.job_id();

        self.enter(PipelineStage::Validating, progress).await;
        let validated = Self::validate(request)?;

        let workspace = Workspace::create(self.work_dir.as_deref()).await?;
        tracing::debug!("[{}] workspace {}", job_id, workspace.path().display());

        let outcome = self.run_in_workspace(&workspace, validated, progress).await;
        workspace.close();

        if let Err(e) = &outcome {
            tracing::error!("[{}] extraction failed: {}", job_id, e);
        }
        outcome
    }

    fn validate(request: &ExtractionRequest) -> Result<ValidatedRequest, ExtractError> {
        let url = SourceUrl::parse(&request.source_url)?;
        let range = TimeRange::from_values(&request.start_time, &request.end_time)?;
        let format: OutputFormat = request.output_format.parse()?;

        Ok(ValidatedRequest { url, range, format })
    }

    async fn run_in_workspace(
        &self,
        workspace: &Workspace,
        request: ValidatedRequest,
        progress: &ProgressReporter,
    ) -> Result<CompletedExtraction, ExtractError> {
        self.enter(PipelineStage::Fetching, progress).await;
        let media: FetchedMedia = self
            .fetcher
            .fetch(&request.url, workspace.path())
            .await
            .map_err(|e| ExtractError::Fetch { cause: format!("{:#}", e) })?;

        self.enter(PipelineStage::NormalizingTimestamps, progress).await;
        let range = request.range.bounded_by(media.metadata.duration_seconds)?;

        self.enter(PipelineStage::ExtractingAuxiliary, progress).await;
        let artifacts = self
            .auxiliary
            .extract(&media, request.url.video_id(), range.start_seconds(), workspace.path())
            .await;

        self.enter(PipelineStage::Transcoding, progress).await;
        let target = workspace
            .path()
            .join(format!("output.{}", request.format.as_str()));
        let audio = self
            .transcoder
            .transcode(&media.path, range, request.format, &target)
            .await
            .map_err(|e| ExtractError::Transcode { cause: format!("{:#}", e) })?;

        self.enter(PipelineStage::Finalized, progress).await;
        let file_id = FileId::new();
        let result = self
            .persist(file_id, audio, artifacts, media.metadata, range, request.format)
            .await?;

        Ok(CompletedExtraction { file_id, result })
    }

    /// Copy outputs out of the workspace before it is removed
    async fn persist(
        &self,
        file_id: FileId,
        audio: PathBuf,
        artifacts: AuxiliaryArtifacts,
        metadata: VideoMetadata,
        range: TimeRange,
        format: OutputFormat,
    ) -> Result<ExtractionResult, ExtractError> {
        tokio::fs::create_dir_all(&self.output_dir).await.map_err(|e| {
            ExtractError::Internal(format!(
                "Failed to create output directory {}: {}",
                self.output_dir.display(),
                e
            ))
        })?;

        let audio_path = self.output_dir.join(format!("{}.{}", file_id, format.as_str()));
        copy_or_discard(&audio, &audio_path)
            .await
            .map_err(|e| ExtractError::Internal(format!("Failed to persist audio output: {}", e)))?;

        let screenshot_path = self
            .persist_artifact(artifacts.screenshot, &format!("{}_screenshot", file_id))
            .await;
        let thumbnail_path = self
            .persist_artifact(artifacts.thumbnail, &format!("{}_thumbnail", file_id))
            .await;

        Ok(ExtractionResult {
            audio_path,
            screenshot_path,
            thumbnail_path,
            metadata,
            range,
            format,
        })
    }

    async fn persist_artifact(&self, source: Option<PathBuf>, stem: &str) -> Option<PathBuf> {
        let source = source?;
        let ext = source
            .extension()
            .map(|e| e.to_string_lossy().into_owned())
            .unwrap_or_else(|| "jpg".to_string());
        let target = self.output_dir.join(format!("{}.{}", stem, ext));

        match copy_or_discard(&source, &target).await {
            Ok(_) => Some(target),
            Err(e) => {
                tracing::warn!("Failed to persist {}: {}", source.display(), e);
                None
            }
        }
    }

    async fn enter(&self, stage: PipelineStage, progress: &ProgressReporter) {
        tracing::info!("[{}] {} ({}%)", progress.job_id(), stage, stage.progress());
        progress.advance(stage.progress()).await;
    }
}

/// Copy `source` to `target`, removing whatever part of `target` was written
/// if the copy fails
async fn copy_or_discard(source: &Path, target: &Path) -> std::io::Result<u64> {
    match tokio::fs::copy(source, target).await {
        Ok(written) => Ok(written),
        Err(e) => {
            if let Err(cleanup) = tokio::fs::remove_file(target).await {
                if cleanup.kind() != std::io::ErrorKind::NotFound {
                    tracing::warn!("Failed to remove partial {}: {}", target.display(), cleanup);
                }
            }
            Err(e)
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_request_deserialization() {
        let json = r#"{
            "youtube_url": "https://youtu.be/dQw4w9WgXcQ",
            "start_time": 5,
            "end_time": "0:08"
        }"#;
        let request: ExtractionRequest = serde_json::from_str(json).unwrap();

        assert_eq!(request.source_url, "https://youtu.be/dQw4w9WgXcQ");
        assert_eq!(request.start_time, TimeValue::Integer(5));
        assert_eq!(request.end_time, TimeValue::text("0:08"));
        assert_eq!(request.output_format, "mp3");
    }

    const URL: &str = "https://youtu.be/dQw4w9WgXcQ";

    #[test]
    fn test_validate_checks_locally() {
        let ok = ExtractionRequest::new(URL, "0:05", "0:08", "WAV");
        let validated = ExtractionPipeline::validate(&ok).unwrap();
        assert_eq!(validated.format, OutputFormat::Wav);
        assert_eq!(validated.url.video_id(), "dQw4w9WgXcQ");

        let bad_format = ExtractionRequest::new(URL, "0:05", "0:08", "flac");
        assert_eq!(
            ExtractionPipeline::validate(&bad_format).err(),
            Some(ExtractError::UnsupportedFormat("flac".to_string()))
        );

        let inverted = ExtractionRequest::new(URL, "0:20", "0:10", "mp3");
        assert_eq!(
            ExtractionPipeline::validate(&inverted).err(),
            Some(ExtractError::InvalidRange { start: 20, end: 10 })
        );
    }

    #[test]
    fn test_stage_progress_increases() {
        let stages = [
            PipelineStage::Validating,
            PipelineStage::Fetching,
            PipelineStage::NormalizingTimestamps,
            PipelineStage::ExtractingAuxiliary,
            PipelineStage::Transcoding,
            PipelineStage::Finalized,
        ];
        assert!(stages.windows(2).all(|w| w[0].progress() < w[1].progress()));
    }

    #[tokio::test]
    async fn test_workspace_removed_on_close_and_drop() {
        let parent = tempfile::tempdir().unwrap();

        let workspace = Workspace::create(Some(parent.path())).await.unwrap();
        let path = workspace.path().to_path_buf();
        assert!(path.is_dir());
        workspace.close();
        assert!(!path.exists());

        let workspace = Workspace::create(Some(&parent.path().join("nested")))
            .await
            .unwrap();
        let path = workspace.path().to_path_buf();
        fs_err::write(path.join("source.webm"), b"data").unwrap();
        drop(workspace);
        assert!(!path.exists());
    }

    #[test]
    fn test_suggested_filename() {
        let result = ExtractionResult {
            audio_path: PathBuf::from("x.mp3"),
            screenshot_path: None,
            thumbnail_path: None,
            metadata: VideoMetadata {
                title: "Rick Astley - Never Gonna Give You Up (Official)".to_string(),
                duration_seconds: Some(212),
                uploader: None,
                view_count: None,
                thumbnail_url: None,
            },
            range: TimeRange::new(5, 8).unwrap(),
            format: OutputFormat::Mp3,
        };
        assert_eq!(
            result.suggested_filename(),
            "Rick Astley - Never Gonna Give You Up _Official__0-05-0-08.mp3"
        );
    }

    #[tokio::test]
    async fn test_failed_copy_leaves_nothing_behind() {
        let dir = tempfile::tempdir().unwrap();
        let target = dir.path().join("out.mp3");
        // stale bytes from an interrupted copy
        fs_err::write(&target, b"partial").unwrap();

        let missing = dir.path().join("missing.mp3");
        assert!(copy_or_discard(&missing, &target).await.is_err());
        assert!(!target.exists());

        let source = dir.path().join("output.mp3");
        fs_err::write(&source, b"audio").unwrap();
        assert_eq!(copy_or_discard(&source, &target).await.unwrap(), 5);
        assert_eq!(fs_err::read(&target).unwrap(), b"audio");
    }
}
