//! Submission front door.
//!
//! Accepts extraction requests, runs each one on its own task, and serves the
//! job status, progress stream and finished files back out.

use serde::{Deserialize, Serialize};
use std::collections::HashMap;
use std::fmt;
use std::path::{Path, PathBuf};
use std::str::FromStr;
use std::sync::Arc;
use std::time::Duration;
use tokio::sync::{mpsc, RwLock};
use uuid::Uuid;

use crate::config::Config;
use crate::extractors::OutputFormat;
use crate::jobs::{
    Job, JobHandle, JobId, JobRegistry, JobStatus, ProgressEvent, ProgressNotifier, RegistryError,
};
use crate::pipeline::{ExtractionPipeline, ExtractionRequest};
use crate::ExtractError;

/// Identifier under which a finished audio file can be downloaded
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize, Deserialize)]
#[serde(transparent)]
pub struct FileId(Uuid);

impl FileId {
    pub fn new() -> Self {
        Self(Uuid::new_v4())
    }
}

impl Default for FileId {
    fn default() -> Self {
        Self::new()
    }
}

impl fmt::Display for FileId {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        fmt::Display::fmt(&self.0, f)
    }
}

impl FromStr for FileId {
    type Err = uuid::Error;

    fn from_str(s: &str) -> Result<Self, Self::Err> {
        Uuid::parse_str(s).map(Self)
    }
}

/// A persisted output file
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct StoredFile {
    pub path: PathBuf,
    pub format: OutputFormat,
    /// Name offered to clients, not the on-disk name
    pub filename: String,
    pub screenshot: Option<PathBuf>,
    pub thumbnail: Option<PathBuf>,
}

#[derive(Debug, Clone, Default)]
pub struct FileStore {
    files: Arc<RwLock<HashMap<FileId, StoredFile>>>,
}

impl FileStore {
    pub fn new() -> Self {
        Self::default()
    }

    pub async fn insert(&self, id: FileId, file: StoredFile) {
        self.files.write().await.insert(id, file);
    }

    pub async fn get(&self, id: FileId) -> Option<StoredFile> {
        self.files.read().await.get(&id).cloned()
    }
}

/// File contents ready to hand to a client
#[derive(Debug, Clone)]
pub struct Download {
    pub bytes: Vec<u8>,
    pub content_type: &'static str,
    pub filename: String,
}

#[derive(thiserror::Error, Debug)]
pub enum DownloadError {
    #[error("File not found: {0}")]
    NotFound(FileId),

    #[error("Screenshot not available for {0}")]
    ScreenshotNotFound(FileId),

    #[error("Thumbnail not available for {0}")]
    ThumbnailNotFound(FileId),

    #[error("Failed to read file {id}: {source}")]
    Io {
        id: FileId,
        #[source]
        source: std::io::Error,
    },
}

/// Acknowledgement returned as soon as a job is queued
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize)]
pub struct Submission {
    pub job_id: JobId,
    pub status: JobStatus,
}

/// Job-oriented API over the extraction pipeline
#[derive(Clone)]
pub struct ExtractionService {
    pipeline: Arc<ExtractionPipeline>,
    registry: JobRegistry,
    notifier: ProgressNotifier,
    files: FileStore,
}

impl ExtractionService {
    pub fn new(config: &Config) -> crate::Result<Self> {
        let pipeline = ExtractionPipeline::new(config)?;
        Ok(Self::with_pipeline(pipeline, config.progress_interval()))
    }

    pub fn with_pipeline(pipeline: ExtractionPipeline, progress_interval: Duration) -> Self {
        let registry = JobRegistry::new();
        Self {
            pipeline: Arc::new(pipeline),
            notifier: ProgressNotifier::new(registry.clone(), progress_interval),
            registry,
            files: FileStore::new(),
        }
    }

    /// Queue a request and start it in the background
    pub async fn submit(&self, request: ExtractionRequest) -> Submission {
        let handle = self.registry.create_owned().await;
        let job_id = handle.id();
        tracing::info!("Queued job {} for {}", job_id, request.source_url);

        tokio::spawn(run_job(
            handle,
            Arc::clone(&self.pipeline),
            self.files.clone(),
            request,
        ));

        Submission {
            job_id,
            status: JobStatus::Queued,
        }
    }

    /// Queue several requests; acknowledgements keep the input order
    pub async fn submit_batch(&self, requests: Vec<ExtractionRequest>) -> Vec<Submission> {
        let mut submissions = Vec::with_capacity(requests.len());
        for request in requests {
            submissions.push(self.submit(request).await);
        }
        submissions
    }

    pub async fn status(&self, job_id: JobId) -> Result<Job, RegistryError> {
        self.notifier
            .poll(job_id)
            .await
            .ok_or(RegistryError::NotFound(job_id))
    }

    /// Receive a progress event every interval until the job is terminal
    pub fn subscribe(&self, job_id: JobId) -> mpsc::Receiver<ProgressEvent> {
        self.notifier.subscribe(job_id)
    }

    /// Block until the job is terminal and return its final state
    pub async fn wait(&self, job_id: JobId) -> Result<Job, RegistryError> {
        let mut events = self.subscribe(job_id);
        while events.recv().await.is_some() {}
        self.status(job_id).await
    }

    pub async fn download(&self, file_id: FileId) -> Result<Download, DownloadError> {
        let file = self
            .files
            .get(file_id)
            .await
            .ok_or(DownloadError::NotFound(file_id))?;

        let bytes = tokio::fs::read(&file.path)
            .await
            .map_err(|source| DownloadError::Io { id: file_id, source })?;

        Ok(Download {
            bytes,
            content_type: file.format.mime_type(),
            filename: file.filename,
        })
    }

    /// The frame captured at the segment start, if one was produced
    pub async fn screenshot(&self, file_id: FileId) -> Result<Download, DownloadError> {
        let file = self
            .files
            .get(file_id)
            .await
            .ok_or(DownloadError::NotFound(file_id))?;
        let path = file
            .screenshot
            .ok_or(DownloadError::ScreenshotNotFound(file_id))?;
        read_image(file_id, &path).await
    }

    /// The video thumbnail, if one could be downloaded
    pub async fn thumbnail(&self, file_id: FileId) -> Result<Download, DownloadError> {
        let file = self
            .files
            .get(file_id)
            .await
            .ok_or(DownloadError::NotFound(file_id))?;
        let path = file
            .thumbnail
            .ok_or(DownloadError::ThumbnailNotFound(file_id))?;
        read_image(file_id, &path).await
    }

    pub fn registry(&self) -> &JobRegistry {
        &self.registry
    }
}

fn image_content_type(path: &Path) -> &'static str {
    match path
        .extension()
        .and_then(|ext| ext.to_str())
        .map(|ext| ext.to_ascii_lowercase())
        .as_deref()
    {
        Some("png") => "image/png",
        Some("webp") => "image/webp",
        _ => "image/jpeg",
    }
}

async fn read_image(file_id: FileId, path: &Path) -> Result<Download, DownloadError> {
    let bytes = tokio::fs::read(path)
        .await
        .map_err(|source| DownloadError::Io { id: file_id, source })?;
    let filename = path
        .file_name()
        .map(|name| name.to_string_lossy().into_owned())
        .unwrap_or_else(|| file_id.to_string());

    Ok(Download {
        bytes,
        content_type: image_content_type(path),
        filename,
    })
}

async fn run_job(
    handle: JobHandle,
    pipeline: Arc<ExtractionPipeline>,
    files: FileStore,
    request: ExtractionRequest,
) {
    handle.mark_running().await;
    let reporter = handle.reporter();

    // A panic inside the pipeline must still leave the job terminal
    let outcome = tokio::spawn(async move { pipeline.run(&request, &reporter).await })
        .await
        .unwrap_or_else(|e| Err(ExtractError::Internal(format!("pipeline task failed: {}", e))));

    match outcome {
        Ok(done) => {
            files
                .insert(
                    done.file_id,
                    StoredFile {
                        path: done.result.audio_path.clone(),
                        format: done.result.format,
                        filename: done.result.suggested_filename(),
                        screenshot: done.result.screenshot_path.clone(),
                        thumbnail: done.result.thumbnail_path.clone(),
                    },
                )
                .await;
            handle.complete(done.result, done.file_id).await;
        }
        Err(e) => handle.fail(&e).await,
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_file_id_round_trips_through_display() {
        let id = FileId::new();
        assert_eq!(id.to_string().parse::<FileId>().unwrap(), id);
        assert!("not-a-uuid".parse::<FileId>().is_err());
    }

    #[tokio::test]
    async fn test_file_store() {
        let store = FileStore::new();
        let id = FileId::new();
        assert!(store.get(id).await.is_none());

        let file = StoredFile {
            path: PathBuf::from("/out/a.wav"),
            format: OutputFormat::Wav,
            filename: "a.wav".to_string(),
            screenshot: None,
            thumbnail: Some(PathBuf::from("/out/a.webp")),
        };
        store.insert(id, file.clone()).await;
        assert_eq!(store.get(id).await, Some(file));
    }

    #[test]
    fn test_image_content_type() {
        assert_eq!(image_content_type(Path::new("/out/x.jpg")), "image/jpeg");
        assert_eq!(image_content_type(Path::new("/out/x.JPEG")), "image/jpeg");
        assert_eq!(image_content_type(Path::new("/out/x.png")), "image/png");
        assert_eq!(image_content_type(Path::new("/out/x.webp")), "image/webp");
        assert_eq!(image_content_type(Path::new("/out/x")), "image/jpeg");
    }

    #[tokio::test]
    async fn test_read_image() {
        let dir = tempfile::tempdir().unwrap();
        let id = FileId::new();
        let path = dir.path().join(format!("{}_thumbnail.png", id));
        fs_err::write(&path, b"png").unwrap();

        let image = read_image(id, &path).await.unwrap();
        assert_eq!(image.bytes, b"png");
        assert_eq!(image.content_type, "image/png");
        assert_eq!(image.filename, format!("{}_thumbnail.png", id));

        let missing = dir.path().join("gone.jpg");
        assert!(matches!(
            read_image(id, &missing).await,
            Err(DownloadError::Io { .. })
        ));
    }

    #[test]
    fn test_submission_shape() {
        let id = JobId::new();
        let submission = Submission {
            job_id: id,
            status: JobStatus::Queued,
        };
        let json = serde_json::to_value(submission).unwrap();
        assert_eq!(json["job_id"], id.to_string());
        assert_eq!(json["status"], "queued");
    }
}
