//! In-process job registry.
//!
//! Every submitted extraction gets a [`Job`] record. The task running the
//! pipeline owns the job's [`JobHandle`], the only way to move it to a terminal
//! state; any number of readers take consistent snapshots with [`JobRegistry::get`].

use chrono::{DateTime, Utc};
use serde::{Deserialize, Serialize};
use std::collections::HashMap;
use std::fmt;
use std::str::FromStr;
use std::sync::Arc;
use tokio::sync::RwLock;
use uuid::Uuid;

pub mod notifier;

pub use notifier::{ProgressEvent, ProgressNotifier, StreamEnd};

use crate::pipeline::ExtractionResult;
use crate::service::FileId;
use crate::{ExtractError, JobError};

/// Opaque job identifier
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize, Deserialize)]
#[serde(transparent)]
pub struct JobId(Uuid);

impl JobId {
    pub fn new() -> Self {
        Self(Uuid::new_v4())
    }
}

impl Default for JobId {
    fn default() -> Self {
        Self::new()
    }
}

impl fmt::Display for JobId {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        fmt::Display::fmt(&self.0, f)
    }
}

impl FromStr for JobId {
    type Err = uuid::Error;

    fn from_str(s: &str) -> Result<Self, Self::Err> {
        Uuid::parse_str(s).map(Self)
    }
}

/// Lifecycle of a job
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "lowercase")]
pub enum JobStatus {
    Queued,
    Running,
    Done,
    Error,
}

impl JobStatus {
    pub fn is_terminal(&self) -> bool {
        matches!(self, JobStatus::Done | JobStatus::Error)
    }

    pub fn as_str(&self) -> &'static str {
        match self {
            JobStatus::Queued => "queued",
            JobStatus::Running => "running",
            JobStatus::Done => "done",
            JobStatus::Error => "error",
        }
    }
}

impl fmt::Display for JobStatus {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(self.as_str())
    }
}

/// Snapshot of a tracked extraction
///
/// `result` and `file_id` are present exactly when the status is `done`;
/// `error` exactly when it is `error`.
#[derive(Debug, Clone, Serialize)]
pub struct Job {
    #[serde(rename = "job_id")]
    id: JobId,
    status: JobStatus,
    progress: u8,
    result: Option<ExtractionResult>,
    error: Option<JobError>,
    file_id: Option<FileId>,
    created_at: DateTime<Utc>,
    updated_at: DateTime<Utc>,
}

impl Job {
    fn new(id: JobId) -> Self {
        let now = Utc::now();
        Self {
            id,
            status: JobStatus::Queued,
            progress: 0,
            result: None,
            error: None,
            file_id: None,
            created_at: now,
            updated_at: now,
        }
    }

    pub fn id(&self) -> JobId {
        self.id
    }

    pub fn status(&self) -> JobStatus {
        self.status
    }

    pub fn progress(&self) -> u8 {
        self.progress
    }

    pub fn result(&self) -> Option<&ExtractionResult> {
        self.result.as_ref()
    }

    pub fn error(&self) -> Option<&JobError> {
        self.error.as_ref()
    }

    pub fn file_id(&self) -> Option<FileId> {
        self.file_id
    }

    pub fn created_at(&self) -> DateTime<Utc> {
        self.created_at
    }

    pub fn updated_at(&self) -> DateTime<Utc> {
        self.updated_at
    }

    fn apply(&mut self, update: JobUpdate) -> Result<(), RegistryError> {
        if self.status.is_terminal() {
            return Err(RegistryError::AlreadyFinished(self.id));
        }

        match update {
            JobUpdate::Running => {
                self.status = JobStatus::Running;
            }
            JobUpdate::Progress(percent) => {
                self.progress = self.progress.max(percent.min(100));
            }
            JobUpdate::Complete { result, file_id } => {
                self.status = JobStatus::Done;
                self.progress = 100;
                self.result = Some(*result);
                self.file_id = Some(file_id);
            }
            JobUpdate::Fail(error) => {
                self.status = JobStatus::Error;
                self.error = Some(error);
            }
        }

        self.updated_at = Utc::now();
        Ok(())
    }
}

/// A partial state change applied atomically to one job
#[derive(Debug, Clone)]
pub enum JobUpdate {
    Running,
    /// Raise progress; lower values are ignored
    Progress(u8),
    Complete {
        result: Box<ExtractionResult>,
        file_id: FileId,
    },
    Fail(JobError),
}

#[derive(thiserror::Error, Debug, Clone, PartialEq, Eq)]
pub enum RegistryError {
    #[error("Job not found: {0}")]
    NotFound(JobId),

    #[error("Job {0} already reached a terminal state")]
    AlreadyFinished(JobId),
}

/// Concurrency-safe map of job id to job state
#[derive(Debug, Clone, Default)]
pub struct JobRegistry {
    jobs: Arc<RwLock<HashMap<JobId, Job>>>,
}

impl JobRegistry {
    pub fn new() -> Self {
        Self::default()
    }

    /// Register a new queued job
    pub async fn create(&self) -> JobId {
        self.create_owned().await.id()
    }

    /// Register a new queued job and take its write handle
    pub async fn create_owned(&self) -> JobHandle {
        let id = JobId::new();
        self.jobs.write().await.insert(id, Job::new(id));
        tracing::debug!("Created job {}", id);

        JobHandle {
            id,
            registry: self.clone(),
        }
    }

    /// Apply a partial update under the write lock
    pub async fn update(&self, id: JobId, update: JobUpdate) -> Result<(), RegistryError> {
        let mut jobs = self.jobs.write().await;
        let job = jobs.get_mut(&id).ok_or(RegistryError::NotFound(id))?;
        job.apply(update)
    }

    /// Consistent snapshot of a job
    pub async fn get(&self, id: JobId) -> Option<Job> {
        self.jobs.read().await.get(&id).cloned()
    }

    pub async fn len(&self) -> usize {
        self.jobs.read().await.len()
    }

}

/// Exclusive write access to one job, held by the task running its pipeline
#[derive(Debug)]
pub struct JobHandle {
    id: JobId,
    registry: JobRegistry,
}

impl JobHandle {
    pub fn id(&self) -> JobId {
        self.id
    }

    /// A cloneable reporter that can only raise progress
    pub fn reporter(&self) -> ProgressReporter {
        ProgressReporter {
            id: self.id,
            registry: self.registry.clone(),
        }
    }

    pub async fn mark_running(&self) {
        self.send(JobUpdate::Running).await;
    }

    pub async fn complete(self, result: ExtractionResult, file_id: FileId) {
        tracing::info!("Job {} done (file {})", self.id, file_id);
        self.send(JobUpdate::Complete {
            result: Box::new(result),
            file_id,
        })
        .await;
    }

    pub async fn fail(self, error: &ExtractError) {
        if error.is_client_error() {
            tracing::warn!("Job {} rejected: {}", self.id, error);
        } else {
            tracing::error!("Job {} failed: {}", self.id, error);
        }
        self.send(JobUpdate::Fail(JobError::from(error))).await;
    }

    async fn send(&self, update: JobUpdate) {
        if let Err(e) = self.registry.update(self.id, update).await {
            tracing::warn!("Dropped job update: {}", e);
        }
    }
}

/// Progress-only view of a job handed to the pipeline
#[derive(Debug, Clone)]
pub struct ProgressReporter {
    id: JobId,
    registry: JobRegistry,
}

impl ProgressReporter {
    pub fn job_id(&self) -> JobId {
        self.id
    }

    pub async fn advance(&self, percent: u8) {
        if let Err(e) = self.registry.update(self.id, JobUpdate::Progress(percent)).await {
            tracing::warn!("Dropped progress update: {}", e);
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::extractors::{OutputFormat, VideoMetadata};
    use crate::validate::TimeRange;
    use std::path::PathBuf;

    pub(crate) fn sample_result() -> ExtractionResult {
        ExtractionResult {
            audio_path: PathBuf::from("/out/clip.mp3"),
            screenshot_path: None,
            thumbnail_path: None,
            metadata: VideoMetadata {
                title: "Sample".to_string(),
                duration_seconds: Some(212),
                uploader: None,
                view_count: None,
                thumbnail_url: None,
            },
            range: TimeRange::new(5, 8).unwrap(),
            format: OutputFormat::Mp3,
        }
    }

    #[tokio::test]
    async fn test_create_is_queued() {
        let registry = JobRegistry::new();
        let id = registry.create().await;

        let job = registry.get(id).await.unwrap();
        assert_eq!(job.status(), JobStatus::Queued);
        assert_eq!(job.progress(), 0);
        assert!(job.result().is_none() && job.error().is_none() && job.file_id().is_none());
        assert_eq!(registry.len().await, 1);
    }

    #[tokio::test]
    async fn test_unknown_job() {
        let registry = JobRegistry::new();
        let id = JobId::new();
        assert!(registry.get(id).await.is_none());
        assert_eq!(
            registry.update(id, JobUpdate::Running).await,
            Err(RegistryError::NotFound(id))
        );
    }

    #[tokio::test]
    async fn test_progress_is_monotonic() {
        let registry = JobRegistry::new();
        let handle = registry.create_owned().await;
        let reporter = handle.reporter();

        handle.mark_running().await;
        reporter.advance(30).await;
        reporter.advance(10).await;
        assert_eq!(registry.get(handle.id()).await.unwrap().progress(), 30);

        reporter.advance(250).await;
        assert_eq!(registry.get(handle.id()).await.unwrap().progress(), 100);
    }

    #[tokio::test]
    async fn test_complete_populates_result_only() {
        let registry = JobRegistry::new();
        let handle = registry.create_owned().await;
        let id = handle.id();
        let file_id = FileId::new();

        handle.complete(sample_result(), file_id).await;

        let job = registry.get(id).await.unwrap();
        assert_eq!(job.status(), JobStatus::Done);
        assert_eq!(job.progress(), 100);
        assert!(job.result().is_some());
        assert!(job.error().is_none());
        assert_eq!(job.file_id(), Some(file_id));
    }

    #[tokio::test]
    async fn test_terminal_state_is_final() {
        let registry = JobRegistry::new();
        let handle = registry.create_owned().await;
        let id = handle.id();
        let reporter = handle.reporter();

        reporter.advance(40).await;
        handle.fail(&ExtractError::InvalidRange { start: 20, end: 10 }).await;

        let job = registry.get(id).await.unwrap();
        assert_eq!(job.status(), JobStatus::Error);
        assert_eq!(job.progress(), 40);
        assert_eq!(job.error().unwrap().kind, crate::ErrorKind::InvalidRange);
        assert!(job.result().is_none());

        // a late writer cannot resurrect or overwrite it
        reporter.advance(90).await;
        assert_eq!(
            registry
                .update(
                    id,
                    JobUpdate::Complete {
                        result: Box::new(sample_result()),
                        file_id: FileId::new(),
                    }
                )
                .await,
            Err(RegistryError::AlreadyFinished(id))
        );
        let job = registry.get(id).await.unwrap();
        assert_eq!(job.status(), JobStatus::Error);
        assert_eq!(job.progress(), 40);
    }

    #[tokio::test]
    async fn test_concurrent_readers_see_consistent_jobs() {
        let registry = JobRegistry::new();
        let mut handles = Vec::new();
        for _ in 0..16 {
            handles.push(registry.create_owned().await);
        }
        let ids: Vec<JobId> = handles.iter().map(|h| h.id()).collect();

        let readers: Vec<_> = (0..8)
            .map(|_| {
                let registry = registry.clone();
                let ids = ids.clone();
                tokio::spawn(async move {
                    for _ in 0..50 {
                        for id in &ids {
                            let job = registry.get(*id).await.unwrap();
                            assert_eq!(job.result().is_some(), job.status() == JobStatus::Done);
                            assert_eq!(job.error().is_some(), job.status() == JobStatus::Error);
                        }
                        tokio::task::yield_now().await;
                    }
                })
            })
            .collect();

        for (i, handle) in handles.into_iter().enumerate() {
            handle.mark_running().await;
            if i % 2 == 0 {
                handle.complete(sample_result(), FileId::new()).await;
            } else {
                handle.fail(&ExtractError::UnknownDuration).await;
            }
        }

        for reader in readers {
            reader.await.unwrap();
        }
    }

    #[tokio::test]
    async fn test_status_report_shape() {
        let registry = JobRegistry::new();
        let id = registry.create().await;
        let json = serde_json::to_value(registry.get(id).await.unwrap()).unwrap();

        assert_eq!(json["job_id"], id.to_string());
        assert_eq!(json["status"], "queued");
        assert_eq!(json["progress"], 0);
        assert!(json["result"].is_null());
        assert!(json["error"].is_null());
        assert!(json["file_id"].is_null());
    }
}
