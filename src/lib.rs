//! Clipforge - extract bounded audio segments from YouTube videos
//!
//! This library runs each extraction as a tracked asynchronous job: the request is
//! validated, the source media is fetched with yt-dlp, the segment is cut and
//! re-encoded with ffmpeg, and the job state can be polled or streamed until it
//! reaches a terminal result.

pub mod cli;
pub mod config;
pub mod extractors;
pub mod jobs;
pub mod output;
pub mod pipeline;
pub mod service;
pub mod utils;
pub mod validate;

use serde::{Deserialize, Serialize};

pub use cli::{Cli, Commands, ReportFormat};
pub use config::Config;
pub use extractors::{OutputFormat, VideoMetadata};
pub use jobs::{Job, JobId, JobRegistry, JobStatus};
pub use pipeline::{ExtractionPipeline, ExtractionRequest, ExtractionResult};
pub use service::{ExtractionService, FileId};
pub use validate::{TimeRange, TimeValue};

/// Result type used throughout the library
pub type Result<T> = anyhow::Result<T>;

/// Fatal failures of an extraction job
#[derive(thiserror::Error, Debug, Clone, PartialEq, Eq)]
pub enum ExtractError {
    #[error("Invalid source URL: {0}")]
    InvalidUrl(String),

    #[error("Invalid timestamp: {0:?}")]
    InvalidTimestamp(String),

    #[error("Invalid time interval: start ({start}s) must be >= 0 and less than end ({end}s)")]
    InvalidRange { start: i64, end: i64 },

    #[error("Could not determine video length")]
    UnknownDuration,

    #[error("Start time ({start}s) is beyond video length ({duration}s)")]
    StartBeyondDuration { start: u64, duration: u64 },

    #[error("End time ({end}s) is beyond video length ({duration}s)")]
    EndBeyondDuration { end: u64, duration: u64 },

    #[error("Unsupported output format {0:?}: only mp3 or wav are supported")]
    UnsupportedFormat(String),

    #[error("Media fetch failed: {cause}")]
    Fetch { cause: String },

    #[error("Segment transcode failed: {cause}")]
    Transcode { cause: String },

    #[error("Internal error: {0}")]
    Internal(String),
}

impl ExtractError {
    pub fn kind(&self) -> ErrorKind {
        match self {
            ExtractError::InvalidUrl(_) => ErrorKind::InvalidUrl,
            ExtractError::InvalidTimestamp(_) => ErrorKind::InvalidTimestamp,
            ExtractError::InvalidRange { .. } => ErrorKind::InvalidRange,
            ExtractError::UnknownDuration => ErrorKind::UnknownDuration,
            ExtractError::StartBeyondDuration { .. } => ErrorKind::StartBeyondDuration,
            ExtractError::EndBeyondDuration { .. } => ErrorKind::EndBeyondDuration,
            ExtractError::UnsupportedFormat(_) => ErrorKind::UnsupportedFormat,
            ExtractError::Fetch { .. } => ErrorKind::FetchError,
            ExtractError::Transcode { .. } => ErrorKind::TranscodeError,
            ExtractError::Internal(_) => ErrorKind::Internal,
        }
    }

    /// Whether the failure was caused by the caller's input rather than a collaborator
    pub fn is_client_error(&self) -> bool {
        !matches!(
            self,
            ExtractError::Fetch { .. } | ExtractError::Transcode { .. } | ExtractError::Internal(_)
        )
    }
}

/// Serializable discriminant of [`ExtractError`]
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize, Deserialize)]
pub enum ErrorKind {
    InvalidUrl,
    InvalidTimestamp,
    InvalidRange,
    UnknownDuration,
    StartBeyondDuration,
    EndBeyondDuration,
    UnsupportedFormat,
    FetchError,
    TranscodeError,
    Internal,
}

/// Failure detail exposed on a job in `error` state
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct JobError {
    pub kind: ErrorKind,
    pub message: String,
}

impl From<&ExtractError> for JobError {
    fn from(err: &ExtractError) -> Self {
        Self {
            kind: err.kind(),
            message: err.to_string(),
        }
    }
}

impl From<ExtractError> for JobError {
    fn from(err: ExtractError) -> Self {
        Self::from(&err)
    }
}

/// Non-fatal failures of the auxiliary steps
#[derive(thiserror::Error, Debug)]
pub enum AuxiliaryWarning {
    #[error("Screenshot capture failed: {0}")]
    Screenshot(String),

    #[error("Thumbnail download failed: {0}")]
    Thumbnail(String),
}
