use serde::Serialize;
use std::time::Duration;
use tokio::sync::mpsc;

use super::{Job, JobId, JobRegistry, JobStatus};

const NOT_FOUND: &str = "Job not found";

/// Message pushed to progress subscribers
#[derive(Debug, Clone, PartialEq, Eq, Serialize)]
#[serde(untagged)]
pub enum ProgressEvent {
    Update {
        job_id: JobId,
        status: JobStatus,
        progress: u8,
    },
    NotFound {
        job_id: JobId,
        error: &'static str,
    },
}

impl ProgressEvent {
    pub fn not_found(job_id: JobId) -> Self {
        ProgressEvent::NotFound {
            job_id,
            error: NOT_FOUND,
        }
    }

    pub fn is_terminal(&self) -> bool {
        match self {
            ProgressEvent::Update { status, .. } => status.is_terminal(),
            ProgressEvent::NotFound { .. } => true,
        }
    }
}

impl From<&Job> for ProgressEvent {
    fn from(job: &Job) -> Self {
        ProgressEvent::Update {
            job_id: job.id(),
            status: job.status(),
            progress: job.progress(),
        }
    }
}

/// Why a progress stream stopped
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum StreamEnd {
    Terminal(JobStatus),
    NotFound,
    Disconnected,
}

/// Exposes job state by poll or by a fixed-cadence push loop
#[derive(Debug, Clone)]
pub struct ProgressNotifier {
    registry: JobRegistry,
    interval: Duration,
}

impl ProgressNotifier {
    pub fn new(registry: JobRegistry, interval: Duration) -> Self {
        Self { registry, interval }
    }

    /// Single read of the current job state
    pub async fn poll(&self, job_id: JobId) -> Option<Job> {
        self.registry.get(job_id).await
    }

    /// Push the job state into `tx` every interval until it is terminal
    ///
    /// Stops at the first send after the receiver is dropped, or as soon as the
    /// receiver closes while waiting for the next tick.
    pub async fn stream(&self, job_id: JobId, tx: mpsc::Sender<ProgressEvent>) -> StreamEnd {
        loop {
            let Some(job) = self.registry.get(job_id).await else {
                tracing::debug!("Progress stream for unknown job {}", job_id);
                let _ = tx.send(ProgressEvent::not_found(job_id)).await;
                return StreamEnd::NotFound;
            };

            let status = job.status();
            if tx.send(ProgressEvent::from(&job)).await.is_err() {
                tracing::debug!("Progress subscriber for {} went away", job_id);
                return StreamEnd::Disconnected;
            }
            if status.is_terminal() {
                return StreamEnd::Terminal(status);
            }

            tokio::select! {
                _ = tokio::time::sleep(self.interval) => {}
                _ = tx.closed() => {
                    tracing::debug!("Progress subscriber for {} went away", job_id);
                    return StreamEnd::Disconnected;
                }
            }
        }
    }

    /// Spawn a stream loop and hand back its receiving end
    pub fn subscribe(&self, job_id: JobId) -> mpsc::Receiver<ProgressEvent> {
        let (tx, rx) = mpsc::channel(16);
        let notifier = self.clone();
        tokio::spawn(async move {
            notifier.stream(job_id, tx).await;
        });
        rx
    }
}
