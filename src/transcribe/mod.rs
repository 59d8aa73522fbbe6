use async_trait::async_trait;
use serde::{Deserialize, Serialize};
use std::sync::Arc;
use std::time::{Duration, Instant};

use crate::PipelineError;

pub mod orchestrator;

pub use orchestrator::TranscriptionOrchestrator;

/// Remote job status as observed through polling.
///
/// `Pending → Running → {Succeeded | Failed}`; anything the service
/// reports outside that set is carried as `Unknown` and treated as
/// non-terminal, so the poll loop keeps waiting until the timeout.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum JobStatus {
    Pending,
    Running,
    Succeeded,
    Failed,
    Unknown,
}

impl JobStatus {
    pub fn parse(raw: &str) -> Self {
        match raw {
            "PENDING" => JobStatus::Pending,
            "RUNNING" => JobStatus::Running,
            "SUCCEEDED" => JobStatus::Succeeded,
            "FAILED" => JobStatus::Failed,
            _ => JobStatus::Unknown,
        }
    }

    pub fn is_terminal(&self) -> bool {
        matches!(self, JobStatus::Succeeded | JobStatus::Failed)
    }

    pub fn label(&self) -> &'static str {
        match self {
            JobStatus::Pending => "queued",
            JobStatus::Running => "transcribing",
            JobStatus::Succeeded => "succeeded",
            JobStatus::Failed => "failed",
            JobStatus::Unknown => "unknown",
        }
    }
}

/// One sentence of the transcript with millisecond offsets
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct TranscriptSegment {
    pub text: String,
    pub start_ms: u64,
    pub end_ms: u64,
}

/// Final transcript assembled from the remote result payload
#[derive(Debug, Clone)]
pub struct Transcript {
    pub full_text: String,
    pub segments: Vec<TranscriptSegment>,
}

/// Invoked on every poll iteration with the observed status and the
/// elapsed/timeout fraction (0.0..=1.0) so callers can render smooth
/// progress while the job runs.
pub type StatusCallback = Arc<dyn Fn(JobStatus, f64) + Send + Sync>;

/// Submit-and-poll interface to the remote speech-to-text service
#[cfg_attr(test, mockall::automock)]
#[async_trait]
pub trait SpeechTranscriber: Send + Sync {
    /// Submit a job for a staged media URL; returns the job id
    async fn submit(
        &self,
        staged_url: &str,
        api_key: &str,
    ) -> std::result::Result<String, PipelineError>;

    /// Poll the job to a terminal state or timeout and fetch the transcript
    async fn await_completion(
        &self,
        job_id: &str,
        api_key: &str,
        on_status: StatusCallback,
    ) -> std::result::Result<Transcript, PipelineError>;
}

/// Injectable time source so the poll loop can be tested without real delays
#[async_trait]
pub trait Clock: Send + Sync {
    fn now(&self) -> Instant;
    async fn sleep(&self, duration: Duration);
}

/// Production clock backed by tokio's timer
pub struct TokioClock;

#[async_trait]
impl Clock for TokioClock {
    fn now(&self) -> Instant {
        Instant::now()
    }

    async fn sleep(&self, duration: Duration) {
        tokio::time::sleep(duration).await;
    }
}
