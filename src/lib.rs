//! Clipscribe - extract transcripts from video share links
//!
//! This library resolves a share link into a platform video id, fetches
//! metadata and an audio-stream locator, downloads the audio through a chain
//! of relay proxies, stages it at a public URL, and runs a remote
//! asynchronous speech-to-text job. When only the text description or
//! platform captions are wanted, the pipeline stops after the metadata step.

pub mod audio;
pub mod cli;
pub mod config;
pub mod metadata;
pub mod output;
pub mod pipeline;
pub mod relay;
pub mod resolver;
pub mod staging;
pub mod transcribe;
pub mod utils;

pub use cli::{Cli, Commands, OutputFormat};
pub use config::Config;
pub use metadata::{MediaLocator, VideoId, VideoMetadata};
pub use pipeline::{PipelineController, PipelineResult, TranscriptMode};
pub use transcribe::{Transcript, TranscriptSegment};

/// Result type used for internal plumbing throughout the library
pub type Result<T> = anyhow::Result<T>;

/// Terminal error kinds a pipeline run can surface to the caller.
///
/// Each variant maps to a distinct, actionable message; apart from the
/// captions fetch inside the metadata provider (which is swallowed by
/// design), every component failure aborts the run with one of these.
#[derive(thiserror::Error, Debug)]
pub enum PipelineError {
    #[error("could not find a video id in link: {0}")]
    UnresolvableLink(String),

    #[error("video metadata unavailable: {0}")]
    MetadataUnavailable(String),

    #[error("all {attempts} relay proxies failed for {target}")]
    AllRelaysExhausted { target: String, attempts: usize },

    #[error("audio download failed after {attempts} relay attempts; the platform blocks direct access - download the file yourself and upload it to the transcription service instead")]
    AudioDownloadFailed { attempts: usize },

    #[error("staging upload failed: {0}")]
    StagingFailed(String),

    #[error("transcription service rejected the job: {0}")]
    SubmissionRejected(String),

    #[error("transcription failed: {0}")]
    TranscriptionFailed(String),

    #[error("transcription did not finish within {0} seconds; the job was abandoned")]
    TranscriptionTimedOut(u64),
}
