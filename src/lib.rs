//! Polydub - A Rust CLI tool for dubbing videos into other languages
//!
//! This library wraps the ElevenLabs Dubbing API behind a small pipeline:
//! submit a video, wait for the provider-side dubbing job to finish, download
//! the dubbed artifact, and merge its audio track back onto the original
//! video. It also ships a YouTube transcript fetcher built on yt-dlp.

pub mod cli;
pub mod config;
pub mod job;
pub mod media;
pub mod pipeline;
pub mod provider;
pub mod transcript;
pub mod utils;

pub use cli::{Cli, Commands};
pub use config::Config;
pub use job::{Job, JobId, JobStatus, JobWaiter, StatusSource, WaitOutcome};
pub use pipeline::{BatchSummary, DubbingPipeline};
pub use provider::{DubParams, DubbingProvider, ElevenLabsClient};

/// Result type used throughout the library
pub type Result<T> = anyhow::Result<T>;

/// Failure modes of a dubbing pipeline run, surfaced to the caller.
///
/// Cleanup failures are deliberately absent: a temp file that cannot be
/// removed is logged, never turned into a run failure.
#[derive(thiserror::Error, Debug)]
pub enum PipelineError {
    #[error("invalid input artifact: {0}")]
    InvalidInput(String),

    #[error("job submission failed: {0}")]
    SubmissionFailed(String),

    #[error("dubbing job failed: {0}")]
    JobFailed(String),

    #[error("dubbing job timed out after {attempts} status checks")]
    JobTimedOut { attempts: u32 },

    #[error("downloaded artifact failed validation: {0}")]
    DownloadInvalid(String),

    #[error("merge step failed: {0}")]
    MergeFailed(String),
}
