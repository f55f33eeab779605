use async_trait::async_trait;
use serde::{Deserialize, Serialize};
use std::time::Duration;
use tokio::time::sleep;

use crate::Result;

/// Default number of status checks before a job is declared timed out
pub const DEFAULT_MAX_ATTEMPTS: u32 = 120;

/// Default interval between status checks
pub const DEFAULT_POLL_INTERVAL: Duration = Duration::from_secs(10);

/// Opaque identifier assigned by the provider when a job is submitted
#[derive(Debug, Clone, PartialEq, Eq, Hash, Serialize, Deserialize)]
pub struct JobId(String);

impl JobId {
    pub fn new(id: impl Into<String>) -> Self {
        Self(id.into())
    }

    pub fn as_str(&self) -> &str {
        &self.0
    }
}

impl std::fmt::Display for JobId {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        write!(f, "{}", self.0)
    }
}

/// Job status mapped into a closed set, regardless of what the provider calls it
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum JobStatus {
    Pending,
    Running,
    Succeeded,
    Failed,
}

impl JobStatus {
    /// Whether the job can no longer change state
    pub fn is_terminal(&self) -> bool {
        matches!(self, JobStatus::Succeeded | JobStatus::Failed)
    }

    /// Map a provider status string into the closed set.
    ///
    /// ElevenLabs reports `dubbing` while in progress and `dubbed` on
    /// success. Anything unrecognized is treated as a failure rather than
    /// polled forever.
    pub fn from_provider(status: &str) -> Self {
        match status {
            "dubbed" => JobStatus::Succeeded,
            "dubbing" => JobStatus::Running,
            "queued" | "pending" => JobStatus::Pending,
            _ => JobStatus::Failed,
        }
    }
}

/// One long-running provider-side operation
#[derive(Debug, Clone)]
pub struct Job {
    pub id: JobId,
    pub status: JobStatus,

    /// Present only when the job has failed
    pub error_message: Option<String>,
}

impl Job {
    /// Build a Job from the provider's raw status fields
    pub fn from_provider(id: JobId, raw_status: &str, error_message: Option<String>) -> Self {
        let status = JobStatus::from_provider(raw_status);
        let error_message = match status {
            JobStatus::Failed => error_message
                .or_else(|| Some(format!("provider reported status '{}'", raw_status))),
            _ => None,
        };

        Self { id, status, error_message }
    }

    /// Human-readable reason for a failed job
    pub fn failure_reason(&self) -> String {
        self.error_message
            .clone()
            .unwrap_or_else(|| "unknown error".to_string())
    }
}

/// Capability to fetch the current status of a job
#[cfg_attr(test, mockall::automock)]
#[async_trait]
pub trait StatusSource: Send + Sync {
    /// Return the job's current status.
    ///
    /// An `Err` here means the status check itself could not be performed
    /// (transport failure); callers treat that as fatal for the run.
    async fn fetch_status(&self, id: &JobId) -> Result<Job>;
}

/// Terminal outcome of waiting on a job
#[derive(Debug, Clone, PartialEq, Eq)]
pub enum WaitOutcome {
    Success,
    Failed(String),
    TimedOut,
}

/// Polls a job until it reaches a terminal state or the attempt budget runs out.
///
/// The waiter never sleeps after a terminal response, and never sleeps after
/// the final check: a timed-out wait has performed `max_attempts` checks and
/// exactly `max_attempts - 1` sleeps.
#[derive(Debug, Clone)]
pub struct JobWaiter {
    max_attempts: u32,
    poll_interval: Duration,
}

impl Default for JobWaiter {
    fn default() -> Self {
        Self::new(DEFAULT_MAX_ATTEMPTS, DEFAULT_POLL_INTERVAL)
    }
}

impl JobWaiter {
    pub fn new(max_attempts: u32, poll_interval: Duration) -> Self {
        Self { max_attempts, poll_interval }
    }

    pub fn max_attempts(&self) -> u32 {
        self.max_attempts
    }

    /// Block the calling task until the job is terminal or attempts run out.
    ///
    /// Provider-reported failure and timeout are ordinary outcomes, not
    /// errors; only a transport failure on the status check itself surfaces
    /// as `Err`, and the caller must not retry past it.
    pub async fn wait<S: StatusSource + ?Sized>(&self, source: &S, id: &JobId) -> Result<WaitOutcome> {
        for attempt in 1..=self.max_attempts {
            let job = source.fetch_status(id).await?;

            match job.status {
                JobStatus::Succeeded => {
                    tracing::info!("Job {} completed after {} status checks", id, attempt);
                    return Ok(WaitOutcome::Success);
                }
                JobStatus::Failed => {
                    let reason = job.failure_reason();
                    tracing::warn!("Job {} failed: {}", id, reason);
                    return Ok(WaitOutcome::Failed(reason));
                }
                JobStatus::Pending | JobStatus::Running => {
                    tracing::info!(
                        "Job {} in progress... attempt {}/{}, next check in {}s",
                        id,
                        attempt,
                        self.max_attempts,
                        self.poll_interval.as_secs()
                    );

                    if attempt < self.max_attempts {
                        sleep(self.poll_interval).await;
                    }
                }
            }
        }

        tracing::warn!("Job {} timed out after {} status checks", id, self.max_attempts);
        Ok(WaitOutcome::TimedOut)
    }
}
