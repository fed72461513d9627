//! Bounded Job Poller
//!
//! Drives a remote job to a terminal status with a fixed interval between
//! status checks, a hard bound on the number of checks, and cancellation
//! through a [`CancellationToken`].
//!
//! The first check happens immediately, so a job that completes on the
//! third check costs two waits.

use std::future::Future;
use std::time::Duration;

use tokio_util::sync::CancellationToken;

use crate::application::ports::{FetchError, JobPort};
use crate::domain::jobs::{JobStatus, JobStatusResponse};
use crate::infrastructure::config::PollSettings;
use crate::infrastructure::metrics;

/// Message used when a failed job carries no error of its own.
const GENERIC_FAILURE: &str = "job failed without an error message";

/// Polling errors.
#[derive(Debug, Clone, PartialEq, Eq, thiserror::Error)]
pub enum PollError {
    /// The job reached `failed`.
    #[error("job failed: {0}")]
    Failed(String),

    /// The job was still running after the last allowed check.
    #[error("job did not finish after {attempts} status checks")]
    TimedOut {
        /// Number of status checks made.
        attempts: u32,
    },

    /// The token was cancelled.
    #[error("polling cancelled")]
    Cancelled,

    /// A status check could not be made.
    #[error(transparent)]
    Fetch(#[from] FetchError),
}

impl PollError {
    const fn outcome(&self) -> &'static str {
        match self {
            Self::Failed(_) => "failed",
            Self::TimedOut { .. } => "timed_out",
            Self::Cancelled => "cancelled",
            Self::Fetch(_) => "fetch_error",
        }
    }
}

/// Fixed-interval, bounded status poller.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub struct BoundedPoller {
    interval: Duration,
    max_attempts: u32,
}

impl Default for BoundedPoller {
    fn default() -> Self {
        Self::new(Duration::from_secs(5), 60)
    }
}

impl BoundedPoller {
    /// Create a poller making at most `max_attempts` checks (at least one).
    #[must_use]
    pub const fn new(interval: Duration, max_attempts: u32) -> Self {
        Self {
            interval,
            max_attempts: if max_attempts == 0 { 1 } else { max_attempts },
        }
    }

    /// Create a poller from `PollSettings`.
    #[must_use]
    pub const fn from_settings(settings: &PollSettings) -> Self {
        Self::new(settings.interval, settings.max_attempts)
    }

    /// Get the wait between checks.
    #[must_use]
    pub const fn interval(&self) -> Duration {
        self.interval
    }

    /// Get the check bound.
    #[must_use]
    pub const fn max_attempts(&self) -> u32 {
        self.max_attempts
    }

    /// Poll `fetch` until the job completes, fails, runs out of checks, or
    /// `cancel` fires.
    ///
    /// The token is checked before every fetch and every wait, and both
    /// race against it.
    ///
    /// # Errors
    ///
    /// Returns `Failed` with the remote message, `TimedOut` after the last
    /// check, `Cancelled`, or the first fetch error.
    pub async fn poll<F, Fut>(
        &self,
        job_id: &str,
        mut fetch: F,
        cancel: &CancellationToken,
    ) -> Result<JobStatusResponse, PollError>
    where
        F: FnMut() -> Fut,
        Fut: Future<Output = Result<JobStatusResponse, FetchError>>,
    {
        let result = self.poll_inner(job_id, &mut fetch, cancel).await;
        let outcome = match &result {
            Ok(_) => "completed",
            Err(e) => e.outcome(),
        };
        metrics::record_job_outcome(outcome);
        result
    }

    /// Poll a job through a [`JobPort`].
    ///
    /// # Errors
    ///
    /// Same as [`BoundedPoller::poll`].
    pub async fn poll_job(
        &self,
        port: &dyn JobPort,
        job_id: &str,
        cancel: &CancellationToken,
    ) -> Result<JobStatusResponse, PollError> {
        self.poll(job_id, || port.fetch_job(job_id), cancel).await
    }

    async fn poll_inner<F, Fut>(
        &self,
        job_id: &str,
        fetch: &mut F,
        cancel: &CancellationToken,
    ) -> Result<JobStatusResponse, PollError>
    where
        F: FnMut() -> Fut,
        Fut: Future<Output = Result<JobStatusResponse, FetchError>>,
    {
        let mut attempts = 0;

        loop {
            if cancel.is_cancelled() {
                return Err(PollError::Cancelled);
            }

            attempts += 1;
            metrics::record_poll_attempt();
            let response = tokio::select! {
                biased;
                () = cancel.cancelled() => return Err(PollError::Cancelled),
                response = fetch() => response?,
            };
            tracing::debug!(job_id, attempt = attempts, status = %response.status, "Job status");

            match response.status {
                JobStatus::Completed => return Ok(response),
                JobStatus::Failed => {
                    let message = response
                        .error
                        .filter(|e| !e.trim().is_empty())
                        .unwrap_or_else(|| GENERIC_FAILURE.to_string());
                    tracing::warn!(job_id, error = %message, "Job failed");
                    return Err(PollError::Failed(message));
                }
                JobStatus::Pending | JobStatus::Running => {}
            }

            if attempts >= self.max_attempts {
                tracing::warn!(job_id, attempts, "Job still running after last status check");
                return Err(PollError::TimedOut { attempts });
            }

            if cancel.is_cancelled() {
                return Err(PollError::Cancelled);
            }
            tokio::select! {
                biased;
                () = cancel.cancelled() => return Err(PollError::Cancelled),
                () = tokio::time::sleep(self.interval) => {}
            }
        }
    }
}
