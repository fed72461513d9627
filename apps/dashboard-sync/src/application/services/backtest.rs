//! Backtest Runner
//!
//! Submits a backtest, polls it to completion, and records finished runs
//! in a bounded recent-runs list. Starting a run cancels the one in
//! flight; a cancelled run never writes its result.

use std::sync::Arc;

use chrono::Utc;
use parking_lot::Mutex;
use tokio_util::sync::CancellationToken;
use uuid::Uuid;

use super::poller::{BoundedPoller, PollError};
use crate::application::ports::JobPort;
use crate::domain::collection::BoundedCollection;
use crate::domain::jobs::{BacktestRequest, BacktestRun};

/// Default number of finished runs kept.
pub const DEFAULT_RECENT_RUNS: usize = 20;

/// The run currently in flight.
struct ActiveRun {
    id: Uuid,
    cancel: CancellationToken,
}

/// Single-flight backtest submitter.
pub struct BacktestRunner {
    port: Arc<dyn JobPort>,
    poller: BoundedPoller,
    recent: Mutex<BoundedCollection<BacktestRun>>,
    active: Mutex<Option<ActiveRun>>,
}

impl BacktestRunner {
    /// Create a runner keeping at most `capacity` finished runs.
    #[must_use]
    pub fn new(port: Arc<dyn JobPort>, poller: BoundedPoller, capacity: usize) -> Self {
        Self {
            port,
            poller,
            recent: Mutex::new(BoundedCollection::new(capacity)),
            active: Mutex::new(None),
        }
    }

    /// Submit and poll a backtest, superseding any run in flight.
    ///
    /// # Errors
    ///
    /// Returns `Cancelled` if the run was superseded or cancelled, or the
    /// submission or polling error.
    pub async fn run(&self, request: BacktestRequest) -> Result<BacktestRun, PollError> {
        let run_id = Uuid::new_v4();
        let cancel = CancellationToken::new();

        let previous = self.active.lock().replace(ActiveRun {
            id: run_id,
            cancel: cancel.clone(),
        });
        if let Some(previous) = previous {
            tracing::info!("Superseding backtest in flight");
            previous.cancel.cancel();
        }

        let result = self.execute(request, &cancel).await;

        let mut active = self.active.lock();
        if active.as_ref().is_some_and(|run| run.id == run_id) {
            *active = None;
        }
        drop(active);

        result
    }

    async fn execute(
        &self,
        request: BacktestRequest,
        cancel: &CancellationToken,
    ) -> Result<BacktestRun, PollError> {
        let handle = tokio::select! {
            biased;
            () = cancel.cancelled() => return Err(PollError::Cancelled),
            handle = self.port.submit_backtest(&request) => handle?,
        };
        tracing::info!(job_id = %handle.id, strategy = %request.strategy, "Backtest submitted");

        let response = self
            .poller
            .poll_job(self.port.as_ref(), &handle.id, cancel)
            .await?;

        let run = BacktestRun {
            id: handle.id,
            strategy: request.strategy,
            status: response.status,
            result: response.result,
            completed_at: Utc::now(),
        };

        // Checked and written under one lock so a superseding run cannot
        // slip in between.
        let mut recent = self.recent.lock();
        if cancel.is_cancelled() {
            return Err(PollError::Cancelled);
        }
        if recent.prepend(run.clone()).is_err() {
            tracing::debug!(job_id = %run.id, "Run already recorded");
        }
        drop(recent);

        tracing::info!(job_id = %run.id, "Backtest completed");
        Ok(run)
    }

    /// Cancel the run in flight, if any.
    pub fn cancel(&self) {
        if let Some(run) = self.active.lock().take() {
            run.cancel.cancel();
        }
    }

    /// Check if a run is in flight.
    #[must_use]
    pub fn is_running(&self) -> bool {
        self.active.lock().is_some()
    }

    /// Copy the finished runs out, newest first.
    #[must_use]
    pub fn recent(&self) -> Vec<BacktestRun> {
        self.recent.lock().to_vec()
    }
}
