//! Remote Jobs
//!
//! Types for long-running commands that answer with a job handle instead of
//! a result (backtests).
//! [`BoundedPoller`](crate::application::services::BoundedPoller) drives a
//! handle to a terminal status.

use chrono::{DateTime, NaiveDate, Utc};
use rust_decimal::Decimal;
use serde::{Deserialize, Serialize};
use serde_json::Value;

use super::collection::Identified;

/// Remote job status.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize, Deserialize)]
#[serde(rename_all = "lowercase")]
pub enum JobStatus {
    /// Queued, not started.
    Pending,
    /// In progress.
    Running,
    /// Finished successfully.
    Completed,
    /// Finished with an error.
    Failed,
}

impl JobStatus {
    /// Check if the job will not change status again.
    #[must_use]
    pub const fn is_terminal(self) -> bool {
        matches!(self, Self::Completed | Self::Failed)
    }

    /// Get the status name.
    #[must_use]
    pub const fn as_str(self) -> &'static str {
        match self {
            Self::Pending => "pending",
            Self::Running => "running",
            Self::Completed => "completed",
            Self::Failed => "failed",
        }
    }
}

impl std::fmt::Display for JobStatus {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.write_str(self.as_str())
    }
}

/// Handle returned when a job is submitted.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct JobHandle {
    /// Job id.
    pub id: String,
    /// Status at submission.
    pub status: JobStatus,
}

/// Body of `GET /api/backtest/{id}`.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct JobStatusResponse {
    /// Current status.
    pub status: JobStatus,
    /// Remote error message for failed jobs.
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub error: Option<String>,
    /// Result payload for completed jobs.
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub result: Option<Value>,
}

impl JobStatusResponse {
    /// Create a response with only a status.
    #[must_use]
    pub const fn new(status: JobStatus) -> Self {
        Self {
            status,
            error: None,
            result: None,
        }
    }
}

/// Backtest submission body.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct BacktestRequest {
    /// Strategy name.
    pub strategy: String,
    /// First day of the simulated range.
    pub start_date: NaiveDate,
    /// Last day of the simulated range.
    pub end_date: NaiveDate,
    /// Starting capital.
    pub initial_capital: Decimal,
    /// Strategy parameters.
    #[serde(default)]
    pub parameters: Value,
}

/// A finished backtest kept in the recent-runs list.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct BacktestRun {
    /// Job id.
    pub id: String,
    /// Strategy name.
    pub strategy: String,
    /// Terminal status.
    pub status: JobStatus,
    /// Result payload.
    #[serde(default)]
    pub result: Option<Value>,
    /// When the run finished.
    pub completed_at: DateTime<Utc>,
}

impl Identified for BacktestRun {
    fn id(&self) -> &str {
        &self.id
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use serde_json::json;

    #[test]
    fn status_terminality() {
        assert!(!JobStatus::Pending.is_terminal());
        assert!(!JobStatus::Running.is_terminal());
        assert!(JobStatus::Completed.is_terminal());
        assert!(JobStatus::Failed.is_terminal());
    }

    #[test]
    fn status_response_without_optionals() {
        let response: JobStatusResponse =
            serde_json::from_value(json!({"status": "running"})).unwrap();

        assert_eq!(response, JobStatusResponse::new(JobStatus::Running));
    }

    #[test]
    fn failed_response_carries_error() {
        let response: JobStatusResponse =
            serde_json::from_value(json!({"status": "failed", "error": "no data for range"}))
                .unwrap();

        assert_eq!(response.status, JobStatus::Failed);
        assert_eq!(response.error.as_deref(), Some("no data for range"));
    }

    #[test]
    fn backtest_request_wire_format() {
        let request = BacktestRequest {
            strategy: "arbitrage".to_string(),
            start_date: NaiveDate::from_ymd_opt(2026, 1, 1).unwrap(),
            end_date: NaiveDate::from_ymd_opt(2026, 3, 31).unwrap(),
            initial_capital: Decimal::from(10_000),
            parameters: json!({"min_spread": 0.02}),
        };

        let value = serde_json::to_value(&request).unwrap();

        assert_eq!(value["start_date"], json!("2026-01-01"));
        assert_eq!(value["strategy"], json!("arbitrage"));
    }
}
