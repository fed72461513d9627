//! Port Interfaces
//!
//! Contracts between the sync services and the trading service's REST API.
//! Infrastructure adapters implement these; services only see the traits.
//!
//! ## Driven Ports (Outbound)
//!
//! - `PositionSource`: open positions snapshot
//! - `PortfolioSource`: portfolio aggregate snapshot
//! - `ActivitySource`: recent activity page
//! - `JobPort`: submit and inspect long-running jobs

use async_trait::async_trait;

use crate::domain::activity::ActivityItem;
use crate::domain::jobs::{BacktestRequest, JobHandle, JobStatusResponse};
use crate::domain::portfolio::PortfolioStats;
use crate::domain::positions::Position;

// =============================================================================
// Errors
// =============================================================================

/// REST fetch failure, worded for display next to stale data.
#[derive(Debug, Clone, PartialEq, Eq, thiserror::Error)]
pub enum FetchError {
    /// The request never produced a response.
    #[error("could not reach the trading service: {0}")]
    Network(String),

    /// The service answered with a non-success status.
    #[error("trading service returned HTTP {status}: {message}")]
    Status {
        /// HTTP status code.
        status: u16,
        /// Response body or reason phrase.
        message: String,
    },

    /// The response body did not have the expected shape.
    #[error("unexpected response from the trading service: {0}")]
    Decode(String),
}

// =============================================================================
// Snapshot Sources
// =============================================================================

/// Source of the open positions snapshot.
#[cfg_attr(test, mockall::automock)]
#[async_trait]
pub trait PositionSource: Send + Sync {
    /// Fetch all open positions.
    async fn fetch_positions(&self) -> Result<Vec<Position>, FetchError>;
}

/// Source of the portfolio aggregate.
#[cfg_attr(test, mockall::automock)]
#[async_trait]
pub trait PortfolioSource: Send + Sync {
    /// Fetch the current portfolio stats.
    async fn fetch_portfolio_stats(&self) -> Result<PortfolioStats, FetchError>;
}

/// Source of recent activity, newest first.
#[cfg_attr(test, mockall::automock)]
#[async_trait]
pub trait ActivitySource: Send + Sync {
    /// Fetch up to `limit` recent activity entries.
    async fn fetch_activity(&self, limit: usize) -> Result<Vec<ActivityItem>, FetchError>;
}

// =============================================================================
// Jobs
// =============================================================================

/// Long-running job endpoints.
#[cfg_attr(test, mockall::automock)]
#[async_trait]
pub trait JobPort: Send + Sync {
    /// Submit a backtest and return its job handle.
    async fn submit_backtest(&self, request: &BacktestRequest) -> Result<JobHandle, FetchError>;

    /// Fetch the current status of a job.
    async fn fetch_job(&self, job_id: &str) -> Result<JobStatusResponse, FetchError>;
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn fetch_error_messages_are_readable() {
        let err = FetchError::Status {
            status: 503,
            message: "Service Unavailable".to_string(),
        };
        assert_eq!(
            err.to_string(),
            "trading service returned HTTP 503: Service Unavailable"
        );
        assert!(
            FetchError::Network("connection refused".to_string())
                .to_string()
                .starts_with("could not reach")
        );
    }
}
