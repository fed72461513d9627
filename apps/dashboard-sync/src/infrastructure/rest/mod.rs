//! REST Adapter
//!
//! `reqwest` client for the trading service's snapshot and job endpoints.
//! Implements every application port.
//!
//! # Endpoints
//!
//! - `GET  /api/positions`
//! - `GET  /api/portfolio/stats`
//! - `GET  /api/activity?limit=N`
//! - `POST /api/backtest` → `{id, status}`
//! - `GET  /api/backtest/{id}` → `{status, error?, result?}`

use std::time::Duration;

use async_trait::async_trait;
use reqwest::{Client, Response};
use serde::Deserialize;
use serde::de::DeserializeOwned;

use crate::application::ports::{
    ActivitySource, FetchError, JobPort, PortfolioSource, PositionSource,
};
use crate::domain::activity::ActivityItem;
use crate::domain::jobs::{BacktestRequest, JobHandle, JobStatusResponse};
use crate::domain::portfolio::PortfolioStats;
use crate::domain::positions::Position;
use crate::infrastructure::metrics;

/// Default per-request timeout.
const DEFAULT_TIMEOUT: Duration = Duration::from_secs(10);

/// Error body shapes used by the trading service.
#[derive(Debug, Deserialize)]
struct ErrorBody {
    #[serde(alias = "message", alias = "error")]
    detail: String,
}

/// List endpoints answer with a bare array or a wrapped one.
#[derive(Debug, Deserialize)]
#[serde(untagged)]
enum ListBody<T> {
    Bare(Vec<T>),
    Wrapped {
        #[serde(alias = "positions", alias = "activity", alias = "data")]
        items: Vec<T>,
    },
}

impl<T> ListBody<T> {
    fn into_vec(self) -> Vec<T> {
        match self {
            Self::Bare(items) | Self::Wrapped { items } => items,
        }
    }
}

/// HTTP client for the trading service REST API.
#[derive(Debug, Clone)]
pub struct RestClient {
    client: Client,
    base_url: String,
}

impl RestClient {
    /// Create a client for `base_url` with the default timeout.
    ///
    /// # Errors
    ///
    /// Returns an error if the HTTP client cannot be built.
    pub fn new(base_url: &str) -> Result<Self, FetchError> {
        Self::with_timeout(base_url, DEFAULT_TIMEOUT)
    }

    /// Create a client with a custom per-request timeout.
    ///
    /// # Errors
    ///
    /// Returns an error if the HTTP client cannot be built.
    pub fn with_timeout(base_url: &str, timeout: Duration) -> Result<Self, FetchError> {
        let client = Client::builder()
            .timeout(timeout)
            .build()
            .map_err(|e| FetchError::Network(e.to_string()))?;

        Ok(Self {
            client,
            base_url: base_url.trim_end_matches('/').to_string(),
        })
    }

    /// Get the API base URL.
    #[must_use]
    pub fn base_url(&self) -> &str {
        &self.base_url
    }

    async fn get<T: DeserializeOwned>(&self, path: &str) -> Result<T, FetchError> {
        let url = format!("{}{path}", self.base_url);
        tracing::debug!(%url, "GET");

        let response = self
            .client
            .get(&url)
            .send()
            .await
            .map_err(|e| FetchError::Network(e.to_string()))?;
        Self::decode(response).await
    }

    async fn decode<T: DeserializeOwned>(response: Response) -> Result<T, FetchError> {
        let status = response.status();
        let body = response
            .text()
            .await
            .map_err(|e| FetchError::Network(e.to_string()))?;

        if !status.is_success() {
            let message = match serde_json::from_str::<ErrorBody>(&body) {
                Ok(err) => err.detail,
                Err(_) if body.trim().is_empty() => status
                    .canonical_reason()
                    .unwrap_or("unknown error")
                    .to_string(),
                Err(_) => body,
            };
            return Err(FetchError::Status {
                status: status.as_u16(),
                message,
            });
        }

        serde_json::from_str(&body).map_err(|e| FetchError::Decode(e.to_string()))
    }
}

/// Count and log a failed fetch, then pass it on.
fn observe<T>(resource: &'static str, result: Result<T, FetchError>) -> Result<T, FetchError> {
    if let Err(e) = &result {
        tracing::warn!(resource, error = %e, "REST fetch failed");
        metrics::record_fetch_error(resource);
    }
    result
}

#[async_trait]
impl PositionSource for RestClient {
    async fn fetch_positions(&self) -> Result<Vec<Position>, FetchError> {
        let result = self
            .get::<ListBody<Position>>("/api/positions")
            .await
            .map(ListBody::into_vec);
        observe("positions", result)
    }
}

#[async_trait]
impl PortfolioSource for RestClient {
    async fn fetch_portfolio_stats(&self) -> Result<PortfolioStats, FetchError> {
        observe("portfolio_stats", self.get("/api/portfolio/stats").await)
    }
}

#[async_trait]
impl ActivitySource for RestClient {
    async fn fetch_activity(&self, limit: usize) -> Result<Vec<ActivityItem>, FetchError> {
        let result = self
            .get::<ListBody<ActivityItem>>(&format!("/api/activity?limit={limit}"))
            .await
            .map(ListBody::into_vec);
        observe("activity", result)
    }
}

#[async_trait]
impl JobPort for RestClient {
    async fn submit_backtest(&self, request: &BacktestRequest) -> Result<JobHandle, FetchError> {
        let url = format!("{}/api/backtest", self.base_url);
        tracing::debug!(%url, strategy = %request.strategy, "POST");

        let result = match self.client.post(&url).json(request).send().await {
            Ok(response) => Self::decode(response).await,
            Err(e) => Err(FetchError::Network(e.to_string())),
        };
        observe("backtest", result)
    }

    async fn fetch_job(&self, job_id: &str) -> Result<JobStatusResponse, FetchError> {
        observe("backtest", self.get(&format!("/api/backtest/{job_id}")).await)
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn trims_trailing_slash() {
        let client = RestClient::new("http://localhost:8000/").unwrap();
        assert_eq!(client.base_url(), "http://localhost:8000");
    }

    #[test]
    fn list_body_accepts_both_shapes() {
        let bare: ListBody<u32> = serde_json::from_str("[1, 2]").unwrap();
        assert_eq!(bare.into_vec(), vec![1, 2]);

        let wrapped: ListBody<u32> = serde_json::from_str(r#"{"positions": [3]}"#).unwrap();
        assert_eq!(wrapped.into_vec(), vec![3]);
    }

    #[test]
    fn error_body_aliases() {
        let body: ErrorBody = serde_json::from_str(r#"{"message": "nope"}"#).unwrap();
        assert_eq!(body.detail, "nope");
    }
}
