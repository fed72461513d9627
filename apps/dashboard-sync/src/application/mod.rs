//! Application Layer - Use cases and port definitions.
//!
//! This layer contains the sync services and the port interfaces through
//! which they reach the trading service's REST API.

/// Port interfaces for REST snapshots and jobs.
pub mod ports;

/// Feed reconcilers, job polling, and backtest submission.
pub mod services;
