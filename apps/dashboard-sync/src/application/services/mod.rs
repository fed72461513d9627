//! Application Services
//!
//! Services that orchestrate domain logic and coordinate between ports.
//!
//! - `Feed`: drives one reconciler against one transport connection
//! - `PositionSync`, `PortfolioSync`, `ActivitySync`: per-feed reconcilers
//!   publishing `watch` views
//! - `BoundedPoller`: fixed-interval, bounded, cancellable job polling
//! - `BacktestRunner`: single-flight backtest submission

mod activity;
mod backtest;
mod feed;
mod poller;
mod portfolio;
mod positions;

pub use activity::{ActivitySync, ActivityView};
pub use backtest::{BacktestRunner, DEFAULT_RECENT_RUNS};
pub use feed::{Feed, FeedReconciler};
pub use poller::{BoundedPoller, PollError};
pub use portfolio::{PortfolioSync, PortfolioView};
pub use positions::{PositionSync, PositionsView};
