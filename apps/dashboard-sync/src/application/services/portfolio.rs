//! Portfolio Sync
//!
//! Keeps the portfolio aggregate current. Price moves on tracked positions
//! nudge the aggregate by each position's exact P&L change; a position
//! opening or closing triggers a REST refresh of stats and positions.

use std::sync::Arc;
use std::time::Duration;

use async_trait::async_trait;
use chrono::{DateTime, Utc};
use tokio::sync::watch;
use tokio::time::Instant;

use super::feed::FeedReconciler;
use crate::application::ports::{FetchError, PortfolioSource, PositionSource};
use crate::domain::portfolio::{PortfolioStats, PortfolioTracker, StatsOutcome};
use crate::domain::positions::PositionUpdate;
use crate::domain::streaming::{InboundMessage, POSITION_TYPE};
use crate::infrastructure::batching::UpdateAccumulator;
use crate::infrastructure::metrics;

/// What presentation sees of the portfolio aggregate.
#[derive(Debug, Clone, Default, PartialEq)]
pub struct PortfolioView {
    /// Current aggregate, absent until the first successful fetch.
    pub stats: Option<PortfolioStats>,
    /// Last REST failure, cleared by the next successful fetch.
    pub last_error: Option<String>,
    /// When the aggregate was last refreshed from REST.
    pub last_synced: Option<DateTime<Utc>>,
}

/// Reconciler for portfolio stats, fed by the `positions` channel.
pub struct PortfolioSync {
    stats_source: Arc<dyn PortfolioSource>,
    positions_source: Arc<dyn PositionSource>,
    tracker: PortfolioTracker,
    accumulator: UpdateAccumulator<PositionUpdate>,
    view: watch::Sender<PortfolioView>,
    resync_requested: bool,
    last_error: Option<String>,
    last_synced: Option<DateTime<Utc>>,
}

impl PortfolioSync {
    /// Create a reconciler coalescing updates over `batch_interval`.
    #[must_use]
    pub fn new(
        stats_source: Arc<dyn PortfolioSource>,
        positions_source: Arc<dyn PositionSource>,
        batch_interval: Duration,
    ) -> Self {
        let (view, _) = watch::channel(PortfolioView::default());
        Self {
            stats_source,
            positions_source,
            tracker: PortfolioTracker::new(),
            accumulator: UpdateAccumulator::new(batch_interval),
            view,
            resync_requested: false,
            last_error: None,
            last_synced: None,
        }
    }

    /// Watch the published view.
    #[must_use]
    pub fn subscribe(&self) -> watch::Receiver<PortfolioView> {
        self.view.subscribe()
    }

    /// Get the tracker.
    #[must_use]
    pub const fn tracker(&self) -> &PortfolioTracker {
        &self.tracker
    }
}

#[async_trait]
impl FeedReconciler for PortfolioSync {
    fn name(&self) -> &'static str {
        "portfolio"
    }

    fn on_message(&mut self, message: &InboundMessage) -> bool {
        if !message.is(POSITION_TYPE) {
            return false;
        }
        match message.parse_data::<PositionUpdate>() {
            Ok(update) => {
                self.accumulator.record(update);
            }
            Err(e) => tracing::warn!(error = %e, "Dropping malformed position update"),
        }
        false
    }

    fn flush_deadline(&self) -> Option<Instant> {
        self.accumulator.deadline()
    }

    fn flush(&mut self) -> bool {
        let window = self.accumulator.take();
        if window.is_empty() {
            return false;
        }

        match self.tracker.apply_accumulated(&window) {
            StatsOutcome::Nudged { delta } => {
                tracing::trace!(%delta, "Portfolio nudged");
                true
            }
            StatsOutcome::Unchanged => false,
            StatsOutcome::ResyncRequired => {
                tracing::debug!("Position set changed, portfolio needs refresh");
                self.resync_requested = true;
                false
            }
        }
    }

    fn needs_resync(&self) -> bool {
        self.resync_requested
    }

    async fn resync(&mut self) -> Result<(), FetchError> {
        metrics::record_resync(self.name());
        // Cleared up front so a failing service is not retried in a loop.
        self.resync_requested = false;

        let (stats, positions) = tokio::join!(
            self.stats_source.fetch_portfolio_stats(),
            self.positions_source.fetch_positions()
        );

        let outcome = match stats.and_then(|stats| positions.map(|positions| (stats, positions))) {
            Ok((stats, positions)) => {
                tracing::debug!(positions = positions.len(), "Portfolio refreshed");
                self.tracker.hydrate(stats, &positions);
                self.last_error = None;
                self.last_synced = Some(Utc::now());
                Ok(())
            }
            Err(e) => {
                self.last_error = Some(e.to_string());
                Err(e)
            }
        };
        self.publish();
        outcome
    }

    fn publish(&self) {
        self.view.send_replace(PortfolioView {
            stats: self.tracker.stats().cloned(),
            last_error: self.last_error.clone(),
            last_synced: self.last_synced,
        });
    }
}
