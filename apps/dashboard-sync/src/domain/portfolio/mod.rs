//! Portfolio Statistics
//!
//! Aggregate-only view of the account. The tracker does not keep a position
//! list; it keeps each open position's unrealized P&L contribution so that a
//! price change can move the aggregate by the exact difference.
//!
//! # Resync Rules
//!
//! Membership changes (`Opened`, `Closed`) and changes for a position the
//! tracker has no contribution for cannot be folded into the aggregate
//! without the full position list. Those return
//! [`StatsOutcome::ResyncRequired`] and the caller re-fetches stats and
//! positions from the REST snapshot endpoints.

use std::collections::HashMap;

use chrono::{DateTime, Utc};
use rust_decimal::Decimal;
use serde::{Deserialize, Serialize};

use super::positions::{Position, PositionUpdate};
use super::streaming::{AccumulatedUpdates, EntityUpdate, Lifecycle};

/// Portfolio statistics as served by `GET /api/portfolio/stats`.
#[derive(Debug, Clone, Default, PartialEq, Eq, Serialize, Deserialize)]
pub struct PortfolioStats {
    /// Cash plus marked value of open positions.
    #[serde(default)]
    pub total_value: Decimal,
    /// Uninvested cash.
    #[serde(default)]
    pub cash_balance: Decimal,
    /// Sum of unrealized P&L over open positions.
    #[serde(default)]
    pub unrealized_pnl: Decimal,
    /// Realized P&L.
    #[serde(default)]
    pub realized_pnl: Decimal,
    /// P&L since the start of the trading day.
    #[serde(default)]
    pub daily_pnl: Decimal,
    /// Number of open positions.
    #[serde(default)]
    pub open_positions: u32,
    /// When the stats were computed or last nudged.
    #[serde(default)]
    pub updated_at: Option<DateTime<Utc>>,
}

/// Effect of applying an update to the tracker.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum StatsOutcome {
    /// The aggregate moved by `delta`.
    Nudged {
        /// Change applied to unrealized P&L and total value.
        delta: Decimal,
    },
    /// Nothing relevant to the aggregate changed.
    Unchanged,
    /// The aggregate cannot be updated incrementally; re-fetch it.
    ResyncRequired,
}

/// Incremental portfolio-stats reconciler.
#[derive(Debug, Clone, Default)]
pub struct PortfolioTracker {
    stats: Option<PortfolioStats>,
    contributions: HashMap<String, Decimal>,
}

impl PortfolioTracker {
    /// Create an empty tracker. Every update requires a resync until the
    /// first hydrate.
    #[must_use]
    pub fn new() -> Self {
        Self::default()
    }

    /// Replace the aggregate and the per-position contributions with a
    /// fresh REST snapshot.
    pub fn hydrate(&mut self, stats: PortfolioStats, positions: &[Position]) {
        self.contributions = positions
            .iter()
            .map(|position| (position.id.clone(), position.unrealized_pnl))
            .collect();
        self.stats = Some(stats);
    }

    /// Apply one streamed position update.
    pub fn apply(&mut self, update: &PositionUpdate) -> StatsOutcome {
        match update.lifecycle() {
            Lifecycle::Opened | Lifecycle::Closed => StatsOutcome::ResyncRequired,
            Lifecycle::Changed => self.nudge(update),
        }
    }

    /// Apply a flushed accumulation window.
    ///
    /// Any opened or closed id in the window forces a resync; otherwise the
    /// merged deltas are folded in one by one.
    pub fn apply_accumulated(&mut self, window: &AccumulatedUpdates<PositionUpdate>) -> StatsOutcome {
        if !window.opened.is_empty() || !window.closed.is_empty() {
            return StatsOutcome::ResyncRequired;
        }

        let mut total = Decimal::ZERO;
        let mut nudged = false;
        for delta in window.deltas.values() {
            match self.nudge(delta) {
                StatsOutcome::Nudged { delta } => {
                    total += delta;
                    nudged = true;
                }
                StatsOutcome::Unchanged => {}
                StatsOutcome::ResyncRequired => return StatsOutcome::ResyncRequired,
            }
        }

        if nudged {
            StatsOutcome::Nudged { delta: total }
        } else {
            StatsOutcome::Unchanged
        }
    }

    fn nudge(&mut self, update: &PositionUpdate) -> StatsOutcome {
        let Some(stats) = self.stats.as_mut() else {
            return StatsOutcome::ResyncRequired;
        };
        let Some(contribution) = self.contributions.get_mut(&update.position_id) else {
            return StatsOutcome::ResyncRequired;
        };
        let Some(pnl) = update.unrealized_pnl else {
            return StatsOutcome::Unchanged;
        };

        let delta = pnl - *contribution;
        *contribution = pnl;
        if delta.is_zero() {
            return StatsOutcome::Unchanged;
        }

        stats.unrealized_pnl += delta;
        stats.total_value += delta;
        stats.updated_at = Some(update.timestamp.unwrap_or_else(Utc::now));
        StatsOutcome::Nudged { delta }
    }

    /// Get the current aggregate, if hydrated.
    #[must_use]
    pub const fn stats(&self) -> Option<&PortfolioStats> {
        self.stats.as_ref()
    }

    /// Get the number of positions with a tracked contribution.
    #[must_use]
    pub fn tracked(&self) -> usize {
        self.contributions.len()
    }

    /// Drop the aggregate so every update requires a resync.
    pub fn invalidate(&mut self) {
        self.stats = None;
        self.contributions.clear();
    }
}
