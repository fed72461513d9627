//! Activity Feed
//!
//! Trading signals streamed on the `signals` channel, their mapping to
//! activity entries, and the [`ActivityLog`] that merges a one-shot REST
//! page with the live stream without duplicates.
//!
//! # Signal Classification
//!
//! | Signal type | Action | Activity kind |
//! |-------------|--------|---------------|
//! | `Arbitrage` | `detected`, `opportunity` | `ArbitrageDetected` |
//! | `Arbitrage` | `executed`, `filled` | `ArbitrageExecuted` |
//! | `CopyTrade` | `executed`, `copied`, `filled` | `CopyTradeExecuted` |
//! | `CopyTrade` | `skipped`, `rejected` | `CopyTradeSkipped` |
//! | `StopLoss` | `triggered`, `executed` | `StopLossTriggered` |
//! | `TakeProfit` | `triggered`, `executed` | `TakeProfitTriggered` |
//! | `Alert` | any | `Alert` |
//! | unknown type | any | `Other` |
//! | other pairs | | `Other` |

use chrono::{DateTime, Utc};
use serde::{Deserialize, Serialize};
use serde_json::Value;

use super::collection::{BoundedCollection, Identified, SeenIds};

/// Number of remembered ids per visible activity slot.
const SEEN_IDS_FACTOR: usize = 4;

// =============================================================================
// Signals
// =============================================================================

/// Signal family.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize, Deserialize)]
pub enum SignalType {
    /// Cross-market price discrepancy.
    Arbitrage,
    /// Mirrored trade from a followed wallet.
    CopyTrade,
    /// Stop-loss rule.
    StopLoss,
    /// Take-profit rule.
    TakeProfit,
    /// Informational alert.
    Alert,
    /// Signal family this client does not know.
    #[serde(other)]
    Unknown,
}

/// Signal streamed on the `signals` channel.
///
/// # Wire Format (JSON)
/// ```json
/// {"signal_id": "s1", "signal_type": "Arbitrage", "action": "detected",
///  "market_id": "m1", "timestamp": "2026-01-05T14:30:00Z",
///  "metadata": {"spread": 0.03}}
/// ```
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct SignalUpdate {
    /// Signal id, shared with the activity entry it produces.
    pub signal_id: String,
    /// Signal family.
    pub signal_type: SignalType,
    /// Free-form action string.
    pub action: String,
    /// Market the signal refers to.
    #[serde(default)]
    pub market_id: Option<String>,
    /// Server timestamp.
    pub timestamp: DateTime<Utc>,
    /// Free-form payload.
    #[serde(default)]
    pub metadata: Value,
}

// =============================================================================
// Activity Entries
// =============================================================================

/// Activity entry category.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum ActivityKind {
    /// Arbitrage opportunity found.
    ArbitrageDetected,
    /// Arbitrage legs filled.
    ArbitrageExecuted,
    /// Copy trade placed.
    CopyTradeExecuted,
    /// Copy trade not placed.
    CopyTradeSkipped,
    /// Stop loss fired.
    StopLossTriggered,
    /// Take profit fired.
    TakeProfitTriggered,
    /// Informational alert.
    Alert,
    /// Signal with an action this client does not recognise.
    #[serde(other)]
    Other,
}

impl ActivityKind {
    /// Classify a `(signal type, action)` pair.
    ///
    /// Actions are compared case-insensitively. Unknown actions fall back to
    /// [`ActivityKind::Other`]; the signal type itself is matched
    /// exhaustively.
    #[must_use]
    pub fn classify(signal_type: SignalType, action: &str) -> Self {
        let action = action.trim().to_ascii_lowercase();
        match signal_type {
            SignalType::Arbitrage => match action.as_str() {
                "detected" | "opportunity" => Self::ArbitrageDetected,
                "executed" | "filled" => Self::ArbitrageExecuted,
                _ => Self::Other,
            },
            SignalType::CopyTrade => match action.as_str() {
                "executed" | "copied" | "filled" => Self::CopyTradeExecuted,
                "skipped" | "rejected" => Self::CopyTradeSkipped,
                _ => Self::Other,
            },
            SignalType::StopLoss => match action.as_str() {
                "triggered" | "executed" => Self::StopLossTriggered,
                _ => Self::Other,
            },
            SignalType::TakeProfit => match action.as_str() {
                "triggered" | "executed" => Self::TakeProfitTriggered,
                _ => Self::Other,
            },
            SignalType::Alert => Self::Alert,
            SignalType::Unknown => Self::Other,
        }
    }

    /// Get a short human-readable label.
    #[must_use]
    pub const fn label(self) -> &'static str {
        match self {
            Self::ArbitrageDetected => "Arbitrage opportunity detected",
            Self::ArbitrageExecuted => "Arbitrage executed",
            Self::CopyTradeExecuted => "Copy trade executed",
            Self::CopyTradeSkipped => "Copy trade skipped",
            Self::StopLossTriggered => "Stop loss triggered",
            Self::TakeProfitTriggered => "Take profit triggered",
            Self::Alert => "Alert",
            Self::Other => "Signal",
        }
    }
}

/// One entry in the activity feed.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct ActivityItem {
    /// Entry id.
    pub id: String,
    /// Entry category.
    pub kind: ActivityKind,
    /// Display text.
    #[serde(default)]
    pub description: String,
    /// Market the entry refers to.
    #[serde(default)]
    pub market_id: Option<String>,
    /// When the underlying event happened.
    pub timestamp: DateTime<Utc>,
    /// Free-form payload.
    #[serde(default)]
    pub metadata: Value,
}

impl Identified for ActivityItem {
    fn id(&self) -> &str {
        &self.id
    }
}

impl ActivityItem {
    /// Build an entry from a streamed signal.
    ///
    /// A `message` string in the signal metadata is used as the description
    /// when present.
    #[must_use]
    pub fn from_signal(signal: &SignalUpdate) -> Self {
        let kind = ActivityKind::classify(signal.signal_type, &signal.action);
        let description = match signal.metadata.get("message").and_then(Value::as_str) {
            Some(message) => message.to_string(),
            None => match &signal.market_id {
                Some(market) => format!("{} on {market}", kind.label()),
                None => kind.label().to_string(),
            },
        };

        Self {
            id: signal.signal_id.clone(),
            kind,
            description,
            market_id: signal.market_id.clone(),
            timestamp: signal.timestamp,
            metadata: signal.metadata.clone(),
        }
    }
}

// =============================================================================
// Activity Log
// =============================================================================

/// Newest-first, capped activity feed with hydrate/stream deduplication.
#[derive(Debug, Clone)]
pub struct ActivityLog {
    items: BoundedCollection<ActivityItem>,
    seen: SeenIds,
}

impl ActivityLog {
    /// Create an empty log holding at most `capacity` entries.
    #[must_use]
    pub fn new(capacity: usize) -> Self {
        Self {
            items: BoundedCollection::new(capacity),
            seen: SeenIds::new(capacity.max(1) * SEEN_IDS_FACTOR),
        }
    }

    /// Merge a REST page.
    ///
    /// Unseen entries are placed by timestamp, so a page fetched after an
    /// outage slots its newer entries ahead of older ones already shown.
    /// Entries too old to fit a full log are skipped and stay unseen.
    /// Returns the number of entries added.
    pub fn hydrate(&mut self, page: Vec<ActivityItem>) -> usize {
        let mut added = 0;
        for item in page {
            if self.seen.contains(&item.id) {
                continue;
            }
            let id = item.id.clone();
            if self
                .items
                .insert_ordered(item, |new, existing| new.timestamp > existing.timestamp)
                .is_ok()
            {
                self.seen.insert(&id);
                added += 1;
            }
        }
        added
    }

    /// Accept a streamed signal.
    ///
    /// Returns `false` if its id was already delivered, either by hydrate
    /// or by the stream.
    pub fn accept(&mut self, signal: &SignalUpdate) -> bool {
        if self.seen.contains(&signal.signal_id) {
            tracing::trace!(signal_id = %signal.signal_id, "Dropping duplicate signal");
            return false;
        }
        let accepted = self
            .items
            .prepend(ActivityItem::from_signal(signal))
            .is_ok();
        if accepted {
            self.seen.insert(&signal.signal_id);
        }
        accepted
    }

    /// Check if an entry is visible.
    #[must_use]
    pub fn contains(&self, id: &str) -> bool {
        self.items.contains(id)
    }

    /// Get the number of visible entries.
    #[must_use]
    pub fn len(&self) -> usize {
        self.items.len()
    }

    /// Check if the log is empty.
    #[must_use]
    pub fn is_empty(&self) -> bool {
        self.items.is_empty()
    }

    /// Copy the entries out, newest-first.
    #[must_use]
    pub fn snapshot(&self) -> Vec<ActivityItem> {
        self.items.to_vec()
    }
}
