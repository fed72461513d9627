//! Positions
//!
//! Position entities as shown on the dashboard, the partial updates
//! streamed on the `positions` channel, and the [`PositionBook`]
//! reconciler that folds those updates into the open-positions list.
//!
//! # Merge Rules
//!
//! | Update | Id present | Id absent |
//! |--------|------------|-----------|
//! | `Opened` | no-op | construct + prepend (evict tail on overflow) |
//! | `Updated` / `PriceChanged` | overwrite carried fields, stamp time | dropped |
//! | `Closed` | remove | no-op |

use chrono::{DateTime, Utc};
use rust_decimal::Decimal;
use serde::{Deserialize, Serialize};

use super::collection::{BoundedCollection, Identified};
use super::streaming::{AccumulatedUpdates, EntityUpdate, Lifecycle};

// =============================================================================
// Entity
// =============================================================================

/// An open position.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct Position {
    /// Position id.
    #[serde(alias = "position_id")]
    pub id: String,
    /// Market the position is held in.
    #[serde(default)]
    pub market_id: Option<String>,
    /// Side or outcome held (e.g. `"YES"`).
    #[serde(default)]
    pub side: Option<String>,
    /// Position size.
    #[serde(default)]
    pub quantity: Decimal,
    /// Average entry price.
    #[serde(default)]
    pub entry_price: Decimal,
    /// Last known mark price.
    #[serde(default)]
    pub current_price: Decimal,
    /// Unrealized profit and loss.
    #[serde(default)]
    pub unrealized_pnl: Decimal,
    /// When the position was opened.
    #[serde(default)]
    pub opened_at: Option<DateTime<Utc>>,
    /// When the position was last updated.
    #[serde(default)]
    pub updated_at: Option<DateTime<Utc>>,
}

impl Identified for Position {
    fn id(&self) -> &str {
        &self.id
    }
}

impl Position {
    /// Construct a position from an `Opened` update.
    ///
    /// Missing fields default to zero; the entry price falls back to the
    /// current price.
    #[must_use]
    pub fn from_update(update: &PositionUpdate) -> Self {
        let current_price = update.current_price.unwrap_or_default();
        Self {
            id: update.position_id.clone(),
            market_id: update.market_id.clone(),
            side: update.side.clone(),
            quantity: update.quantity.unwrap_or_default(),
            entry_price: update.entry_price.unwrap_or(current_price),
            current_price,
            unrealized_pnl: update.unrealized_pnl.unwrap_or_default(),
            opened_at: update.timestamp,
            updated_at: update.timestamp,
        }
    }

    /// Overwrite the fields carried by an update and stamp its timestamp.
    pub fn apply(&mut self, update: &PositionUpdate) {
        if let Some(price) = update.current_price {
            self.current_price = price;
        }
        if let Some(pnl) = update.unrealized_pnl {
            self.unrealized_pnl = pnl;
        }
        if let Some(quantity) = update.quantity {
            self.quantity = quantity;
        }
        if let Some(entry_price) = update.entry_price {
            self.entry_price = entry_price;
        }
        if update.market_id.is_some() {
            self.market_id.clone_from(&update.market_id);
        }
        if update.side.is_some() {
            self.side.clone_from(&update.side);
        }
        self.updated_at = Some(update.timestamp.unwrap_or_else(Utc::now));
    }

    /// Get the market value at the current price.
    #[must_use]
    pub fn market_value(&self) -> Decimal {
        self.quantity * self.current_price
    }
}

// =============================================================================
// Updates
// =============================================================================

/// Kind of position update.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize, Deserialize)]
pub enum PositionUpdateType {
    /// Position opened.
    Opened,
    /// Quantity or other fields changed.
    Updated,
    /// Mark price changed.
    PriceChanged,
    /// Position closed.
    Closed,
}

impl PositionUpdateType {
    /// Get the lifecycle class.
    #[must_use]
    pub const fn lifecycle(self) -> Lifecycle {
        match self {
            Self::Opened => Lifecycle::Opened,
            Self::Updated | Self::PriceChanged => Lifecycle::Changed,
            Self::Closed => Lifecycle::Closed,
        }
    }
}

/// Partial position update streamed on the `positions` channel.
///
/// # Wire Format (JSON)
/// ```json
/// {"update_type": "PriceChanged", "position_id": "p1",
///  "current_price": 0.6, "unrealized_pnl": 5, "quantity": 10,
///  "timestamp": "2026-01-05T14:30:00Z"}
/// ```
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct PositionUpdate {
    /// Position id.
    pub position_id: String,
    /// Update kind.
    pub update_type: PositionUpdateType,
    /// New mark price.
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub current_price: Option<Decimal>,
    /// New unrealized P&L.
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub unrealized_pnl: Option<Decimal>,
    /// New quantity.
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub quantity: Option<Decimal>,
    /// Server timestamp of the change.
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub timestamp: Option<DateTime<Utc>>,
    /// Market id (sent with `Opened`).
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub market_id: Option<String>,
    /// Side or outcome (sent with `Opened`).
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub side: Option<String>,
    /// Entry price (sent with `Opened`).
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub entry_price: Option<Decimal>,
}

impl PositionUpdate {
    /// Create an update carrying only an id and a kind.
    #[must_use]
    pub fn new(position_id: impl Into<String>, update_type: PositionUpdateType) -> Self {
        Self {
            position_id: position_id.into(),
            update_type,
            current_price: None,
            unrealized_pnl: None,
            quantity: None,
            timestamp: None,
            market_id: None,
            side: None,
            entry_price: None,
        }
    }

    /// Set the mark price.
    #[must_use]
    pub const fn with_price(mut self, price: Decimal) -> Self {
        self.current_price = Some(price);
        self
    }

    /// Set the unrealized P&L.
    #[must_use]
    pub const fn with_pnl(mut self, pnl: Decimal) -> Self {
        self.unrealized_pnl = Some(pnl);
        self
    }

    /// Set the quantity.
    #[must_use]
    pub const fn with_quantity(mut self, quantity: Decimal) -> Self {
        self.quantity = Some(quantity);
        self
    }

    /// Set the timestamp.
    #[must_use]
    pub const fn with_timestamp(mut self, timestamp: DateTime<Utc>) -> Self {
        self.timestamp = Some(timestamp);
        self
    }
}

fn overwrite<T: Clone>(target: &mut Option<T>, newer: Option<&T>) {
    if let Some(value) = newer {
        *target = Some(value.clone());
    }
}

impl EntityUpdate for PositionUpdate {
    fn entity_id(&self) -> &str {
        &self.position_id
    }

    fn lifecycle(&self) -> Lifecycle {
        self.update_type.lifecycle()
    }

    fn merge(&mut self, newer: &Self) {
        self.update_type = newer.update_type;
        overwrite(&mut self.current_price, newer.current_price.as_ref());
        overwrite(&mut self.unrealized_pnl, newer.unrealized_pnl.as_ref());
        overwrite(&mut self.quantity, newer.quantity.as_ref());
        overwrite(&mut self.timestamp, newer.timestamp.as_ref());
        overwrite(&mut self.market_id, newer.market_id.as_ref());
        overwrite(&mut self.side, newer.side.as_ref());
        overwrite(&mut self.entry_price, newer.entry_price.as_ref());
    }
}

// =============================================================================
// Reconciler
// =============================================================================

/// Effect of applying one update to the book.
#[derive(Debug, Clone, PartialEq, Eq)]
pub enum ReconcileOutcome {
    /// A new position was inserted. Carries the id evicted on overflow.
    Inserted {
        /// Position evicted from the tail, if any.
        evicted: Option<String>,
    },
    /// An existing position was updated.
    Updated,
    /// A position was removed.
    Removed,
    /// `Opened` for an id already present.
    Duplicate,
    /// Update for an id not present; nothing changed.
    Unknown,
}

impl ReconcileOutcome {
    /// Check if the book changed.
    #[must_use]
    pub const fn changed(&self) -> bool {
        matches!(self, Self::Inserted { .. } | Self::Updated | Self::Removed)
    }
}

/// Counts from applying a flushed accumulation window.
#[derive(Debug, Clone, Copy, Default, PartialEq, Eq)]
pub struct FlushSummary {
    /// Positions inserted.
    pub inserted: usize,
    /// Positions updated.
    pub updated: usize,
    /// Positions removed.
    pub removed: usize,
}

impl FlushSummary {
    /// Check if the book changed.
    #[must_use]
    pub const fn changed(&self) -> bool {
        self.inserted + self.updated + self.removed > 0
    }
}

/// The open-positions collection and its merge rules.
#[derive(Debug, Clone)]
pub struct PositionBook {
    positions: BoundedCollection<Position>,
}

impl PositionBook {
    /// Create an empty book.
    #[must_use]
    pub fn new(capacity: usize) -> Self {
        Self {
            positions: BoundedCollection::new(capacity),
        }
    }

    /// Replace the book with a REST snapshot (newest-first).
    pub fn hydrate(&mut self, positions: Vec<Position>) {
        self.positions.replace_all(positions);
    }

    /// Apply one update in receipt order.
    pub fn apply(&mut self, update: &PositionUpdate) -> ReconcileOutcome {
        match update.update_type.lifecycle() {
            Lifecycle::Opened => self.open(update),
            Lifecycle::Changed => match self.positions.get_mut(&update.position_id) {
                Some(position) => {
                    position.apply(update);
                    ReconcileOutcome::Updated
                }
                None => {
                    tracing::trace!(position_id = %update.position_id, "Dropping update for unknown position");
                    ReconcileOutcome::Unknown
                }
            },
            Lifecycle::Closed => {
                if self.positions.remove(&update.position_id).is_some() {
                    ReconcileOutcome::Removed
                } else {
                    ReconcileOutcome::Unknown
                }
            }
        }
    }

    /// Apply a flushed accumulation window.
    ///
    /// Ids in the closed set are removed regardless of any opened or delta
    /// entry for the same id in the window. For every other id the result
    /// matches applying the window's updates in receipt order.
    pub fn apply_accumulated(&mut self, window: &AccumulatedUpdates<PositionUpdate>) -> FlushSummary {
        let mut summary = FlushSummary::default();

        for opened in &window.opened {
            let id = opened.position_id.as_str();
            if window.is_closed(id) {
                continue;
            }
            let changes = match self.open(opened) {
                ReconcileOutcome::Inserted { .. } => {
                    summary.inserted += 1;
                    window.since_open.get(id)
                }
                // Already held before the window, so the `Opened` is a no-op
                // and every change in the window applies.
                _ => {
                    let changes = window.deltas.get(id);
                    if changes.is_some() {
                        summary.updated += 1;
                    }
                    changes
                }
            };
            if let Some(changes) = changes
                && let Some(position) = self.positions.get_mut(id)
            {
                position.apply(changes);
            }
        }

        for (id, delta) in &window.deltas {
            if window.is_closed(id) || window.was_opened(id) {
                continue;
            }
            if let Some(position) = self.positions.get_mut(id) {
                position.apply(delta);
                summary.updated += 1;
            }
        }

        for id in &window.closed {
            if self.positions.remove(id).is_some() {
                summary.removed += 1;
            }
        }

        summary
    }

    fn open(&mut self, update: &PositionUpdate) -> ReconcileOutcome {
        if self.positions.contains(&update.position_id) {
            return ReconcileOutcome::Duplicate;
        }
        match self.positions.prepend(Position::from_update(update)) {
            Ok(evicted) => ReconcileOutcome::Inserted {
                evicted: evicted.map(|position| position.id),
            },
            Err(_) => ReconcileOutcome::Duplicate,
        }
    }

    /// Get a position by id.
    #[must_use]
    pub fn get(&self, id: &str) -> Option<&Position> {
        self.positions.get(id)
    }

    /// Check if a position is present.
    #[must_use]
    pub fn contains(&self, id: &str) -> bool {
        self.positions.contains(id)
    }

    /// Get the number of open positions.
    #[must_use]
    pub fn len(&self) -> usize {
        self.positions.len()
    }

    /// Check if there are no open positions.
    #[must_use]
    pub fn is_empty(&self) -> bool {
        self.positions.is_empty()
    }

    /// Iterate the position ids newest-first.
    pub fn ids(&self) -> impl Iterator<Item = &str> {
        self.positions.ids()
    }

    /// Copy the positions out, newest-first.
    #[must_use]
    pub fn snapshot(&self) -> Vec<Position> {
        self.positions.to_vec()
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::infrastructure::batching::UpdateAccumulator;
    use std::time::Duration;

    fn opened(id: &str) -> PositionUpdate {
        PositionUpdate::new(id, PositionUpdateType::Opened)
            .with_price(Decimal::new(50, 2))
            .with_quantity(Decimal::from(10))
            .with_pnl(Decimal::ZERO)
    }

    fn price(id: &str, price: Decimal) -> PositionUpdate {
        PositionUpdate::new(id, PositionUpdateType::PriceChanged).with_price(price)
    }

    fn closed(id: &str) -> PositionUpdate {
        PositionUpdate::new(id, PositionUpdateType::Closed)
    }

    #[test]
    fn deserializes_wire_update() {
        let update: PositionUpdate = serde_json::from_str(
            r#"{"update_type":"PriceChanged","position_id":"p1","current_price":0.6,
                "unrealized_pnl":5,"quantity":10,"timestamp":"2026-01-05T14:30:00Z"}"#,
        )
        .unwrap();

        assert_eq!(update.update_type, PositionUpdateType::PriceChanged);
        assert_eq!(update.current_price, Some(Decimal::new(6, 1)));
        assert_eq!(update.unrealized_pnl, Some(Decimal::from(5)));
        assert_eq!(update.quantity, Some(Decimal::from(10)));
        assert!(update.timestamp.is_some());
    }

    #[test]
    fn opened_inserts_at_head() {
        let mut book = PositionBook::new(10);
        book.apply(&opened("p1"));
        let outcome = book.apply(&opened("p2"));

        assert_eq!(outcome, ReconcileOutcome::Inserted { evicted: None });
        assert_eq!(book.ids().collect::<Vec<_>>(), vec!["p2", "p1"]);
    }

    #[test]
    fn duplicate_opened_is_noop() {
        let mut book = PositionBook::new(10);
        book.apply(&opened("p1"));
        book.apply(&price("p1", Decimal::new(70, 2)));

        let outcome = book.apply(&opened("p1"));

        assert_eq!(outcome, ReconcileOutcome::Duplicate);
        assert_eq!(book.len(), 1);
        assert_eq!(book.get("p1").unwrap().current_price, Decimal::new(70, 2));
    }

    #[test]
    fn opened_overflow_evicts_oldest() {
        let mut book = PositionBook::new(2);
        book.apply(&opened("p1"));
        book.apply(&opened("p2"));

        let outcome = book.apply(&opened("p3"));

        assert_eq!(
            outcome,
            ReconcileOutcome::Inserted {
                evicted: Some("p1".to_string())
            }
        );
        assert!(!book.contains("p1"));
    }

    #[test]
    fn update_overwrites_only_carried_fields() {
        let mut book = PositionBook::new(10);
        book.apply(&opened("p1").with_pnl(Decimal::from(2)));

        let ts = Utc::now();
        book.apply(&price("p1", Decimal::new(6, 1)).with_timestamp(ts));

        let position = book.get("p1").unwrap();
        assert_eq!(position.current_price, Decimal::new(6, 1));
        assert_eq!(position.unrealized_pnl, Decimal::from(2));
        assert_eq!(position.quantity, Decimal::from(10));
        assert_eq!(position.updated_at, Some(ts));
    }

    #[test]
    fn update_for_unknown_id_is_dropped() {
        let mut book = PositionBook::new(10);
        let outcome = book.apply(&price("ghost", Decimal::ONE));

        assert_eq!(outcome, ReconcileOutcome::Unknown);
        assert!(book.is_empty());
    }

    #[test]
    fn closed_removes_and_is_idempotent() {
        let mut book = PositionBook::new(10);
        book.apply(&opened("p1"));

        assert_eq!(book.apply(&closed("p1")), ReconcileOutcome::Removed);
        assert_eq!(book.apply(&closed("p1")), ReconcileOutcome::Unknown);
        assert!(book.is_empty());
    }

    #[test]
    fn opened_price_closed_scenario() {
        let mut book = PositionBook::new(10);

        book.apply(&opened("p1"));
        assert!(book.contains("p1"));

        book.apply(
            &PositionUpdate::new("p1", PositionUpdateType::PriceChanged)
                .with_price(Decimal::new(6, 1))
                .with_pnl(Decimal::from(5))
                .with_quantity(Decimal::from(10)),
        );
        assert_eq!(book.get("p1").unwrap().current_price, Decimal::new(6, 1));

        book.apply(&closed("p1"));
        assert!(!book.contains("p1"));
    }

    #[test]
    fn merge_keeps_missing_fields() {
        let mut merged = price("p1", Decimal::new(9, 1)).with_quantity(Decimal::from(10));
        merged.merge(&PositionUpdate::new("p1", PositionUpdateType::Updated).with_pnl(Decimal::ONE));

        assert_eq!(merged.update_type, PositionUpdateType::Updated);
        assert_eq!(merged.current_price, Some(Decimal::new(9, 1)));
        assert_eq!(merged.unrealized_pnl, Some(Decimal::ONE));
        assert_eq!(merged.quantity, Some(Decimal::from(10)));
    }

    #[test]
    fn accumulated_window_closed_wins() {
        let mut book = PositionBook::new(10);
        book.apply(&opened("existing"));

        let mut acc = UpdateAccumulator::new(Duration::from_millis(100));
        acc.record(opened("p1"));
        acc.record(price("p1", Decimal::new(8, 1)));
        acc.record(opened("p2"));
        acc.record(closed("p2"));
        acc.record(price("existing", Decimal::new(3, 1)));
        acc.record(price("ghost", Decimal::ONE));
        let window = acc.take();

        let summary = book.apply_accumulated(&window);

        assert_eq!(
            summary,
            FlushSummary {
                inserted: 1,
                updated: 1,
                removed: 0,
            }
        );
        assert_eq!(book.get("p1").unwrap().current_price, Decimal::new(8, 1));
        assert!(!book.contains("p2"));
        assert!(!book.contains("ghost"));
        assert_eq!(
            book.get("existing").unwrap().current_price,
            Decimal::new(3, 1)
        );
    }

    #[test]
    fn accumulated_close_of_existing_position() {
        let mut book = PositionBook::new(10);
        book.apply(&opened("p1"));

        let mut acc = UpdateAccumulator::new(Duration::from_millis(100));
        acc.record(price("p1", Decimal::ONE));
        acc.record(closed("p1"));
        let summary = book.apply_accumulated(&acc.take());

        assert_eq!(summary.removed, 1);
        assert_eq!(summary.updated, 0);
        assert!(book.is_empty());
    }

    #[test]
    fn accumulated_reopen_of_held_position_keeps_changes() {
        let mut sequential = PositionBook::new(10);
        let mut batched = PositionBook::new(10);
        sequential.apply(&opened("p1"));
        batched.apply(&opened("p1"));

        // Servers replay `Opened` after a reconnect for positions already
        // hydrated over REST.
        let replayed = [
            price("p1", Decimal::new(55, 2)),
            opened("p1").with_quantity(Decimal::from(99)),
            price("p1", Decimal::new(6, 1)).with_pnl(Decimal::ONE),
        ];
        let mut acc = UpdateAccumulator::new(Duration::from_millis(100));
        for update in &replayed {
            sequential.apply(update);
            acc.record(update.clone());
        }

        let summary = batched.apply_accumulated(&acc.take());

        assert_eq!(
            summary,
            FlushSummary {
                inserted: 0,
                updated: 1,
                removed: 0,
            }
        );
        let position = batched.get("p1").unwrap();
        assert_eq!(position.current_price, Decimal::new(6, 1));
        assert_eq!(position.unrealized_pnl, Decimal::ONE);
        assert_eq!(position.quantity, Decimal::from(10));
        assert_eq!(position.current_price, sequential.get("p1").unwrap().current_price);
    }

    #[test]
    fn accumulated_open_ignores_changes_that_arrived_first() {
        let mut book = PositionBook::new(10);

        let mut acc = UpdateAccumulator::new(Duration::from_millis(100));
        acc.record(price("p1", Decimal::new(9, 1)));
        acc.record(opened("p1"));
        acc.record(PositionUpdate::new("p1", PositionUpdateType::Updated).with_pnl(Decimal::TWO));
        let summary = book.apply_accumulated(&acc.take());

        assert_eq!(summary.inserted, 1);
        let position = book.get("p1").unwrap();
        assert_eq!(position.current_price, Decimal::new(50, 2));
        assert_eq!(position.entry_price, Decimal::new(50, 2));
        assert_eq!(position.unrealized_pnl, Decimal::TWO);
    }
}
