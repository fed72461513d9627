//! Positions Sync
//!
//! Keeps the open-positions list current: REST snapshot on hydrate and
//! resync, streamed updates coalesced per position and applied once per
//! window.

use std::sync::Arc;
use std::time::Duration;

use async_trait::async_trait;
use chrono::{DateTime, Utc};
use tokio::sync::watch;
use tokio::time::Instant;

use super::feed::FeedReconciler;
use crate::application::ports::{FetchError, PositionSource};
use crate::domain::positions::{Position, PositionBook, PositionUpdate};
use crate::domain::streaming::{InboundMessage, POSITION_TYPE};
use crate::infrastructure::batching::UpdateAccumulator;
use crate::infrastructure::metrics;

/// What presentation sees of the positions feed.
#[derive(Debug, Clone, Default, PartialEq)]
pub struct PositionsView {
    /// Open positions, newest first.
    pub positions: Vec<Position>,
    /// Last REST failure, cleared by the next successful fetch.
    pub last_error: Option<String>,
    /// When the list was last refreshed from REST.
    pub last_synced: Option<DateTime<Utc>>,
}

/// Reconciler for the `positions` channel.
pub struct PositionSync {
    source: Arc<dyn PositionSource>,
    book: PositionBook,
    accumulator: UpdateAccumulator<PositionUpdate>,
    view: watch::Sender<PositionsView>,
    last_error: Option<String>,
    last_synced: Option<DateTime<Utc>>,
}

impl PositionSync {
    /// Create a reconciler holding at most `capacity` positions and
    /// coalescing updates over `batch_interval`.
    #[must_use]
    pub fn new(source: Arc<dyn PositionSource>, capacity: usize, batch_interval: Duration) -> Self {
        let (view, _) = watch::channel(PositionsView::default());
        Self {
            source,
            book: PositionBook::new(capacity),
            accumulator: UpdateAccumulator::new(batch_interval),
            view,
            last_error: None,
            last_synced: None,
        }
    }

    /// Watch the published view.
    #[must_use]
    pub fn subscribe(&self) -> watch::Receiver<PositionsView> {
        self.view.subscribe()
    }

    /// Get the position book.
    #[must_use]
    pub const fn book(&self) -> &PositionBook {
        &self.book
    }
}

#[async_trait]
impl FeedReconciler for PositionSync {
    fn name(&self) -> &'static str {
        "positions"
    }

    fn on_message(&mut self, message: &InboundMessage) -> bool {
        if !message.is(POSITION_TYPE) {
            tracing::trace!(kind = %message.kind, "Ignoring non-position message");
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

        let summary = self.book.apply_accumulated(&window);
        tracing::debug!(
            inserted = summary.inserted,
            updated = summary.updated,
            removed = summary.removed,
            "Applied position updates"
        );
        summary.changed()
    }

    async fn resync(&mut self) -> Result<(), FetchError> {
        metrics::record_resync(self.name());
        let result = self.source.fetch_positions().await;

        let outcome = match result {
            Ok(positions) => {
                tracing::debug!(count = positions.len(), "Positions refreshed");
                self.book.hydrate(positions);
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
        self.view.send_replace(PositionsView {
            positions: self.book.snapshot(),
            last_error: self.last_error.clone(),
            last_synced: self.last_synced,
        });
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::application::ports::MockPositionSource;
    use rust_decimal::Decimal;
    use serde_json::json;

    fn position(id: &str) -> Position {
        serde_json::from_value(json!({"id": id, "quantity": "10", "current_price": "0.5"}))
            .unwrap()
    }

    fn message(data: serde_json::Value) -> InboundMessage {
        InboundMessage::new(POSITION_TYPE, data)
    }

    #[tokio::test]
    async fn resync_publishes_snapshot() {
        let mut source = MockPositionSource::new();
        source
            .expect_fetch_positions()
            .times(1)
            .returning(|| Ok(vec![position("p1"), position("p2")]));

        let mut sync = PositionSync::new(Arc::new(source), 10, Duration::from_millis(100));
        let view = sync.subscribe();
        sync.resync().await.unwrap();

        let view = view.borrow();
        assert_eq!(view.positions.len(), 2);
        assert!(view.last_error.is_none());
        assert!(view.last_synced.is_some());
    }

    #[tokio::test]
    async fn failed_resync_keeps_positions_and_reports_error() {
        let mut source = MockPositionSource::new();
        let mut calls = 0;
        source.expect_fetch_positions().times(2).returning(move || {
            calls += 1;
            if calls == 1 {
                Ok(vec![position("p1")])
            } else {
                Err(FetchError::Network("connection refused".to_string()))
            }
        });

        let mut sync = PositionSync::new(Arc::new(source), 10, Duration::from_millis(100));
        let view = sync.subscribe();
        sync.resync().await.unwrap();
        assert!(sync.resync().await.is_err());

        let view = view.borrow();
        assert_eq!(view.positions.len(), 1);
        assert!(view.last_error.as_deref().unwrap().contains("connection refused"));
    }

    #[tokio::test(start_paused = true)]
    async fn stream_updates_apply_on_flush() {
        let mut sync = PositionSync::new(
            Arc::new(MockPositionSource::new()),
            10,
            Duration::from_millis(100),
        );

        assert!(!sync.on_message(&message(json!({
            "position_id": "p1", "update_type": "Opened",
            "current_price": 0.5, "quantity": 10
        }))));
        sync.on_message(&message(json!({
            "position_id": "p1", "update_type": "PriceChanged", "current_price": 0.6
        })));
        assert!(sync.flush_deadline().is_some());
        assert!(sync.book().is_empty());

        assert!(sync.flush());
        let p1 = sync.book().get("p1").unwrap();
        assert_eq!(p1.current_price, Decimal::new(6, 1));
        assert_eq!(p1.quantity, Decimal::from(10));
        assert!(sync.flush_deadline().is_none());
    }

    #[tokio::test]
    async fn ignores_other_and_malformed_messages() {
        let mut sync = PositionSync::new(
            Arc::new(MockPositionSource::new()),
            10,
            Duration::from_millis(100),
        );

        sync.on_message(&InboundMessage::new("Signal", json!({})));
        sync.on_message(&message(json!({"update_type": "Opened"})));

        assert!(sync.flush_deadline().is_none());
        assert!(!sync.flush());
    }
}
