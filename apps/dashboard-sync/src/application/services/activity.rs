//! Activity Sync
//!
//! Merges one REST page of recent activity with the live `signals` stream.
//! Both paths go through the log's seen-id set, so an entry delivered by
//! hydrate is never repeated by the stream and vice versa.

use std::sync::Arc;

use async_trait::async_trait;
use chrono::{DateTime, Utc};
use tokio::sync::watch;

use super::feed::FeedReconciler;
use crate::application::ports::{ActivitySource, FetchError};
use crate::domain::activity::{ActivityItem, ActivityLog, SignalUpdate};
use crate::domain::streaming::{InboundMessage, SIGNAL_TYPE};
use crate::infrastructure::metrics;

/// What presentation sees of the activity feed.
#[derive(Debug, Clone, Default, PartialEq)]
pub struct ActivityView {
    /// Entries, newest first.
    pub items: Vec<ActivityItem>,
    /// Last REST failure, cleared by the next successful fetch.
    pub last_error: Option<String>,
    /// When the feed was last merged with a REST page.
    pub last_synced: Option<DateTime<Utc>>,
}

/// Reconciler for the `signals` channel.
pub struct ActivitySync {
    source: Arc<dyn ActivitySource>,
    log: ActivityLog,
    capacity: usize,
    view: watch::Sender<ActivityView>,
    last_error: Option<String>,
    last_synced: Option<DateTime<Utc>>,
}

impl ActivitySync {
    /// Create a reconciler showing at most `capacity` entries.
    #[must_use]
    pub fn new(source: Arc<dyn ActivitySource>, capacity: usize) -> Self {
        let (view, _) = watch::channel(ActivityView::default());
        Self {
            source,
            log: ActivityLog::new(capacity),
            capacity,
            view,
            last_error: None,
            last_synced: None,
        }
    }

    /// Watch the published view.
    #[must_use]
    pub fn subscribe(&self) -> watch::Receiver<ActivityView> {
        self.view.subscribe()
    }

    /// Get the activity log.
    #[must_use]
    pub const fn log(&self) -> &ActivityLog {
        &self.log
    }
}

#[async_trait]
impl FeedReconciler for ActivitySync {
    fn name(&self) -> &'static str {
        "activity"
    }

    fn on_message(&mut self, message: &InboundMessage) -> bool {
        if !message.is(SIGNAL_TYPE) {
            return false;
        }
        match message.parse_data::<SignalUpdate>() {
            Ok(signal) => self.log.accept(&signal),
            Err(e) => {
                tracing::warn!(error = %e, "Dropping malformed signal");
                false
            }
        }
    }

    async fn resync(&mut self) -> Result<(), FetchError> {
        metrics::record_resync(self.name());

        let outcome = match self.source.fetch_activity(self.capacity).await {
            Ok(page) => {
                let added = self.log.hydrate(page);
                tracing::debug!(added, "Activity merged");
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
        self.view.send_replace(ActivityView {
            items: self.log.snapshot(),
            last_error: self.last_error.clone(),
            last_synced: self.last_synced,
        });
    }
}
