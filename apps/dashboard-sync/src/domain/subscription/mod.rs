//! Channel Subscription Tracking
//!
//! Records which channels a connection has subscribed to, and with which
//! filters, so the subscriptions can be replayed after every reconnect.
//!
//! # Design
//!
//! The registry is the source of truth for desired subscriptions. A
//! subscribe issued while the socket is down is recorded here and sent
//! once the connection opens, instead of failing.

use std::collections::HashMap;

use parking_lot::RwLock;
use serde_json::Value;

use super::streaming::{Channel, ControlFrame};

/// Result of recording a subscription change.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum SubscriptionChange {
    /// The channel was not subscribed before.
    Added,
    /// The channel was already subscribed; its filters were replaced.
    FiltersChanged,
    /// The channel was already subscribed with identical filters.
    Unchanged,
    /// The channel was removed.
    Removed,
    /// The channel was not subscribed.
    NotSubscribed,
}

impl SubscriptionChange {
    /// Check if the server needs to be told about this change.
    #[must_use]
    pub const fn needs_frame(self) -> bool {
        matches!(self, Self::Added | Self::FiltersChanged | Self::Removed)
    }
}

/// Thread-safe record of desired channel subscriptions.
///
/// # Example
///
/// ```rust
/// use dashboard_sync::domain::streaming::Channel;
/// use dashboard_sync::domain::subscription::{SubscriptionChange, SubscriptionRegistry};
///
/// let registry = SubscriptionRegistry::new();
///
/// assert_eq!(registry.add(Channel::Signals, None), SubscriptionChange::Added);
/// assert_eq!(registry.add(Channel::Signals, None), SubscriptionChange::Unchanged);
/// assert_eq!(registry.restore_frames().len(), 1);
///
/// assert_eq!(registry.remove(Channel::Signals), SubscriptionChange::Removed);
/// assert!(registry.restore_frames().is_empty());
/// ```
#[derive(Debug, Default)]
pub struct SubscriptionRegistry {
    channels: RwLock<HashMap<Channel, Option<Value>>>,
}

impl SubscriptionRegistry {
    /// Create an empty registry.
    #[must_use]
    pub fn new() -> Self {
        Self::default()
    }

    /// Record a subscription.
    pub fn add(&self, channel: Channel, filters: Option<Value>) -> SubscriptionChange {
        let mut channels = self.channels.write();
        match channels.insert(channel, filters.clone()) {
            None => SubscriptionChange::Added,
            Some(previous) if previous == filters => SubscriptionChange::Unchanged,
            Some(_) => SubscriptionChange::FiltersChanged,
        }
    }

    /// Remove a subscription.
    pub fn remove(&self, channel: Channel) -> SubscriptionChange {
        if self.channels.write().remove(&channel).is_some() {
            SubscriptionChange::Removed
        } else {
            SubscriptionChange::NotSubscribed
        }
    }

    /// Check if a channel is subscribed.
    #[must_use]
    pub fn contains(&self, channel: Channel) -> bool {
        self.channels.read().contains_key(&channel)
    }

    /// Get the number of subscribed channels.
    #[must_use]
    pub fn len(&self) -> usize {
        self.channels.read().len()
    }

    /// Check if nothing is subscribed.
    #[must_use]
    pub fn is_empty(&self) -> bool {
        self.channels.read().is_empty()
    }

    /// Build the subscribe frames that restore every recorded subscription.
    ///
    /// Frames are ordered by channel name so replay is deterministic.
    #[must_use]
    pub fn restore_frames(&self) -> Vec<ControlFrame> {
        let channels = self.channels.read();
        let mut frames: Vec<_> = channels
            .iter()
            .map(|(channel, filters)| ControlFrame::Subscribe {
                channel: *channel,
                filters: filters.clone(),
            })
            .collect();
        frames.sort_by_key(|frame| match frame {
            ControlFrame::Subscribe { channel, .. } | ControlFrame::Unsubscribe { channel } => {
                channel.as_str()
            }
            ControlFrame::Ping => "",
        });
        frames
    }

    /// Drop every subscription.
    pub fn clear(&self) {
        self.channels.write().clear();
    }
}
