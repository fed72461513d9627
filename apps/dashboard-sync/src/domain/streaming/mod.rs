//! Streaming Wire Types
//!
//! Channel names, connection status, and the frame shapes exchanged with
//! the trading service's WebSocket endpoint.
//!
//! # Wire Format
//!
//! Server → client:
//! ```json
//! {"type": "Position", "data": {"update_type": "Opened", "position_id": "p1"}}
//! {"type": "Pong"}
//! ```
//!
//! Client → server:
//! ```json
//! {"action": "ping"}
//! {"action": "subscribe", "channel": "signals", "filters": {"market_id": "m1"}}
//! {"action": "unsubscribe", "channel": "signals"}
//! ```

use std::collections::{HashMap, HashSet};

use serde::de::DeserializeOwned;
use serde::{Deserialize, Serialize};
use serde_json::Value;

/// Message type reserved for keepalive acknowledgements.
pub const PONG_TYPE: &str = "Pong";

/// Message type carrying a [`crate::domain::positions::PositionUpdate`].
pub const POSITION_TYPE: &str = "Position";

/// Message type carrying a [`crate::domain::activity::SignalUpdate`].
pub const SIGNAL_TYPE: &str = "Signal";

// =============================================================================
// Channels
// =============================================================================

/// Logical streaming channel. One connection is opened per channel.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize, Deserialize)]
#[serde(rename_all = "lowercase")]
pub enum Channel {
    /// Position lifecycle and price updates.
    Positions,
    /// Trading signals (arbitrage, copy trades, stops, alerts).
    Signals,
    /// Order book snapshots.
    Orderbook,
    /// Every channel multiplexed on one socket.
    All,
}

impl Channel {
    /// Get all channels.
    #[must_use]
    pub const fn all() -> &'static [Self] {
        &[Self::Positions, Self::Signals, Self::Orderbook, Self::All]
    }

    /// Get the channel name used in URLs and control frames.
    #[must_use]
    pub const fn as_str(&self) -> &'static str {
        match self {
            Self::Positions => "positions",
            Self::Signals => "signals",
            Self::Orderbook => "orderbook",
            Self::All => "all",
        }
    }

    /// Build the streaming URL for this channel from a base URL.
    #[must_use]
    pub fn url(&self, ws_base: &str) -> String {
        format!("{}/ws/{}", ws_base.trim_end_matches('/'), self.as_str())
    }
}

impl std::fmt::Display for Channel {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.write_str(self.as_str())
    }
}

// =============================================================================
// Connection Status
// =============================================================================

/// Consumer-visible connection status.
///
/// Transitions: `Disconnected → Connecting → Connected → (Disconnected | Error)`,
/// `Error → Disconnected` on the close that follows, and
/// `Disconnected → Connecting` on auto or manual reconnect.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Default, Serialize, Deserialize)]
#[serde(rename_all = "lowercase")]
pub enum ConnectionStatus {
    /// Socket is being opened.
    Connecting,
    /// Socket is open and delivering frames.
    Connected,
    /// No socket; either idle, between reconnects, or given up.
    #[default]
    Disconnected,
    /// A transport-level error was observed on the socket.
    Error,
}

impl ConnectionStatus {
    /// Get the status name.
    #[must_use]
    pub const fn as_str(&self) -> &'static str {
        match self {
            Self::Connecting => "connecting",
            Self::Connected => "connected",
            Self::Disconnected => "disconnected",
            Self::Error => "error",
        }
    }

    /// Check if the socket is open.
    #[must_use]
    pub const fn is_connected(&self) -> bool {
        matches!(self, Self::Connected)
    }
}

// =============================================================================
// Frames
// =============================================================================

/// A decoded server → client frame.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct InboundMessage {
    /// Message discriminant (`"Position"`, `"Signal"`, `"Pong"`, ...).
    #[serde(rename = "type")]
    pub kind: String,
    /// Message payload. Absent payloads decode as `null`.
    #[serde(default)]
    pub data: Value,
}

impl InboundMessage {
    /// Create a new message.
    #[must_use]
    pub fn new(kind: impl Into<String>, data: Value) -> Self {
        Self {
            kind: kind.into(),
            data,
        }
    }

    /// Check if this is a keepalive acknowledgement.
    #[must_use]
    pub fn is_pong(&self) -> bool {
        self.kind == PONG_TYPE
    }

    /// Check the message discriminant.
    #[must_use]
    pub fn is(&self, kind: &str) -> bool {
        self.kind == kind
    }

    /// Deserialize the payload into a typed update.
    ///
    /// # Errors
    ///
    /// Returns an error if the payload does not match `T`.
    pub fn parse_data<T: DeserializeOwned>(&self) -> Result<T, serde_json::Error> {
        T::deserialize(&self.data)
    }
}

/// A client → server control frame.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(tag = "action", rename_all = "lowercase")]
pub enum ControlFrame {
    /// Keepalive ping; answered with a `Pong` message.
    Ping,
    /// Subscribe to a channel with optional server-side filters.
    Subscribe {
        /// Target channel.
        channel: Channel,
        /// Opaque filter object forwarded to the server.
        #[serde(default, skip_serializing_if = "Option::is_none")]
        filters: Option<Value>,
    },
    /// Unsubscribe from a channel.
    Unsubscribe {
        /// Target channel.
        channel: Channel,
    },
}

// =============================================================================
// Entity Updates
// =============================================================================

/// Lifecycle class of an entity update, independent of channel.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash)]
pub enum Lifecycle {
    /// Entity appeared.
    Opened,
    /// Some fields of an existing entity changed.
    Changed,
    /// Entity went away.
    Closed,
}

/// An update addressed to one entity by a stable id.
///
/// Implemented by high-churn updates so they can be coalesced per entity
/// before reaching a reconciler.
pub trait EntityUpdate: Clone {
    /// Stable entity id used for identity and deduplication.
    fn entity_id(&self) -> &str;

    /// Lifecycle class of this update.
    fn lifecycle(&self) -> Lifecycle;

    /// Merge a newer update for the same entity into `self`.
    ///
    /// Fields carried by `newer` overwrite; fields it omits keep their
    /// previously merged value.
    fn merge(&mut self, newer: &Self);
}

/// Updates collected during one flush window.
///
/// Applying a window gives the same fields as applying its updates in
/// receipt order. The one exception is `closed`, which is authoritative: an
/// id closed anywhere in the window ends up absent even if it was opened
/// again afterwards.
#[derive(Debug, Clone)]
pub struct AccumulatedUpdates<U> {
    /// First `Opened` per id, in first-seen order.
    pub opened: Vec<U>,
    /// Ids closed in the window.
    pub closed: HashSet<String>,
    /// Every field change per id, merged in receipt order.
    pub deltas: HashMap<String, U>,
    /// Field changes received after the id's `Opened`, merged in receipt
    /// order.
    pub since_open: HashMap<String, U>,
}

impl<U> Default for AccumulatedUpdates<U> {
    fn default() -> Self {
        Self {
            opened: Vec::new(),
            closed: HashSet::new(),
            deltas: HashMap::new(),
            since_open: HashMap::new(),
        }
    }
}

impl<U: EntityUpdate> AccumulatedUpdates<U> {
    /// Check if the window is empty.
    #[must_use]
    pub fn is_empty(&self) -> bool {
        self.opened.is_empty() && self.closed.is_empty() && self.deltas.is_empty()
    }

    /// Check if an id was closed in the window.
    #[must_use]
    pub fn is_closed(&self, id: &str) -> bool {
        self.closed.contains(id)
    }

    /// Check if an id was opened in the window.
    #[must_use]
    pub fn was_opened(&self, id: &str) -> bool {
        self.opened.iter().any(|opened| opened.entity_id() == id)
    }

    /// Iterate the opened ids in first-seen order.
    pub fn opened_ids(&self) -> impl Iterator<Item = &str> {
        self.opened.iter().map(EntityUpdate::entity_id)
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use serde_json::json;

    #[test]
    fn channel_urls() {
        assert_eq!(
            Channel::Positions.url("ws://localhost:8000"),
            "ws://localhost:8000/ws/positions"
        );
        assert_eq!(
            Channel::All.url("wss://bot.example.com/"),
            "wss://bot.example.com/ws/all"
        );
    }

    #[test]
    fn channel_serializes_lowercase() {
        assert_eq!(
            serde_json::to_value(Channel::Orderbook).unwrap(),
            json!("orderbook")
        );
    }

    #[test]
    fn inbound_message_without_data() {
        let msg: InboundMessage = serde_json::from_str(r#"{"type":"Pong"}"#).unwrap();
        assert!(msg.is_pong());
        assert_eq!(msg.data, Value::Null);
    }

    #[test]
    fn control_frames_match_wire_format() {
        assert_eq!(
            serde_json::to_value(ControlFrame::Ping).unwrap(),
            json!({"action": "ping"})
        );
        assert_eq!(
            serde_json::to_value(ControlFrame::Subscribe {
                channel: Channel::Signals,
                filters: None,
            })
            .unwrap(),
            json!({"action": "subscribe", "channel": "signals"})
        );
        assert_eq!(
            serde_json::to_value(ControlFrame::Subscribe {
                channel: Channel::Positions,
                filters: Some(json!({"market_id": "m1"})),
            })
            .unwrap(),
            json!({"action": "subscribe", "channel": "positions", "filters": {"market_id": "m1"}})
        );
        assert_eq!(
            serde_json::to_value(ControlFrame::Unsubscribe {
                channel: Channel::Signals,
            })
            .unwrap(),
            json!({"action": "unsubscribe", "channel": "signals"})
        );
    }

    #[test]
    fn status_default_is_disconnected() {
        assert_eq!(ConnectionStatus::default(), ConnectionStatus::Disconnected);
        assert!(!ConnectionStatus::Error.is_connected());
        assert!(ConnectionStatus::Connected.is_connected());
    }

    #[derive(Debug, Clone)]
    struct Tick {
        id: &'static str,
        lifecycle: Lifecycle,
    }

    impl EntityUpdate for Tick {
        fn entity_id(&self) -> &str {
            self.id
        }

        fn lifecycle(&self) -> Lifecycle {
            self.lifecycle
        }

        fn merge(&mut self, newer: &Self) {
            self.lifecycle = newer.lifecycle;
        }
    }

    #[test]
    fn accumulated_window_membership() {
        let mut window = AccumulatedUpdates::<Tick>::default();
        assert!(window.is_empty());

        window.opened.push(Tick {
            id: "a",
            lifecycle: Lifecycle::Opened,
        });
        window.closed.insert("b".to_string());

        assert!(!window.is_empty());
        assert!(window.was_opened("a"));
        assert!(!window.was_opened("b"));
        assert!(window.is_closed("b"));
        assert_eq!(window.opened_ids().collect::<Vec<_>>(), vec!["a"]);
    }
}
