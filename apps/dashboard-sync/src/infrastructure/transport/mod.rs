//! Streaming Transport
//!
//! WebSocket connection management for the dashboard streaming channels.
//!
//! # Components
//!
//! - [`TransportManager`]: one connection per channel with status tracking,
//!   subscription replay, and bounded reconnection
//! - [`JsonCodec`]: frame decoding and control frame encoding
//! - [`HeartbeatManager`]: application-level keepalive pings
//! - [`ReconnectPolicy`]: delay schedule and attempt bound

mod client;
mod codec;
mod heartbeat;
mod reconnect;

pub use client::{DeliveryMode, TransportConfig, TransportError, TransportEvent, TransportManager};
pub use codec::{CodecError, JsonCodec};
pub use heartbeat::{HeartbeatConfig, HeartbeatEvent, HeartbeatManager, HeartbeatState};
pub use reconnect::{ReconnectConfig, ReconnectPolicy};
