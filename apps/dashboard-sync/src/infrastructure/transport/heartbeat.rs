//! Heartbeat Manager
//!
//! Keeps a connection alive with periodic application-level pings and,
//! when a pong timeout is configured, reports a connection that stopped
//! answering.

use std::sync::Arc;
use std::sync::atomic::{AtomicBool, Ordering};
use std::time::{Duration, Instant};

use parking_lot::RwLock;
use tokio::sync::mpsc;
use tokio_util::sync::CancellationToken;

use crate::infrastructure::config::WebSocketSettings;

/// Configuration for heartbeat behavior.
#[derive(Debug, Clone)]
pub struct HeartbeatConfig {
    /// Interval between ping messages.
    pub ping_interval: Duration,
    /// Silence after a ping before the connection is considered dead.
    /// `None` disables the check.
    pub pong_timeout: Option<Duration>,
}

impl Default for HeartbeatConfig {
    fn default() -> Self {
        Self {
            ping_interval: Duration::from_secs(30),
            pong_timeout: None,
        }
    }
}

impl HeartbeatConfig {
    /// Create a new configuration with custom values.
    #[must_use]
    pub const fn new(ping_interval: Duration, pong_timeout: Option<Duration>) -> Self {
        Self {
            ping_interval,
            pong_timeout,
        }
    }

    /// Create configuration from `WebSocketSettings`.
    #[must_use]
    pub const fn from_websocket_settings(settings: &WebSocketSettings) -> Self {
        Self {
            ping_interval: settings.keepalive_interval,
            pong_timeout: settings.pong_timeout,
        }
    }
}

/// Events emitted by the heartbeat manager.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum HeartbeatEvent {
    /// Request to send a ping message.
    SendPing,
    /// No frame arrived within the pong timeout.
    Timeout(Duration),
}

/// State shared between the heartbeat manager and the socket reader.
#[derive(Debug)]
pub struct HeartbeatState {
    last_pong: RwLock<Instant>,
    waiting_for_pong: AtomicBool,
}

impl Default for HeartbeatState {
    fn default() -> Self {
        Self::new()
    }
}

impl HeartbeatState {
    /// Create new heartbeat state.
    #[must_use]
    pub fn new() -> Self {
        Self {
            last_pong: RwLock::new(Instant::now()),
            waiting_for_pong: AtomicBool::new(false),
        }
    }

    /// Record that the server answered. Any inbound frame counts.
    pub fn record_pong(&self) {
        *self.last_pong.write() = Instant::now();
        self.waiting_for_pong.store(false, Ordering::SeqCst);
    }

    /// Mark that a ping is outstanding.
    pub fn mark_ping_sent(&self) {
        self.waiting_for_pong.store(true, Ordering::SeqCst);
    }

    /// Check if a ping is outstanding.
    #[must_use]
    pub fn is_waiting_for_pong(&self) -> bool {
        self.waiting_for_pong.load(Ordering::SeqCst)
    }

    /// Get the time since the server last answered.
    #[must_use]
    pub fn time_since_pong(&self) -> Duration {
        self.last_pong.read().elapsed()
    }
}

/// Periodic ping scheduler for one connection.
///
/// The first ping is requested one full interval after `run` starts.
pub struct HeartbeatManager {
    config: HeartbeatConfig,
    state: Arc<HeartbeatState>,
    event_tx: mpsc::Sender<HeartbeatEvent>,
    cancel: CancellationToken,
}

impl HeartbeatManager {
    /// Create a new heartbeat manager.
    #[must_use]
    pub const fn new(
        config: HeartbeatConfig,
        state: Arc<HeartbeatState>,
        event_tx: mpsc::Sender<HeartbeatEvent>,
        cancel: CancellationToken,
    ) -> Self {
        Self {
            config,
            state,
            event_tx,
            cancel,
        }
    }

    /// Run until cancelled, a timeout is reported, or the receiver is gone.
    ///
    /// A zero ping interval disables the heartbeat and returns immediately.
    pub async fn run(self) {
        let period = self.config.ping_interval;
        if period.is_zero() {
            tracing::debug!("Heartbeat disabled");
            return;
        }
        let mut interval = tokio::time::interval_at(tokio::time::Instant::now() + period, period);
        interval.set_missed_tick_behavior(tokio::time::MissedTickBehavior::Skip);

        loop {
            tokio::select! {
                () = self.cancel.cancelled() => {
                    tracing::debug!("Heartbeat manager cancelled");
                    break;
                }
                _ = interval.tick() => {
                    if self.check_and_ping().await.is_err() {
                        break;
                    }
                }
            }
        }
    }

    async fn check_and_ping(&self) -> Result<(), ()> {
        if let Some(timeout) = self.config.pong_timeout
            && self.state.is_waiting_for_pong()
        {
            let elapsed = self.state.time_since_pong();
            if elapsed > timeout {
                tracing::warn!(
                    elapsed_secs = elapsed.as_secs(),
                    timeout_secs = timeout.as_secs(),
                    "Heartbeat timeout detected"
                );
                let _ = self.event_tx.send(HeartbeatEvent::Timeout(elapsed)).await;
                return Err(());
            }
        }

        if self.event_tx.send(HeartbeatEvent::SendPing).await.is_err() {
            tracing::debug!("Event channel closed, stopping heartbeat");
            return Err(());
        }

        Ok(())
    }
}
