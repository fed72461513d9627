//! Transport Manager
//!
//! Owns one WebSocket connection to a dashboard channel and reports its
//! lifecycle as [`TransportEvent`]s.
//!
//! # Lifecycle
//!
//! - `connect()` spawns a driver task that exclusively owns the socket, the
//!   heartbeat task, and the batch timer.
//! - On open: status `connected`, attempt counter reset, recorded
//!   subscriptions replayed, heartbeat armed.
//! - On close: status `disconnected`; if auto-reconnect is on and the
//!   attempt budget allows, the driver waits the reconnect delay and opens a
//!   new socket.
//! - On a transport error: status `error` and an `Error` event, followed by
//!   the close handling above.
//! - `disconnect()` cancels the driver, flushes pending batched messages,
//!   sends a close frame, and waits for the task to end.

use std::sync::Arc;
use std::sync::atomic::{AtomicBool, AtomicU32, Ordering};
use std::time::Duration;

use futures_util::{SinkExt, StreamExt};
use parking_lot::Mutex;
use serde::Serialize;
use serde_json::Value;
use tokio::sync::mpsc::error::TrySendError;
use tokio::sync::{mpsc, watch};
use tokio::task::JoinHandle;
use tokio::time::Instant;
use tokio_tungstenite::tungstenite::Message;
use tokio_util::sync::CancellationToken;
use tracing::Instrument;
use uuid::Uuid;

use super::codec::{CodecError, JsonCodec};
use super::heartbeat::{HeartbeatConfig, HeartbeatEvent, HeartbeatManager, HeartbeatState};
use super::reconnect::{ReconnectConfig, ReconnectPolicy};
use crate::domain::streaming::{Channel, ConnectionStatus, ControlFrame, InboundMessage};
use crate::domain::subscription::{SubscriptionChange, SubscriptionRegistry};
use crate::infrastructure::batching::MessageBatcher;
use crate::infrastructure::config::WebSocketSettings;
use crate::infrastructure::metrics;

/// Queued outbound frames per connection.
const OUTBOUND_BUFFER: usize = 64;

/// Default capacity of the event channel.
const DEFAULT_EVENT_BUFFER: usize = 1024;

// =============================================================================
// Error Type
// =============================================================================

/// Errors that can occur in the transport.
#[derive(Debug, thiserror::Error)]
pub enum TransportError {
    /// WebSocket error.
    #[error("WebSocket error: {0}")]
    WebSocket(#[from] tokio_tungstenite::tungstenite::Error),

    /// Codec error.
    #[error("codec error: {0}")]
    Codec(#[from] CodecError),

    /// No open connection to send on.
    #[error("not connected")]
    NotConnected,

    /// Outbound queue is full.
    #[error("outbound queue full")]
    QueueFull,

    /// Server stopped answering pings.
    #[error("heartbeat timeout after {0:?}")]
    HeartbeatTimeout(Duration),

    /// Connection closed by the server.
    #[error("connection closed")]
    ConnectionClosed,

    /// Event receiver was dropped.
    #[error("event receiver dropped")]
    ReceiverDropped,
}

// =============================================================================
// Transport Events
// =============================================================================

/// Events emitted by the transport.
#[derive(Debug, Clone, PartialEq)]
pub enum TransportEvent {
    /// Socket opened.
    Connected,
    /// Socket closed or failed to open.
    Disconnected,
    /// A reconnect attempt is scheduled.
    Reconnecting {
        /// Attempt number, starting at 1.
        attempt: u32,
    },
    /// A single decoded message.
    Message(InboundMessage),
    /// Messages queued during one flush window, oldest first.
    Batch(Vec<InboundMessage>),
    /// Transport-level error.
    Error(String),
}

/// How decoded messages are handed to the consumer.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Default)]
pub enum DeliveryMode {
    /// Every message as its own `Message` event, in wire order.
    #[default]
    Immediate,
    /// One `Batch` event per window.
    Batched {
        /// Flush window, armed by the first queued message.
        interval: Duration,
        /// Also emit each batched message as a `Message` event after the
        /// `Batch` event.
        per_message: bool,
    },
}

// =============================================================================
// Transport Configuration
// =============================================================================

/// Configuration for one channel connection.
#[derive(Debug, Clone)]
pub struct TransportConfig {
    /// Channel served by this connection.
    pub channel: Channel,
    /// Full WebSocket URL.
    pub url: String,
    /// Heartbeat configuration.
    pub heartbeat: HeartbeatConfig,
    /// Reconnection configuration.
    pub reconnect: ReconnectConfig,
    /// Reconnect automatically after a close.
    pub auto_reconnect: bool,
    /// Message delivery mode.
    pub delivery: DeliveryMode,
    /// Capacity of the event channel.
    pub event_buffer: usize,
}

impl TransportConfig {
    /// Create a configuration with defaults for a channel under `ws_base`.
    #[must_use]
    pub fn new(ws_base: &str, channel: Channel) -> Self {
        Self {
            channel,
            url: channel.url(ws_base),
            heartbeat: HeartbeatConfig::default(),
            reconnect: ReconnectConfig::default(),
            auto_reconnect: true,
            delivery: DeliveryMode::Immediate,
            event_buffer: DEFAULT_EVENT_BUFFER,
        }
    }

    /// Create configuration from `WebSocketSettings`.
    #[must_use]
    pub fn from_websocket_settings(
        ws_base: &str,
        channel: Channel,
        settings: &WebSocketSettings,
    ) -> Self {
        Self {
            heartbeat: HeartbeatConfig::from_websocket_settings(settings),
            reconnect: ReconnectConfig::from_websocket_settings(settings),
            auto_reconnect: settings.auto_reconnect,
            ..Self::new(ws_base, channel)
        }
    }

    /// Set the delivery mode.
    #[must_use]
    pub fn with_delivery(mut self, delivery: DeliveryMode) -> Self {
        self.delivery = delivery;
        self
    }

    /// Set the reconnection configuration.
    #[must_use]
    pub fn with_reconnect(mut self, reconnect: ReconnectConfig) -> Self {
        self.reconnect = reconnect;
        self
    }

    /// Set the heartbeat configuration.
    #[must_use]
    pub fn with_heartbeat(mut self, heartbeat: HeartbeatConfig) -> Self {
        self.heartbeat = heartbeat;
        self
    }

    /// Enable or disable auto-reconnect.
    #[must_use]
    pub fn with_auto_reconnect(mut self, auto_reconnect: bool) -> Self {
        self.auto_reconnect = auto_reconnect;
        self
    }
}

// =============================================================================
// Transport Manager
// =============================================================================

/// State shared between the manager and its driver task.
struct Shared {
    channel: Channel,
    status: watch::Sender<ConnectionStatus>,
    attempts: AtomicU32,
    enabled: AtomicBool,
    subscriptions: SubscriptionRegistry,
    /// Held across a subscription change and its frame, and across the
    /// replay snapshot taken when a socket opens.
    subscription_lock: Mutex<()>,
}

impl Shared {
    /// Mark the socket open and take the subscriptions to replay on it.
    ///
    /// Every subscription change lands either in the returned frames or,
    /// once the status reads connected, in the outbound queue. Never both.
    fn open(&self) -> Vec<ControlFrame> {
        let _guard = self.subscription_lock.lock();
        let frames = self.subscriptions.restore_frames();
        self.set_status(ConnectionStatus::Connected);
        frames
    }

    fn set_status(&self, status: ConnectionStatus) {
        let previous = self.status.send_replace(status);
        if previous != status {
            tracing::debug!(
                from = previous.as_str(),
                to = status.as_str(),
                "Connection status changed"
            );
            metrics::set_connection_status(self.channel, status);
        }
    }
}

struct Session {
    cancel: CancellationToken,
    outbound_tx: mpsc::Sender<String>,
    handle: JoinHandle<()>,
}

/// Connection-owning client for one dashboard channel.
///
/// Dropping the manager cancels its driver task.
///
/// # Example
///
/// ```rust,no_run
/// use dashboard_sync::domain::streaming::Channel;
/// use dashboard_sync::infrastructure::transport::{
///     TransportConfig, TransportEvent, TransportManager,
/// };
///
/// async fn example() {
///     let config = TransportConfig::new("ws://localhost:8000", Channel::Positions);
///     let (transport, mut events) = TransportManager::new(config);
///     transport.connect();
///
///     while let Some(event) = events.recv().await {
///         match event {
///             TransportEvent::Message(message) => println!("{}", message.kind),
///             TransportEvent::Disconnected => break,
///             _ => {}
///         }
///     }
///
///     transport.disconnect().await;
/// }
/// ```
pub struct TransportManager {
    config: TransportConfig,
    codec: JsonCodec,
    shared: Arc<Shared>,
    event_tx: mpsc::Sender<TransportEvent>,
    session: Mutex<Option<Session>>,
}

impl TransportManager {
    /// Create a manager and the receiver for its events.
    ///
    /// The manager starts enabled and disconnected.
    #[must_use]
    pub fn new(config: TransportConfig) -> (Self, mpsc::Receiver<TransportEvent>) {
        let (event_tx, event_rx) = mpsc::channel(config.event_buffer.max(1));
        let (status, _) = watch::channel(ConnectionStatus::Disconnected);
        let shared = Arc::new(Shared {
            channel: config.channel,
            status,
            attempts: AtomicU32::new(0),
            enabled: AtomicBool::new(true),
            subscriptions: SubscriptionRegistry::new(),
            subscription_lock: Mutex::new(()),
        });

        let manager = Self {
            config,
            codec: JsonCodec::new(),
            shared,
            event_tx,
            session: Mutex::new(None),
        };
        (manager, event_rx)
    }

    /// Start the connection if it is not already running.
    ///
    /// No-op while disabled. Must be called from within a tokio runtime.
    pub fn connect(&self) {
        if !self.is_enabled() {
            tracing::debug!(channel = %self.config.channel, "Transport disabled, not connecting");
            return;
        }

        let mut session = self.session.lock();
        if session.as_ref().is_some_and(|s| !s.handle.is_finished()) {
            return;
        }

        let id = Uuid::new_v4();
        let cancel = CancellationToken::new();
        let (outbound_tx, outbound_rx) = mpsc::channel(OUTBOUND_BUFFER);
        self.shared.set_status(ConnectionStatus::Connecting);

        let driver = Driver {
            config: self.config.clone(),
            codec: self.codec.clone(),
            shared: Arc::clone(&self.shared),
            event_tx: self.event_tx.clone(),
            cancel: cancel.clone(),
        };
        let span = tracing::info_span!("transport", channel = %self.config.channel, session = %id);
        let handle = tokio::spawn(driver.run(outbound_rx).instrument(span));

        *session = Some(Session {
            cancel,
            outbound_tx,
            handle,
        });
    }

    /// Stop the connection and wait for the driver to finish.
    ///
    /// Pending batched messages are flushed as events before the socket is
    /// closed; keep draining the event receiver until this returns.
    /// Calling it again is a no-op.
    pub async fn disconnect(&self) {
        self.shared
            .attempts
            .store(self.config.reconnect.max_attempts, Ordering::SeqCst);

        let session = self.session.lock().take();
        let Some(session) = session else {
            return;
        };

        session.cancel.cancel();
        if let Err(e) = session.handle.await {
            tracing::warn!(channel = %self.config.channel, error = %e, "Transport driver ended abnormally");
        }
        self.shared.set_status(ConnectionStatus::Disconnected);
    }

    /// Reset the attempt counter, drop the current connection, and connect
    /// again.
    pub async fn reconnect(&self) {
        self.disconnect().await;
        self.shared.attempts.store(0, Ordering::SeqCst);
        self.connect();
    }

    /// Enable or disable the transport.
    ///
    /// Disabling disconnects and suppresses reconnects until re-enabled;
    /// enabling connects.
    pub async fn set_enabled(&self, enabled: bool) {
        self.shared.enabled.store(enabled, Ordering::SeqCst);
        if enabled {
            self.connect();
        } else {
            self.disconnect().await;
        }
    }

    /// Send a JSON payload on the open connection.
    ///
    /// # Errors
    ///
    /// Returns `NotConnected` when no socket is open and `QueueFull` when the
    /// outbound queue is saturated.
    pub fn send<T: Serialize>(&self, payload: &T) -> Result<(), TransportError> {
        if !self.status().is_connected() {
            return Err(TransportError::NotConnected);
        }
        let text = self.codec.encode(payload)?;

        let session = self.session.lock();
        let Some(session) = session.as_ref() else {
            return Err(TransportError::NotConnected);
        };
        session.outbound_tx.try_send(text).map_err(|e| match e {
            TrySendError::Full(_) => TransportError::QueueFull,
            TrySendError::Closed(_) => TransportError::NotConnected,
        })
    }

    /// Send a control frame on the open connection.
    ///
    /// # Errors
    ///
    /// Same as [`TransportManager::send`].
    pub fn send_frame(&self, frame: &ControlFrame) -> Result<(), TransportError> {
        self.send(frame)
    }

    /// Subscribe to a channel with optional filters.
    ///
    /// The subscription is recorded and replayed after every reconnect.
    /// While disconnected the frame is deferred until the next open.
    ///
    /// # Errors
    ///
    /// Returns an error only if the frame cannot be encoded or queued.
    pub fn subscribe(
        &self,
        channel: Channel,
        filters: Option<Value>,
    ) -> Result<SubscriptionChange, TransportError> {
        let _guard = self.shared.subscription_lock.lock();
        let change = self.shared.subscriptions.add(channel, filters.clone());
        if change.needs_frame() {
            self.send_or_defer(&ControlFrame::Subscribe { channel, filters })?;
        }
        Ok(change)
    }

    /// Unsubscribe from a channel.
    ///
    /// # Errors
    ///
    /// Returns an error only if the frame cannot be encoded or queued.
    pub fn unsubscribe(&self, channel: Channel) -> Result<SubscriptionChange, TransportError> {
        let _guard = self.shared.subscription_lock.lock();
        let change = self.shared.subscriptions.remove(channel);
        if change.needs_frame() {
            self.send_or_defer(&ControlFrame::Unsubscribe { channel })?;
        }
        Ok(change)
    }

    fn send_or_defer(&self, frame: &ControlFrame) -> Result<(), TransportError> {
        match self.send_frame(frame) {
            Err(TransportError::NotConnected) => {
                tracing::debug!(?frame, "Not connected, frame deferred to next open");
                Ok(())
            }
            other => other,
        }
    }

    /// Get the current connection status.
    #[must_use]
    pub fn status(&self) -> ConnectionStatus {
        *self.shared.status.borrow()
    }

    /// Watch connection status changes.
    #[must_use]
    pub fn watch_status(&self) -> watch::Receiver<ConnectionStatus> {
        self.shared.status.subscribe()
    }

    /// Get the reconnect attempt counter.
    #[must_use]
    pub fn reconnect_attempts(&self) -> u32 {
        self.shared.attempts.load(Ordering::SeqCst)
    }

    /// Check if the transport is enabled.
    #[must_use]
    pub fn is_enabled(&self) -> bool {
        self.shared.enabled.load(Ordering::SeqCst)
    }

    /// Get the channel served by this transport.
    #[must_use]
    pub const fn channel(&self) -> Channel {
        self.config.channel
    }

    /// Get the recorded subscriptions.
    #[must_use]
    pub fn subscriptions(&self) -> &SubscriptionRegistry {
        &self.shared.subscriptions
    }
}

impl Drop for TransportManager {
    fn drop(&mut self) {
        if let Some(session) = self.session.get_mut().take() {
            session.cancel.cancel();
        }
    }
}

// =============================================================================
// Driver
// =============================================================================

type Batcher = Option<MessageBatcher<InboundMessage>>;

struct Driver {
    config: TransportConfig,
    codec: JsonCodec,
    shared: Arc<Shared>,
    event_tx: mpsc::Sender<TransportEvent>,
    cancel: CancellationToken,
}

impl Driver {
    async fn run(self, mut outbound_rx: mpsc::Receiver<String>) {
        let mut policy = ReconnectPolicy::new(self.config.reconnect.clone());
        let mut batcher: Batcher = match self.config.delivery {
            DeliveryMode::Batched { interval, .. } => Some(MessageBatcher::new(interval)),
            DeliveryMode::Immediate => None,
        };

        loop {
            if self.cancel.is_cancelled() {
                break;
            }
            self.shared.set_status(ConnectionStatus::Connecting);

            let result = self
                .connect_and_run(&mut policy, &mut outbound_rx, &mut batcher)
                .await;

            if self.flush(&mut batcher).await.is_err() {
                break;
            }

            match result {
                Ok(()) => {
                    tracing::info!("Connection closed by client");
                    break;
                }
                Err(TransportError::ReceiverDropped) => {
                    tracing::debug!("Event receiver dropped, stopping transport");
                    break;
                }
                Err(TransportError::ConnectionClosed) => {
                    tracing::info!("Connection closed by server");
                }
                Err(e) => {
                    tracing::warn!(error = %e, "Connection error");
                    metrics::record_transport_error(self.config.channel);
                    self.shared.set_status(ConnectionStatus::Error);
                    if self.emit(TransportEvent::Error(e.to_string())).await.is_err() {
                        break;
                    }
                }
            }

            self.shared.set_status(ConnectionStatus::Disconnected);
            if self.emit(TransportEvent::Disconnected).await.is_err() {
                break;
            }

            if self.cancel.is_cancelled()
                || !self.config.auto_reconnect
                || !self.shared.enabled.load(Ordering::SeqCst)
            {
                break;
            }

            let Some(delay) = policy.next_delay() else {
                tracing::warn!(
                    attempts = policy.attempt_count(),
                    "Reconnect attempts exhausted, giving up"
                );
                break;
            };

            let attempt = policy.attempt_count();
            self.shared.attempts.store(attempt, Ordering::SeqCst);
            metrics::record_reconnect(self.config.channel);
            tracing::info!(attempt, delay_ms = delay.as_millis(), "Reconnecting");

            if self
                .emit(TransportEvent::Reconnecting { attempt })
                .await
                .is_err()
            {
                break;
            }

            tokio::select! {
                () = self.cancel.cancelled() => {
                    tracing::info!("Cancelled during reconnect delay");
                    break;
                }
                () = tokio::time::sleep(delay) => {}
            }
        }

        self.shared.set_status(ConnectionStatus::Disconnected);
    }

    /// Open one socket and serve it until it closes or the driver is
    /// cancelled. `Ok` means cancelled.
    async fn connect_and_run(
        &self,
        policy: &mut ReconnectPolicy,
        outbound_rx: &mut mpsc::Receiver<String>,
        batcher: &mut Batcher,
    ) -> Result<(), TransportError> {
        tracing::info!(url = %self.config.url, "Connecting");

        let (ws_stream, _response) = tokio::select! {
            () = self.cancel.cancelled() => return Ok(()),
            result = tokio_tungstenite::connect_async(self.config.url.as_str()) => result?,
        };
        let (mut write, mut read) = ws_stream.split();

        // Frames queued for a previous socket are stale.
        while outbound_rx.try_recv().is_ok() {}

        policy.reset();
        self.shared.attempts.store(0, Ordering::SeqCst);
        let restore = self.shared.open();
        tracing::info!("Connected");

        for frame in restore {
            tracing::debug!(?frame, "Restoring subscription");
            write
                .send(Message::Text(self.codec.encode(&frame)?.into()))
                .await?;
        }
        self.emit(TransportEvent::Connected).await?;

        let heartbeat_state = Arc::new(HeartbeatState::new());
        let (heartbeat_tx, mut heartbeat_rx) = mpsc::channel::<HeartbeatEvent>(10);
        let heartbeat_cancel = self.cancel.child_token();
        let _heartbeat_guard = heartbeat_cancel.clone().drop_guard();
        tokio::spawn(
            HeartbeatManager::new(
                self.config.heartbeat.clone(),
                Arc::clone(&heartbeat_state),
                heartbeat_tx,
                heartbeat_cancel,
            )
            .run()
            .in_current_span(),
        );
        let mut heartbeat_open = true;

        loop {
            let deadline = batcher.as_ref().and_then(MessageBatcher::deadline);

            tokio::select! {
                () = self.cancel.cancelled() => {
                    let _ = write.send(Message::Close(None)).await;
                    return Ok(());
                }
                () = tokio::time::sleep_until(deadline.unwrap_or_else(Instant::now)), if deadline.is_some() => {
                    self.flush(batcher).await?;
                }
                outbound = outbound_rx.recv() => {
                    let Some(text) = outbound else {
                        return Ok(());
                    };
                    write.send(Message::Text(text.into())).await?;
                }
                event = heartbeat_rx.recv(), if heartbeat_open => match event {
                    Some(HeartbeatEvent::SendPing) => {
                        heartbeat_state.mark_ping_sent();
                        write
                            .send(Message::Text(self.codec.encode(&ControlFrame::Ping)?.into()))
                            .await?;
                    }
                    Some(HeartbeatEvent::Timeout(elapsed)) => {
                        return Err(TransportError::HeartbeatTimeout(elapsed));
                    }
                    None => heartbeat_open = false,
                },
                msg = read.next() => match msg {
                    Some(Ok(Message::Text(text))) => {
                        heartbeat_state.record_pong();
                        self.handle_text(&text, batcher).await?;
                    }
                    Some(Ok(Message::Ping(data))) => {
                        heartbeat_state.record_pong();
                        write.send(Message::Pong(data)).await?;
                    }
                    Some(Ok(Message::Pong(_))) => heartbeat_state.record_pong(),
                    Some(Ok(Message::Close(frame))) => {
                        tracing::info!(?frame, "Server sent close frame");
                        return Err(TransportError::ConnectionClosed);
                    }
                    Some(Ok(_)) => {
                        // Binary and raw frames are not part of the protocol.
                    }
                    Some(Err(e)) => return Err(e.into()),
                    None => {
                        tracing::info!("WebSocket stream ended");
                        return Err(TransportError::ConnectionClosed);
                    }
                },
            }
        }
    }

    /// Decode a text frame and deliver or queue its messages.
    ///
    /// Undecodable frames are dropped; keepalive acknowledgements are
    /// consumed here.
    async fn handle_text(&self, text: &str, batcher: &mut Batcher) -> Result<(), TransportError> {
        let messages = match self.codec.decode(text) {
            Ok(messages) => messages,
            Err(e) => {
                tracing::warn!(error = %e, "Dropping undecodable frame");
                metrics::record_decode_error(self.config.channel);
                return Ok(());
            }
        };

        for message in messages {
            if message.is_pong() {
                tracing::trace!("Pong received");
                continue;
            }
            metrics::record_message_received(self.config.channel, &message.kind);

            match batcher {
                Some(batcher) => {
                    batcher.push(message);
                }
                None => self.emit(TransportEvent::Message(message)).await?,
            }
        }
        Ok(())
    }

    async fn flush(&self, batcher: &mut Batcher) -> Result<(), TransportError> {
        let Some(batcher) = batcher.as_mut() else {
            return Ok(());
        };
        let batch = batcher.take();
        if batch.is_empty() {
            return Ok(());
        }

        tracing::trace!(size = batch.len(), "Flushing batch");
        metrics::record_batch_flushed(self.config.channel, batch.len());

        if matches!(
            self.config.delivery,
            DeliveryMode::Batched {
                per_message: true,
                ..
            }
        ) {
            self.emit(TransportEvent::Batch(batch.clone())).await?;
            for message in batch {
                self.emit(TransportEvent::Message(message)).await?;
            }
            Ok(())
        } else {
            self.emit(TransportEvent::Batch(batch)).await
        }
    }

    async fn emit(&self, event: TransportEvent) -> Result<(), TransportError> {
        self.event_tx
            .send(event)
            .await
            .map_err(|_| TransportError::ReceiverDropped)
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn config_builds_channel_url() {
        let config = TransportConfig::new("ws://localhost:8000/", Channel::Signals);
        assert_eq!(config.url, "ws://localhost:8000/ws/signals");
        assert_eq!(config.delivery, DeliveryMode::Immediate);
        assert!(config.auto_reconnect);
    }

    #[test]
    fn config_from_settings() {
        let settings = WebSocketSettings {
            auto_reconnect: false,
            max_reconnect_attempts: 2,
            ..WebSocketSettings::default()
        };
        let config =
            TransportConfig::from_websocket_settings("wss://bot", Channel::Positions, &settings);

        assert!(!config.auto_reconnect);
        assert_eq!(config.reconnect.max_attempts, 2);
        assert_eq!(config.heartbeat.ping_interval, Duration::from_secs(30));
    }

    #[tokio::test]
    async fn starts_disconnected_and_enabled() {
        let (transport, _events) =
            TransportManager::new(TransportConfig::new("ws://127.0.0.1:1", Channel::Positions));

        assert_eq!(transport.status(), ConnectionStatus::Disconnected);
        assert!(transport.is_enabled());
        assert_eq!(transport.reconnect_attempts(), 0);
    }

    #[tokio::test]
    async fn send_while_disconnected_fails() {
        let (transport, _events) =
            TransportManager::new(TransportConfig::new("ws://127.0.0.1:1", Channel::Positions));

        let err = transport.send(&serde_json::json!({"action": "ping"})).unwrap_err();
        assert!(matches!(err, TransportError::NotConnected));
    }

    #[tokio::test]
    async fn subscribe_while_disconnected_is_deferred() {
        let (transport, _events) =
            TransportManager::new(TransportConfig::new("ws://127.0.0.1:1", Channel::All));

        let change = transport.subscribe(Channel::Signals, None).unwrap();

        assert_eq!(change, SubscriptionChange::Added);
        assert!(transport.subscriptions().contains(Channel::Signals));

        let change = transport.unsubscribe(Channel::Signals).unwrap();
        assert_eq!(change, SubscriptionChange::Removed);
        assert!(transport.subscriptions().is_empty());
    }

    #[tokio::test]
    async fn disabled_transport_does_not_connect() {
        let (transport, _events) =
            TransportManager::new(TransportConfig::new("ws://127.0.0.1:1", Channel::Positions));

        transport.set_enabled(false).await;
        transport.connect();

        assert!(!transport.is_enabled());
        assert_eq!(transport.status(), ConnectionStatus::Disconnected);
    }

    #[tokio::test]
    async fn disconnect_without_connect_is_noop() {
        let (transport, _events) =
            TransportManager::new(TransportConfig::new("ws://127.0.0.1:1", Channel::Positions));

        transport.disconnect().await;
        transport.disconnect().await;

        assert_eq!(transport.status(), ConnectionStatus::Disconnected);
    }
}
