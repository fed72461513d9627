//! Feed Driver
//!
//! Runs one reconciler against one transport connection.
//!
//! # Lifecycle
//!
//! 1. Hydrate from REST, then connect.
//! 2. Apply stream messages; publish when the view changed.
//! 3. Flush accumulated updates when their window expires.
//! 4. Re-fetch from REST after every reconnect, whenever the reconciler
//!    asks for it, and periodically while the stream is down.
//! 5. On cancellation: disconnect while draining in-flight events, then
//!    flush what is pending.

use std::time::Duration;

use async_trait::async_trait;
use tokio::sync::mpsc;
use tokio::time::{Instant, Interval, MissedTickBehavior};
use tokio_util::sync::CancellationToken;
use tracing::Instrument;

use crate::application::ports::FetchError;
use crate::domain::streaming::InboundMessage;
use crate::infrastructure::transport::{TransportConfig, TransportEvent, TransportManager};

/// A consumer-side state reconciler driven by a [`Feed`].
#[async_trait]
pub trait FeedReconciler: Send {
    /// Feed name used in logs and metrics.
    fn name(&self) -> &'static str;

    /// Apply one stream message. Returns `true` if the view changed.
    fn on_message(&mut self, message: &InboundMessage) -> bool;

    /// Apply a batch of stream messages in order.
    fn on_batch(&mut self, batch: &[InboundMessage]) -> bool {
        batch
            .iter()
            .fold(false, |changed, message| self.on_message(message) | changed)
    }

    /// Deadline of the pending accumulation window, if one is open.
    fn flush_deadline(&self) -> Option<Instant> {
        None
    }

    /// Apply the pending accumulation window. Returns `true` if the view
    /// changed.
    fn flush(&mut self) -> bool {
        false
    }

    /// Check if the reconciler needs a REST refresh.
    fn needs_resync(&self) -> bool {
        false
    }

    /// Refresh from REST and publish the result, including any error.
    async fn resync(&mut self) -> Result<(), FetchError>;

    /// Publish the current view.
    fn publish(&self);
}

/// One reconciler bound to its own transport connection.
pub struct Feed<R> {
    reconciler: R,
    transport: TransportManager,
    events: mpsc::Receiver<TransportEvent>,
    fallback_refresh: Option<Duration>,
}

impl<R: FeedReconciler> Feed<R> {
    /// Create a feed. The transport is not connected until [`Feed::run`].
    #[must_use]
    pub fn new(reconciler: R, transport: TransportConfig) -> Self {
        let (transport, events) = TransportManager::new(transport);
        Self {
            reconciler,
            transport,
            events,
            fallback_refresh: None,
        }
    }

    /// Refresh from REST every `period` while the stream is not connected.
    #[must_use]
    pub fn with_fallback_refresh(mut self, period: Option<Duration>) -> Self {
        self.fallback_refresh = period.filter(|p| !p.is_zero());
        self
    }

    /// Get the transport.
    #[must_use]
    pub const fn transport(&self) -> &TransportManager {
        &self.transport
    }

    /// Get the reconciler.
    #[must_use]
    pub const fn reconciler(&self) -> &R {
        &self.reconciler
    }

    /// Drive the feed until `cancel` fires or the transport goes away.
    ///
    /// Returns the reconciler with every received update applied.
    pub async fn run(self, cancel: CancellationToken) -> R {
        let span = tracing::info_span!("feed", feed = self.reconciler.name());
        self.run_inner(cancel).instrument(span).await
    }

    async fn run_inner(mut self, cancel: CancellationToken) -> R {
        self.resync().await;
        self.transport.connect();

        let mut fallback = self.fallback_refresh.map(|period| {
            let mut interval = tokio::time::interval_at(Instant::now() + period, period);
            interval.set_missed_tick_behavior(MissedTickBehavior::Delay);
            interval
        });
        let mut connected_once = false;

        loop {
            let deadline = self.reconciler.flush_deadline();

            tokio::select! {
                () = cancel.cancelled() => break,
                () = tokio::time::sleep_until(deadline.unwrap_or_else(Instant::now)), if deadline.is_some() => {
                    if self.reconciler.flush() {
                        self.reconciler.publish();
                    }
                }
                event = self.events.recv() => {
                    let Some(event) = event else {
                        tracing::debug!("Transport event channel closed");
                        break;
                    };
                    if matches!(event, TransportEvent::Connected) {
                        if connected_once {
                            tracing::info!("Stream reconnected, refreshing from REST");
                            self.resync().await;
                        }
                        connected_once = true;
                    } else {
                        deliver(&mut self.reconciler, event);
                    }
                }
                () = tick(&mut fallback), if fallback.is_some() => {
                    if !self.transport.status().is_connected() {
                        tracing::debug!("Stream down, refreshing from REST");
                        self.resync().await;
                    }
                }
            }

            if self.reconciler.needs_resync() {
                self.resync().await;
            }
        }

        self.shutdown().await;
        self.reconciler
    }

    async fn resync(&mut self) {
        if let Err(e) = self.reconciler.resync().await {
            tracing::warn!(error = %e, "REST refresh failed");
        }
    }

    /// Disconnect while draining in-flight events, then flush.
    async fn shutdown(&mut self) {
        let Self {
            reconciler,
            transport,
            events,
            ..
        } = self;

        let disconnect = transport.disconnect();
        tokio::pin!(disconnect);
        loop {
            tokio::select! {
                () = &mut disconnect => break,
                Some(event) = events.recv() => deliver(reconciler, event),
            }
        }
        while let Ok(event) = events.try_recv() {
            deliver(reconciler, event);
        }

        if reconciler.flush() {
            reconciler.publish();
        }
        tracing::info!("Feed stopped");
    }
}

/// Apply a transport event to the reconciler.
fn deliver<R: FeedReconciler>(reconciler: &mut R, event: TransportEvent) {
    let changed = match event {
        TransportEvent::Message(message) => reconciler.on_message(&message),
        TransportEvent::Batch(batch) => reconciler.on_batch(&batch),
        TransportEvent::Reconnecting { attempt } => {
            tracing::debug!(attempt, "Stream reconnecting");
            false
        }
        TransportEvent::Error(error) => {
            tracing::warn!(%error, "Stream error");
            false
        }
        TransportEvent::Connected | TransportEvent::Disconnected => false,
    };
    if changed {
        reconciler.publish();
    }
}

async fn tick(interval: &mut Option<Interval>) {
    match interval {
        Some(interval) => {
            interval.tick().await;
        }
        None => std::future::pending().await,
    }
}
