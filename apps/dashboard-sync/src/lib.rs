#![cfg_attr(
    test,
    allow(
        clippy::unwrap_used,
        clippy::expect_used,
        clippy::float_cmp,
        clippy::significant_drop_tightening,
        clippy::too_many_lines,
        clippy::match_same_arms,
        clippy::needless_pass_by_value,
        clippy::needless_collect,
        clippy::option_if_let_else,
        clippy::default_trait_access,
        clippy::items_after_statements,
        clippy::or_fun_call
    )
)]

//! Dashboard Sync - Real-Time Synchronization Core
//!
//! Keeps dashboard-side state (open positions, portfolio stats, activity)
//! in sync with the trading service over reconnecting WebSocket channels,
//! with REST hydration and fallback, and polls long-running jobs to
//! completion.
//!
//! # Layers (inside → outside)
//!
//! - **Domain**: Data model and merge rules
//!   - `streaming`: Channels, connection status, wire frames
//!   - `positions`, `portfolio`, `activity`: Entities and reconcilers
//!   - `collection`: Bounded id-keyed collections
//!   - `jobs`: Remote job types
//!
//! - **Application**: Use cases and port definitions
//!   - `ports`: REST snapshot and job interfaces
//!   - `services`: Feed driver, reconcilers, bounded poller
//!
//! - **Infrastructure**: Adapters and external integrations
//!   - `transport`: WebSocket connection manager
//!   - `batching`: Debounce windows and update accumulation
//!   - `rest`: REST adapter
//!   - `config`, `metrics`, `telemetry`
//!
//! # Data Flow
//!
//! ```text
//! Trading service WS ──► TransportManager ──► Feed ──► Reconciler ──► watch view
//!                                                         ▲
//! Trading service REST ─────► RestClient ─────────────────┘
//! ```

#![forbid(unsafe_code)]
#![warn(missing_docs)]
#![warn(clippy::pedantic)]

// =============================================================================
// Module Declarations
// =============================================================================

/// Domain layer - Data model and merge rules with no I/O.
pub mod domain;

/// Application layer - Use cases and port definitions.
pub mod application;

/// Infrastructure layer - Adapters and external integrations.
pub mod infrastructure;

// =============================================================================
// Re-exports
// =============================================================================

// Domain types
pub use domain::streaming::{Channel, ConnectionStatus, ControlFrame, InboundMessage};

// Application services
pub use application::ports::FetchError;
pub use application::services::{
    ActivitySync, ActivityView, BacktestRunner, BoundedPoller, Feed, FeedReconciler, PollError,
    PortfolioSync, PortfolioView, PositionSync, PositionsView,
};

// Infrastructure config
pub use infrastructure::config::{ConfigError, SyncConfig};

// Transport
pub use infrastructure::transport::{
    DeliveryMode, TransportConfig, TransportError, TransportEvent, TransportManager,
};

// REST adapter
pub use infrastructure::rest::RestClient;

// Metrics
pub use infrastructure::metrics::init_metrics;

// Telemetry
pub use infrastructure::telemetry::{TelemetryConfig, TelemetryGuard, init as init_telemetry};
