//! Domain Layer - Entities, updates and reconciliation rules.
//!
//! This layer contains the dashboard-side data model and the pure merge
//! logic that folds streamed updates into bounded collections. Nothing
//! here performs I/O or owns timers.

/// Bounded, id-keyed collections and dedup sets.
pub mod collection;

/// Activity feed built from signal updates.
pub mod activity;

/// Remote job (backtest) types.
pub mod jobs;

/// Aggregate portfolio statistics.
pub mod portfolio;

/// Position entities, updates and the position book reconciler.
pub mod positions;

/// Streaming wire types shared by every channel.
pub mod streaming;

/// Channel subscription tracking.
pub mod subscription;
