//! Infrastructure Layer - Adapters and external integrations.
//!
//! This layer contains the concrete implementations of the port interfaces
//! defined in the application layer, plus the streaming transport.

/// Message batching and per-entity update accumulation.
pub mod batching;

/// Configuration loaded from the environment.
pub mod config;

/// Prometheus metrics instrumentation.
pub mod metrics;

/// REST adapter for snapshots and jobs.
pub mod rest;

/// OpenTelemetry tracing integration.
pub mod telemetry;

/// WebSocket transport with reconnect and keepalive.
pub mod transport;
