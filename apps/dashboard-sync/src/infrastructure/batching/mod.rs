//! Message Batching
//!
//! Debounced delivery for inbound streams.
//!
//! - [`MessageBatcher`] queues raw messages and releases them as one ordered
//!   batch per window.
//! - [`UpdateAccumulator`] coalesces updates per entity id within a window.
//!
//! Neither type spawns anything. Each exposes the deadline of its
//! [`FlushTimer`] so the owning task can `select!` on it and call `take()`
//! when it expires; the timer is armed by the first item of a window and
//! released by `take()`.

mod accumulator;
mod batcher;

pub use accumulator::UpdateAccumulator;
pub use crate::domain::streaming::AccumulatedUpdates;
pub use batcher::{FlushTimer, MessageBatcher};
