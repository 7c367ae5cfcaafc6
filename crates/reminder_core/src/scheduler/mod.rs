//! Reminder scheduling engine.
//!
//! # Responsibility
//! - Keep the set of armed reminders keyed by task id.
//! - Fire each reminder exactly once at (or after) its wall-clock time.
//! - Hand fired events to a single delivery consumer in FIFO order.
//!
//! # Invariants
//! - At most one live entry exists per task id; re-scheduling replaces it.
//! - A cancelled or replaced entry never fires afterwards.
//! - Past-due reminders fire immediately instead of being dropped.
//! - Store and scheduler state are independent until reconciled by the
//!   service layer.

mod engine;
mod queue;

pub use engine::Scheduler;
