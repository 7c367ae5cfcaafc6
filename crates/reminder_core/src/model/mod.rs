//! Domain model for reminder tasks and notification events.
//!
//! # Responsibility
//! - Define the durable `Task` record shared by store, scheduler and service.
//! - Define transient scheduler/dispatcher messages.
//!
//! # Invariants
//! - Every task is identified by a stable, non-empty `TaskId`.
//! - Transient types never hold references into the store.

pub mod event;
pub mod task;
