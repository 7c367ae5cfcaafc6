//! Repository layer abstractions and persistence implementations.
//!
//! # Responsibility
//! - Define the task persistence contract used by the service layer.
//! - Isolate SQLite query details from scheduling and orchestration.
//!
//! # Invariants
//! - Write paths call `Task::validate()` before SQL mutations.
//! - Read paths degrade malformed fields per row instead of failing the load.

pub mod task_repo;
