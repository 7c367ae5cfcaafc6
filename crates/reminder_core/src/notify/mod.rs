//! Notification delivery: channel strategies and the dispatcher chain.
//!
//! # Responsibility
//! - Define the pluggable `NotificationChannel` contract.
//! - Provide host-platform channels backed by bounded child processes.
//! - Turn fired events into visible notifications with graceful fallback.
//!
//! # Invariants
//! - Channel failures and panics never propagate past the dispatcher.
//! - Every dispatched event reaches the UI callback or, failing that, the
//!   interactive and last-resort channels.

pub mod channel;
pub mod dispatcher;
pub mod platform;
mod process;

pub use channel::{Notification, NotificationChannel};
pub use dispatcher::{DeliveryReport, Dispatcher, UiCallback};
