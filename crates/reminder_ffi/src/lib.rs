//! Flutter-facing bindings for the reminder engine.

pub mod api;
