//! Core use-case services.
//!
//! # Responsibility
//! - Compose task persistence and reminder scheduling into use-case APIs.
//! - Keep host UI/FFI layers decoupled from storage and thread details.

pub mod reminder_service;
