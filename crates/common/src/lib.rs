//! Common utilities and types shared across room-sync components.

#![warn(clippy::pedantic)]

/// Module for participant and stream identifier types
pub mod types;

/// Module for secret types that prevent accidental logging
pub mod secret;

/// Module for room join token acquisition over HTTP
pub mod join_token;
