//! peercall: one-to-one call signaling.
//!
//! A relay server tracks which participants are online and forwards call
//! messages between their connections. Each client runs at most one call at
//! a time through a per-call state machine that drives an external media /
//! peer-connection capability.
//!
//! Binaries:
//! - `signaling_server`: the relay.
//! - `call_client`: a demo endpoint with simulated media.

/// Per-call state machine, session registry and media capability traits.
pub mod call;
/// Call agent gluing the signaling client to the session registry.
pub mod client;
/// Handles configuration loading and management.
pub mod config;
/// Logging utilities for the application.
pub mod log;
/// Relay server: presence, routing, wire protocol and connection handling.
pub mod signaling;
/// Signaling client for communicating with the relay.
pub mod signaling_client;
pub mod utils;
