//! Wakegate - A reverse proxy that wakes sleeping backends on demand
//!
//! This library provides a request gate that:
//! - Probes the backend's health URL before every request
//! - Wakes a dead backend with a wake-on-LAN magic packet or an HTTP start call
//! - Polls the backend until it answers, then forwards the original request
//! - Stops the backend through an HTTP stop call after an idle window
//! - Forwards gated traffic to a single upstream over pooled connections

pub mod config;
pub mod error;
pub mod gate;
pub mod health;
pub mod magic;
pub mod pool;
pub mod server;
pub mod timer;
pub mod wake;

/// Version information for the gate
pub const VERSION: &str = env!("CARGO_PKG_VERSION");
pub const PKG_NAME: &str = env!("CARGO_PKG_NAME");
