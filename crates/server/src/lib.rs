//! HostDeck server library
//!
//! Everything behind the `hostdeckd` binary: configuration, the container
//! runtime adapter, the installation lifecycle manager, telemetry collection
//! and fan-out, and the HTTP/WebSocket surface.

pub mod apps;
pub mod auth;
pub mod config;
pub mod runtime;
pub mod server;
pub mod subscriptions;
pub mod telemetry;
