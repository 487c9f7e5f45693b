//! Vidur API Library Crate
//!
//! This library contains the web service that relays client WebSockets to
//! live agent sessions: configuration, shared state, routing, and the
//! WebSocket relay itself. The `api` binary is a thin wrapper around it.

pub mod config;
pub mod error;
pub mod router;
pub mod state;
pub mod ws;
