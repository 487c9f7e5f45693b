//! WebSocket Relay
//!
//! This module contains the logic that bridges a client WebSocket to a live
//! agent session. It is structured into submodules:
//!
//! - `protocol`: The JSON message format exchanged with the client.
//! - `relay`: The inbound and outbound pumps and the race between them.
//! - `session`: The endpoints and the live session lifecycle around a relay.

pub mod protocol;
pub mod relay;
pub mod session;

pub use session::{media_stream_handler, ws_handler};
