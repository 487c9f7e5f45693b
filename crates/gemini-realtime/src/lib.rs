//! Gemini Live adapter
//!
//! Implements the [`vidur_core::LiveRunner`] seam on top of the Gemini Live
//! `BidiGenerateContent` websocket API. Each opened session owns one writer
//! task that drains its request queue into the upstream socket, while the
//! read half of the socket is exposed as the session's event stream.

mod session;
pub mod types;

pub use session::{DEFAULT_LIVE_URL, GeminiLiveRunner};
