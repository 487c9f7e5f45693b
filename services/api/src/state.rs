//! Shared Application State
//!
//! This module defines the `AppState` struct, which holds the resources
//! shared by every connection. It is built once at startup and read-only
//! afterwards.

use crate::config::Config;
use std::sync::Arc;
use vidur_core::LiveRunner;

/// The shared application state, created once at startup and passed to all handlers.
#[derive(Clone)]
pub struct AppState {
    pub runner: Arc<dyn LiveRunner>,
    pub config: Arc<Config>,
}
