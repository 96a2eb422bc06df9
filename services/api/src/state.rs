//! Shared Application State
//!
//! This module defines the `AppState` struct, which holds the session
//! registry and the collaborators every connection shares.

use crate::ws::orchestrator::TurnServices;
use jarvis_core::session::SessionStore;
use std::sync::Arc;

/// The shared application state, created once at startup and passed to all handlers.
#[derive(Clone)]
pub struct AppState {
    pub sessions: Arc<SessionStore>,
    pub services: Arc<TurnServices>,
}
