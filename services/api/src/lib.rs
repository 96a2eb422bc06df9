//! Jarvis API Library Crate
//!
//! This library contains the web service around `jarvis-core`: configuration,
//! the application state, the HTTP handlers, the WebSocket voice sessions, and
//! routing. The `api` binary is a thin wrapper around this library.

pub mod config;
pub mod handlers;
pub mod models;
pub mod router;
pub mod state;
pub mod ws;
