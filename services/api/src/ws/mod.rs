//! WebSocket Voice Sessions
//!
//! - `protocol`: the JSON control and event messages exchanged with the client.
//! - `orchestrator`: the per-connection turn state machine.
//! - `session`: connection lifecycle, from upgrade to teardown.

pub mod orchestrator;
pub mod protocol;
pub mod session;

pub use session::ws_handler;
