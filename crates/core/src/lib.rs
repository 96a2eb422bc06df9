//! Core logic for the Jarvis voice assistant.
//!
//! Everything here is independent of the HTTP server: per-connection session
//! state and audio assembly, the tool-call grammar, the bounded reasoning loop,
//! the cascading web search, and the collaborator traits for the language
//! model, speech and repository services.

pub mod conversation;
pub mod frame;
pub mod github;
pub mod llm_client;
pub mod reasoning;
pub mod search;
pub mod session;
pub mod tool;
pub mod tool_router;
pub mod voice;
