//! Defines the WebSocket message protocol between the browser client and the API server.
//!
//! Audio travels as binary frames in both directions; everything else is a
//! JSON object tagged by its `type` field.

use serde::{Deserialize, Serialize};

/// Control messages sent from the client (browser) to the server.
#[derive(Deserialize, Debug, Clone, PartialEq, Eq)]
#[serde(tag = "type", rename_all = "snake_case")]
pub enum ClientMessage {
    /// Abandons the turn in flight at its next checkpoint.
    Interrupt,
    /// Ends the current recording and starts processing it.
    StopRecording,
}

/// Where the facts in an `ai_response` came from.
#[derive(Serialize, Debug, Clone, Copy, PartialEq, Eq)]
#[serde(rename_all = "snake_case")]
pub enum SourceType {
    Github,
    Web,
}

/// Events sent from the server to the client (browser).
#[derive(Serialize, Debug, Clone, PartialEq)]
#[serde(tag = "type", rename_all = "snake_case")]
pub enum ServerMessage {
    /// Connection-level notices.
    System { message: String },
    /// Progress of the turn being processed.
    Status { message: String },
    /// A failure inside the current turn; the session stays open.
    Error { message: String },
    /// What the user said.
    Transcription { text: String },
    /// The assistant's final reply for the turn.
    AiResponse {
        text: String,
        #[serde(skip_serializing_if = "Option::is_none")]
        has_sources: Option<bool>,
        #[serde(skip_serializing_if = "Option::is_none")]
        source_type: Option<SourceType>,
    },
}

impl ServerMessage {
    pub fn system(message: impl Into<String>) -> Self {
        Self::System {
            message: message.into(),
        }
    }

    pub fn status(message: impl Into<String>) -> Self {
        Self::Status {
            message: message.into(),
        }
    }

    pub fn error(message: impl Into<String>) -> Self {
        Self::Error {
            message: message.into(),
        }
    }

    pub fn ai_response(text: impl Into<String>, source: Option<SourceType>) -> Self {
        Self::AiResponse {
            text: text.into(),
            has_sources: source.map(|_| true),
            source_type: source,
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use serde_json::json;

    #[test]
    fn test_client_messages_deserialize() {
        let interrupt: ClientMessage = serde_json::from_str(r#"{"type": "interrupt"}"#).unwrap();
        assert_eq!(interrupt, ClientMessage::Interrupt);

        let stop: ClientMessage = serde_json::from_str(r#"{"type": "stop_recording"}"#).unwrap();
        assert_eq!(stop, ClientMessage::StopRecording);

        assert!(serde_json::from_str::<ClientMessage>(r#"{"type": "start_recording"}"#).is_err());
    }

    #[test]
    fn test_ai_response_without_sources_omits_fields() {
        let value = serde_json::to_value(ServerMessage::ai_response("Hello", None)).unwrap();
        assert_eq!(value, json!({"type": "ai_response", "text": "Hello"}));
    }

    #[test]
    fn test_ai_response_with_sources() {
        let value =
            serde_json::to_value(ServerMessage::ai_response("See PR", Some(SourceType::Github)))
                .unwrap();
        assert_eq!(
            value,
            json!({"type": "ai_response", "text": "See PR", "has_sources": true, "source_type": "github"})
        );
    }

    #[test]
    fn test_status_shape() {
        let value = serde_json::to_value(ServerMessage::status("AI is thinking...")).unwrap();
        assert_eq!(value, json!({"type": "status", "message": "AI is thinking..."}));
    }
}
