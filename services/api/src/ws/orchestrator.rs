//! Per-connection turn state machine.
//!
//! A turn moves `Idle -> Recording -> Finalizing -> Transcribing -> Reasoning
//! -> Synthesizing -> Idle`. Frames and stop signals are handled strictly in
//! arrival order by a single task per connection. The socket reader starts
//! the turn when the stop signal arrives, so an interrupt sent after it
//! cancels that turn even while it is still queued. Interrupts are only
//! consulted at the three checkpoints of a turn; a call already in flight always runs to completion
//! and its result is dropped by the next checkpoint.

use super::protocol::{ServerMessage, SourceType};
use bytes::Bytes;
use jarvis_core::{
    conversation::Turn,
    frame::{FrameError, RecordingState},
    reasoning::{ReasoningLoop, ReasoningOutcome},
    session::Session,
    voice::{SpeechSynthesizer, Transcriber},
};
use std::fmt;
use std::sync::Arc;
use tokio::sync::mpsc;
use tokio_util::sync::CancellationToken;
use tracing::{debug, error, info, instrument, warn};

pub const CONNECTED_MESSAGE: &str = "AI Service Connected - Whisper & GPT-4 Ready";
pub const INTERRUPTED_MESSAGE: &str = "Processing interrupted";
const TRANSCRIBING_STATUS: &str = "Transcribing audio...";
const THINKING_STATUS: &str = "AI is thinking...";

#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum TurnState {
    Idle,
    Recording,
    Finalizing,
    Transcribing,
    Reasoning,
    Synthesizing,
    Closed,
}

/// Points in a turn where a pending interrupt is honored.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum Checkpoint {
    BeforeTranscription,
    BeforeReasoning,
    AfterReasoning,
}

impl fmt::Display for Checkpoint {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match self {
            Checkpoint::BeforeTranscription => write!(f, "before transcription"),
            Checkpoint::BeforeReasoning => write!(f, "before reasoning"),
            Checkpoint::AfterReasoning => write!(f, "after reasoning"),
        }
    }
}

/// Anything the orchestrator writes back to the client.
#[derive(Debug, Clone, PartialEq)]
pub enum Outbound {
    Event(ServerMessage),
    /// Synthesized speech for the last `ai_response`.
    Audio(Bytes),
}

/// Input forwarded from the socket reader.
#[derive(Debug)]
pub enum SessionInput {
    Frame(Bytes),
    /// End of recording, carrying the interrupt token of the turn it starts.
    Stop(CancellationToken),
}

#[derive(Debug, thiserror::Error)]
pub enum TurnError {
    #[error("No audio data received")]
    EmptyRecording,
    #[error("transcription failed: {0:#}")]
    Transcription(anyhow::Error),
    #[error("completion failed: {0:#}")]
    Completion(anyhow::Error),
}

#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum TurnOutcome {
    Completed,
    Interrupted(Checkpoint),
    Failed,
}

/// Collaborators shared by every connection.
pub struct TurnServices {
    pub transcriber: Arc<dyn Transcriber>,
    pub synthesizer: Arc<dyn SpeechSynthesizer>,
    pub reasoning: Arc<ReasoningLoop>,
    pub language: String,
    pub vocabulary: Option<String>,
}

pub struct SessionOrchestrator {
    session: Arc<Session>,
    services: Arc<TurnServices>,
    outbound: mpsc::Sender<Outbound>,
    state: TurnState,
}

impl SessionOrchestrator {
    pub fn new(
        session: Arc<Session>,
        services: Arc<TurnServices>,
        outbound: mpsc::Sender<Outbound>,
    ) -> Self {
        Self {
            session,
            services,
            outbound,
            state: TurnState::Idle,
        }
    }

    pub fn state(&self) -> TurnState {
        self.state
    }

    /// Processes inputs in arrival order until the channel closes or the session is removed.
    pub async fn run(mut self, mut inputs: mpsc::Receiver<SessionInput>) {
        while let Some(input) = inputs.recv().await {
            match input {
                SessionInput::Frame(frame) => self.handle_frame(&frame).await,
                SessionInput::Stop(token) => {
                    self.handle_stop(token).await;
                }
            }
            if self.session.is_closed() {
                break;
            }
        }
        self.transition(TurnState::Closed);
        debug!(session_id = %self.session.id(), "Orchestrator stopped");
    }

    pub async fn handle_frame(&mut self, frame: &[u8]) {
        match self.session.accept_frame(frame).await {
            Ok(RecordingState::Recording) => self.transition(TurnState::Recording),
            Ok(RecordingState::Idle) => {}
            Err(FrameError::InvalidSignature { len }) => {
                warn!(
                    session_id = %self.session.id(),
                    bytes = len,
                    "Discarding frame that does not start a recording"
                );
            }
            Err(e) => warn!(session_id = %self.session.id(), error = %e, "Discarding frame"),
        }
    }

    /// Finalizes the recording and runs the turn. The buffer is always empty afterwards.
    #[instrument(name = "turn", skip_all, fields(session_id = %self.session.id()))]
    pub async fn handle_stop(&mut self, token: CancellationToken) -> Option<TurnOutcome> {
        self.transition(TurnState::Finalizing);
        let audio = self.session.finalize_recording().await;
        info!(bytes = audio.len(), "Stop recording received");

        if audio.is_empty() {
            self.emit(ServerMessage::error(TurnError::EmptyRecording.to_string()))
                .await;
            self.transition(TurnState::Idle);
            return None;
        }
        Some(self.process_recording(audio, token).await)
    }

    async fn process_recording(&mut self, audio: Bytes, token: CancellationToken) -> TurnOutcome {
        let outcome = match self.run_turn(audio, &token).await {
            Ok(outcome) => outcome,
            Err(e) => {
                error!(error = %e, "Turn failed");
                self.emit(ServerMessage::error(format!("Error processing audio: {}", e)))
                    .await;
                TurnOutcome::Failed
            }
        };
        self.session.reset_recording().await;
        self.transition(TurnState::Idle);
        outcome
    }

    async fn run_turn(
        &mut self,
        audio: Bytes,
        token: &CancellationToken,
    ) -> Result<TurnOutcome, TurnError> {
        self.transition(TurnState::Transcribing);
        self.emit(ServerMessage::status(TRANSCRIBING_STATUS)).await;
        if let Some(outcome) = self.checkpoint(token, Checkpoint::BeforeTranscription) {
            return Ok(outcome);
        }

        let services = self.services.clone();
        let text = services
            .transcriber
            .transcribe(audio, &services.language, services.vocabulary.as_deref())
            .await
            .map_err(TurnError::Transcription)?;
        info!(transcription = %text, "Transcribed recording");
        self.emit(ServerMessage::Transcription { text: text.clone() })
            .await;
        self.session.append(Turn::user(text.clone())).await;

        let context = services.reasoning.tools().code_context(&text).await;

        self.transition(TurnState::Reasoning);
        self.emit(ServerMessage::status(THINKING_STATUS)).await;
        if let Some(outcome) = self.checkpoint(token, Checkpoint::BeforeReasoning) {
            return Ok(outcome);
        }

        let mut working = self.session.history().await;
        let reply = services
            .reasoning
            .run(&mut working, context.as_deref())
            .await
            .map_err(TurnError::Completion)?;
        if let Some(outcome) = self.checkpoint(token, Checkpoint::AfterReasoning) {
            return Ok(outcome);
        }

        working.push(Turn::assistant(reply.text.clone()));
        if !self.session.commit(working).await {
            debug!("History was not committed");
        }
        let source = source_type(&reply, context.is_some());
        self.emit(ServerMessage::ai_response(reply.text.clone(), source))
            .await;

        self.transition(TurnState::Synthesizing);
        match services.synthesizer.synthesize(&reply.text).await {
            Some(speech) => self.send(Outbound::Audio(speech)).await,
            None => warn!("Continuing without synthesized speech"),
        }
        Ok(TurnOutcome::Completed)
    }

    fn checkpoint(&self, token: &CancellationToken, at: Checkpoint) -> Option<TurnOutcome> {
        if token.is_cancelled() {
            info!(checkpoint = %at, "Turn interrupted");
            Some(TurnOutcome::Interrupted(at))
        } else {
            None
        }
    }

    fn transition(&mut self, next: TurnState) {
        if self.state != next {
            debug!(from = ?self.state, to = ?next, "Turn state change");
            self.state = next;
        }
    }

    async fn emit(&self, message: ServerMessage) {
        self.send(Outbound::Event(message)).await;
    }

    async fn send(&self, outbound: Outbound) {
        if self.outbound.send(outbound).await.is_err() {
            debug!(session_id = %self.session.id(), "Client writer closed; dropping message");
        }
    }
}

fn source_type(reply: &ReasoningOutcome, used_code_context: bool) -> Option<SourceType> {
    if used_code_context || reply.pull_request_url.is_some() {
        Some(SourceType::Github)
    } else if reply.searched {
        Some(SourceType::Web)
    } else {
        None
    }
}
