//! Manages the WebSocket connection lifecycle for a voice session.
//!
//! Each connection runs three tasks: the socket reader (this function's own
//! task), a writer draining the outbound channel into the socket, and the
//! `SessionOrchestrator` processing frames and stop signals in order.
//! Interrupts bypass the orchestrator queue so they can land while a turn is
//! in flight; the stop signal starts its turn here for the same reason.

use super::{
    orchestrator::{CONNECTED_MESSAGE, INTERRUPTED_MESSAGE, Outbound, SessionInput, SessionOrchestrator},
    protocol::{ClientMessage, ServerMessage},
};
use crate::state::AppState;
use anyhow::Result;
use axum::{
    extract::{
        Query, State,
        ws::{Message, WebSocket, WebSocketUpgrade},
    },
    response::Response,
};
use futures_util::{
    SinkExt, StreamExt,
    stream::{SplitSink, SplitStream},
};
use jarvis_core::session::Session;
use serde::Deserialize;
use std::sync::Arc;
use tokio::sync::mpsc;
use tracing::{Instrument, debug, error, info, instrument, warn};
use utoipa::IntoParams;
use uuid::Uuid;

const OUTBOUND_CAPACITY: usize = 64;
const INPUT_CAPACITY: usize = 256;

#[derive(Deserialize, Debug, IntoParams)]
#[into_params(parameter_in = Query)]
pub struct ConnectParams {
    /// Identifier to resume; a new one is generated when absent.
    pub session_id: Option<String>,
}

/// Axum handler to upgrade an HTTP connection to a voice session WebSocket.
#[utoipa::path(
    get,
    path = "/ws/ai",
    params(ConnectParams),
    responses(
        (status = 101, description = "Switching protocols to the voice session WebSocket")
    )
)]
pub async fn ws_handler(
    ws: WebSocketUpgrade,
    Query(params): Query<ConnectParams>,
    State(state): State<Arc<AppState>>,
) -> Response {
    let session_id = params
        .session_id
        .filter(|id| !id.trim().is_empty())
        .unwrap_or_else(|| Uuid::new_v4().to_string());
    ws.on_upgrade(move |socket| handle_socket(socket, state, session_id))
}

/// Main handler for an individual WebSocket connection.
#[instrument(name = "ws_session", skip(socket, state))]
async fn handle_socket(socket: WebSocket, state: Arc<AppState>, session_id: String) {
    info!("New WebSocket connection");
    let session = state.sessions.get_or_create(&session_id).await;

    let (socket_tx, socket_rx) = socket.split();
    let (outbound_tx, outbound_rx) = mpsc::channel(OUTBOUND_CAPACITY);
    tokio::spawn(write_outbound(socket_tx, outbound_rx).in_current_span());

    if outbound_tx
        .send(Outbound::Event(ServerMessage::system(CONNECTED_MESSAGE)))
        .await
        .is_err()
    {
        error!("Failed to queue connection notice");
    }

    let (input_tx, input_rx) = mpsc::channel(INPUT_CAPACITY);
    let orchestrator =
        SessionOrchestrator::new(session.clone(), state.services.clone(), outbound_tx.clone());
    tokio::spawn(orchestrator.run(input_rx).in_current_span());

    if let Err(e) = read_inbound(socket_rx, &session, &input_tx, &outbound_tx).await {
        error!(error = ?e, "WebSocket session terminated with error");
    }

    // A turn still in flight finishes against a closed session and is dropped,
    // unless a reconnect is still attached to it.
    drop(input_tx);
    state.sessions.release(&session);
    info!("WebSocket connection closed");
}

/// Routes client messages until the socket closes.
async fn read_inbound(
    mut socket_rx: SplitStream<WebSocket>,
    session: &Session,
    inputs: &mpsc::Sender<SessionInput>,
    outbound: &mpsc::Sender<Outbound>,
) -> Result<()> {
    while let Some(msg_result) = socket_rx.next().await {
        let routed = match msg_result? {
            Message::Binary(data) => inputs.send(SessionInput::Frame(data)).await.is_ok(),
            Message::Text(text) => match serde_json::from_str::<ClientMessage>(&text) {
                Ok(msg) => route_control(msg, session, inputs, outbound).await,
                Err(e) => {
                    warn!(error = %e, "Ignoring unrecognized text message");
                    true
                }
            },
            Message::Close(_) => {
                info!("Client sent close frame");
                break;
            }
            Message::Ping(_) | Message::Pong(_) => true,
        };
        if !routed {
            warn!("Orchestrator stopped; closing connection");
            break;
        }
    }
    Ok(())
}

/// Applies a control message. Returns false once the orchestrator is gone.
async fn route_control(
    msg: ClientMessage,
    session: &Session,
    inputs: &mpsc::Sender<SessionInput>,
    outbound: &mpsc::Sender<Outbound>,
) -> bool {
    match msg {
        ClientMessage::Interrupt => {
            info!("Interrupt signal received");
            session.interrupt().await;
            if outbound
                .send(Outbound::Event(ServerMessage::system(INTERRUPTED_MESSAGE)))
                .await
                .is_err()
            {
                debug!("Client writer closed; dropping interrupt notice");
            }
            true
        }
        ClientMessage::StopRecording => {
            let token = session.begin_turn().await;
            inputs.send(SessionInput::Stop(token)).await.is_ok()
        }
    }
}

/// Drains the outbound channel into the socket until every sender is gone.
async fn write_outbound(
    mut socket_tx: SplitSink<WebSocket, Message>,
    mut outbound: mpsc::Receiver<Outbound>,
) {
    while let Some(item) = outbound.recv().await {
        let result = match item {
            Outbound::Event(msg) => send_msg(&mut socket_tx, msg).await,
            Outbound::Audio(audio) => {
                debug!(bytes = audio.len(), "Sending synthesized speech");
                socket_tx
                    .send(Message::Binary(audio))
                    .await
                    .map_err(Into::into)
            }
        };
        if let Err(e) = result {
            warn!(error = %e, "Failed to write to client; stopping writer");
            break;
        }
    }
    let _ = socket_tx.close().await;
}

/// A helper function to serialize and send a `ServerMessage` to the client.
pub(crate) async fn send_msg(
    socket_tx: &mut SplitSink<WebSocket, Message>,
    msg: ServerMessage,
) -> Result<()> {
    let serialized = serde_json::to_string(&msg)?;
    socket_tx.send(Message::Text(serialized.into())).await?;
    Ok(())
}

#[cfg(test)]
mod tests {
    use super::*;
    use jarvis_core::session::SessionStore;

    #[tokio::test]
    async fn test_interrupt_after_stop_cancels_queued_turn() {
        let store = SessionStore::new("sys");
        let session = store.get_or_create("sid").await;
        let (inputs, mut queued) = mpsc::channel(4);
        let (outbound, mut events) = mpsc::channel(4);

        assert!(route_control(ClientMessage::StopRecording, &session, &inputs, &outbound).await);
        assert!(route_control(ClientMessage::Interrupt, &session, &inputs, &outbound).await);

        match queued.try_recv() {
            Ok(SessionInput::Stop(token)) => assert!(token.is_cancelled()),
            other => panic!("expected a queued stop, got {:?}", other),
        }
        assert_eq!(
            events.try_recv().ok(),
            Some(Outbound::Event(ServerMessage::system(INTERRUPTED_MESSAGE)))
        );
    }

    #[tokio::test]
    async fn test_interrupt_before_stop_does_not_carry_over() {
        let store = SessionStore::new("sys");
        let session = store.get_or_create("sid").await;
        let (inputs, mut queued) = mpsc::channel(4);
        let (outbound, _events) = mpsc::channel(4);

        route_control(ClientMessage::Interrupt, &session, &inputs, &outbound).await;
        route_control(ClientMessage::StopRecording, &session, &inputs, &outbound).await;

        match queued.try_recv() {
            Ok(SessionInput::Stop(token)) => assert!(!token.is_cancelled()),
            other => panic!("expected a queued stop, got {:?}", other),
        }
    }

    #[tokio::test]
    async fn test_stop_reports_closed_orchestrator() {
        let store = SessionStore::new("sys");
        let session = store.get_or_create("sid").await;
        let (inputs, queued) = mpsc::channel(1);
        let (outbound, _events) = mpsc::channel(1);
        drop(queued);

        assert!(!route_control(ClientMessage::StopRecording, &session, &inputs, &outbound).await);
    }
}
