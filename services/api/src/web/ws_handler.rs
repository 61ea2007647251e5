//! services/api/src/web/ws_handler.rs
//!
//! This is the main entry point and control loop for a WebSocket connection.
//! It owns the connection's `BriefSession` and feeds it socket frames and
//! background events, one at a time.

use crate::web::{
    protocol::{ClientMessage, Outbound},
    session::{BriefSession, SessionEvent},
    state::AppState,
};
use axum::{
    extract::{
        ws::{Message, WebSocket},
        State, WebSocketUpgrade,
    },
    response::Response,
};
use futures::{
    stream::{SplitSink, StreamExt},
    SinkExt,
};
use std::sync::Arc;
use tokio::sync::mpsc::{self, UnboundedReceiver};
use tracing::{error, info, warn};

/// The handler for upgrading HTTP requests to WebSocket connections.
pub async fn ws_handler(ws: WebSocketUpgrade, State(app_state): State<Arc<AppState>>) -> Response {
    ws.on_upgrade(move |socket| handle_socket(socket, app_state))
}

async fn handle_socket(socket: WebSocket, app_state: Arc<AppState>) {
    let (sender, mut receiver) = socket.split();

    // --- 1. Wiring ---
    let (outbound_tx, outbound_rx) = mpsc::unbounded_channel();
    let (event_tx, mut event_rx) = mpsc::unbounded_channel();
    let writer = tokio::spawn(write_outbound(sender, outbound_rx));

    let mut session = BriefSession::new(app_state, event_tx, outbound_tx);
    info!("New WebSocket connection established for session {}.", session.id());
    session.start();

    // --- 2. Main Event Loop ---
    loop {
        tokio::select! {
            frame = receiver.next() => match frame {
                Some(Ok(Message::Text(text))) => match serde_json::from_str::<ClientMessage>(text.as_str()) {
                    Ok(message) => session.handle(SessionEvent::Client(message)),
                    Err(e) => warn!("Failed to deserialize client message: {}", e),
                },
                Some(Ok(Message::Binary(data))) => session.handle(SessionEvent::Audio(data.to_vec())),
                Some(Ok(Message::Close(_))) => {
                    info!("Client sent close message.");
                    break;
                }
                Some(Ok(_)) => {}
                Some(Err(e)) => {
                    warn!("WebSocket error: {}", e);
                    break;
                }
                None => {
                    info!("Client disconnected.");
                    break;
                }
            },
            Some(event) = event_rx.recv() => session.handle(event),
        }
    }

    // --- 3. Cleanup ---
    session.shutdown();
    drop(session);
    writer.abort();
    info!("WebSocket connection closed.");
}

/// Serializes outbound messages onto the socket until the channel or the socket closes.
async fn write_outbound(
    mut sender: SplitSink<WebSocket, Message>,
    mut outbound: UnboundedReceiver<Outbound>,
) {
    while let Some(item) = outbound.recv().await {
        let frame = match item {
            Outbound::Message(message) => match serde_json::to_string(&message) {
                Ok(json) => Message::Text(json.into()),
                Err(e) => {
                    error!("Failed to serialize server message: {}", e);
                    continue;
                }
            },
            Outbound::Audio(audio) => Message::Binary(audio.into()),
        };
        if sender.send(frame).await.is_err() {
            error!("Failed to send frame to client. Ending writer task.");
            break;
        }
    }
}
