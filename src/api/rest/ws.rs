use std::sync::Arc;

use axum::extract::ws::{Message, WebSocket, WebSocketUpgrade};
use axum::extract::State;
use axum::response::IntoResponse;
use futures::SinkExt;
use futures::StreamExt;
use serde_json::json;
use tokio::sync::mpsc;
use tokio_stream::wrappers::ReceiverStream;
use tracing::{debug, info, warn};

use crate::error::AppError;
use crate::events::session::{ClientMessage, Session};
use crate::models::principal::Principal;
use crate::state::AppState;

const REPLY_BUFFER: usize = 16;

pub async fn ws_handler(
    ws: WebSocketUpgrade,
    principal: Principal,
    State(state): State<Arc<AppState>>,
) -> impl IntoResponse {
    ws.on_upgrade(move |socket| handle_socket(socket, state, principal))
}

async fn handle_socket(socket: WebSocket, state: Arc<AppState>, principal: Principal) {
    let (mut sender, mut receiver) = socket.split();
    let (connection_id, events_rx) = state.events.connect();
    let (reply_tx, mut reply_rx) = mpsc::channel::<String>(REPLY_BUFFER);

    info!(
        connection_id,
        user_id = %principal.id,
        role = %principal.role,
        "websocket client connected"
    );

    let mut send_task = tokio::spawn(async move {
        let mut events = ReceiverStream::new(events_rx);
        loop {
            let frame = tokio::select! {
                event = events.next() => match event {
                    Some(event) => match serde_json::to_string(&event) {
                        Ok(json) => json,
                        Err(err) => {
                            warn!(error = %err, "failed to serialize event for ws");
                            continue;
                        }
                    },
                    None => break,
                },
                reply = reply_rx.recv() => match reply {
                    Some(json) => json,
                    None => break,
                },
            };

            if sender.send(Message::Text(frame)).await.is_err() {
                break;
            }
        }
    });

    let session_state = state.clone();
    let mut recv_task = tokio::spawn(async move {
        let session = Session::new(&session_state, principal, connection_id);

        while let Some(Ok(message)) = receiver.next().await {
            let text = match message {
                Message::Text(text) => text,
                Message::Close(_) => break,
                _ => continue,
            };

            let result = ClientMessage::parse(&text).and_then(|message| session.handle(message));
            if let Err(err) = result {
                debug!(connection_id, error = %err, "client message rejected");
                if reply_tx.try_send(error_frame(&err)).is_err() {
                    warn!(connection_id, "reply queue full; error frame dropped");
                }
            }
        }
    });

    tokio::select! {
        _ = &mut send_task => recv_task.abort(),
        _ = &mut recv_task => send_task.abort(),
    }

    state.events.disconnect(connection_id);
    info!(connection_id, "websocket client disconnected");
}

fn error_frame(err: &AppError) -> String {
    json!({
        "event": "error",
        "data": {
            "code": err.code(),
            "message": err.to_string(),
        }
    })
    .to_string()
}
