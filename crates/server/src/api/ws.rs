//! `GET /api/v1/tasks/events/ws` — all-tasks task event stream
//! (`SPEC_FULL.md` §6 "WebSocket").

use axum::extract::ws::{Message, WebSocket, WebSocketUpgrade};
use axum::extract::State;
use axum::response::IntoResponse;
use tokio::sync::broadcast::error::RecvError;

use crate::state::AppState;

pub async fn task_events_ws(ws: WebSocketUpgrade, State(state): State<AppState>) -> impl IntoResponse {
    ws.on_upgrade(move |socket| handle_socket(socket, state))
}

async fn handle_socket(mut socket: WebSocket, state: AppState) {
    let mut rx = state.events.subscribe();
    loop {
        match rx.recv().await {
            Ok(frame) => {
                let Ok(data) = serde_json::to_string(&frame) else { continue };
                if socket.send(Message::Text(data)).await.is_err() {
                    break;
                }
            }
            Err(RecvError::Lagged(n)) => {
                let msg = format!("{{\"warning\":\"missed {n} events\"}}");
                if socket.send(Message::Text(msg)).await.is_err() {
                    break;
                }
            }
            Err(RecvError::Closed) => break,
        }
    }
}
