//! WebSocket transport.
//!
//! The upgrade requires `X-User-Id` and `X-Nickname` headers; connections
//! without both are rejected before any session state exists. A successful
//! upgrade binds the session, registers an outbound queue with the dispatcher
//! and subscribes the shared room channel. Disconnect always tears all three
//! down.

use axum::{
    extract::{
        ws::{Message, WebSocket},
        State, WebSocketUpgrade,
    },
    http::{HeaderMap, StatusCode},
    response::{IntoResponse, Response},
};
use futures_util::{SinkExt, StreamExt};
use std::sync::Arc;
use tokio::sync::{broadcast, mpsc};
use uuid::Uuid;

use crate::message::{ClientFrame, Payload};
use crate::routes::AppState;
use crate::suggest::DEFAULT_ROOM_ID;

fn header_value(headers: &HeaderMap, name: &str) -> Option<String> {
    headers
        .get(name)
        .and_then(|value| value.to_str().ok())
        .map(str::to_string)
        .filter(|value| !value.is_empty())
}

/// WebSocket upgrade handler.
pub async fn ws_handler(
    ws: WebSocketUpgrade,
    headers: HeaderMap,
    State(state): State<Arc<AppState>>,
) -> Response {
    let Some(user_id) = header_value(&headers, "x-user-id") else {
        tracing::warn!("WebSocket handshake rejected: missing X-User-Id");
        return (StatusCode::BAD_REQUEST, "missing X-User-Id header").into_response();
    };
    let Some(nickname) = header_value(&headers, "x-nickname") else {
        tracing::warn!("WebSocket handshake rejected: missing X-Nickname");
        return (StatusCode::BAD_REQUEST, "missing X-Nickname header").into_response();
    };

    tracing::info!(user_id = %user_id, nickname = %nickname, "WebSocket handshake");
    ws.on_upgrade(move |socket| handle_socket(socket, state, user_id, nickname))
}

async fn handle_socket(socket: WebSocket, state: Arc<AppState>, user_id: String, nickname: String) {
    let session_id = Uuid::new_v4().to_string();
    state.registry.bind(&session_id, &user_id, &nickname);

    let (out_tx, mut out_rx) = mpsc::unbounded_channel::<Payload>();
    state.dispatcher.register_session(&session_id, out_tx);
    let mut room_rx = state.dispatcher.subscribe_room(DEFAULT_ROOM_ID);

    let (mut ws_tx, mut ws_rx) = socket.split();

    // Forward room broadcasts and addressed payloads to this socket.
    let writer_session = session_id.clone();
    let send_task = tokio::spawn(async move {
        loop {
            let payload = tokio::select! {
                queued = out_rx.recv() => match queued {
                    Some(payload) => payload,
                    None => break,
                },
                fanned = room_rx.recv() => match fanned {
                    Ok(payload) => payload,
                    Err(broadcast::error::RecvError::Lagged(skipped)) => {
                        tracing::warn!(session_id = %writer_session, skipped, "Slow consumer lagged behind room channel");
                        continue;
                    }
                    Err(broadcast::error::RecvError::Closed) => break,
                },
            };

            let json = match serde_json::to_string(&payload) {
                Ok(json) => json,
                Err(e) => {
                    tracing::error!(error = %e, "Failed to serialize outbound payload");
                    continue;
                }
            };
            if ws_tx.send(Message::Text(json)).await.is_err() {
                break;
            }
        }
    });

    // Drain inbound frames until the client goes away.
    while let Some(received) = ws_rx.next().await {
        match received {
            Ok(Message::Text(text)) => {
                handle_frame(&state, &text, &user_id, &nickname).await;
            }
            Ok(Message::Close(_)) | Err(_) => break,
            Ok(_) => {}
        }
    }

    send_task.abort();
    state.dispatcher.unregister_session(&session_id);
    state.registry.unbind(&session_id);
    tracing::info!(session_id = %session_id, user_id = %user_id, "WebSocket disconnected");
}

async fn handle_frame(state: &AppState, raw: &str, user_id: &str, nickname: &str) {
    let frame: ClientFrame = match serde_json::from_str(raw) {
        Ok(frame) => frame,
        Err(e) => {
            tracing::warn!(error = %e, "Unparseable client frame dropped");
            return;
        }
    };

    match frame {
        ClientFrame::Message(inbound) => {
            if let Err(e) = state
                .chat
                .handle_chat_message(inbound, user_id, nickname)
                .await
            {
                tracing::error!(error = %e, user_id = %user_id, "Failed to handle chat message");
            }
        }
        ClientFrame::RequestRecommendation { analysis_id } => {
            // Requester identity always comes from the session binding.
            state
                .suggestions
                .provide_recommendation(&analysis_id, user_id)
                .await;
        }
    }
}
