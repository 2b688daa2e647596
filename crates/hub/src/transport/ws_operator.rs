// SPDX-License-Identifier: BUSL-1.1
// Copyright (c) 2026 Alfred Jean LLC

//! Operator subscription channel — fans hub events out to every
//! connected operator session.

use std::sync::Arc;

use axum::extract::ws::{Message, WebSocket};
use axum::extract::{State, WebSocketUpgrade};
use axum::response::IntoResponse;
use futures_util::{SinkExt, StreamExt};
use tokio::sync::broadcast;

use crate::state::HubState;

/// `GET /ws/operator` — WebSocket upgrade for an operator session.
pub async fn ws_operator_handler(
    State(state): State<Arc<HubState>>,
    ws: WebSocketUpgrade,
) -> impl IntoResponse {
    ws.on_upgrade(move |socket| handle_operator_socket(state, socket))
}

/// Per-session event loop. A lagging session skips events rather than
/// slowing publishers down.
async fn handle_operator_socket(state: Arc<HubState>, socket: WebSocket) {
    let (mut ws_tx, mut ws_rx) = socket.split();
    let mut events = state.operators.subscribe();

    loop {
        tokio::select! {
            _ = state.shutdown.cancelled() => break,

            event = events.recv() => {
                let event = match event {
                    Ok(event) => event,
                    Err(broadcast::error::RecvError::Lagged(skipped)) => {
                        tracing::debug!(skipped, "operator session lagged, events skipped");
                        continue;
                    }
                    Err(broadcast::error::RecvError::Closed) => break,
                };
                if let Ok(json) = serde_json::to_string(&event) {
                    if ws_tx.send(Message::Text(json.into())).await.is_err() {
                        break;
                    }
                }
            }

            msg = ws_rx.next() => {
                match msg {
                    Some(Ok(Message::Close(_))) | None => break,
                    Some(Err(_)) => break,
                    _ => {}
                }
            }
        }
    }
}
