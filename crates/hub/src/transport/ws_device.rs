// SPDX-License-Identifier: BUSL-1.1
// Copyright (c) 2026 Alfred Jean LLC

//! Device-side duplex channel. Devices register into their group, push
//! telemetry and command results, and receive command frames.
//!
//! Any inbound frame counts as a heartbeat and refreshes last-seen.

use std::sync::Arc;

use axum::extract::ws::{Message, WebSocket};
use axum::extract::{Query, State, WebSocketUpgrade};
use axum::http::HeaderMap;
use axum::response::IntoResponse;
use futures_util::{SinkExt, StreamExt};
use serde::{Deserialize, Serialize};
use tokio::sync::mpsc;

use crate::events::HubEvent;
use crate::hub::ConnId;
use crate::metrics::Metrics;
use crate::router;
use crate::state::{epoch_ms, HubState};
use crate::store::CommandStatus;
use crate::transport::auth;

/// Terminal status reported by a device.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
pub enum ResultStatus {
    Completed,
    Failed,
}

/// Frames a device may send to the hub.
#[derive(Debug, Clone, Serialize, Deserialize)]
#[serde(tag = "type", rename_all = "snake_case")]
pub enum DeviceFrame {
    /// Join the connection group for a device id.
    Register { device_id: String },
    /// Opaque telemetry payload.
    Telemetry { device_id: String, payload: String },
    /// Asynchronous outcome of a previously delivered command.
    CommandResult {
        command_id: String,
        status: ResultStatus,
        #[serde(default)]
        result: Option<String>,
    },
}

/// Query parameters for the device WS upgrade.
#[derive(Debug, Clone, Deserialize)]
pub struct DeviceWsQuery {
    pub key: Option<String>,
}

/// `GET /ws/device` — WebSocket upgrade for a device transport channel.
pub async fn ws_device_handler(
    State(state): State<Arc<HubState>>,
    Query(query): Query<DeviceWsQuery>,
    headers: HeaderMap,
    ws: WebSocketUpgrade,
) -> impl IntoResponse {
    // The shared secret may arrive as a header or a query param.
    let query_str = query.key.as_ref().map(|k| format!("key={k}")).unwrap_or_default();
    let expected = state.config.api_key.as_deref();
    if auth::validate_api_key(&headers, expected).is_err()
        && auth::validate_ws_query(&query_str, expected).is_err()
    {
        return axum::http::Response::builder()
            .status(401)
            .body(axum::body::Body::from("unauthorized"))
            .unwrap_or_default()
            .into_response();
    }

    ws.on_upgrade(move |socket| handle_device_socket(state, socket)).into_response()
}

/// Per-connection loop: outbound command frames one way, device frames
/// the other.
async fn handle_device_socket(state: Arc<HubState>, socket: WebSocket) {
    let (mut ws_tx, mut ws_rx) = socket.split();
    let conn_id = state.devices.next_conn_id();
    let (frame_tx, mut frame_rx) = mpsc::unbounded_channel::<Arc<str>>();
    let mut registered: Option<String> = None;

    loop {
        tokio::select! {
            _ = state.shutdown.cancelled() => break,

            // Hub -> device
            frame = frame_rx.recv() => {
                match frame {
                    Some(text) => {
                        if ws_tx.send(Message::Text(text.to_string().into())).await.is_err() {
                            break;
                        }
                    }
                    None => break,
                }
            }

            // Device -> hub
            msg = ws_rx.next() => {
                match msg {
                    Some(Ok(Message::Text(text))) => {
                        handle_frame(&state, text.as_str(), conn_id, &frame_tx, &mut registered)
                            .await;
                    }
                    Some(Ok(Message::Close(_))) | None => break,
                    Some(Err(_)) => break,
                    _ => {}
                }
            }
        }
    }

    if let Some(ref device_id) = registered {
        state.devices.detach(device_id, conn_id).await;
        tracing::info!(device_id = %device_id, "device connection closed");
    }
}

/// Parse and apply one inbound device frame.
pub(crate) async fn handle_frame(
    state: &HubState,
    text: &str,
    conn_id: ConnId,
    frame_tx: &mpsc::UnboundedSender<Arc<str>>,
    registered: &mut Option<String>,
) {
    let frame = match serde_json::from_str::<DeviceFrame>(text) {
        Ok(frame) => frame,
        Err(e) => {
            tracing::debug!(err = %e, "unparseable device frame dropped");
            return;
        }
    };

    match frame {
        DeviceFrame::Register { device_id } => {
            if let Some(prev) = registered.take() {
                if prev != device_id {
                    state.devices.detach(&prev, conn_id).await;
                }
            }
            state.devices.attach(&device_id, conn_id, frame_tx.clone()).await;
            match state.store.touch_device(&device_id, epoch_ms()).await {
                Ok(true) => {}
                Ok(false) => {
                    tracing::warn!(device_id = %device_id, "register from unprovisioned device")
                }
                Err(e) => {
                    tracing::error!(device_id = %device_id, err = %e, "last-seen update failed")
                }
            }
            tracing::info!(device_id = %device_id, "device registered");
            *registered = Some(device_id);
        }
        DeviceFrame::Telemetry { device_id, payload } => {
            apply_telemetry(state, &device_id, &payload).await;
        }
        DeviceFrame::CommandResult { command_id, status, result } => {
            apply_command_result(state, &command_id, status, result.as_deref(), registered.as_deref())
                .await;
        }
    }
}

/// Persist a telemetry sample (pruning the rolling window) and broadcast it.
pub(crate) async fn apply_telemetry(state: &HubState, device_id: &str, payload: &str) {
    let now = epoch_ms();
    if let Err(e) = state.store.touch_device(device_id, now).await {
        tracing::error!(device_id, err = %e, "last-seen update failed");
    }
    match state.store.append_telemetry(device_id, payload, now).await {
        Ok(sample) => {
            Metrics::incr(&state.metrics.telemetry_frames);
            state.operators.publish(HubEvent::TelemetryReceived {
                device_id: device_id.to_owned(),
                sample,
            });
        }
        Err(e) => tracing::error!(device_id, err = %e, "failed to persist telemetry"),
    }
}

/// Apply a device-reported command outcome. Unknown or malformed ids are
/// logged and dropped; late results after a terminal transition are
/// no-ops.
pub(crate) async fn apply_command_result(
    state: &HubState,
    command_id: &str,
    status: ResultStatus,
    result: Option<&str>,
    registered_device: Option<&str>,
) {
    if let Some(device_id) = registered_device {
        if let Err(e) = state.store.touch_device(device_id, epoch_ms()).await {
            tracing::error!(device_id, err = %e, "last-seen update failed");
        }
    }

    if uuid::Uuid::parse_str(command_id).is_err() {
        tracing::warn!(command_id, "malformed command id on result frame");
        return;
    }
    let command = match state.store.command(command_id).await {
        Ok(Some(command)) => command,
        Ok(None) => {
            tracing::warn!(command_id, "result for unknown command dropped");
            return;
        }
        Err(e) => {
            tracing::error!(command_id, err = %e, "result lookup failed");
            return;
        }
    };

    let latency = epoch_ms().saturating_sub(command.created_at);
    let (terminal, counter) = match status {
        ResultStatus::Completed => (CommandStatus::Completed, &state.metrics.commands_completed),
        ResultStatus::Failed => (CommandStatus::Failed, &state.metrics.commands_failed),
    };
    if router::finish_and_publish(
        state,
        command_id,
        terminal,
        result.unwrap_or_default(),
        Some(latency),
        counter,
    )
    .await
    {
        tracing::info!(command_id, status = ?status, latency_ms = latency, "command finished");
    } else {
        tracing::debug!(command_id, "late result ignored, command already terminal");
    }
}

#[cfg(test)]
#[path = "ws_device_tests.rs"]
mod tests;
