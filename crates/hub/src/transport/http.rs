// SPDX-License-Identifier: BUSL-1.1
// Copyright (c) 2026 Alfred Jean LLC

//! HTTP handlers for the operator-facing REST surface.

use std::sync::Arc;

use axum::extract::{Path, Query, State};
use axum::http::StatusCode;
use axum::response::IntoResponse;
use axum::Json;
use serde::{Deserialize, Serialize};

use crate::error::ApiError;
use crate::events::HubEvent;
use crate::router::{self, SubmitError};
use crate::state::{epoch_ms, HubState};
use crate::store::{
    DeviceFilter, DeviceKind, DevicePatch, DeviceRecord, DeviceStatus, DeviceUpdate,
    TelemetrySample, TELEMETRY_WINDOW,
};

// -- Request/Response types ---------------------------------------------------

#[derive(Debug, Serialize)]
pub struct HealthResponse {
    pub status: String,
    pub device_count: i64,
    pub queue_capacity: usize,
}

#[derive(Debug, Deserialize)]
pub struct SubmitCommandRequest {
    pub idempotency_key: String,
    pub command: String,
}

#[derive(Debug, Serialize)]
pub struct SubmitCommandResponse {
    pub command_id: String,
    pub duplicate: bool,
}

#[derive(Debug, Serialize)]
pub struct HeartbeatResponse {
    pub device_id: String,
    pub status: DeviceStatus,
}

#[derive(Debug, Deserialize)]
pub struct ListDevicesQuery {
    pub status: Option<DeviceStatus>,
    pub kind: Option<DeviceKind>,
    /// Name substring filter.
    pub name: Option<String>,
    /// Keyset cursor from the previous page's `next`.
    pub after: Option<String>,
    pub limit: Option<i64>,
}

#[derive(Debug, Serialize)]
pub struct DeviceDetailResponse {
    pub device: DeviceRecord,
    /// Newest first, at most the rolling window.
    pub telemetry: Vec<TelemetrySample>,
    /// Optimistic-concurrency token for the update path.
    pub version: i64,
}

#[derive(Debug, Deserialize)]
pub struct UpdateDeviceRequest {
    pub name: Option<String>,
    pub location: Option<String>,
    pub firmware: Option<String>,
    /// Concurrency token from a prior read.
    pub version: i64,
}

/// Largest accepted device page.
const MAX_PAGE_SIZE: i64 = 100;
const DEFAULT_PAGE_SIZE: i64 = 50;

// -- Handlers -----------------------------------------------------------------

/// `GET /api/v1/health`
pub async fn health(State(s): State<Arc<HubState>>) -> impl IntoResponse {
    let device_count = s.store.device_count().await.unwrap_or(0);
    Json(HealthResponse {
        status: "running".to_owned(),
        device_count,
        queue_capacity: s.config.queue_capacity,
    })
}

/// `GET /api/v1/metrics`
pub async fn metrics(State(s): State<Arc<HubState>>) -> impl IntoResponse {
    Json(s.metrics.snapshot())
}

/// `POST /api/v1/devices/{id}/commands` — submit a command.
pub async fn submit_command(
    State(s): State<Arc<HubState>>,
    Path(device_id): Path<String>,
    Json(req): Json<SubmitCommandRequest>,
) -> impl IntoResponse {
    match router::enqueue(&s, &device_id, &req.idempotency_key, &req.command).await {
        Ok(accepted) => (
            StatusCode::ACCEPTED,
            Json(SubmitCommandResponse {
                command_id: accepted.command_id,
                duplicate: accepted.duplicate,
            }),
        )
            .into_response(),
        Err(SubmitError::Invalid(message)) => {
            ApiError::BadRequest.to_http_response(message).into_response()
        }
        Err(SubmitError::QueueFull) => {
            ApiError::QueueFull.to_http_response("command queue full").into_response()
        }
        Err(SubmitError::Store(e)) => {
            tracing::error!(device_id = %device_id, err = %e, "command submission failed");
            ApiError::Internal.to_http_response("submission failed").into_response()
        }
    }
}

/// `GET /api/v1/devices/{id}/commands/{command_id}` — command snapshot.
pub async fn get_command(
    State(s): State<Arc<HubState>>,
    Path((device_id, command_id)): Path<(String, String)>,
) -> impl IntoResponse {
    match s.store.command(&command_id).await {
        Ok(Some(command)) if command.device_id == device_id => {
            Json(command).into_response()
        }
        Ok(_) => ApiError::NotFound.to_http_response("command not found").into_response(),
        Err(e) => {
            tracing::error!(command_id = %command_id, err = %e, "command lookup failed");
            ApiError::Internal.to_http_response("lookup failed").into_response()
        }
    }
}

/// `POST /api/v1/devices/{id}/heartbeat` — refresh last-seen, go online.
pub async fn heartbeat(
    State(s): State<Arc<HubState>>,
    Path(device_id): Path<String>,
) -> impl IntoResponse {
    match s.store.heartbeat_device(&device_id, epoch_ms()).await {
        Ok(Some(prev)) => {
            if prev == DeviceStatus::Offline {
                s.operators.publish(HubEvent::DeviceStatusChanged {
                    device_id: device_id.clone(),
                    status: DeviceStatus::Online,
                });
                tracing::info!(device_id = %device_id, "device back online via heartbeat");
            }
            Json(HeartbeatResponse { device_id, status: DeviceStatus::Online }).into_response()
        }
        Ok(None) => ApiError::NotFound.to_http_response("device not found").into_response(),
        Err(e) => {
            tracing::error!(device_id = %device_id, err = %e, "heartbeat failed");
            ApiError::Internal.to_http_response("heartbeat failed").into_response()
        }
    }
}

/// `GET /api/v1/devices` — filtered, keyset-paginated device listing.
pub async fn list_devices(
    State(s): State<Arc<HubState>>,
    Query(query): Query<ListDevicesQuery>,
) -> impl IntoResponse {
    let limit = query.limit.unwrap_or(DEFAULT_PAGE_SIZE).clamp(1, MAX_PAGE_SIZE);
    let filter = DeviceFilter {
        status: query.status,
        kind: query.kind,
        name: query.name,
        after: query.after,
        limit,
    };
    match s.store.list_devices(&filter).await {
        Ok(page) => Json(page).into_response(),
        Err(e) => {
            tracing::error!(err = %e, "device listing failed");
            ApiError::Internal.to_http_response("listing failed").into_response()
        }
    }
}

/// `GET /api/v1/devices/{id}` — device with recent telemetry.
pub async fn get_device(
    State(s): State<Arc<HubState>>,
    Path(device_id): Path<String>,
) -> impl IntoResponse {
    let device = match s.store.device(&device_id).await {
        Ok(Some(device)) => device,
        Ok(None) => {
            return ApiError::NotFound.to_http_response("device not found").into_response()
        }
        Err(e) => {
            tracing::error!(device_id = %device_id, err = %e, "device lookup failed");
            return ApiError::Internal.to_http_response("lookup failed").into_response();
        }
    };

    let telemetry = match s.store.recent_telemetry(&device_id, TELEMETRY_WINDOW).await {
        Ok(samples) => samples,
        Err(e) => {
            tracing::error!(device_id = %device_id, err = %e, "telemetry lookup failed");
            return ApiError::Internal.to_http_response("lookup failed").into_response();
        }
    };

    let version = device.version;
    Json(DeviceDetailResponse { device, telemetry, version }).into_response()
}

/// `PATCH /api/v1/devices/{id}` — update mutable fields with optimistic
/// concurrency.
pub async fn update_device(
    State(s): State<Arc<HubState>>,
    Path(device_id): Path<String>,
    Json(req): Json<UpdateDeviceRequest>,
) -> impl IntoResponse {
    let patch =
        DevicePatch { name: req.name, location: req.location, firmware: req.firmware };
    match s.store.update_device(&device_id, &patch, req.version).await {
        Ok(DeviceUpdate::Updated(device)) => Json(device).into_response(),
        Ok(DeviceUpdate::VersionMismatch) => ApiError::VersionConflict
            .to_http_response("device was modified concurrently")
            .into_response(),
        Ok(DeviceUpdate::NotFound) => {
            ApiError::NotFound.to_http_response("device not found").into_response()
        }
        Err(e) => {
            tracing::error!(device_id = %device_id, err = %e, "device update failed");
            ApiError::Internal.to_http_response("update failed").into_response()
        }
    }
}
