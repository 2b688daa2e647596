// SPDX-License-Identifier: BUSL-1.1
// Copyright (c) 2026 Alfred Jean LLC

//! HTTP + WebSocket transport for the control plane.

pub mod auth;
pub mod http;
pub mod ws_device;
pub mod ws_operator;

use std::sync::Arc;

use axum::middleware;
use axum::routing::get;
use axum::Router;
use tower_http::cors::CorsLayer;

use crate::state::HubState;

/// Build the axum `Router` with all hub routes.
pub fn build_router(state: Arc<HubState>) -> Router {
    Router::new()
        // Probes (no auth)
        .route("/api/v1/health", get(http::health))
        .route("/api/v1/metrics", get(http::metrics))
        // Device inventory
        .route("/api/v1/devices", get(http::list_devices))
        .route("/api/v1/devices/{id}", get(http::get_device).patch(http::update_device))
        .route("/api/v1/devices/{id}/heartbeat", axum::routing::post(http::heartbeat))
        // Command submission
        .route("/api/v1/devices/{id}/commands", axum::routing::post(http::submit_command))
        .route("/api/v1/devices/{id}/commands/{command_id}", get(http::get_command))
        // Device transport (duplex)
        .route("/ws/device", get(ws_device::ws_device_handler))
        // Operator subscriptions
        .route("/ws/operator", get(ws_operator::ws_operator_handler))
        // Middleware
        .layer(middleware::from_fn_with_state(state.clone(), auth::auth_layer))
        .layer(CorsLayer::permissive())
        .with_state(state)
}
