// SPDX-License-Identifier: BUSL-1.1
// Copyright (c) 2026 Alfred Jean LLC

use std::sync::Arc;

use axum::extract::State;
use axum::http::{HeaderMap, Request, StatusCode};
use axum::middleware::Next;
use axum::response::{IntoResponse, Response};

use crate::error::ApiError;
use crate::state::HubState;

/// Constant-time string comparison to prevent timing side-channel attacks.
fn constant_time_eq(a: &str, b: &str) -> bool {
    let a = a.as_bytes();
    let b = b.as_bytes();
    if a.len() != b.len() {
        return false;
    }
    let mut acc = 0u8;
    for (x, y) in a.iter().zip(b.iter()) {
        acc |= x ^ y;
    }
    acc == 0
}

/// Validate the `X-Api-Key` header against the configured shared secret.
pub fn validate_api_key(headers: &HeaderMap, expected: Option<&str>) -> Result<(), ApiError> {
    let expected = match expected {
        Some(key) => key,
        None => return Ok(()),
    };

    let supplied =
        headers.get("x-api-key").and_then(|v| v.to_str().ok()).ok_or(ApiError::Unauthorized)?;

    if constant_time_eq(supplied, expected) {
        Ok(())
    } else {
        Err(ApiError::Unauthorized)
    }
}

/// Validate a key from a WebSocket query string (`?key=...`).
pub fn validate_ws_query(query: &str, expected: Option<&str>) -> Result<(), ApiError> {
    let expected = match expected {
        Some(key) => key,
        None => return Ok(()),
    };

    for pair in query.split('&') {
        if let Some(value) = pair.strip_prefix("key=") {
            if constant_time_eq(value, expected) {
                return Ok(());
            }
        }
    }

    Err(ApiError::Unauthorized)
}

/// Axum middleware that enforces the shared secret.
///
/// Exempt: `/api/v1/health`, `/api/v1/metrics`, and WebSocket upgrades
/// (`/ws/`). The device channel re-validates inside its handler, where
/// the key may also arrive as a query parameter; the operator channel is
/// part of the operator UI surface and stays open.
pub async fn auth_layer(
    state: State<Arc<HubState>>,
    req: Request<axum::body::Body>,
    next: Next,
) -> Response {
    let path = req.uri().path();

    if path == "/api/v1/health" || path == "/api/v1/metrics" || path.starts_with("/ws/") {
        return next.run(req).await;
    }

    if let Err(code) = validate_api_key(req.headers(), state.config.api_key.as_deref()) {
        let body = crate::error::ErrorResponse { error: code.to_error_body("unauthorized") };
        return (
            StatusCode::from_u16(code.http_status()).unwrap_or(StatusCode::UNAUTHORIZED),
            axum::Json(body),
        )
            .into_response();
    }

    next.run(req).await
}

#[cfg(test)]
#[path = "auth_tests.rs"]
mod tests;
