// SPDX-License-Identifier: BUSL-1.1
// Copyright (c) 2026 Alfred Jean LLC

//! Integration tests for the hub HTTP API.
//!
//! Uses `axum_test::TestServer` — no real TCP needed.

use std::sync::Arc;

use axum::http::StatusCode;
use axum_test::TestServer;
use sqlx::types::Json;
use tokio::sync::mpsc;
use tokio_util::sync::CancellationToken;

use fleet_hub::chaos::ChaosKnobs;
use fleet_hub::config::HubConfig;
use fleet_hub::router::QueuedCommand;
use fleet_hub::state::{epoch_ms, HubState};
use fleet_hub::store::{DeviceKind, DeviceRecord, DeviceStatus, Store, TransportKind};
use fleet_hub::transport::build_router;

fn test_config(queue_capacity: usize, api_key: Option<&str>) -> HubConfig {
    HubConfig {
        host: "127.0.0.1".into(),
        port: 0,
        api_key: api_key.map(str::to_owned),
        db_url: "sqlite::memory:".into(),
        queue_capacity,
        response_timeout_ms: 10_000,
        sweep_interval_ms: 10_000,
        offline_after_ms: 30_000,
        chaos_latency: None,
        chaos_drop_rate: 0.0,
    }
}

async fn test_state(
    queue_capacity: usize,
    api_key: Option<&str>,
) -> anyhow::Result<(Arc<HubState>, mpsc::Receiver<QueuedCommand>)> {
    let store = Store::in_memory().await?;
    let (queue_tx, queue_rx) = mpsc::channel(queue_capacity);
    let state = Arc::new(HubState::new(
        test_config(queue_capacity, api_key),
        store,
        ChaosKnobs::disabled(),
        queue_tx,
        CancellationToken::new(),
    ));
    Ok((state, queue_rx))
}

fn test_server(state: Arc<HubState>) -> anyhow::Result<TestServer> {
    Ok(TestServer::new(build_router(state))?)
}

fn device(id: &str, name: &str) -> DeviceRecord {
    DeviceRecord {
        id: id.to_owned(),
        name: name.to_owned(),
        kind: DeviceKind::Display,
        transport: TransportKind::HttpJson,
        capabilities: Json(vec!["power".to_owned()]),
        status: DeviceStatus::Offline,
        last_seen: None,
        firmware: "2.4.1".to_owned(),
        location: "row-1".to_owned(),
        version: 1,
    }
}

#[tokio::test]
async fn health_is_unauthenticated() -> anyhow::Result<()> {
    let (state, _queue_rx) = test_state(50, Some("secret")).await?;
    state.store.create_device(&device("d01", "Wall display")).await?;

    let server = test_server(state)?;
    let resp = server.get("/api/v1/health").await;
    resp.assert_status_ok();

    let body: serde_json::Value = resp.json();
    assert_eq!(body["status"], "running");
    assert_eq!(body["device_count"], 1);
    assert_eq!(body["queue_capacity"], 50);
    Ok(())
}

#[tokio::test]
async fn device_routes_require_the_shared_secret() -> anyhow::Result<()> {
    let (state, _queue_rx) = test_state(50, Some("secret")).await?;
    let server = test_server(state)?;

    let resp = server.get("/api/v1/devices").await;
    resp.assert_status(StatusCode::UNAUTHORIZED);

    let resp = server.get("/api/v1/devices").add_header("x-api-key", "wrong").await;
    resp.assert_status(StatusCode::UNAUTHORIZED);

    let resp = server.get("/api/v1/devices").add_header("x-api-key", "secret").await;
    resp.assert_status_ok();
    Ok(())
}

#[tokio::test]
async fn submit_command_is_accepted_and_idempotent() -> anyhow::Result<()> {
    let (state, _queue_rx) = test_state(50, None).await?;
    let server = test_server(state)?;

    let body = serde_json::json!({ "idempotency_key": "K", "command": "Reboot" });
    let first = server.post("/api/v1/devices/d01/commands").json(&body).await;
    first.assert_status(StatusCode::ACCEPTED);
    let first: serde_json::Value = first.json();
    let command_id = first["command_id"]
        .as_str()
        .ok_or_else(|| anyhow::anyhow!("missing command_id"))?
        .to_owned();
    assert_eq!(first["duplicate"], false);

    // Same key again: same id, still 202.
    let second = server.post("/api/v1/devices/d01/commands").json(&body).await;
    second.assert_status(StatusCode::ACCEPTED);
    let second: serde_json::Value = second.json();
    assert_eq!(second["command_id"], command_id.as_str());
    assert_eq!(second["duplicate"], true);
    Ok(())
}

#[tokio::test]
async fn submit_command_validates_input() -> anyhow::Result<()> {
    let (state, _queue_rx) = test_state(50, None).await?;
    let server = test_server(state)?;

    let resp = server
        .post("/api/v1/devices/d01/commands")
        .json(&serde_json::json!({ "idempotency_key": "", "command": "Reboot" }))
        .await;
    resp.assert_status(StatusCode::BAD_REQUEST);

    let resp = server
        .post("/api/v1/devices/d01/commands")
        .json(&serde_json::json!({ "idempotency_key": "K", "command": "" }))
        .await;
    resp.assert_status(StatusCode::BAD_REQUEST);

    let body: serde_json::Value = resp.json();
    assert_eq!(body["error"]["code"], "BAD_REQUEST");
    Ok(())
}

#[tokio::test]
async fn full_queue_is_backpressure_not_an_error_state() -> anyhow::Result<()> {
    // Capacity 1 and no worker draining: the second distinct command
    // must bounce with 429 and leave no durable trace.
    let (state, _queue_rx) = test_state(1, None).await?;
    let server = test_server(Arc::clone(&state))?;

    let resp = server
        .post("/api/v1/devices/d01/commands")
        .json(&serde_json::json!({ "idempotency_key": "K1", "command": "Reboot" }))
        .await;
    resp.assert_status(StatusCode::ACCEPTED);

    let resp = server
        .post("/api/v1/devices/d01/commands")
        .json(&serde_json::json!({ "idempotency_key": "K2", "command": "Reboot" }))
        .await;
    resp.assert_status(StatusCode::TOO_MANY_REQUESTS);
    let body: serde_json::Value = resp.json();
    assert_eq!(body["error"]["code"], "QUEUE_FULL");

    assert!(state.store.find_command("d01", "K2").await?.is_none());

    // A resubmission of the first key still resolves to its command.
    let resp = server
        .post("/api/v1/devices/d01/commands")
        .json(&serde_json::json!({ "idempotency_key": "K1", "command": "Reboot" }))
        .await;
    resp.assert_status(StatusCode::ACCEPTED);
    Ok(())
}

#[tokio::test]
async fn command_snapshot_lookup() -> anyhow::Result<()> {
    let (state, _queue_rx) = test_state(50, None).await?;
    let server = test_server(state)?;

    let resp = server
        .post("/api/v1/devices/d01/commands")
        .json(&serde_json::json!({ "idempotency_key": "K", "command": "Reboot" }))
        .await;
    let submitted: serde_json::Value = resp.json();
    let command_id = submitted["command_id"]
        .as_str()
        .ok_or_else(|| anyhow::anyhow!("missing command_id"))?
        .to_owned();

    let resp = server.get(&format!("/api/v1/devices/d01/commands/{command_id}")).await;
    resp.assert_status_ok();
    let snapshot: serde_json::Value = resp.json();
    assert_eq!(snapshot["status"], "pending");
    assert_eq!(snapshot["verb"], "Reboot");

    // The command belongs to d01, not d02.
    let resp = server.get(&format!("/api/v1/devices/d02/commands/{command_id}")).await;
    resp.assert_status(StatusCode::NOT_FOUND);

    let resp = server.get("/api/v1/devices/d01/commands/nope").await;
    resp.assert_status(StatusCode::NOT_FOUND);
    Ok(())
}

#[tokio::test]
async fn heartbeat_marks_online() -> anyhow::Result<()> {
    let (state, _queue_rx) = test_state(50, None).await?;
    state.store.create_device(&device("d03", "Codec")).await?;
    let server = test_server(Arc::clone(&state))?;

    let resp = server.post("/api/v1/devices/d03/heartbeat").await;
    resp.assert_status_ok();
    let body: serde_json::Value = resp.json();
    assert_eq!(body["status"], "online");

    let read = state.store.device("d03").await?.ok_or_else(|| anyhow::anyhow!("missing"))?;
    assert_eq!(read.status, DeviceStatus::Online);
    assert!(read.last_seen.is_some());

    let resp = server.post("/api/v1/devices/ghost/heartbeat").await;
    resp.assert_status(StatusCode::NOT_FOUND);
    Ok(())
}

#[tokio::test]
async fn device_listing_paginates_and_filters() -> anyhow::Result<()> {
    let (state, _queue_rx) = test_state(50, None).await?;
    for (id, name) in [("d01", "North display"), ("d02", "South display"), ("d03", "Lobby cam")] {
        state.store.create_device(&device(id, name)).await?;
    }
    let server = test_server(state)?;

    let resp = server.get("/api/v1/devices?limit=2").await;
    resp.assert_status_ok();
    let page: serde_json::Value = resp.json();
    assert_eq!(page["items"].as_array().map(Vec::len), Some(2));
    assert_eq!(page["next"], "d02");

    let resp = server.get("/api/v1/devices?limit=2&after=d02").await;
    let page: serde_json::Value = resp.json();
    assert_eq!(page["items"].as_array().map(Vec::len), Some(1));
    assert_eq!(page["items"][0]["id"], "d03");
    assert_eq!(page["next"], serde_json::Value::Null);

    let resp = server.get("/api/v1/devices?name=display").await;
    let page: serde_json::Value = resp.json();
    assert_eq!(page["items"].as_array().map(Vec::len), Some(2));

    let resp = server.get("/api/v1/devices?status=offline&limit=100").await;
    let page: serde_json::Value = resp.json();
    assert_eq!(page["items"].as_array().map(Vec::len), Some(3));
    Ok(())
}

#[tokio::test]
async fn device_detail_includes_recent_telemetry() -> anyhow::Result<()> {
    let (state, _queue_rx) = test_state(50, None).await?;
    state.store.create_device(&device("d01", "Wall display")).await?;
    let now = epoch_ms();
    for i in 0..3 {
        state.store.append_telemetry("d01", &format!("sample-{i}"), now + i).await?;
    }
    let server = test_server(state)?;

    let resp = server.get("/api/v1/devices/d01").await;
    resp.assert_status_ok();
    let body: serde_json::Value = resp.json();
    assert_eq!(body["device"]["id"], "d01");
    assert_eq!(body["version"], 1);
    assert_eq!(body["telemetry"].as_array().map(Vec::len), Some(3));
    assert_eq!(body["telemetry"][0]["payload"], "sample-2");

    let resp = server.get("/api/v1/devices/ghost").await;
    resp.assert_status(StatusCode::NOT_FOUND);
    Ok(())
}

#[tokio::test]
async fn device_update_uses_the_concurrency_token() -> anyhow::Result<()> {
    let (state, _queue_rx) = test_state(50, None).await?;
    state.store.create_device(&device("d01", "Wall display")).await?;
    let server = test_server(state)?;

    let resp = server
        .patch("/api/v1/devices/d01")
        .json(&serde_json::json!({ "location": "row-4", "version": 1 }))
        .await;
    resp.assert_status_ok();
    let body: serde_json::Value = resp.json();
    assert_eq!(body["location"], "row-4");
    assert_eq!(body["version"], 2);

    // Replaying the stale token conflicts.
    let resp = server
        .patch("/api/v1/devices/d01")
        .json(&serde_json::json!({ "location": "row-9", "version": 1 }))
        .await;
    resp.assert_status(StatusCode::CONFLICT);
    let body: serde_json::Value = resp.json();
    assert_eq!(body["error"]["code"], "VERSION_CONFLICT");
    Ok(())
}

#[tokio::test]
async fn metrics_snapshot_tracks_submissions() -> anyhow::Result<()> {
    let (state, _queue_rx) = test_state(50, None).await?;
    let server = test_server(state)?;

    server
        .post("/api/v1/devices/d01/commands")
        .json(&serde_json::json!({ "idempotency_key": "K", "command": "Reboot" }))
        .await
        .assert_status(StatusCode::ACCEPTED);
    server
        .post("/api/v1/devices/d01/commands")
        .json(&serde_json::json!({ "idempotency_key": "K", "command": "Reboot" }))
        .await
        .assert_status(StatusCode::ACCEPTED);

    let resp = server.get("/api/v1/metrics").await;
    resp.assert_status_ok();
    let body: serde_json::Value = resp.json();
    assert_eq!(body["commands_submitted"], 1);
    assert_eq!(body["commands_deduplicated"], 1);
    Ok(())
}
