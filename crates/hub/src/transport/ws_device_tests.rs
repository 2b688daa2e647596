// SPDX-License-Identifier: BUSL-1.1
// Copyright (c) 2026 Alfred Jean LLC

use std::sync::Arc;

use sqlx::types::Json;
use tokio::sync::mpsc;
use tokio_util::sync::CancellationToken;

use super::{apply_command_result, apply_telemetry, handle_frame, DeviceFrame, ResultStatus};
use crate::chaos::ChaosKnobs;
use crate::config::HubConfig;
use crate::events::HubEvent;
use crate::state::{epoch_ms, HubState};
use crate::store::{
    CommandRecord, CommandStatus, DeviceKind, DeviceRecord, DeviceStatus, Store, TransportKind,
};

fn test_config() -> HubConfig {
    HubConfig {
        host: "127.0.0.1".into(),
        port: 0,
        api_key: None,
        db_url: "sqlite::memory:".into(),
        queue_capacity: 50,
        response_timeout_ms: 10_000,
        sweep_interval_ms: 10_000,
        offline_after_ms: 30_000,
        chaos_latency: None,
        chaos_drop_rate: 0.0,
    }
}

async fn test_state() -> anyhow::Result<Arc<HubState>> {
    let store = Store::in_memory().await?;
    let (queue_tx, _queue_rx) = mpsc::channel(50);
    Ok(Arc::new(HubState::new(
        test_config(),
        store,
        ChaosKnobs::disabled(),
        queue_tx,
        CancellationToken::new(),
    )))
}

fn device(id: &str) -> DeviceRecord {
    DeviceRecord {
        id: id.to_owned(),
        name: format!("Device {id}"),
        kind: DeviceKind::Switcher,
        transport: TransportKind::LineOrientedTcp,
        capabilities: Json(vec![]),
        status: DeviceStatus::Offline,
        last_seen: None,
        firmware: String::new(),
        location: String::new(),
        version: 1,
    }
}

#[test]
fn inbound_frames_parse() -> anyhow::Result<()> {
    let frame: DeviceFrame =
        serde_json::from_str(r#"{"type":"register","device_id":"d01"}"#)?;
    assert!(matches!(frame, DeviceFrame::Register { ref device_id } if device_id == "d01"));

    let frame: DeviceFrame = serde_json::from_str(
        r#"{"type":"telemetry","device_id":"d01","payload":"{\"temp\":20}"}"#,
    )?;
    assert!(matches!(frame, DeviceFrame::Telemetry { .. }));

    let frame: DeviceFrame = serde_json::from_str(
        r#"{"type":"command_result","command_id":"c1","status":"Completed","result":"OK"}"#,
    )?;
    match frame {
        DeviceFrame::CommandResult { status, result, .. } => {
            assert_eq!(status, ResultStatus::Completed);
            assert_eq!(result.as_deref(), Some("OK"));
        }
        other => anyhow::bail!("unexpected frame: {other:?}"),
    }

    // The result field may be omitted.
    let frame: DeviceFrame = serde_json::from_str(
        r#"{"type":"command_result","command_id":"c1","status":"Failed"}"#,
    )?;
    assert!(matches!(frame, DeviceFrame::CommandResult { result: None, .. }));
    Ok(())
}

#[tokio::test]
async fn register_frame_joins_the_device_group() -> anyhow::Result<()> {
    let state = test_state().await?;
    state.store.create_device(&device("d01")).await?;

    let conn = state.devices.next_conn_id();
    let (frame_tx, mut frame_rx) = mpsc::unbounded_channel();
    let mut registered = None;

    handle_frame(
        &state,
        r#"{"type":"register","device_id":"d01"}"#,
        conn,
        &frame_tx,
        &mut registered,
    )
    .await;

    assert_eq!(registered.as_deref(), Some("d01"));
    assert_eq!(state.devices.connection_count("d01").await, 1);

    // Registration refreshed last-seen.
    let read = state.store.device("d01").await?.ok_or_else(|| anyhow::anyhow!("missing"))?;
    assert!(read.last_seen.is_some());

    // Commands now reach this connection.
    assert!(state.devices.send_command("d01", "c1", "Reboot").await);
    assert!(frame_rx.recv().await.is_some());
    Ok(())
}

#[tokio::test]
async fn garbage_frames_are_dropped() -> anyhow::Result<()> {
    let state = test_state().await?;
    let conn = state.devices.next_conn_id();
    let (frame_tx, _frame_rx) = mpsc::unbounded_channel();
    let mut registered = None;

    handle_frame(&state, "not json", conn, &frame_tx, &mut registered).await;
    handle_frame(&state, r#"{"type":"unknown"}"#, conn, &frame_tx, &mut registered).await;

    assert!(registered.is_none());
    Ok(())
}

#[tokio::test]
async fn telemetry_is_persisted_and_broadcast() -> anyhow::Result<()> {
    let state = test_state().await?;
    state.store.create_device(&device("d01")).await?;
    let mut events = state.operators.subscribe();

    apply_telemetry(&state, "d01", r#"{"temp":21}"#).await;

    let samples = state.store.recent_telemetry("d01", 10).await?;
    assert_eq!(samples.len(), 1);
    assert_eq!(samples[0].payload, r#"{"temp":21}"#);

    let read = state.store.device("d01").await?.ok_or_else(|| anyhow::anyhow!("missing"))?;
    assert!(read.last_seen.is_some());

    match events.try_recv() {
        Ok(HubEvent::TelemetryReceived { device_id, sample }) => {
            assert_eq!(device_id, "d01");
            assert_eq!(sample.payload, r#"{"temp":21}"#);
        }
        other => anyhow::bail!("expected telemetry event, got {other:?}"),
    }
    Ok(())
}

#[tokio::test]
async fn device_result_completes_a_pending_command() -> anyhow::Result<()> {
    let state = test_state().await?;
    let mut events = state.operators.subscribe();
    let command = CommandRecord::pending("d01", "K", "Reboot", epoch_ms() - 120);
    state.store.create_command(&command).await?;

    apply_command_result(&state, &command.id, ResultStatus::Completed, Some("OK"), None).await;

    let stored =
        state.store.command(&command.id).await?.ok_or_else(|| anyhow::anyhow!("missing"))?;
    assert_eq!(stored.status, CommandStatus::Completed);
    assert_eq!(stored.result.as_deref(), Some("OK"));
    let latency = stored.latency_ms.ok_or_else(|| anyhow::anyhow!("latency unset"))?;
    assert!(latency >= 100, "latency {latency}ms should reflect created_at age");

    match events.try_recv() {
        Ok(HubEvent::CommandCompleted { command: snapshot }) => {
            assert_eq!(snapshot.id, command.id);
            assert_eq!(snapshot.status, CommandStatus::Completed);
        }
        other => anyhow::bail!("expected command_completed, got {other:?}"),
    }

    // A second arrival is an idempotent no-op: no event, fields intact.
    apply_command_result(&state, &command.id, ResultStatus::Failed, Some("late"), None).await;
    assert!(events.try_recv().is_err());
    let stored =
        state.store.command(&command.id).await?.ok_or_else(|| anyhow::anyhow!("missing"))?;
    assert_eq!(stored.status, CommandStatus::Completed);
    assert_eq!(stored.result.as_deref(), Some("OK"));
    Ok(())
}

#[tokio::test]
async fn device_reported_failure_is_recorded() -> anyhow::Result<()> {
    let state = test_state().await?;
    let command = CommandRecord::pending("d01", "K", "Reboot", epoch_ms());
    state.store.create_command(&command).await?;

    apply_command_result(&state, &command.id, ResultStatus::Failed, Some("bus stuck"), None)
        .await;

    let stored =
        state.store.command(&command.id).await?.ok_or_else(|| anyhow::anyhow!("missing"))?;
    assert_eq!(stored.status, CommandStatus::Failed);
    assert_eq!(stored.result.as_deref(), Some("bus stuck"));
    Ok(())
}

#[tokio::test]
async fn unknown_or_malformed_result_ids_are_dropped() -> anyhow::Result<()> {
    let state = test_state().await?;
    let mut events = state.operators.subscribe();

    let unknown = uuid::Uuid::new_v4().to_string();
    apply_command_result(&state, &unknown, ResultStatus::Completed, Some("OK"), None).await;
    apply_command_result(&state, "not-a-uuid", ResultStatus::Completed, Some("OK"), None).await;

    assert!(events.try_recv().is_err());
    Ok(())
}

#[tokio::test]
async fn result_frame_refreshes_last_seen_of_registered_device() -> anyhow::Result<()> {
    let state = test_state().await?;
    state.store.create_device(&device("d01")).await?;
    let command = CommandRecord::pending("d01", "K", "Reboot", epoch_ms());
    state.store.create_command(&command).await?;

    apply_command_result(&state, &command.id, ResultStatus::Completed, Some("OK"), Some("d01"))
        .await;

    let read = state.store.device("d01").await?.ok_or_else(|| anyhow::anyhow!("missing"))?;
    assert!(read.last_seen.is_some());
    Ok(())
}
