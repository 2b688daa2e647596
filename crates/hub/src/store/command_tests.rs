// SPDX-License-Identifier: BUSL-1.1
// Copyright (c) 2026 Alfred Jean LLC

use super::super::{CommandRecord, CommandStatus, Store, StoreError};

#[tokio::test]
async fn create_and_find_by_idempotency_pair() -> anyhow::Result<()> {
    let store = Store::in_memory().await?;
    let command = CommandRecord::pending("d01", "K", "Reboot", 1_000);
    store.create_command(&command).await?;

    let found = store
        .find_command("d01", "K")
        .await?
        .ok_or_else(|| anyhow::anyhow!("command missing"))?;
    assert_eq!(found.id, command.id);
    assert_eq!(found.status, CommandStatus::Pending);
    assert_eq!(found.verb, "Reboot");
    assert_eq!(found.created_at, 1_000);
    Ok(())
}

#[tokio::test]
async fn duplicate_pair_is_rejected() -> anyhow::Result<()> {
    let store = Store::in_memory().await?;
    store.create_command(&CommandRecord::pending("d01", "K", "Reboot", 1_000)).await?;

    let duplicate = CommandRecord::pending("d01", "K", "Reboot", 2_000);
    match store.create_command(&duplicate).await {
        Err(StoreError::DuplicateKey) => {}
        other => anyhow::bail!("expected DuplicateKey, got {other:?}"),
    }
    Ok(())
}

#[tokio::test]
async fn same_key_on_another_device_is_distinct() -> anyhow::Result<()> {
    let store = Store::in_memory().await?;
    store.create_command(&CommandRecord::pending("d01", "K", "Reboot", 1_000)).await?;
    store.create_command(&CommandRecord::pending("d02", "K", "Reboot", 1_000)).await?;

    assert!(store.find_command("d01", "K").await?.is_some());
    assert!(store.find_command("d02", "K").await?.is_some());
    Ok(())
}

#[tokio::test]
async fn terminal_transition_happens_at_most_once() -> anyhow::Result<()> {
    let store = Store::in_memory().await?;
    let command = CommandRecord::pending("d01", "K", "Reboot", 1_000);
    store.create_command(&command).await?;

    let first = store
        .finish_command(&command.id, CommandStatus::Completed, "OK", Some(120))
        .await?;
    let won = first.ok_or_else(|| anyhow::anyhow!("first transition should win"))?;
    assert_eq!(won.status, CommandStatus::Completed);
    assert_eq!(won.result.as_deref(), Some("OK"));
    assert_eq!(won.latency_ms, Some(120));

    // A late result must not overwrite the terminal fields.
    let second = store
        .finish_command(&command.id, CommandStatus::Failed, "late", Some(999))
        .await?;
    assert!(second.is_none());

    let current = store
        .command(&command.id)
        .await?
        .ok_or_else(|| anyhow::anyhow!("command missing"))?;
    assert_eq!(current.status, CommandStatus::Completed);
    assert_eq!(current.result.as_deref(), Some("OK"));
    assert_eq!(current.latency_ms, Some(120));
    Ok(())
}

#[tokio::test]
async fn finish_unknown_command_is_noop() -> anyhow::Result<()> {
    let store = Store::in_memory().await?;
    let outcome = store
        .finish_command("missing", CommandStatus::Failed, "timeout", None)
        .await?;
    assert!(outcome.is_none());
    Ok(())
}

#[tokio::test]
async fn commands_survive_reopen() -> anyhow::Result<()> {
    let dir = tempfile::tempdir()?;
    let url = format!("sqlite://{}", dir.path().join("hub.db").display());

    let command = CommandRecord::pending("d01", "K", "Reboot", 1_000);
    {
        let store = Store::connect(&url).await?;
        store.create_command(&command).await?;
    }

    let reopened = Store::connect(&url).await?;
    let found = reopened
        .find_command("d01", "K")
        .await?
        .ok_or_else(|| anyhow::anyhow!("command lost across reopen"))?;
    assert_eq!(found.id, command.id);
    Ok(())
}

#[tokio::test]
async fn stale_scan_returns_only_old_pending() -> anyhow::Result<()> {
    let store = Store::in_memory().await?;
    let old = CommandRecord::pending("d01", "K1", "Reboot", 1_000);
    let fresh = CommandRecord::pending("d01", "K2", "Reboot", 50_000);
    let finished = CommandRecord::pending("d01", "K3", "Reboot", 1_000);
    store.create_command(&old).await?;
    store.create_command(&fresh).await?;
    store.create_command(&finished).await?;
    store.finish_command(&finished.id, CommandStatus::Completed, "OK", None).await?;

    let stale = store.stale_pending_commands(10_000).await?;
    assert_eq!(stale.len(), 1);
    assert_eq!(stale[0].id, old.id);
    Ok(())
}
