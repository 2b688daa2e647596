// SPDX-License-Identifier: BUSL-1.1
// Copyright (c) 2026 Alfred Jean LLC

//! Durable store for devices, commands, and recent telemetry.
//!
//! Backed by SQLite via sqlx. The unique index on
//! `(device_id, idempotency_key)` is the authoritative command
//! deduplication mechanism; everything else is single-record
//! transactional.

pub mod command;
pub mod device;
pub mod telemetry;

use std::str::FromStr;

use sqlx::sqlite::{SqliteConnectOptions, SqliteJournalMode, SqlitePool, SqlitePoolOptions};

pub use command::{CommandRecord, CommandStatus};
pub use device::{
    DeviceFilter, DeviceKind, DevicePage, DevicePatch, DeviceRecord, DeviceStatus, DeviceUpdate,
    TransportKind,
};
pub use telemetry::{TelemetrySample, TELEMETRY_WINDOW};

/// Errors surfaced by the store.
#[derive(Debug, thiserror::Error)]
pub enum StoreError {
    /// The `(device_id, idempotency_key)` pair already exists.
    #[error("duplicate idempotency key")]
    DuplicateKey,
    #[error(transparent)]
    Database(#[from] sqlx::Error),
}

const SCHEMA: &[&str] = &[
    "CREATE TABLE IF NOT EXISTS devices (
        id TEXT PRIMARY KEY,
        name TEXT NOT NULL,
        kind TEXT NOT NULL,
        transport TEXT NOT NULL,
        capabilities TEXT NOT NULL DEFAULT '[]',
        status TEXT NOT NULL DEFAULT 'offline',
        last_seen INTEGER,
        firmware TEXT NOT NULL DEFAULT '',
        location TEXT NOT NULL DEFAULT '',
        version INTEGER NOT NULL DEFAULT 1
    )",
    "CREATE TABLE IF NOT EXISTS commands (
        id TEXT PRIMARY KEY,
        device_id TEXT NOT NULL,
        idempotency_key TEXT NOT NULL,
        verb TEXT NOT NULL,
        status TEXT NOT NULL DEFAULT 'pending',
        result TEXT,
        latency_ms INTEGER,
        created_at INTEGER NOT NULL
    )",
    "CREATE UNIQUE INDEX IF NOT EXISTS idx_commands_device_key
        ON commands (device_id, idempotency_key)",
    "CREATE TABLE IF NOT EXISTS telemetry (
        id TEXT PRIMARY KEY,
        device_id TEXT NOT NULL,
        ts INTEGER NOT NULL,
        payload TEXT NOT NULL
    )",
    "CREATE INDEX IF NOT EXISTS idx_telemetry_device_ts
        ON telemetry (device_id, ts)",
];

/// Handle to the durable store. Cheap to clone; all clones share one pool.
#[derive(Debug, Clone)]
pub struct Store {
    pool: SqlitePool,
}

impl Store {
    /// Open (creating if missing) the database at `url` and apply the schema.
    pub async fn connect(url: &str) -> Result<Self, StoreError> {
        let options = SqliteConnectOptions::from_str(url)?
            .create_if_missing(true)
            .journal_mode(SqliteJournalMode::Wal)
            .busy_timeout(std::time::Duration::from_secs(5));
        let pool = SqlitePoolOptions::new().max_connections(5).connect_with(options).await?;
        let store = Self { pool };
        store.migrate().await?;
        Ok(store)
    }

    /// In-memory store for tests. Pinned to a single connection so the
    /// database outlives individual acquisitions.
    pub async fn in_memory() -> Result<Self, StoreError> {
        let options = SqliteConnectOptions::new().in_memory(true);
        let pool = SqlitePoolOptions::new()
            .max_connections(1)
            .idle_timeout(None)
            .max_lifetime(None)
            .connect_with(options)
            .await?;
        let store = Self { pool };
        store.migrate().await?;
        Ok(store)
    }

    async fn migrate(&self) -> Result<(), StoreError> {
        for statement in SCHEMA {
            sqlx::query(statement).execute(&self.pool).await?;
        }
        Ok(())
    }

    pub(crate) fn pool(&self) -> &SqlitePool {
        &self.pool
    }
}
