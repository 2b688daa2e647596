// SPDX-License-Identifier: BUSL-1.1
// Copyright (c) 2026 Alfred Jean LLC

//! Command records. A command leaves `pending` at most once; the
//! conditional terminal update is what enforces that under races.

use serde::{Deserialize, Serialize};

use super::{Store, StoreError};

/// Lifecycle of a command.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize, sqlx::Type)]
#[serde(rename_all = "lowercase")]
#[sqlx(rename_all = "lowercase")]
pub enum CommandStatus {
    Pending,
    Completed,
    Failed,
}

/// A dispatched (or awaiting-dispatch) command.
#[derive(Debug, Clone, Serialize, Deserialize, sqlx::FromRow)]
pub struct CommandRecord {
    pub id: String,
    pub device_id: String,
    pub idempotency_key: String,
    pub verb: String,
    pub status: CommandStatus,
    pub result: Option<String>,
    pub latency_ms: Option<i64>,
    /// Epoch milliseconds at creation.
    pub created_at: i64,
}

impl CommandRecord {
    /// Build a fresh pending command.
    pub fn pending(device_id: &str, idempotency_key: &str, verb: &str, now_ms: i64) -> Self {
        Self {
            id: uuid::Uuid::new_v4().to_string(),
            device_id: device_id.to_owned(),
            idempotency_key: idempotency_key.to_owned(),
            verb: verb.to_owned(),
            status: CommandStatus::Pending,
            result: None,
            latency_ms: None,
            created_at: now_ms,
        }
    }
}

impl Store {
    /// Persist a new command. Fails with [`StoreError::DuplicateKey`] when
    /// the `(device_id, idempotency_key)` pair already exists.
    pub async fn create_command(&self, command: &CommandRecord) -> Result<(), StoreError> {
        let result = sqlx::query(
            "INSERT INTO commands
                (id, device_id, idempotency_key, verb, status, result, latency_ms, created_at)
             VALUES (?, ?, ?, ?, ?, ?, ?, ?)",
        )
        .bind(&command.id)
        .bind(&command.device_id)
        .bind(&command.idempotency_key)
        .bind(&command.verb)
        .bind(command.status)
        .bind(&command.result)
        .bind(command.latency_ms)
        .bind(command.created_at)
        .execute(self.pool())
        .await;

        match result {
            Ok(_) => Ok(()),
            Err(e) if e.as_database_error().is_some_and(|d| d.is_unique_violation()) => {
                Err(StoreError::DuplicateKey)
            }
            Err(e) => Err(e.into()),
        }
    }

    pub async fn command(&self, id: &str) -> Result<Option<CommandRecord>, StoreError> {
        let row = sqlx::query_as::<_, CommandRecord>("SELECT * FROM commands WHERE id = ?")
            .bind(id)
            .fetch_optional(self.pool())
            .await?;
        Ok(row)
    }

    /// Look up the command for an idempotency pair.
    pub async fn find_command(
        &self,
        device_id: &str,
        idempotency_key: &str,
    ) -> Result<Option<CommandRecord>, StoreError> {
        let row = sqlx::query_as::<_, CommandRecord>(
            "SELECT * FROM commands WHERE device_id = ? AND idempotency_key = ?",
        )
        .bind(device_id)
        .bind(idempotency_key)
        .fetch_optional(self.pool())
        .await?;
        Ok(row)
    }

    /// Transition a command out of `pending`. Returns the updated record
    /// when this call won the transition, `None` when the command is
    /// unknown or already terminal. Latency is only written if not
    /// already set.
    pub async fn finish_command(
        &self,
        id: &str,
        status: CommandStatus,
        result: &str,
        latency_ms: Option<i64>,
    ) -> Result<Option<CommandRecord>, StoreError> {
        let updated = sqlx::query(
            "UPDATE commands
             SET status = ?, result = ?, latency_ms = COALESCE(latency_ms, ?)
             WHERE id = ? AND status = ?",
        )
        .bind(status)
        .bind(result)
        .bind(latency_ms)
        .bind(id)
        .bind(CommandStatus::Pending)
        .execute(self.pool())
        .await?;

        if updated.rows_affected() == 1 {
            self.command(id).await
        } else {
            Ok(None)
        }
    }

    /// Pending commands created at or before `cutoff_ms`, for the startup
    /// reconciliation scan.
    pub async fn stale_pending_commands(
        &self,
        cutoff_ms: i64,
    ) -> Result<Vec<CommandRecord>, StoreError> {
        let rows = sqlx::query_as::<_, CommandRecord>(
            "SELECT * FROM commands WHERE status = ? AND created_at <= ? ORDER BY created_at",
        )
        .bind(CommandStatus::Pending)
        .bind(cutoff_ms)
        .fetch_all(self.pool())
        .await?;
        Ok(rows)
    }
}

#[cfg(test)]
#[path = "command_tests.rs"]
mod tests;
