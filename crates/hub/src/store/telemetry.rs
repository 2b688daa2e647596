// SPDX-License-Identifier: BUSL-1.1
// Copyright (c) 2026 Alfred Jean LLC

//! Rolling per-device telemetry window. Older samples are pruned on
//! ingestion so a device never holds more than [`TELEMETRY_WINDOW`] rows.

use serde::{Deserialize, Serialize};

use super::{Store, StoreError};

/// Samples retained per device.
pub const TELEMETRY_WINDOW: i64 = 50;

/// One opaque telemetry sample.
#[derive(Debug, Clone, Serialize, Deserialize, sqlx::FromRow)]
pub struct TelemetrySample {
    pub id: String,
    pub device_id: String,
    /// Epoch milliseconds at ingestion.
    pub ts: i64,
    pub payload: String,
}

impl Store {
    /// Insert a sample and prune the device's window in one transaction.
    pub async fn append_telemetry(
        &self,
        device_id: &str,
        payload: &str,
        ts: i64,
    ) -> Result<TelemetrySample, StoreError> {
        let sample = TelemetrySample {
            id: uuid::Uuid::new_v4().to_string(),
            device_id: device_id.to_owned(),
            ts,
            payload: payload.to_owned(),
        };

        let mut tx = self.pool().begin().await?;
        sqlx::query("INSERT INTO telemetry (id, device_id, ts, payload) VALUES (?, ?, ?, ?)")
            .bind(&sample.id)
            .bind(&sample.device_id)
            .bind(sample.ts)
            .bind(&sample.payload)
            .execute(&mut *tx)
            .await?;
        sqlx::query(
            "DELETE FROM telemetry
             WHERE device_id = ?
               AND id NOT IN (
                   SELECT id FROM telemetry
                   WHERE device_id = ?
                   ORDER BY ts DESC, id DESC
                   LIMIT ?
               )",
        )
        .bind(device_id)
        .bind(device_id)
        .bind(TELEMETRY_WINDOW)
        .execute(&mut *tx)
        .await?;
        tx.commit().await?;

        Ok(sample)
    }

    /// Newest samples first, at most `limit`.
    pub async fn recent_telemetry(
        &self,
        device_id: &str,
        limit: i64,
    ) -> Result<Vec<TelemetrySample>, StoreError> {
        let rows = sqlx::query_as::<_, TelemetrySample>(
            "SELECT * FROM telemetry WHERE device_id = ? ORDER BY ts DESC, id DESC LIMIT ?",
        )
        .bind(device_id)
        .bind(limit)
        .fetch_all(self.pool())
        .await?;
        Ok(rows)
    }

    /// Durable sample count for a device.
    pub async fn telemetry_count(&self, device_id: &str) -> Result<i64, StoreError> {
        let (count,): (i64,) =
            sqlx::query_as("SELECT COUNT(*) FROM telemetry WHERE device_id = ?")
                .bind(device_id)
                .fetch_one(self.pool())
                .await?;
        Ok(count)
    }
}

#[cfg(test)]
#[path = "telemetry_tests.rs"]
mod tests;
