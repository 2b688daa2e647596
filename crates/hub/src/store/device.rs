// SPDX-License-Identifier: BUSL-1.1
// Copyright (c) 2026 Alfred Jean LLC

//! Device records: point lookups, keyset-paginated listing, liveness
//! and optimistic-concurrency updates.

use serde::{Deserialize, Serialize};
use sqlx::types::Json;
use sqlx::QueryBuilder;

use super::{Store, StoreError};

/// What a device physically is.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize, sqlx::Type)]
#[serde(rename_all = "lowercase")]
#[sqlx(rename_all = "lowercase")]
pub enum DeviceKind {
    Display,
    Codec,
    Switcher,
    Sensor,
}

/// How the edge side reaches the device.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize, sqlx::Type)]
#[serde(rename_all = "kebab-case")]
#[sqlx(rename_all = "kebab-case")]
pub enum TransportKind {
    LineOrientedTcp,
    HttpJson,
    EdgePush,
}

/// Reachability as judged by the liveness monitor.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize, sqlx::Type)]
#[serde(rename_all = "lowercase")]
#[sqlx(rename_all = "lowercase")]
pub enum DeviceStatus {
    Online,
    Offline,
}

/// A provisioned device.
#[derive(Debug, Clone, Serialize, Deserialize, sqlx::FromRow)]
pub struct DeviceRecord {
    pub id: String,
    pub name: String,
    pub kind: DeviceKind,
    pub transport: TransportKind,
    pub capabilities: Json<Vec<String>>,
    pub status: DeviceStatus,
    /// Epoch milliseconds of the last inbound frame or heartbeat.
    pub last_seen: Option<i64>,
    pub firmware: String,
    pub location: String,
    /// Optimistic-concurrency token, bumped on every update.
    pub version: i64,
}

/// Filters for the device listing.
#[derive(Debug, Clone, Default)]
pub struct DeviceFilter {
    pub status: Option<DeviceStatus>,
    pub kind: Option<DeviceKind>,
    /// Case-insensitive name substring.
    pub name: Option<String>,
    /// Keyset cursor: only devices with id strictly greater.
    pub after: Option<String>,
    pub limit: i64,
}

/// One page of devices plus the cursor for the next page.
#[derive(Debug, Clone, Serialize)]
pub struct DevicePage {
    pub items: Vec<DeviceRecord>,
    pub next: Option<String>,
}

/// Mutable fields of the device update path.
#[derive(Debug, Clone, Default, Deserialize)]
pub struct DevicePatch {
    pub name: Option<String>,
    pub location: Option<String>,
    pub firmware: Option<String>,
}

/// Outcome of an optimistic-concurrency device update.
#[derive(Debug)]
pub enum DeviceUpdate {
    Updated(DeviceRecord),
    VersionMismatch,
    NotFound,
}

impl Store {
    /// Insert a freshly provisioned device.
    pub async fn create_device(&self, device: &DeviceRecord) -> Result<(), StoreError> {
        sqlx::query(
            "INSERT INTO devices
                (id, name, kind, transport, capabilities, status, last_seen,
                 firmware, location, version)
             VALUES (?, ?, ?, ?, ?, ?, ?, ?, ?, ?)",
        )
        .bind(&device.id)
        .bind(&device.name)
        .bind(device.kind)
        .bind(device.transport)
        .bind(&device.capabilities)
        .bind(device.status)
        .bind(device.last_seen)
        .bind(&device.firmware)
        .bind(&device.location)
        .bind(device.version)
        .execute(self.pool())
        .await?;
        Ok(())
    }

    pub async fn device(&self, id: &str) -> Result<Option<DeviceRecord>, StoreError> {
        let row = sqlx::query_as::<_, DeviceRecord>("SELECT * FROM devices WHERE id = ?")
            .bind(id)
            .fetch_optional(self.pool())
            .await?;
        Ok(row)
    }

    pub async fn device_count(&self) -> Result<i64, StoreError> {
        let (count,): (i64,) = sqlx::query_as("SELECT COUNT(*) FROM devices")
            .fetch_one(self.pool())
            .await?;
        Ok(count)
    }

    /// All devices, for the liveness sweep.
    pub async fn all_devices(&self) -> Result<Vec<DeviceRecord>, StoreError> {
        let rows = sqlx::query_as::<_, DeviceRecord>("SELECT * FROM devices ORDER BY id")
            .fetch_all(self.pool())
            .await?;
        Ok(rows)
    }

    /// Keyset-paginated device listing ordered by id.
    pub async fn list_devices(&self, filter: &DeviceFilter) -> Result<DevicePage, StoreError> {
        let mut qb = QueryBuilder::new("SELECT * FROM devices WHERE 1 = 1");
        if let Some(status) = filter.status {
            qb.push(" AND status = ").push_bind(status);
        }
        if let Some(kind) = filter.kind {
            qb.push(" AND kind = ").push_bind(kind);
        }
        if let Some(ref name) = filter.name {
            qb.push(" AND name LIKE ").push_bind(format!("%{name}%"));
        }
        if let Some(ref after) = filter.after {
            qb.push(" AND id > ").push_bind(after.clone());
        }
        // Fetch one extra row to decide whether a next page exists.
        qb.push(" ORDER BY id LIMIT ").push_bind(filter.limit + 1);

        let mut items: Vec<DeviceRecord> =
            qb.build_query_as().fetch_all(self.pool()).await?;
        let next = if items.len() as i64 > filter.limit {
            items.truncate(filter.limit as usize);
            items.last().map(|d| d.id.clone())
        } else {
            None
        };
        Ok(DevicePage { items, next })
    }

    /// Refresh last-seen from an inbound frame. Returns false for an
    /// unknown device.
    pub async fn touch_device(&self, id: &str, now_ms: i64) -> Result<bool, StoreError> {
        let result = sqlx::query("UPDATE devices SET last_seen = ? WHERE id = ?")
            .bind(now_ms)
            .bind(id)
            .execute(self.pool())
            .await?;
        Ok(result.rows_affected() == 1)
    }

    /// Explicit heartbeat: last-seen=now, status=online. Returns the
    /// previous status, or `None` for an unknown device.
    pub async fn heartbeat_device(
        &self,
        id: &str,
        now_ms: i64,
    ) -> Result<Option<DeviceStatus>, StoreError> {
        let mut tx = self.pool().begin().await?;
        let prev: Option<(DeviceStatus,)> =
            sqlx::query_as("SELECT status FROM devices WHERE id = ?")
                .bind(id)
                .fetch_optional(&mut *tx)
                .await?;
        let Some((prev,)) = prev else {
            return Ok(None);
        };
        sqlx::query("UPDATE devices SET last_seen = ?, status = ? WHERE id = ?")
            .bind(now_ms)
            .bind(DeviceStatus::Online)
            .bind(id)
            .execute(&mut *tx)
            .await?;
        tx.commit().await?;
        Ok(Some(prev))
    }

    /// Apply a batch of sweep transitions in one transaction.
    pub async fn apply_status_transitions(
        &self,
        transitions: &[(String, DeviceStatus)],
    ) -> Result<(), StoreError> {
        if transitions.is_empty() {
            return Ok(());
        }
        let mut tx = self.pool().begin().await?;
        for (id, status) in transitions {
            sqlx::query("UPDATE devices SET status = ? WHERE id = ?")
                .bind(*status)
                .bind(id)
                .execute(&mut *tx)
                .await?;
        }
        tx.commit().await?;
        Ok(())
    }

    /// Update mutable device fields guarded by the concurrency token.
    pub async fn update_device(
        &self,
        id: &str,
        patch: &DevicePatch,
        expected_version: i64,
    ) -> Result<DeviceUpdate, StoreError> {
        let result = sqlx::query(
            "UPDATE devices SET
                name = COALESCE(?, name),
                location = COALESCE(?, location),
                firmware = COALESCE(?, firmware),
                version = version + 1
             WHERE id = ? AND version = ?",
        )
        .bind(&patch.name)
        .bind(&patch.location)
        .bind(&patch.firmware)
        .bind(id)
        .bind(expected_version)
        .execute(self.pool())
        .await?;

        if result.rows_affected() == 1 {
            match self.device(id).await? {
                Some(updated) => Ok(DeviceUpdate::Updated(updated)),
                None => Ok(DeviceUpdate::NotFound),
            }
        } else if self.device(id).await?.is_some() {
            Ok(DeviceUpdate::VersionMismatch)
        } else {
            Ok(DeviceUpdate::NotFound)
        }
    }
}

#[cfg(test)]
#[path = "device_tests.rs"]
mod tests;
