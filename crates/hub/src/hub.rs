// SPDX-License-Identifier: BUSL-1.1
// Copyright (c) 2026 Alfred Jean LLC

//! Live device connections, grouped by device id.
//!
//! The hub is deliberately thin over the transport: `send_command` only
//! guarantees that the frame was handed to every live connection in the
//! group. Completion is reconciled by the router's response timeout and
//! the device's result frame.

use std::collections::HashMap;
use std::sync::atomic::{AtomicU64, Ordering};
use std::sync::Arc;

use serde::Serialize;
use tokio::sync::{mpsc, RwLock};

/// Identifies one live connection within the hub.
pub type ConnId = u64;

/// Frame pushed from the hub to a device.
#[derive(Debug, Clone, Serialize)]
#[serde(tag = "type", rename_all = "snake_case")]
enum OutboundFrame<'a> {
    Command { device_id: &'a str, command_id: &'a str, verb: &'a str },
}

/// Connection groups keyed by device id.
#[derive(Debug, Default)]
pub struct DeviceHub {
    groups: RwLock<HashMap<String, HashMap<ConnId, mpsc::UnboundedSender<Arc<str>>>>>,
    next_id: AtomicU64,
}

impl DeviceHub {
    pub fn new() -> Self {
        Self::default()
    }

    /// Allocate a connection id for a freshly accepted socket.
    pub fn next_conn_id(&self) -> ConnId {
        self.next_id.fetch_add(1, Ordering::Relaxed)
    }

    /// Associate a live connection with a device group.
    pub async fn attach(
        &self,
        device_id: &str,
        conn_id: ConnId,
        tx: mpsc::UnboundedSender<Arc<str>>,
    ) {
        let mut groups = self.groups.write().await;
        groups.entry(device_id.to_owned()).or_default().insert(conn_id, tx);
    }

    /// Drop a connection from its group; empty groups are removed.
    pub async fn detach(&self, device_id: &str, conn_id: ConnId) {
        let mut groups = self.groups.write().await;
        if let Some(group) = groups.get_mut(device_id) {
            group.remove(&conn_id);
            if group.is_empty() {
                groups.remove(device_id);
            }
        }
    }

    /// Deliver a command frame to every connection in the device group.
    /// Returns true iff the frame left the process on at least one
    /// connection; it does not wait for device execution.
    pub async fn send_command(&self, device_id: &str, command_id: &str, verb: &str) -> bool {
        let frame = OutboundFrame::Command { device_id, command_id, verb };
        let Ok(json) = serde_json::to_string(&frame) else {
            return false;
        };
        let shared: Arc<str> = Arc::from(json.as_str());

        let groups = self.groups.read().await;
        let Some(group) = groups.get(device_id) else {
            return false;
        };
        let mut delivered = false;
        for tx in group.values() {
            if tx.send(Arc::clone(&shared)).is_ok() {
                delivered = true;
            }
        }
        delivered
    }

    /// Number of live connections for a device.
    pub async fn connection_count(&self, device_id: &str) -> usize {
        self.groups.read().await.get(device_id).map(HashMap::len).unwrap_or(0)
    }
}

#[cfg(test)]
#[path = "hub_tests.rs"]
mod tests;
