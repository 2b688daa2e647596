// SPDX-License-Identifier: BUSL-1.1
// Copyright (c) 2026 Alfred Jean LLC

//! Liveness monitor: periodic sweep that flips device status by
//! last-seen age and broadcasts the transitions.

use std::sync::Arc;

use crate::events::HubEvent;
use crate::state::{epoch_ms, HubState};
use crate::store::DeviceStatus;

/// Spawn the background sweep task.
pub fn spawn_monitor(state: Arc<HubState>) {
    let interval = state.config.sweep_interval();

    tokio::spawn(async move {
        let mut timer = tokio::time::interval(interval);
        timer.set_missed_tick_behavior(tokio::time::MissedTickBehavior::Skip);

        loop {
            tokio::select! {
                _ = state.shutdown.cancelled() => break,
                _ = timer.tick() => {}
            }

            match sweep(&state).await {
                Ok(0) => {}
                Ok(transitions) => {
                    tracing::info!(transitions, "liveness sweep applied status transitions");
                }
                Err(e) => tracing::warn!(err = %e, "liveness sweep failed"),
            }
        }
        tracing::debug!("liveness monitor stopped");
    });
}

/// One sweep: devices not seen within the offline threshold go offline,
/// recently-seen devices go online. Writes are batched; one event per
/// actual transition. Returns the transition count.
pub async fn sweep(state: &HubState) -> Result<usize, crate::store::StoreError> {
    let now = epoch_ms();
    let threshold = state.config.offline_threshold_ms();

    let devices = state.store.all_devices().await?;
    let mut transitions = Vec::new();
    for device in devices {
        let Some(last_seen) = device.last_seen else {
            continue;
        };
        let next = if now.saturating_sub(last_seen) > threshold {
            DeviceStatus::Offline
        } else {
            DeviceStatus::Online
        };
        if next != device.status {
            transitions.push((device.id, next));
        }
    }

    state.store.apply_status_transitions(&transitions).await?;

    let count = transitions.len();
    for (device_id, status) in transitions {
        tracing::info!(device_id = %device_id, status = ?status, "device status changed");
        state.operators.publish(HubEvent::DeviceStatusChanged { device_id, status });
    }
    Ok(count)
}

#[cfg(test)]
#[path = "monitor_tests.rs"]
mod tests;
