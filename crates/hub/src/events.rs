// SPDX-License-Identifier: BUSL-1.1
// Copyright (c) 2026 Alfred Jean LLC

//! Operator-facing event types and the broadcast hub that fans them out
//! to `/ws/operator` clients.
//!
//! Delivery is best-effort: a slow subscriber lags and skips, it never
//! blocks publishers. Each event carries the fields needed to stand
//! alone; no inter-event ordering is promised.

use serde::{Deserialize, Serialize};
use tokio::sync::broadcast;

use crate::store::{CommandRecord, DeviceStatus, TelemetrySample};

/// Events fanned out to all subscribed operator sessions.
#[derive(Debug, Clone, Serialize, Deserialize)]
#[serde(tag = "type", rename_all = "snake_case")]
pub enum HubEvent {
    /// A device crossed the liveness threshold or heartbeated back.
    DeviceStatusChanged { device_id: String, status: DeviceStatus },
    /// A command reached a terminal state.
    CommandCompleted { command: CommandRecord },
    /// A device pushed a telemetry sample.
    TelemetryReceived { device_id: String, sample: TelemetrySample },
}

impl HubEvent {
    /// The device this event concerns.
    pub fn device_id(&self) -> &str {
        match self {
            Self::DeviceStatusChanged { device_id, .. }
            | Self::TelemetryReceived { device_id, .. } => device_id,
            Self::CommandCompleted { command } => &command.device_id,
        }
    }
}

/// Fan-out hub for operator sessions.
#[derive(Debug)]
pub struct OperatorHub {
    event_tx: broadcast::Sender<HubEvent>,
}

impl OperatorHub {
    pub fn new() -> Self {
        let (event_tx, _) = broadcast::channel(256);
        Self { event_tx }
    }

    /// Subscribe an operator session.
    pub fn subscribe(&self) -> broadcast::Receiver<HubEvent> {
        self.event_tx.subscribe()
    }

    /// Publish to all current subscribers. A send error only means
    /// nobody is listening.
    pub fn publish(&self, event: HubEvent) {
        let _ = self.event_tx.send(event);
    }

    pub fn subscriber_count(&self) -> usize {
        self.event_tx.receiver_count()
    }
}

impl Default for OperatorHub {
    fn default() -> Self {
        Self::new()
    }
}

#[cfg(test)]
#[path = "events_tests.rs"]
mod tests;
