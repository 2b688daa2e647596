// SPDX-License-Identifier: BUSL-1.1
// Copyright (c) 2026 Alfred Jean LLC

use tokio::sync::mpsc;
use tokio_util::sync::CancellationToken;

use crate::breaker::BreakerRegistry;
use crate::chaos::ChaosKnobs;
use crate::config::HubConfig;
use crate::events::OperatorHub;
use crate::hub::DeviceHub;
use crate::metrics::Metrics;
use crate::router::QueuedCommand;
use crate::store::Store;

/// Shared hub state, wired once at startup.
pub struct HubState {
    pub config: HubConfig,
    pub store: Store,
    pub devices: DeviceHub,
    pub operators: OperatorHub,
    pub breakers: BreakerRegistry,
    pub chaos: ChaosKnobs,
    pub metrics: Metrics,
    /// Producer side of the bounded in-flight queue.
    pub queue_tx: mpsc::Sender<QueuedCommand>,
    pub shutdown: CancellationToken,
}

impl HubState {
    pub fn new(
        config: HubConfig,
        store: Store,
        chaos: ChaosKnobs,
        queue_tx: mpsc::Sender<QueuedCommand>,
        shutdown: CancellationToken,
    ) -> Self {
        Self {
            config,
            store,
            devices: DeviceHub::new(),
            operators: OperatorHub::new(),
            breakers: BreakerRegistry::new(),
            chaos,
            metrics: Metrics::new(),
            queue_tx,
            shutdown,
        }
    }
}

/// Return current epoch millis.
pub fn epoch_ms() -> i64 {
    std::time::SystemTime::now()
        .duration_since(std::time::UNIX_EPOCH)
        .unwrap_or_default()
        .as_millis() as i64
}
