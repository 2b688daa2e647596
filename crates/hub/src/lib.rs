// SPDX-License-Identifier: BUSL-1.1
// Copyright (c) 2026 Alfred Jean LLC

//! Fleet-hub: command-dispatch and device-liveness control plane for
//! fleets of remote edge devices.

pub mod breaker;
pub mod chaos;
pub mod config;
pub mod error;
pub mod events;
pub mod hub;
pub mod metrics;
pub mod monitor;
pub mod retry;
pub mod router;
pub mod state;
pub mod store;
pub mod transport;

use std::sync::Arc;

use tokio::net::TcpListener;
use tokio::sync::mpsc;
use tokio_util::sync::CancellationToken;

use crate::chaos::ChaosKnobs;
use crate::config::HubConfig;
use crate::state::HubState;
use crate::store::Store;
use crate::transport::build_router;

/// Run the hub until shutdown.
pub async fn run(config: HubConfig) -> anyhow::Result<()> {
    let chaos = ChaosKnobs::from_config(config.chaos_latency.as_deref(), config.chaos_drop_rate)?;
    if chaos.latency_range().is_some() || chaos.drop_rate() > 0.0 {
        tracing::warn!(
            latency = ?chaos.latency_range(),
            drop_rate = chaos.drop_rate(),
            "chaos knobs active"
        );
    }

    let store = Store::connect(&config.db_url).await?;
    let shutdown = CancellationToken::new();
    let (queue_tx, queue_rx) = mpsc::channel(config.queue_capacity);
    let addr = format!("{}:{}", config.host, config.port);

    let state = Arc::new(HubState::new(config, store, chaos, queue_tx, shutdown.clone()));

    // Reconciliations lost to a previous crash.
    router::reconcile_stale(&state).await?;

    router::spawn_worker(Arc::clone(&state), queue_rx);
    monitor::spawn_monitor(Arc::clone(&state));

    {
        let shutdown = shutdown.clone();
        tokio::spawn(async move {
            if tokio::signal::ctrl_c().await.is_ok() {
                tracing::info!("shutdown signal received");
                shutdown.cancel();
            }
        });
    }

    tracing::info!("fleet-hub listening on {addr}");
    let app = build_router(state);
    let listener = TcpListener::bind(&addr).await?;
    axum::serve(listener, app).with_graceful_shutdown(shutdown.cancelled_owned()).await?;

    Ok(())
}
