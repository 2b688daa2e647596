// SPDX-License-Identifier: BUSL-1.1
// Copyright (c) 2026 Alfred Jean LLC

/// Configuration for the fleet-hub control plane.
#[derive(Debug, Clone, clap::Parser)]
pub struct HubConfig {
    /// Host to bind on.
    #[arg(long, default_value = "127.0.0.1", env = "FLEET_HUB_HOST")]
    pub host: String,

    /// Port to listen on.
    #[arg(long, default_value_t = 9620, env = "FLEET_HUB_PORT")]
    pub port: u16,

    /// Shared secret for the operator API and device transport.
    /// If unset, auth is disabled.
    #[arg(long, env = "FLEET_HUB_API_KEY")]
    pub api_key: Option<String>,

    /// SQLite database URL.
    #[arg(long, default_value = "sqlite://fleet-hub.db?mode=rwc", env = "FLEET_HUB_DB")]
    pub db_url: String,

    /// Capacity of the in-flight command queue. Submissions beyond this
    /// are rejected with a backpressure error.
    #[arg(long, default_value_t = 50, env = "FLEET_HUB_QUEUE_CAPACITY")]
    pub queue_capacity: usize,

    /// Milliseconds a dispatched command may stay pending before the
    /// reconciler fails it.
    #[arg(long, default_value_t = 10_000, env = "FLEET_HUB_RESPONSE_TIMEOUT_MS")]
    pub response_timeout_ms: u64,

    /// Liveness sweep interval in milliseconds.
    #[arg(long, default_value_t = 10_000, env = "FLEET_HUB_SWEEP_INTERVAL_MS")]
    pub sweep_interval_ms: u64,

    /// Milliseconds without an inbound frame before a device is marked offline.
    #[arg(long, default_value_t = 30_000, env = "FLEET_HUB_OFFLINE_AFTER_MS")]
    pub offline_after_ms: u64,

    /// Injected dispatch latency range in seconds, e.g. `1.0-2.0`.
    /// Resilience testing only.
    #[arg(long, env = "CHAOS_LATENCY")]
    pub chaos_latency: Option<String>,

    /// Probability in [0,1] that a dispatch is silently dropped.
    /// Resilience testing only.
    #[arg(long, default_value_t = 0.0, env = "CHAOS_DROP_RATE")]
    pub chaos_drop_rate: f64,
}

impl HubConfig {
    pub fn response_timeout(&self) -> std::time::Duration {
        std::time::Duration::from_millis(self.response_timeout_ms)
    }

    pub fn sweep_interval(&self) -> std::time::Duration {
        std::time::Duration::from_millis(self.sweep_interval_ms)
    }

    pub fn offline_threshold_ms(&self) -> i64 {
        self.offline_after_ms as i64
    }
}
