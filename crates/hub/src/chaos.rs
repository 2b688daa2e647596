// SPDX-License-Identifier: BUSL-1.1
// Copyright (c) 2026 Alfred Jean LLC

//! Chaos knobs for resilience testing: injected dispatch latency and a
//! drop rate. Loaded once at startup, read-only afterwards, consumed
//! only by the command worker.

use std::time::Duration;

use rand::Rng;

#[derive(Debug, Clone, Default)]
pub struct ChaosKnobs {
    latency: Option<(Duration, Duration)>,
    drop_rate: f64,
}

impl ChaosKnobs {
    /// Build from raw configuration values. Malformed values are fatal:
    /// a control plane with half-applied chaos settings is worse than one
    /// that refuses to start.
    pub fn from_config(latency: Option<&str>, drop_rate: f64) -> anyhow::Result<Self> {
        if !(0.0..=1.0).contains(&drop_rate) {
            anyhow::bail!("CHAOS_DROP_RATE must be in [0,1], got {drop_rate}");
        }
        let latency = latency.map(parse_latency_range).transpose()?;
        Ok(Self { latency, drop_rate })
    }

    pub fn disabled() -> Self {
        Self::default()
    }

    /// Roll the dice for one dispatch.
    pub fn should_drop(&self) -> bool {
        self.drop_rate > 0.0 && rand::rng().random::<f64>() < self.drop_rate
    }

    /// Uniformly sampled injected latency, if configured.
    pub fn sample_latency(&self) -> Option<Duration> {
        let (min, max) = self.latency?;
        if max <= min {
            return Some(min);
        }
        let span = max - min;
        Some(min + span.mul_f64(rand::rng().random::<f64>()))
    }

    pub fn latency_range(&self) -> Option<(Duration, Duration)> {
        self.latency
    }

    pub fn drop_rate(&self) -> f64 {
        self.drop_rate
    }
}

/// Parse `CHAOS_LATENCY` in the form `<min>-<max>` (seconds, decimals
/// allowed), e.g. `1.0-2.0`.
fn parse_latency_range(s: &str) -> anyhow::Result<(Duration, Duration)> {
    let (min, max) = s
        .split_once('-')
        .ok_or_else(|| anyhow::anyhow!("CHAOS_LATENCY must look like `<min>-<max>`, got `{s}`"))?;
    let min: f64 = min.trim().parse().map_err(|_| {
        anyhow::anyhow!("CHAOS_LATENCY min is not a number: `{min}`")
    })?;
    let max: f64 = max.trim().parse().map_err(|_| {
        anyhow::anyhow!("CHAOS_LATENCY max is not a number: `{max}`")
    })?;
    if min < 0.0 || max < 0.0 {
        anyhow::bail!("CHAOS_LATENCY bounds must be non-negative");
    }
    if max < min {
        anyhow::bail!("CHAOS_LATENCY max must be >= min");
    }
    Ok((Duration::from_secs_f64(min), Duration::from_secs_f64(max)))
}

#[cfg(test)]
#[path = "chaos_tests.rs"]
mod tests;
