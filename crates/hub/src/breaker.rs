// SPDX-License-Identifier: BUSL-1.1
// Copyright (c) 2026 Alfred Jean LLC

//! Per-device circuit breakers. Consecutive dispatch failures open the
//! breaker; after the open window elapses one probe dispatch is allowed
//! through (half-open) until a success closes it again.

use std::collections::HashMap;
use std::sync::{Arc, Mutex};
use std::time::{Duration, Instant};

use tokio::sync::RwLock;

/// Consecutive failures required to open the breaker.
pub const FAILURE_THRESHOLD: u32 = 5;

/// How long an opened breaker rejects dispatches before going half-open.
pub const OPEN_WINDOW: Duration = Duration::from_secs(10);

/// Observable breaker state.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum BreakerState {
    Closed,
    Open,
    HalfOpen,
}

#[derive(Debug, Default)]
struct BreakerInner {
    failures: u32,
    opened_at: Option<Instant>,
}

/// Circuit breaker for a single device.
#[derive(Debug)]
pub struct CircuitBreaker {
    threshold: u32,
    open_window: Duration,
    inner: Mutex<BreakerInner>,
}

impl CircuitBreaker {
    pub fn new() -> Self {
        Self::with_settings(FAILURE_THRESHOLD, OPEN_WINDOW)
    }

    pub fn with_settings(threshold: u32, open_window: Duration) -> Self {
        Self { threshold, open_window, inner: Mutex::new(BreakerInner::default()) }
    }

    /// Reset the failure count; the breaker closes.
    pub fn record_success(&self) {
        if let Ok(mut inner) = self.inner.lock() {
            inner.failures = 0;
            inner.opened_at = None;
        }
    }

    /// Count a failure. At or past the threshold the open window restarts,
    /// so a failed half-open probe re-opens the breaker.
    pub fn record_failure(&self) {
        if let Ok(mut inner) = self.inner.lock() {
            inner.failures = inner.failures.saturating_add(1);
            if inner.failures >= self.threshold {
                inner.opened_at = Some(Instant::now());
            }
        }
    }

    pub fn state(&self) -> BreakerState {
        let Ok(inner) = self.inner.lock() else {
            return BreakerState::Closed;
        };
        if inner.failures < self.threshold {
            return BreakerState::Closed;
        }
        match inner.opened_at {
            Some(opened_at) if opened_at.elapsed() < self.open_window => BreakerState::Open,
            _ => BreakerState::HalfOpen,
        }
    }

    /// Whether dispatch must be skipped right now. Half-open lets the
    /// probe through.
    pub fn is_open(&self) -> bool {
        self.state() == BreakerState::Open
    }

    pub fn failures(&self) -> u32 {
        self.inner.lock().map(|inner| inner.failures).unwrap_or(0)
    }
}

impl Default for CircuitBreaker {
    fn default() -> Self {
        Self::new()
    }
}

/// Registry of breakers keyed by device id. `get` creates on first use;
/// concurrent calls for the same device return the same instance.
#[derive(Debug, Default)]
pub struct BreakerRegistry {
    breakers: RwLock<HashMap<String, Arc<CircuitBreaker>>>,
}

impl BreakerRegistry {
    pub fn new() -> Self {
        Self::default()
    }

    pub async fn get(&self, device_id: &str) -> Arc<CircuitBreaker> {
        {
            let guard = self.breakers.read().await;
            if let Some(breaker) = guard.get(device_id) {
                return Arc::clone(breaker);
            }
        }

        let mut guard = self.breakers.write().await;
        // Double-check after acquiring the write lock.
        if let Some(breaker) = guard.get(device_id) {
            return Arc::clone(breaker);
        }
        let breaker = Arc::new(CircuitBreaker::new());
        guard.insert(device_id.to_owned(), Arc::clone(&breaker));
        breaker
    }
}

#[cfg(test)]
#[path = "breaker_tests.rs"]
mod tests;
