// SPDX-License-Identifier: BUSL-1.1
// Copyright (c) 2026 Alfred Jean LLC

//! Process-wide numeric counters backing `GET /api/v1/metrics`.

use std::sync::atomic::{AtomicU64, Ordering};

use serde::Serialize;

/// Monotonic counters. Exactly one of `commands_completed`,
/// `commands_failed`, `commands_timed_out` is bumped per terminal
/// transition.
#[derive(Debug, Default)]
pub struct Metrics {
    pub commands_submitted: AtomicU64,
    pub commands_deduplicated: AtomicU64,
    pub commands_rejected_queue_full: AtomicU64,
    pub commands_dispatched: AtomicU64,
    pub commands_completed: AtomicU64,
    pub commands_failed: AtomicU64,
    pub commands_timed_out: AtomicU64,
    pub dispatches_chaos_dropped: AtomicU64,
    pub dispatches_breaker_skipped: AtomicU64,
    pub telemetry_frames: AtomicU64,
}

impl Metrics {
    pub fn new() -> Self {
        Self::default()
    }

    pub fn incr(counter: &AtomicU64) {
        counter.fetch_add(1, Ordering::Relaxed);
    }

    pub fn snapshot(&self) -> MetricsSnapshot {
        MetricsSnapshot {
            commands_submitted: self.commands_submitted.load(Ordering::Relaxed),
            commands_deduplicated: self.commands_deduplicated.load(Ordering::Relaxed),
            commands_rejected_queue_full: self
                .commands_rejected_queue_full
                .load(Ordering::Relaxed),
            commands_dispatched: self.commands_dispatched.load(Ordering::Relaxed),
            commands_completed: self.commands_completed.load(Ordering::Relaxed),
            commands_failed: self.commands_failed.load(Ordering::Relaxed),
            commands_timed_out: self.commands_timed_out.load(Ordering::Relaxed),
            dispatches_chaos_dropped: self.dispatches_chaos_dropped.load(Ordering::Relaxed),
            dispatches_breaker_skipped: self
                .dispatches_breaker_skipped
                .load(Ordering::Relaxed),
            telemetry_frames: self.telemetry_frames.load(Ordering::Relaxed),
        }
    }
}

/// Point-in-time copy of every counter.
#[derive(Debug, Clone, Serialize)]
pub struct MetricsSnapshot {
    pub commands_submitted: u64,
    pub commands_deduplicated: u64,
    pub commands_rejected_queue_full: u64,
    pub commands_dispatched: u64,
    pub commands_completed: u64,
    pub commands_failed: u64,
    pub commands_timed_out: u64,
    pub dispatches_chaos_dropped: u64,
    pub dispatches_breaker_skipped: u64,
    pub telemetry_frames: u64,
}
