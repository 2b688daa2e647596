// SPDX-License-Identifier: BUSL-1.1
// Copyright (c) 2026 Alfred Jean LLC

//! Bounded-attempt executor with exponential delays plus jitter.
//!
//! The jitter de-correlates retry storms across devices: when a shared
//! link flaps, per-device retries must not land in lockstep.

use std::future::Future;
use std::time::Duration;

use rand::Rng;
use tokio_util::sync::CancellationToken;

/// Base delay after each failed attempt. The array length is the
/// attempt budget.
pub const BASE_DELAYS_MS: [u64; 3] = [100, 300, 700];

/// Upper bound (exclusive) of the uniform jitter added to each delay.
pub const JITTER_MS: u64 = 50;

/// How an execution ended.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum RetryOutcome {
    /// Some attempt reported success.
    Success,
    /// Every attempt failed.
    Exhausted,
    /// The cancellation signal fired during a delay.
    Cancelled,
}

/// Invoke `op` up to three times, sleeping a jittered backoff after each
/// failure. Cancellation during a delay propagates immediately.
pub async fn execute<F, Fut>(cancel: &CancellationToken, mut op: F) -> RetryOutcome
where
    F: FnMut() -> Fut,
    Fut: Future<Output = bool>,
{
    for base_ms in BASE_DELAYS_MS {
        if op().await {
            return RetryOutcome::Success;
        }
        tokio::select! {
            _ = cancel.cancelled() => return RetryOutcome::Cancelled,
            _ = tokio::time::sleep(jittered(base_ms)) => {}
        }
    }
    RetryOutcome::Exhausted
}

/// Base delay plus an independent uniform sample from `[0, JITTER_MS)`.
fn jittered(base_ms: u64) -> Duration {
    Duration::from_millis(base_ms + rand::rng().random_range(0..JITTER_MS))
}

#[cfg(test)]
#[path = "retry_tests.rs"]
mod tests;
