// SPDX-License-Identifier: BUSL-1.1
// Copyright (c) 2026 Alfred Jean LLC

//! Command router: idempotent submission onto a bounded in-flight queue,
//! the single-consumer worker that dispatches via the device hub, and
//! the per-command response-timeout reconciler.

use std::sync::atomic::AtomicU64;
use std::sync::Arc;

use tokio::sync::mpsc;

use crate::events::HubEvent;
use crate::metrics::Metrics;
use crate::retry::{self, RetryOutcome};
use crate::state::{epoch_ms, HubState};
use crate::store::{CommandRecord, CommandStatus, StoreError};

/// Maximum accepted command verb length.
pub const MAX_VERB_LEN: usize = 200;

/// Maximum accepted idempotency key length.
pub const MAX_KEY_LEN: usize = 100;

/// Entry on the in-flight queue. The worker re-reads durable state on
/// dequeue, so this only carries what dispatch needs.
#[derive(Debug, Clone)]
pub struct QueuedCommand {
    pub id: String,
    pub device_id: String,
    pub verb: String,
}

/// Successful submission: the durable command id, and whether it was
/// already known under this idempotency key.
#[derive(Debug, Clone)]
pub struct Accepted {
    pub command_id: String,
    pub duplicate: bool,
}

/// Why a submission was not accepted.
#[derive(Debug, thiserror::Error)]
pub enum SubmitError {
    #[error("{0}")]
    Invalid(&'static str),
    /// The bounded queue is full; nothing was persisted. The caller may
    /// retry later with the same key.
    #[error("command queue full")]
    QueueFull,
    #[error(transparent)]
    Store(#[from] StoreError),
}

/// Submit a command. Deduplicates on `(device_id, idempotency_key)`,
/// reserves a queue slot before persisting, and only makes the command
/// visible to the worker once it is durable.
pub async fn enqueue(
    state: &HubState,
    device_id: &str,
    idempotency_key: &str,
    verb: &str,
) -> Result<Accepted, SubmitError> {
    if device_id.is_empty() {
        return Err(SubmitError::Invalid("device id must not be empty"));
    }
    if idempotency_key.is_empty() {
        return Err(SubmitError::Invalid("idempotency key must not be empty"));
    }
    if idempotency_key.len() > MAX_KEY_LEN {
        return Err(SubmitError::Invalid("idempotency key exceeds 100 characters"));
    }
    if verb.is_empty() {
        return Err(SubmitError::Invalid("command must not be empty"));
    }
    if verb.len() > MAX_VERB_LEN {
        return Err(SubmitError::Invalid("command exceeds 200 characters"));
    }

    if let Some(existing) = state.store.find_command(device_id, idempotency_key).await? {
        Metrics::incr(&state.metrics.commands_deduplicated);
        return Ok(Accepted { command_id: existing.id, duplicate: true });
    }

    // Reserve the queue slot before persisting: a full queue is a pure
    // backpressure signal and must leave no durable trace.
    let permit = match state.queue_tx.try_reserve() {
        Ok(permit) => permit,
        Err(_) => {
            Metrics::incr(&state.metrics.commands_rejected_queue_full);
            return Err(SubmitError::QueueFull);
        }
    };

    let command = CommandRecord::pending(device_id, idempotency_key, verb, epoch_ms());
    match state.store.create_command(&command).await {
        Ok(()) => {}
        Err(StoreError::DuplicateKey) => {
            // Two submissions raced past the lookup; surface the winner's id.
            drop(permit);
            let existing = state
                .store
                .find_command(device_id, idempotency_key)
                .await?
                .ok_or(StoreError::DuplicateKey)?;
            Metrics::incr(&state.metrics.commands_deduplicated);
            return Ok(Accepted { command_id: existing.id, duplicate: true });
        }
        Err(e) => return Err(e.into()),
    }

    permit.send(QueuedCommand {
        id: command.id.clone(),
        device_id: device_id.to_owned(),
        verb: verb.to_owned(),
    });
    Metrics::incr(&state.metrics.commands_submitted);
    tracing::debug!(device_id, command_id = %command.id, "command accepted");
    Ok(Accepted { command_id: command.id, duplicate: false })
}

/// Spawn the single queue consumer.
pub fn spawn_worker(state: Arc<HubState>, queue_rx: mpsc::Receiver<QueuedCommand>) {
    tokio::spawn(run_worker(state, queue_rx));
}

async fn run_worker(state: Arc<HubState>, mut queue_rx: mpsc::Receiver<QueuedCommand>) {
    loop {
        let queued = tokio::select! {
            _ = state.shutdown.cancelled() => break,
            next = queue_rx.recv() => match next {
                Some(queued) => queued,
                None => break,
            },
        };
        dispatch_one(&state, queued).await;
    }
    tracing::debug!("command worker stopped");
}

/// Dispatch a dequeued command: breaker gate, chaos knobs, retried send,
/// then either a scheduled reconciliation or an immediate failure.
async fn dispatch_one(state: &Arc<HubState>, queued: QueuedCommand) {
    // A raced duplicate or the reconciler may have finished it already.
    match state.store.command(&queued.id).await {
        Ok(Some(command)) if command.status == CommandStatus::Pending => {}
        Ok(_) => return,
        Err(e) => {
            tracing::error!(command_id = %queued.id, err = %e, "pre-dispatch lookup failed");
            return;
        }
    }

    let breaker = state.breakers.get(&queued.device_id).await;
    if breaker.is_open() {
        tracing::warn!(
            device_id = %queued.device_id,
            command_id = %queued.id,
            "circuit open, dispatch skipped"
        );
        Metrics::incr(&state.metrics.dispatches_breaker_skipped);
        schedule_reconcile(Arc::clone(state), queued.id, "circuit open");
        return;
    }

    if state.chaos.should_drop() {
        tracing::warn!(command_id = %queued.id, "chaos: dispatch dropped");
        Metrics::incr(&state.metrics.dispatches_chaos_dropped);
        schedule_reconcile(Arc::clone(state), queued.id, "dropped");
        return;
    }
    if let Some(delay) = state.chaos.sample_latency() {
        tokio::select! {
            _ = state.shutdown.cancelled() => return,
            _ = tokio::time::sleep(delay) => {}
        }
    }

    let started = tokio::time::Instant::now();
    let outcome = retry::execute(&state.shutdown, || {
        state.devices.send_command(&queued.device_id, &queued.id, &queued.verb)
    })
    .await;

    match outcome {
        RetryOutcome::Success => {
            breaker.record_success();
            Metrics::incr(&state.metrics.commands_dispatched);
            schedule_reconcile(Arc::clone(state), queued.id, "timeout");
        }
        RetryOutcome::Exhausted => {
            breaker.record_failure();
            let latency = started.elapsed().as_millis() as i64;
            finish_and_publish(
                state,
                &queued.id,
                CommandStatus::Failed,
                "transport send failed after retries",
                Some(latency),
                &state.metrics.commands_failed,
            )
            .await;
        }
        RetryOutcome::Cancelled => {}
    }
}

/// Schedule the response-timeout reconciliation for a command. `reason`
/// becomes the terminal result if the command is still pending when the
/// deadline fires.
pub fn schedule_reconcile(state: Arc<HubState>, command_id: String, reason: &'static str) {
    tokio::spawn(async move {
        tokio::select! {
            _ = state.shutdown.cancelled() => return,
            _ = tokio::time::sleep(state.config.response_timeout()) => {}
        }
        reconcile(&state, &command_id, reason).await;
    });
}

async fn reconcile(state: &HubState, command_id: &str, reason: &'static str) {
    let command = match state.store.command(command_id).await {
        Ok(Some(command)) => command,
        Ok(None) => return,
        Err(e) => {
            tracing::warn!(command_id, err = %e, "reconcile lookup failed");
            return;
        }
    };
    if command.status != CommandStatus::Pending {
        return;
    }
    let latency = epoch_ms().saturating_sub(command.created_at);
    if finish_and_publish(
        state,
        command_id,
        CommandStatus::Failed,
        reason,
        Some(latency),
        &state.metrics.commands_timed_out,
    )
    .await
    {
        tracing::warn!(command_id, reason, "pending command reconciled as failed");
    }
}

/// Fail pending commands older than the response timeout. Runs once at
/// startup to cover reconciliations lost to a crash.
pub async fn reconcile_stale(state: &HubState) -> Result<(), StoreError> {
    let cutoff = epoch_ms() - state.config.response_timeout_ms as i64;
    let stale = state.store.stale_pending_commands(cutoff).await?;
    for command in stale {
        let latency = epoch_ms().saturating_sub(command.created_at);
        finish_and_publish(
            state,
            &command.id,
            CommandStatus::Failed,
            "timeout",
            Some(latency),
            &state.metrics.commands_timed_out,
        )
        .await;
    }
    Ok(())
}

/// Write a terminal state and publish `command_completed` iff this call
/// won the pending→terminal transition.
pub(crate) async fn finish_and_publish(
    state: &HubState,
    command_id: &str,
    status: CommandStatus,
    result: &str,
    latency_ms: Option<i64>,
    counter: &AtomicU64,
) -> bool {
    match state.store.finish_command(command_id, status, result, latency_ms).await {
        Ok(Some(done)) => {
            Metrics::incr(counter);
            state.operators.publish(HubEvent::CommandCompleted { command: done });
            true
        }
        Ok(None) => false,
        Err(e) => {
            tracing::error!(command_id, err = %e, "failed to persist terminal command state");
            false
        }
    }
}

#[cfg(test)]
#[path = "router_tests.rs"]
mod tests;
