//! Progress aggregator: the only code that mutates a session's state.
//!
//! Every function takes the session lock, applies one transition, and
//! publishes the resulting delta before releasing the lock. Subscribers
//! take their snapshot under the same lock, which keeps snapshot plus
//! live deltas free of gaps and duplicates.

use chemaudit_core::batch::{
    BatchSnapshot, BatchState, DeltaKind, ItemOutcome, ItemResult, ItemStatus, ProgressDelta,
};
use chemaudit_core::error::InvariantViolation;

use crate::session::{BatchSession, SessionState};

// ---------------------------------------------------------------------------
// Transitions
// ---------------------------------------------------------------------------

/// Move a queued session to `Running` on its first dequeue.
///
/// Returns `false` when the session already left `Queued` or cancellation
/// was requested; a cancelled session never starts.
pub fn mark_running(session: &BatchSession) -> bool {
    let mut state = session.state.lock();
    if state.state != BatchState::Queued || state.cancel_requested {
        return false;
    }

    state.state = BatchState::Running;
    state.started_at = Some(chrono::Utc::now());
    publish(session, &mut state, DeltaKind::State, None, None);

    tracing::info!(batch_id = %session.id(), total = session.total(), "Batch running");
    true
}

/// Mark one item as handed to a worker.
pub fn mark_dispatched(session: &BatchSession, index: usize) {
    let mut state = session.state.lock();
    if let Some(status) = state.statuses.get_mut(index) {
        if *status == ItemStatus::Pending {
            *status = ItemStatus::Running;
            tracing::debug!(batch_id = %session.id(), index, "Item dispatched");
        }
    }
}

/// Record one worker result.
///
/// Returns the published item delta, or `None` when the session had
/// already failed and the late result was dropped. A duplicate, an
/// out-of-range index or a result for a cancelled item forces the session
/// into `Failed` and is returned as the error.
pub fn report(
    session: &BatchSession,
    result: ItemResult,
) -> Result<Option<ProgressDelta>, InvariantViolation> {
    let mut state = session.state.lock();
    let index = result.index;

    if state.state.is_terminal() {
        tracing::debug!(
            batch_id = %session.id(),
            index,
            state = state.state.as_str(),
            "Dropping result for terminal batch",
        );
        return Ok(None);
    }

    let total = state.counters.total;
    let violation = match state.statuses.get(index) {
        None => Some(InvariantViolation::IndexOutOfRange { index, total }),
        Some(ItemStatus::Succeeded | ItemStatus::Failed) => {
            Some(InvariantViolation::DuplicateResult { index })
        }
        Some(ItemStatus::Cancelled) => Some(InvariantViolation::ReportAfterCancel { index }),
        Some(ItemStatus::Pending | ItemStatus::Running) => None,
    };
    if let Some(violation) = violation {
        fail_locked(session, &mut state, violation.clone());
        return Err(violation);
    }

    let outcome = result.into_outcome();
    let mut counters = state.counters;
    counters.completed += 1;
    match outcome.status() {
        ItemStatus::Succeeded => counters.succeeded += 1,
        _ => counters.failed += 1,
    }
    if !counters.is_consistent() {
        let violation = InvariantViolation::CounterOverflow {
            completed: counters.completed,
            cancelled: counters.cancelled,
            total,
        };
        fail_locked(session, &mut state, violation.clone());
        return Err(violation);
    }

    state.counters = counters;
    state.statuses[index] = outcome.status();
    state.outcomes[index] = Some(outcome.clone());

    tracing::debug!(
        batch_id = %session.id(),
        index,
        status = outcome.status().as_str(),
        completed = counters.completed,
        total,
        "Item completed",
    );

    let delta = publish(session, &mut state, DeltaKind::Item, Some(index), Some(outcome));
    session.admission.release(1);
    finish_if_settled(session, &mut state);
    Ok(Some(delta))
}

/// Mark never-dequeued items as cancelled.
pub fn cancel_remaining(session: &BatchSession, indices: &[usize]) {
    if indices.is_empty() {
        return;
    }

    let mut state = session.state.lock();
    if state.state.is_terminal() {
        return;
    }

    let mut cancelled = 0;
    for &index in indices {
        if state.statuses.get(index) == Some(&ItemStatus::Pending) {
            state.statuses[index] = ItemStatus::Cancelled;
            state.outcomes[index] = Some(ItemOutcome::Cancelled);
            cancelled += 1;
        }
    }
    if cancelled == 0 {
        return;
    }

    state.counters.cancelled += cancelled;
    session.admission.release(cancelled);
    publish(session, &mut state, DeltaKind::State, None, None);

    tracing::info!(batch_id = %session.id(), cancelled, "Queued items cancelled");
    finish_if_settled(session, &mut state);
}

/// Request cooperative cancellation. Idempotent.
///
/// Already-terminal sessions and repeated requests leave the state
/// untouched; every call returns the current snapshot.
pub fn request_cancel(session: &BatchSession) -> BatchSnapshot {
    let mut state = session.state.lock();
    if !state.state.is_terminal() && !state.cancel_requested {
        state.cancel_requested = true;
        publish(session, &mut state, DeltaKind::State, None, None);
        session.trigger_cancel();

        tracing::info!(
            batch_id = %session.id(),
            completed = state.counters.completed,
            total = state.counters.total,
            "Batch cancellation requested",
        );
    }
    session.snapshot_locked(&state)
}

/// Force a session into `Failed` after an invariant violation.
#[cfg(test)]
pub(crate) fn fail_session(session: &BatchSession, violation: InvariantViolation) {
    let mut state = session.state.lock();
    fail_locked(session, &mut state, violation);
}

// ---------------------------------------------------------------------------
// Helpers (caller holds the session lock)
// ---------------------------------------------------------------------------

fn publish(
    session: &BatchSession,
    state: &mut SessionState,
    kind: DeltaKind,
    item_index: Option<usize>,
    outcome: Option<ItemOutcome>,
) -> ProgressDelta {
    state.seq += 1;
    let delta = state.delta(session.id(), kind, item_index, outcome);
    session.channel.publish(delta.clone());
    delta
}

fn finish_if_settled(session: &BatchSession, state: &mut SessionState) {
    let counters = state.counters;
    if state.state.is_terminal() || counters.settled() < counters.total {
        return;
    }

    state.state = if counters.completed == counters.total && !state.cancel_requested {
        BatchState::Completed
    } else {
        BatchState::Cancelled
    };
    state.completed_at = Some(chrono::Utc::now());
    publish(session, state, DeltaKind::State, None, None);

    tracing::info!(
        batch_id = %session.id(),
        state = state.state.as_str(),
        succeeded = counters.succeeded,
        failed = counters.failed,
        cancelled = counters.cancelled,
        "Batch finished",
    );
}

fn fail_locked(session: &BatchSession, state: &mut SessionState, violation: InvariantViolation) {
    if state.state.is_terminal() {
        return;
    }

    let unsettled = state.counters.total - state.counters.settled();
    for index in 0..state.statuses.len() {
        if state.statuses[index] == ItemStatus::Pending {
            state.statuses[index] = ItemStatus::Cancelled;
            state.outcomes[index] = Some(ItemOutcome::Cancelled);
            state.counters.cancelled += 1;
        }
    }

    tracing::error!(
        batch_id = %session.id(),
        violation = %violation,
        "Invariant violation, failing batch",
    );

    state.state = BatchState::Failed;
    state.failure = Some(violation);
    state.completed_at = Some(chrono::Utc::now());
    publish(session, state, DeltaKind::State, None, None);

    session.admission.release(unsettled);
    session.trigger_cancel();
}

// ---------------------------------------------------------------------------
// Tests
// ---------------------------------------------------------------------------
