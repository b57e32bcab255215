//! Batch session: one admitted batch and everything it owns.
//!
//! The session holds the immutable item list, its mutex-guarded progress
//! state, its work queue, its progress channel and its cancellation token.
//! State is only mutated through [`crate::aggregator`].

use std::sync::atomic::{AtomicBool, AtomicUsize, Ordering};
use std::sync::Arc;
use std::time::Duration;

use chemaudit_core::batch::{
    BatchCounters, BatchItem, BatchSnapshot, BatchState, DeltaKind, ItemOutcome, ItemStatus,
    ItemView, ProgressDelta,
};
use chemaudit_core::error::InvariantViolation;
use chemaudit_core::query::{self, ResultPage, ResultQuery};
use chemaudit_core::statistics::BatchStatistics;
use chemaudit_core::types::{BatchId, Timestamp};
use chemaudit_core::validation::ValidationOptions;
use chemaudit_events::ProgressChannel;
use parking_lot::Mutex;
use tokio::sync::broadcast;
use tokio_util::sync::CancellationToken;

use crate::admission::AdmissionControl;
use crate::aggregator;
use crate::queue::WorkQueue;
use crate::subscription::Subscription;

// ---------------------------------------------------------------------------
// Mutable state
// ---------------------------------------------------------------------------

/// Progress state guarded by the session mutex.
#[derive(Debug)]
pub(crate) struct SessionState {
    pub statuses: Vec<ItemStatus>,
    pub outcomes: Vec<Option<ItemOutcome>>,
    pub counters: BatchCounters,
    pub state: BatchState,
    pub cancel_requested: bool,
    /// Sequence number of the last published delta.
    pub seq: u64,
    pub started_at: Option<Timestamp>,
    pub completed_at: Option<Timestamp>,
    pub failure: Option<InvariantViolation>,
}

impl SessionState {
    fn new(total: usize) -> Self {
        Self {
            statuses: vec![ItemStatus::Pending; total],
            outcomes: vec![None; total],
            counters: BatchCounters::new(total),
            state: BatchState::Queued,
            cancel_requested: false,
            seq: 0,
            started_at: None,
            completed_at: None,
            failure: None,
        }
    }

    /// Build a delta reflecting the current state.
    pub fn delta(
        &self,
        batch_id: BatchId,
        kind: DeltaKind,
        item_index: Option<usize>,
        outcome: Option<ItemOutcome>,
    ) -> ProgressDelta {
        ProgressDelta {
            batch_id,
            seq: self.seq,
            kind,
            item_index,
            outcome,
            counters: self.counters,
            state: self.state,
            cancel_requested: self.cancel_requested,
        }
    }
}

// ---------------------------------------------------------------------------
// BatchSession
// ---------------------------------------------------------------------------

/// One admitted batch.
#[derive(Debug)]
pub struct BatchSession {
    id: BatchId,
    items: Vec<BatchItem>,
    options: ValidationOptions,
    item_timeout: Duration,
    created_at: Timestamp,
    pub(crate) state: Mutex<SessionState>,
    queue: Mutex<WorkQueue>,
    pub(crate) channel: ProgressChannel,
    cancel: CancellationToken,
    subscribers: AtomicUsize,
    observed: AtomicBool,
    pub(crate) admission: Arc<AdmissionControl>,
}

impl BatchSession {
    pub(crate) fn new(
        id: BatchId,
        items: Vec<BatchItem>,
        options: ValidationOptions,
        item_timeout: Duration,
        channel_capacity: usize,
        admission: Arc<AdmissionControl>,
    ) -> Self {
        let total = items.len();
        Self {
            id,
            items,
            options,
            item_timeout,
            created_at: chrono::Utc::now(),
            state: Mutex::new(SessionState::new(total)),
            queue: Mutex::new(WorkQueue::new(total)),
            channel: ProgressChannel::new(channel_capacity),
            cancel: CancellationToken::new(),
            subscribers: AtomicUsize::new(0),
            observed: AtomicBool::new(false),
            admission,
        }
    }

    pub fn id(&self) -> BatchId {
        self.id
    }

    pub fn total(&self) -> usize {
        self.items.len()
    }

    pub fn items(&self) -> &[BatchItem] {
        &self.items
    }

    pub fn options(&self) -> &ValidationOptions {
        &self.options
    }

    /// Timeout applied to each item of this batch.
    pub fn item_timeout(&self) -> Duration {
        self.item_timeout
    }

    pub fn created_at(&self) -> Timestamp {
        self.created_at
    }

    pub fn state(&self) -> BatchState {
        self.state.lock().state
    }

    pub fn is_terminal(&self) -> bool {
        self.state().is_terminal()
    }

    pub fn completed_at(&self) -> Option<Timestamp> {
        self.state.lock().completed_at
    }

    pub fn cancel_requested(&self) -> bool {
        self.state.lock().cancel_requested
    }

    /// Token cancelled once cancellation is requested or the session fails.
    pub fn cancellation(&self) -> CancellationToken {
        self.cancel.clone()
    }

    /// Current counters and per-item results.
    pub fn snapshot(&self) -> BatchSnapshot {
        let state = self.state.lock();
        self.snapshot_locked(&state)
    }

    pub(crate) fn snapshot_locked(&self, state: &SessionState) -> BatchSnapshot {
        let results = self
            .items
            .iter()
            .filter(|item| state.statuses[item.index].is_terminal())
            .map(|item| self.view_locked(state, item))
            .collect();

        BatchSnapshot {
            id: self.id,
            state: state.state,
            cancel_requested: state.cancel_requested,
            counters: state.counters,
            seq: state.seq,
            created_at: self.created_at,
            started_at: state.started_at,
            completed_at: state.completed_at,
            results,
            failure_reason: state.failure.as_ref().map(ToString::to_string),
        }
    }

    /// Take a snapshot delta and a receiver atomically.
    ///
    /// Deltas are published under the same lock, so the receiver sees
    /// exactly the deltas with a higher `seq` than the snapshot.
    pub(crate) fn snapshot_and_receiver(
        &self,
    ) -> (ProgressDelta, broadcast::Receiver<ProgressDelta>) {
        let state = self.state.lock();
        let rx = self.channel.subscribe();
        let snapshot = state.delta(self.id, DeltaKind::Snapshot, None, None);
        (snapshot, rx)
    }

    /// Open a progress subscription on this session.
    pub fn subscribe(self: &Arc<Self>) -> Subscription {
        Subscription::open(Arc::clone(self))
    }

    /// Request cooperative cancellation. Idempotent.
    pub fn request_cancel(&self) -> BatchSnapshot {
        aggregator::request_cancel(self)
    }

    /// Every item with its current status, in index order.
    pub fn item_views(&self) -> Vec<ItemView> {
        let state = self.state.lock();
        self.items
            .iter()
            .map(|item| self.view_locked(&state, item))
            .collect()
    }

    fn view_locked(&self, state: &SessionState, item: &BatchItem) -> ItemView {
        ItemView {
            index: item.index,
            payload: item.payload.as_str().to_string(),
            name: item.name.clone(),
            status: state.statuses[item.index],
            outcome: state.outcomes[item.index].clone(),
        }
    }

    pub fn results(&self, query: &ResultQuery) -> ResultPage {
        query::paginate(self.item_views(), query)
    }

    pub fn statistics(&self, now: Timestamp) -> BatchStatistics {
        let state = self.state.lock();
        BatchStatistics::compute(
            state
                .statuses
                .iter()
                .zip(state.outcomes.iter())
                .map(|(status, outcome)| (*status, outcome.as_ref())),
        )
        .with_processing_time(state.started_at, state.completed_at, now)
    }

    // -- work queue --------------------------------------------------------

    pub(crate) fn dequeue(&self) -> Option<usize> {
        self.queue.lock().pop_front()
    }

    pub(crate) fn drain_queue(&self) -> Vec<usize> {
        self.queue.lock().drain_remaining()
    }

    /// Items not yet handed to a worker.
    pub fn queued(&self) -> usize {
        self.queue.lock().len()
    }

    pub(crate) fn trigger_cancel(&self) {
        self.cancel.cancel();
    }

    // -- subscriber accounting ---------------------------------------------

    pub fn subscriber_count(&self) -> usize {
        self.subscribers.load(Ordering::Acquire)
    }

    pub(crate) fn add_subscriber(&self) {
        self.subscribers.fetch_add(1, Ordering::AcqRel);
        self.mark_observed();
    }

    pub(crate) fn remove_subscriber(&self) {
        let _ = self
            .subscribers
            .fetch_update(Ordering::AcqRel, Ordering::Acquire, |n| {
                Some(n.saturating_sub(1))
            });
    }

    /// Record that a client has shown interest in this batch.
    pub fn mark_observed(&self) {
        self.observed.store(true, Ordering::Release);
    }

    /// Whether any client ever subscribed to or queried this batch.
    pub fn was_observed(&self) -> bool {
        self.observed.load(Ordering::Acquire)
    }
}
