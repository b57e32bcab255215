//! Worker pool and per-batch dispatcher.
//!
//! A single semaphore bounds concurrent validations across every batch.
//! Each batch gets a dispatcher task that pulls indices from its work
//! queue one permit at a time, so batches interleave at item granularity.

use std::sync::Arc;
use std::time::Duration;

use chemaudit_core::batch::{ItemFailure, ItemResult};
use chemaudit_core::validation::Validator;
use tokio::sync::{OwnedSemaphorePermit, Semaphore};
use tokio_util::task::TaskTracker;

use crate::aggregator;
use crate::session::BatchSession;

/// Fixed-size pool of validation slots shared by all batches.
#[derive(Clone)]
pub struct WorkerPool {
    permits: Arc<Semaphore>,
    size: usize,
    validator: Arc<dyn Validator>,
    tracker: TaskTracker,
}

impl WorkerPool {
    pub fn new(size: usize, validator: Arc<dyn Validator>, tracker: TaskTracker) -> Self {
        let size = size.max(1);
        Self {
            permits: Arc::new(Semaphore::new(size)),
            size,
            validator,
            tracker,
        }
    }

    pub fn size(&self) -> usize {
        self.size
    }

    /// Validator calls currently holding a slot, including calls that
    /// already timed out but have not returned.
    pub fn busy(&self) -> usize {
        self.size.saturating_sub(self.permits.available_permits())
    }

    /// Stop handing out permits. Dispatchers waiting for one exit.
    pub fn close(&self) {
        self.permits.close();
    }

    /// Dispatch every item of `session` until the queue is empty or the
    /// session is cancelled.
    ///
    /// Cancellation is checked after each permit is acquired and before
    /// the next dequeue; items still queued at that point are cancelled.
    pub async fn run_batch(&self, session: Arc<BatchSession>) {
        let cancel = session.cancellation();
        let mut dispatched = 0usize;

        loop {
            let permit = tokio::select! {
                biased;
                _ = cancel.cancelled() => break,
                permit = Arc::clone(&self.permits).acquire_owned() => match permit {
                    Ok(permit) => permit,
                    Err(_) => break,
                },
            };

            if cancel.is_cancelled() {
                break;
            }
            let Some(index) = session.dequeue() else {
                break;
            };

            if dispatched == 0 {
                aggregator::mark_running(&session);
            }
            aggregator::mark_dispatched(&session, index);
            dispatched += 1;

            let pool = self.clone();
            let session = Arc::clone(&session);
            self.tracker.spawn(async move {
                pool.process_item(session, index, permit).await;
            });
        }

        let remaining = session.drain_queue();
        if !remaining.is_empty() {
            aggregator::cancel_remaining(&session, &remaining);
        }

        tracing::debug!(
            batch_id = %session.id(),
            dispatched,
            cancelled = remaining.len(),
            "Batch dispatcher finished",
        );
    }

    /// Validate one item on the blocking pool and report its result.
    async fn process_item(
        &self,
        session: Arc<BatchSession>,
        index: usize,
        permit: OwnedSemaphorePermit,
    ) {
        let timeout = session.item_timeout();
        let result = self.validate_item(&session, index, timeout, permit).await;

        match aggregator::report(&session, result) {
            Ok(_) => {}
            Err(violation) => {
                tracing::error!(
                    batch_id = %session.id(),
                    index,
                    error = %violation,
                    "Worker result rejected",
                );
            }
        }
    }

    /// The permit moves into the blocking call and is released only when
    /// the validator returns. A timed-out call keeps its slot, and a
    /// tracked waiter holds shutdown open until it finishes.
    async fn validate_item(
        &self,
        session: &BatchSession,
        index: usize,
        timeout: Duration,
        permit: OwnedSemaphorePermit,
    ) -> ItemResult {
        let payload = session.items()[index].payload.clone();
        let options = session.options().clone();
        let validator = Arc::clone(&self.validator);

        let mut task = tokio::task::spawn_blocking(move || {
            let _permit = permit;
            validator.validate(&payload, &options)
        });

        match tokio::time::timeout(timeout, &mut task).await {
            Ok(Ok(Ok(record))) => ItemResult::ok(index, record),
            Ok(Ok(Err(e))) => {
                tracing::debug!(batch_id = %session.id(), index, error = %e, "Validator rejected item");
                ItemResult::err(index, ItemFailure::validator_error(e.to_string()))
            }
            Ok(Err(join_error)) => {
                let message = if join_error.is_panic() {
                    "validator panicked"
                } else {
                    "validator task was aborted"
                };
                tracing::warn!(batch_id = %session.id(), index, "Validation {message}");
                ItemResult::err(index, ItemFailure::validator_error(message))
            }
            Err(_) => {
                let after_ms = u64::try_from(timeout.as_millis()).unwrap_or(u64::MAX);
                tracing::warn!(batch_id = %session.id(), index, after_ms, "Validation timed out");

                let batch_id = session.id();
                self.tracker.spawn(async move {
                    let _ = task.await;
                    tracing::debug!(%batch_id, index, "Timed-out validator call returned");
                });
                ItemResult::err(index, ItemFailure::timeout(after_ms))
            }
        }
    }
}

impl std::fmt::Debug for WorkerPool {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.debug_struct("WorkerPool")
            .field("size", &self.size)
            .field("busy", &self.busy())
            .field("validator", &self.validator.name())
            .finish()
    }
}
