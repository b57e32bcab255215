//! Batch registry: the id → session map and the engine's entry points.
//!
//! The registry is constructed once at startup and handed to the HTTP layer
//! as a value. The map lock and a session's own lock are never held at the
//! same time: lookups clone the session `Arc` and release the map first.

use std::collections::HashMap;
use std::sync::Arc;
use std::time::Duration;

use chemaudit_core::batch::{BatchItem, BatchSnapshot};
use chemaudit_core::error::{AdmissionError, SessionError};
use chemaudit_core::payload::{sanitize_name, StructurePayload, SubmittedStructure};
use chemaudit_core::query::{ResultPage, ResultQuery};
use chemaudit_core::statistics::BatchStatistics;
use chemaudit_core::types::{BatchId, Timestamp};
use chemaudit_core::validation::{ValidationOptions, Validator};
use serde::Serialize;
use tokio::sync::RwLock;
use tokio_util::task::TaskTracker;
use validator::Validate;

use crate::admission::AdmissionControl;
use crate::config::EngineConfig;
use crate::session::BatchSession;
use crate::subscription::Subscription;
use crate::worker::WorkerPool;

/// Sessions removed by one retention sweep.
#[derive(Debug, Clone, Default, PartialEq, Eq, Serialize)]
pub struct SweepReport {
    /// Terminal sessions past the retention window.
    pub expired: Vec<BatchId>,
    /// Live sessions nobody observed within the grace period.
    pub abandoned: Vec<BatchId>,
}

impl SweepReport {
    pub fn is_empty(&self) -> bool {
        self.expired.is_empty() && self.abandoned.is_empty()
    }
}

pub struct BatchRegistry {
    sessions: RwLock<HashMap<BatchId, Arc<BatchSession>>>,
    config: EngineConfig,
    pool: WorkerPool,
    admission: Arc<AdmissionControl>,
    tracker: TaskTracker,
}

impl BatchRegistry {
    pub fn new(config: EngineConfig, validator: Arc<dyn Validator>) -> Self {
        let tracker = TaskTracker::new();
        let pool = WorkerPool::new(config.worker_pool_size, validator, tracker.clone());
        let admission = Arc::new(AdmissionControl::new(config.queue_capacity));

        tracing::info!(
            workers = pool.size(),
            queue_capacity = config.queue_capacity,
            max_batch_size = config.max_batch_size,
            "Batch registry initialised",
        );

        Self {
            sessions: RwLock::new(HashMap::new()),
            config,
            pool,
            admission,
            tracker,
        }
    }

    pub fn config(&self) -> &EngineConfig {
        &self.config
    }

    pub fn pool(&self) -> &WorkerPool {
        &self.pool
    }

    pub fn admission(&self) -> &AdmissionControl {
        &self.admission
    }

    /// Number of sessions currently held.
    pub async fn len(&self) -> usize {
        self.sessions.read().await.len()
    }

    pub async fn is_empty(&self) -> bool {
        self.sessions.read().await.is_empty()
    }

    // -----------------------------------------------------------------------
    // Submission
    // -----------------------------------------------------------------------

    /// Admit a batch and start dispatching it.
    ///
    /// Either every structure is admitted or none is; the returned snapshot
    /// is taken before dispatch starts, so it is always `Queued`.
    pub async fn submit(
        &self,
        structures: Vec<SubmittedStructure>,
        options: ValidationOptions,
    ) -> Result<BatchSnapshot, AdmissionError> {
        if structures.is_empty() {
            return Err(AdmissionError::Empty);
        }
        if structures.len() > self.config.max_batch_size {
            return Err(AdmissionError::TooLarge {
                requested: structures.len(),
                limit: self.config.max_batch_size,
            });
        }
        options
            .validate()
            .map_err(|e| AdmissionError::InvalidOptions(e.to_string()))?;

        let items = structures
            .into_iter()
            .enumerate()
            .map(|(index, structure)| {
                let payload = StructurePayload::parse(&structure.payload).map_err(|e| {
                    AdmissionError::InvalidPayload {
                        index,
                        reason: e.to_string(),
                    }
                })?;
                Ok(BatchItem {
                    index,
                    payload,
                    name: structure.name.as_deref().and_then(sanitize_name),
                })
            })
            .collect::<Result<Vec<_>, AdmissionError>>()?;

        let total = items.len();
        self.admission.try_reserve(total)?;

        let id = BatchId::new();
        let item_timeout = self.config.resolve_item_timeout(options.timeout_ms);
        let session = Arc::new(BatchSession::new(
            id,
            items,
            options,
            item_timeout,
            self.config.channel_capacity,
            Arc::clone(&self.admission),
        ));
        let snapshot = session.snapshot();

        self.sessions.write().await.insert(id, Arc::clone(&session));

        let pool = self.pool.clone();
        self.tracker.spawn(async move {
            pool.run_batch(session).await;
        });

        tracing::info!(
            batch_id = %id,
            total,
            item_timeout_ms = u64::try_from(item_timeout.as_millis()).unwrap_or(u64::MAX),
            "Batch submitted",
        );
        Ok(snapshot)
    }

    // -----------------------------------------------------------------------
    // Queries
    // -----------------------------------------------------------------------

    /// Look up a session without marking it observed.
    pub async fn session(&self, id: BatchId) -> Result<Arc<BatchSession>, SessionError> {
        self.sessions
            .read()
            .await
            .get(&id)
            .cloned()
            .ok_or(SessionError::NotFound(id))
    }

    async fn observed(&self, id: BatchId) -> Result<Arc<BatchSession>, SessionError> {
        let session = self.session(id).await?;
        session.mark_observed();
        Ok(session)
    }

    pub async fn get(&self, id: BatchId) -> Result<BatchSnapshot, SessionError> {
        Ok(self.observed(id).await?.snapshot())
    }

    pub async fn statistics(&self, id: BatchId) -> Result<BatchStatistics, SessionError> {
        Ok(self.observed(id).await?.statistics(chrono::Utc::now()))
    }

    pub async fn results(
        &self,
        id: BatchId,
        query: &ResultQuery,
    ) -> Result<ResultPage, SessionError> {
        Ok(self.observed(id).await?.results(query))
    }

    /// Request cooperative cancellation. Idempotent.
    pub async fn cancel(&self, id: BatchId) -> Result<BatchSnapshot, SessionError> {
        Ok(self.session(id).await?.request_cancel())
    }

    pub async fn subscribe(&self, id: BatchId) -> Result<Subscription, SessionError> {
        Ok(self.session(id).await?.subscribe())
    }

    // -----------------------------------------------------------------------
    // Retention
    // -----------------------------------------------------------------------

    /// Evict expired and abandoned sessions.
    ///
    /// A terminal session is evicted once `retention` has passed since it
    /// finished and no subscriber is attached. A live session that nobody
    /// subscribed to or queried within `abandon_grace` is cancelled and
    /// evicted.
    pub async fn sweep(&self, now: Timestamp) -> SweepReport {
        let sessions: Vec<Arc<BatchSession>> =
            self.sessions.read().await.values().cloned().collect();

        let mut report = SweepReport::default();
        for session in sessions {
            if session.is_terminal() {
                let expired = session
                    .completed_at()
                    .is_some_and(|done| elapsed(done, now) >= self.config.retention);
                if expired && session.subscriber_count() == 0 {
                    report.expired.push(session.id());
                }
            } else if !session.was_observed()
                && elapsed(session.created_at(), now) >= self.config.abandon_grace
            {
                session.request_cancel();
                report.abandoned.push(session.id());
            }
        }

        if report.is_empty() {
            return report;
        }

        let mut map = self.sessions.write().await;
        for id in report.expired.iter().chain(report.abandoned.iter()) {
            let in_use = map.get(id).is_some_and(|s| s.subscriber_count() > 0);
            if !in_use {
                map.remove(id);
            }
        }
        drop(map);

        tracing::info!(
            expired = report.expired.len(),
            abandoned = report.abandoned.len(),
            "Batch retention sweep evicted sessions",
        );
        report
    }

    // -----------------------------------------------------------------------
    // Teardown
    // -----------------------------------------------------------------------

    /// Cancel every live session and wait for in-flight work to drain.
    ///
    /// Returns `false` when `timeout` elapsed first.
    pub async fn shutdown(&self, timeout: Duration) -> bool {
        let sessions: Vec<Arc<BatchSession>> =
            self.sessions.read().await.values().cloned().collect();

        let mut cancelled = 0;
        for session in &sessions {
            if !session.is_terminal() {
                session.request_cancel();
                cancelled += 1;
            }
        }

        self.tracker.close();
        let drained = tokio::time::timeout(timeout, self.tracker.wait())
            .await
            .is_ok();
        self.pool.close();

        if drained {
            tracing::info!(cancelled, "Batch registry drained");
        } else {
            tracing::warn!(
                cancelled,
                in_flight = self.tracker.len(),
                timeout_secs = timeout.as_secs(),
                "Batch registry shutdown timed out",
            );
        }
        drained
    }
}

fn elapsed(since: Timestamp, now: Timestamp) -> Duration {
    (now - since).to_std().unwrap_or(Duration::ZERO)
}

impl std::fmt::Debug for BatchRegistry {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.debug_struct("BatchRegistry")
            .field("config", &self.config)
            .field("pool", &self.pool)
            .finish_non_exhaustive()
    }
}
