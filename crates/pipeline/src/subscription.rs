//! Progress subscription over one session.
//!
//! A subscription yields a snapshot delta first, then live deltas in
//! sequence order, and ends after the terminal delta. A subscriber that
//! falls behind the channel buffer is resynchronised with a fresh
//! snapshot instead of seeing a gap.

use std::sync::Arc;

use chemaudit_core::batch::ProgressDelta;
use chemaudit_core::types::BatchId;
use futures::Stream;
use tokio::sync::broadcast::{self, error::RecvError};

use crate::session::BatchSession;

pub struct Subscription {
    session: Arc<BatchSession>,
    rx: broadcast::Receiver<ProgressDelta>,
    /// Snapshot not yet handed to the caller.
    pending: Option<ProgressDelta>,
    last_seq: u64,
    finished: bool,
}

impl Subscription {
    pub(crate) fn open(session: Arc<BatchSession>) -> Self {
        let (snapshot, rx) = session.snapshot_and_receiver();
        session.add_subscriber();

        tracing::debug!(
            batch_id = %session.id(),
            seq = snapshot.seq,
            subscribers = session.subscriber_count(),
            "Subscriber attached",
        );

        Self {
            last_seq: snapshot.seq,
            pending: Some(snapshot),
            rx,
            session,
            finished: false,
        }
    }

    pub fn batch_id(&self) -> BatchId {
        self.session.id()
    }

    /// Next delta, or `None` once the terminal delta has been delivered.
    pub async fn next(&mut self) -> Option<ProgressDelta> {
        if self.finished {
            return None;
        }
        if let Some(snapshot) = self.pending.take() {
            return Some(self.deliver(snapshot));
        }

        loop {
            match self.rx.recv().await {
                Ok(delta) if delta.seq <= self.last_seq => continue,
                Ok(delta) => return Some(self.deliver(delta)),
                Err(RecvError::Lagged(skipped)) => {
                    tracing::warn!(
                        batch_id = %self.session.id(),
                        skipped,
                        "Subscriber lagged, resending snapshot",
                    );
                    let (snapshot, rx) = self.session.snapshot_and_receiver();
                    self.rx = rx;
                    return Some(self.deliver(snapshot));
                }
                Err(RecvError::Closed) => {
                    self.finished = true;
                    return None;
                }
            }
        }
    }

    fn deliver(&mut self, delta: ProgressDelta) -> ProgressDelta {
        self.last_seq = delta.seq;
        if delta.is_terminal() {
            self.finished = true;
        }
        delta
    }

    /// Adapt into a `Stream` of deltas.
    pub fn into_stream(self) -> impl Stream<Item = ProgressDelta> + Send {
        futures::stream::unfold(self, |mut sub| async move {
            let delta = sub.next().await?;
            Some((delta, sub))
        })
    }
}

impl Drop for Subscription {
    fn drop(&mut self) {
        self.session.remove_subscriber();
        tracing::debug!(batch_id = %self.session.id(), "Subscriber detached");
    }
}

impl std::fmt::Debug for Subscription {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.debug_struct("Subscription")
            .field("batch_id", &self.session.id())
            .field("last_seq", &self.last_seq)
            .field("finished", &self.finished)
            .finish()
    }
}

#[cfg(test)]
mod tests {
    use std::time::Duration;

    use chemaudit_core::batch::{BatchItem, BatchState, DeltaKind, ItemResult};
    use chemaudit_core::payload::StructurePayload;
    use chemaudit_core::validation::{ValidationOptions, ValidationRecord};
    use futures::StreamExt;

    use super::*;
    use crate::admission::AdmissionControl;
    use crate::aggregator;
    use crate::session::tests::session;

    fn ok(index: usize) -> ItemResult {
        ItemResult::ok(index, ValidationRecord::new(90))
    }

    #[tokio::test]
    async fn snapshot_comes_first_then_live_deltas() {
        let session = Arc::new(session(2));
        aggregator::mark_running(&session);
        aggregator::report(&session, ok(0)).unwrap();

        let mut sub = session.subscribe();
        let first = sub.next().await.unwrap();
        assert_eq!(first.kind, DeltaKind::Snapshot);
        assert_eq!(first.counters.completed, 1);

        aggregator::report(&session, ok(1)).unwrap();
        let item = sub.next().await.unwrap();
        assert_eq!(item.kind, DeltaKind::Item);
        assert_eq!(item.item_index, Some(1));

        let terminal = sub.next().await.unwrap();
        assert_eq!(terminal.state, BatchState::Completed);
        assert!(sub.next().await.is_none());
    }

    #[tokio::test]
    async fn terminal_session_yields_only_snapshot() {
        let session = Arc::new(session(1));
        aggregator::mark_running(&session);
        aggregator::report(&session, ok(0)).unwrap();

        let deltas: Vec<_> = session.subscribe().into_stream().collect().await;
        assert_eq!(deltas.len(), 1);
        assert_eq!(deltas[0].kind, DeltaKind::Snapshot);
        assert_eq!(deltas[0].state, BatchState::Completed);
    }

    #[tokio::test]
    async fn lagging_subscriber_is_resynchronised() {
        let items = (0..10)
            .map(|index| BatchItem {
                index,
                payload: StructurePayload::parse("C").unwrap(),
                name: None,
            })
            .collect();
        let session = Arc::new(BatchSession::new(
            BatchId::new(),
            items,
            ValidationOptions::default(),
            Duration::from_secs(1),
            2,
            Arc::new(AdmissionControl::new(10)),
        ));

        let mut sub = session.subscribe();
        assert_eq!(sub.next().await.unwrap().kind, DeltaKind::Snapshot);

        aggregator::mark_running(&session);
        for index in 0..6 {
            aggregator::report(&session, ok(index)).unwrap();
        }

        let resync = sub.next().await.unwrap();
        assert_eq!(resync.kind, DeltaKind::Snapshot);
        assert_eq!(resync.counters.completed, 6);

        aggregator::report(&session, ok(6)).unwrap();
        let next = sub.next().await.unwrap();
        assert_eq!(next.seq, resync.seq + 1);
        assert_eq!(next.item_index, Some(6));
    }

    #[tokio::test]
    async fn dropping_subscription_releases_slot() {
        let session = Arc::new(session(1));
        let sub = session.subscribe();
        assert_eq!(session.subscriber_count(), 1);

        drop(sub);
        assert_eq!(session.subscriber_count(), 0);
        assert!(session.was_observed());
    }
}
