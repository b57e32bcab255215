//! Per-batch progress channel backed by a `tokio::sync::broadcast` channel.
//!
//! [`ProgressChannel`] fans every [`ProgressDelta`] out to all current
//! subscribers of one batch. Each subscriber receives every delta; nothing
//! is consumed on behalf of another subscriber.

use chemaudit_core::batch::{ProgressDelta, MSG_TYPE_BATCH_PROGRESS};
use serde::Serialize;
use tokio::sync::broadcast;

// ---------------------------------------------------------------------------
// Wire frame
// ---------------------------------------------------------------------------

/// JSON envelope for one delta on a streaming connection.
#[derive(Debug, Serialize)]
pub struct ProgressFrame<'a> {
    #[serde(rename = "type")]
    pub msg_type: &'static str,
    #[serde(flatten)]
    pub delta: &'a ProgressDelta,
}

impl<'a> ProgressFrame<'a> {
    pub fn new(delta: &'a ProgressDelta) -> Self {
        Self {
            msg_type: MSG_TYPE_BATCH_PROGRESS,
            delta,
        }
    }

    /// Serialize to the text payload sent over the socket.
    pub fn to_json(&self) -> serde_json::Result<String> {
        serde_json::to_string(self)
    }
}

// ---------------------------------------------------------------------------
// ProgressChannel
// ---------------------------------------------------------------------------

/// Default buffer capacity for a batch's broadcast channel.
pub const DEFAULT_CAPACITY: usize = 1024;

/// In-process fan-out of one batch's progress deltas.
#[derive(Debug)]
pub struct ProgressChannel {
    sender: broadcast::Sender<ProgressDelta>,
}

impl ProgressChannel {
    /// Create a channel with a specific buffer capacity.
    ///
    /// When the buffer is full, the oldest un-consumed deltas are dropped
    /// and slow receivers will observe a `RecvError::Lagged`.
    pub fn new(capacity: usize) -> Self {
        let (sender, _) = broadcast::channel(capacity.max(1));
        Self { sender }
    }

    /// Publish a delta to all current subscribers.
    ///
    /// With no subscribers the delta is dropped; current state remains
    /// queryable from the session.
    pub fn publish(&self, delta: ProgressDelta) {
        let seq = delta.seq;
        match self.sender.send(delta) {
            Ok(receivers) => tracing::trace!(seq, receivers, "Progress delta published"),
            Err(_) => tracing::trace!(seq, "Progress delta dropped, no subscribers"),
        }
    }

    /// Subscribe to deltas published from now on.
    pub fn subscribe(&self) -> broadcast::Receiver<ProgressDelta> {
        self.sender.subscribe()
    }

    /// Number of live receivers.
    pub fn receiver_count(&self) -> usize {
        self.sender.receiver_count()
    }
}

impl Default for ProgressChannel {
    fn default() -> Self {
        Self::new(DEFAULT_CAPACITY)
    }
}

// ---------------------------------------------------------------------------
// Tests
// ---------------------------------------------------------------------------

#[cfg(test)]
mod tests {
    use chemaudit_core::batch::{BatchCounters, BatchState, DeltaKind};
    use chemaudit_core::types::BatchId;

    use super::*;

    fn delta(seq: u64) -> ProgressDelta {
        ProgressDelta {
            batch_id: BatchId::new(),
            seq,
            kind: DeltaKind::State,
            item_index: None,
            outcome: None,
            counters: BatchCounters::new(3),
            state: BatchState::Running,
            cancel_requested: false,
        }
    }

    #[tokio::test]
    async fn publish_and_receive_single_subscriber() {
        let channel = ProgressChannel::default();
        let mut rx = channel.subscribe();

        channel.publish(delta(1));

        let received = rx.recv().await.expect("should receive the delta");
        assert_eq!(received.seq, 1);
        assert_eq!(received.state, BatchState::Running);
    }

    #[tokio::test]
    async fn multiple_subscribers_receive_same_delta() {
        let channel = ProgressChannel::default();
        let mut rx1 = channel.subscribe();
        let mut rx2 = channel.subscribe();
        assert_eq!(channel.receiver_count(), 2);

        channel.publish(delta(7));

        let d1 = rx1.recv().await.expect("subscriber 1 should receive");
        let d2 = rx2.recv().await.expect("subscriber 2 should receive");
        assert_eq!(d1.seq, 7);
        assert_eq!(d2.seq, 7);
    }

    #[test]
    fn publish_with_no_subscribers_does_not_panic() {
        let channel = ProgressChannel::default();
        channel.publish(delta(1));
        assert_eq!(channel.receiver_count(), 0);
    }

    #[tokio::test]
    async fn late_subscriber_misses_earlier_deltas() {
        let channel = ProgressChannel::default();
        channel.publish(delta(1));

        let mut rx = channel.subscribe();
        channel.publish(delta(2));

        assert_eq!(rx.recv().await.unwrap().seq, 2);
    }

    #[tokio::test]
    async fn slow_subscriber_observes_lag() {
        let channel = ProgressChannel::new(2);
        let mut rx = channel.subscribe();
        for seq in 1..=5 {
            channel.publish(delta(seq));
        }

        assert!(matches!(
            rx.recv().await,
            Err(broadcast::error::RecvError::Lagged(3))
        ));
        assert_eq!(rx.recv().await.unwrap().seq, 4);
    }

    #[test]
    fn frame_carries_type_tag_and_flattened_delta() {
        let d = delta(3);
        let json: serde_json::Value =
            serde_json::from_str(&ProgressFrame::new(&d).to_json().unwrap()).unwrap();
        assert_eq!(json["type"], MSG_TYPE_BATCH_PROGRESS);
        assert_eq!(json["seq"], 3);
        assert_eq!(json["total"], 3);
        assert_eq!(json["state"], "running");
    }
}
