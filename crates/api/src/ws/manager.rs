//! Registry of open progress streams.
//!
//! Each connection streams exactly one batch. The manager owns the outbound
//! sender of every stream so heartbeat pings and shutdown Close frames reach
//! clients without going through the per-connection pump.

use std::collections::HashMap;

use axum::body::Bytes;
use axum::extract::ws::Message;
use chemaudit_core::types::{BatchId, Timestamp};
use tokio::sync::{mpsc, RwLock};

/// Channel sender half for pushing messages to a WebSocket connection.
pub type WsSender = mpsc::UnboundedSender<Message>;

/// One open progress stream.
struct ProgressStream {
    batch_id: BatchId,
    sender: WsSender,
    opened_at: Timestamp,
}

/// Open progress streams keyed by connection id.
pub struct WsManager {
    connections: RwLock<HashMap<String, ProgressStream>>,
}

impl WsManager {
    pub fn new() -> Self {
        Self {
            connections: RwLock::new(HashMap::new()),
        }
    }

    /// Register a stream for `batch_id`.
    ///
    /// The returned receiver is drained into the socket by the connection's
    /// pump; frames sent on the manager's copy of the sender land there too.
    pub async fn add(
        &self,
        conn_id: String,
        batch_id: BatchId,
    ) -> (WsSender, mpsc::UnboundedReceiver<Message>) {
        let (tx, rx) = mpsc::unbounded_channel();
        let stream = ProgressStream {
            batch_id,
            sender: tx.clone(),
            opened_at: chrono::Utc::now(),
        };
        self.connections.write().await.insert(conn_id, stream);
        (tx, rx)
    }

    /// Forget a stream once its socket has closed.
    pub async fn remove(&self, conn_id: &str) {
        let Some(stream) = self.connections.write().await.remove(conn_id) else {
            return;
        };
        let open_secs = (chrono::Utc::now() - stream.opened_at).num_seconds();
        tracing::debug!(conn_id, batch_id = %stream.batch_id, open_secs, "Progress stream removed");
    }

    /// Streams currently watching `batch_id`.
    pub async fn connections_for_batch(&self, batch_id: BatchId) -> usize {
        self.connections
            .read()
            .await
            .values()
            .filter(|stream| stream.batch_id == batch_id)
            .count()
    }

    /// Streams open across all batches.
    pub async fn connection_count(&self) -> usize {
        self.connections.read().await.len()
    }

    /// Close every remaining stream.
    ///
    /// Streams of cancelled batches have normally ended with their terminal
    /// frame already; this catches the ones still flushing.
    pub async fn shutdown_all(&self) {
        let mut streams = self.connections.write().await;
        let count = streams.len();
        for stream in streams.drain().map(|(_, stream)| stream) {
            let _ = stream.sender.send(Message::Close(None));
        }
        tracing::info!(count, "Closed remaining progress streams");
    }

    /// Ping every stream so idle watchers of long batches stay connected.
    pub async fn ping_all(&self) {
        for stream in self.connections.read().await.values() {
            let _ = stream.sender.send(Message::Ping(Bytes::new()));
        }
    }
}

impl Default for WsManager {
    fn default() -> Self {
        Self::new()
    }
}
