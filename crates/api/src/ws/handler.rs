use std::sync::Arc;
use std::time::Duration;

use axum::extract::ws::{close_code, CloseFrame, Message, WebSocket, WebSocketUpgrade};
use axum::extract::{Path, State};
use axum::response::Response;
use chemaudit_events::ProgressFrame;
use chemaudit_pipeline::Subscription;
use futures::{SinkExt, StreamExt};

use crate::error::AppResult;
use crate::handlers::batches::parse_batch_id;
use crate::state::AppState;
use crate::ws::manager::WsManager;

/// How long to wait for queued frames to flush after the stream ends.
const FLUSH_TIMEOUT: Duration = Duration::from_secs(5);

/// GET /api/v1/batches/{id}/ws
///
/// Subscribes before upgrading so an unknown batch is answered with a
/// plain 404. After the upgrade the client receives a snapshot frame, live
/// progress frames, and a Close frame once the batch is terminal.
pub async fn batch_ws_handler(
    State(state): State<AppState>,
    Path(id): Path<String>,
    ws: WebSocketUpgrade,
) -> AppResult<Response> {
    let batch_id = parse_batch_id(&id)?;
    let subscription = state.registry.subscribe(batch_id).await?;

    Ok(ws.on_upgrade(move |socket| handle_socket(socket, state.ws_manager, subscription)))
}

/// Pump one subscription into one WebSocket connection.
///
/// Outbound frames go through the `WsManager` channel so heartbeat pings
/// and shutdown Close frames share the same sink. Inbound messages are only
/// read to notice disconnects.
async fn handle_socket(socket: WebSocket, ws_manager: Arc<WsManager>, subscription: Subscription) {
    let conn_id = uuid::Uuid::new_v4().to_string();
    let batch_id = subscription.batch_id();
    let (tx, mut rx) = ws_manager.add(conn_id.clone(), batch_id).await;
    let viewers = ws_manager.connections_for_batch(batch_id).await;
    tracing::info!(conn_id = %conn_id, batch_id = %batch_id, viewers, "Progress stream connected");
    let (mut sink, mut inbound) = socket.split();

    // Sender task: forward channel messages to the WebSocket sink.
    let sender_conn_id = conn_id.clone();
    let send_task = tokio::spawn(async move {
        while let Some(msg) = rx.recv().await {
            let closing = matches!(msg, Message::Close(_));
            if sink.send(msg).await.is_err() {
                tracing::debug!(conn_id = %sender_conn_id, "WebSocket sink closed");
                break;
            }
            if closing {
                break;
            }
        }
    });

    let deltas = subscription.into_stream();
    futures::pin_mut!(deltas);

    loop {
        tokio::select! {
            delta = deltas.next() => match delta {
                Some(delta) => {
                    let text = match ProgressFrame::new(&delta).to_json() {
                        Ok(text) => text,
                        Err(e) => {
                            tracing::error!(conn_id = %conn_id, error = %e, "Failed to encode progress frame");
                            break;
                        }
                    };
                    tracing::debug!(conn_id = %conn_id, seq = delta.seq, "Progress frame sent");
                    if tx.send(Message::Text(text.into())).is_err() {
                        break;
                    }
                }
                None => {
                    let _ = tx.send(Message::Close(Some(CloseFrame {
                        code: close_code::NORMAL,
                        reason: "batch finished".into(),
                    })));
                    break;
                }
            },
            msg = inbound.next() => match msg {
                Some(Ok(Message::Close(_))) | None => break,
                Some(Ok(Message::Pong(_))) => {
                    tracing::trace!(conn_id = %conn_id, "Pong received");
                }
                Some(Ok(_)) => {}
                Some(Err(e)) => {
                    tracing::debug!(conn_id = %conn_id, error = %e, "WebSocket receive error");
                    break;
                }
            },
        }
    }

    // Dropping the last sender lets the sender task drain and exit.
    ws_manager.remove(&conn_id).await;
    drop(tx);
    if tokio::time::timeout(FLUSH_TIMEOUT, send_task).await.is_err() {
        tracing::debug!(conn_id = %conn_id, "WebSocket flush timed out");
    }
    tracing::info!(conn_id = %conn_id, batch_id = %batch_id, "Progress stream disconnected");
}
