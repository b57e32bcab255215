//! Route definitions for batch validation.
//!
//! Mounted at `/batches` by `api_routes()`.
//!
//! ```text
//! POST   /                  -> submit_batch
//! POST   /upload            -> upload_batch (multipart CSV/TSV/SDF)
//! POST   /detect-columns    -> detect_columns (multipart CSV/TSV)
//! GET    /{id}              -> get_batch
//! DELETE /{id}              -> cancel_batch
//! GET    /{id}/stats        -> get_batch_stats
//! GET    /{id}/results      -> list_results (?page, page_size, status, min_score, max_score)
//! POST   /{id}/cancel       -> cancel_batch
//! GET    /{id}/ws           -> batch_ws_handler (WebSocket progress stream)
//! ```

use axum::routing::{get, post};
use axum::Router;

use crate::handlers::{batches, uploads};
use crate::state::AppState;
use crate::ws;

/// Batch routes -- mounted at `/batches`.
pub fn router() -> Router<AppState> {
    Router::new()
        .route("/", post(batches::submit_batch))
        .route("/upload", post(uploads::upload_batch))
        .route("/detect-columns", post(uploads::detect_columns))
        .route(
            "/{id}",
            get(batches::get_batch).delete(batches::cancel_batch),
        )
        .route("/{id}/stats", get(batches::get_batch_stats))
        .route("/{id}/results", get(batches::list_results))
        .route("/{id}/cancel", post(batches::cancel_batch))
        .route("/{id}/ws", get(ws::batch_ws_handler))
}
