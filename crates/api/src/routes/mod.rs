pub mod batches;
pub mod health;

use axum::Router;

use crate::state::AppState;

/// Build the `/api/v1` route tree.
///
/// Route hierarchy:
///
/// ```text
/// /batches                     submit (POST)
/// /batches/upload              submit a CSV/TSV/SDF file (POST, multipart)
/// /batches/detect-columns      suggest CSV columns (POST, multipart)
/// /batches/{id}                status snapshot (GET), cancel (DELETE)
/// /batches/{id}/stats          aggregate statistics
/// /batches/{id}/results        paginated per-item results
/// /batches/{id}/cancel         cancel (POST)
/// /batches/{id}/ws             WebSocket progress stream
/// ```
pub fn api_routes() -> Router<AppState> {
    Router::new().nest("/batches", batches::router())
}
