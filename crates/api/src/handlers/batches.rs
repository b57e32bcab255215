//! Handlers for batch submission, status, results, and cancellation.

use axum::extract::rejection::{JsonRejection, QueryRejection};
use axum::extract::{Path, Query, State};
use axum::http::StatusCode;
use axum::response::IntoResponse;
use axum::Json;
use serde::{Deserialize, Serialize};
use validator::Validate;

use chemaudit_core::batch::BatchState;
use chemaudit_core::error::CoreError;
use chemaudit_core::payload::SubmittedStructure;
use chemaudit_core::query::ResultQuery;
use chemaudit_core::types::BatchId;
use chemaudit_core::validation::ValidationOptions;

use crate::error::{AppError, AppResult};
use crate::response::DataResponse;
use crate::state::AppState;

// ---------------------------------------------------------------------------
// Request / response DTOs
// ---------------------------------------------------------------------------

/// Request body for `POST /batches`.
#[derive(Debug, Deserialize)]
pub struct SubmitBatchRequest {
    pub structures: Vec<SubmittedStructure>,
    #[serde(default)]
    pub options: ValidationOptions,
}

/// Response body for an accepted submission.
#[derive(Debug, Serialize)]
pub struct SubmitBatchResponse {
    pub id: BatchId,
    pub state: BatchState,
    pub total: usize,
}

// ---------------------------------------------------------------------------
// Helpers
// ---------------------------------------------------------------------------

/// Parse a batch id path segment.
pub fn parse_batch_id(raw: &str) -> AppResult<BatchId> {
    raw.parse()
        .map_err(|_| AppError::BadRequest(format!("Invalid batch id: {raw}")))
}

/// Map a JSON extractor rejection, keeping the body-limit case distinct.
fn json_rejection(rejection: JsonRejection) -> AppError {
    if rejection.status() == StatusCode::PAYLOAD_TOO_LARGE {
        AppError::PayloadTooLarge(rejection.body_text())
    } else {
        AppError::BadRequest(rejection.body_text())
    }
}

// ---------------------------------------------------------------------------
// Handlers
// ---------------------------------------------------------------------------

/// POST /batches
///
/// Admit a batch. Returns 201 with the id and `queued` state; admission
/// failures reject the whole batch.
pub async fn submit_batch(
    State(state): State<AppState>,
    body: Result<Json<SubmitBatchRequest>, JsonRejection>,
) -> AppResult<impl IntoResponse> {
    let Json(body) = body.map_err(json_rejection)?;

    let snapshot = state.registry.submit(body.structures, body.options).await?;
    let response = SubmitBatchResponse {
        id: snapshot.id,
        state: snapshot.state,
        total: snapshot.counters.total,
    };

    Ok((StatusCode::CREATED, Json(DataResponse { data: response })))
}

/// GET /batches/{id}
///
/// Current counters plus every terminal per-item result.
pub async fn get_batch(
    State(state): State<AppState>,
    Path(id): Path<String>,
) -> AppResult<impl IntoResponse> {
    let snapshot = state.registry.get(parse_batch_id(&id)?).await?;
    Ok(Json(DataResponse { data: snapshot }))
}

/// GET /batches/{id}/stats
pub async fn get_batch_stats(
    State(state): State<AppState>,
    Path(id): Path<String>,
) -> AppResult<impl IntoResponse> {
    let stats = state.registry.statistics(parse_batch_id(&id)?).await?;
    Ok(Json(DataResponse { data: stats }))
}

/// GET /batches/{id}/results
///
/// Paginated per-item results (`?page, page_size, status, min_score,
/// max_score`).
pub async fn list_results(
    State(state): State<AppState>,
    Path(id): Path<String>,
    query: Result<Query<ResultQuery>, QueryRejection>,
) -> AppResult<impl IntoResponse> {
    let id = parse_batch_id(&id)?;
    let Query(query) = query.map_err(|e| AppError::BadRequest(e.body_text()))?;
    query
        .validate()
        .map_err(|e| AppError::Core(CoreError::Validation(e.to_string())))?;

    let page = state.registry.results(id, &query).await?;
    Ok(Json(DataResponse { data: page }))
}

/// POST /batches/{id}/cancel and DELETE /batches/{id}
///
/// Cooperative cancel. Idempotent; a terminal batch is returned unchanged.
pub async fn cancel_batch(
    State(state): State<AppState>,
    Path(id): Path<String>,
) -> AppResult<impl IntoResponse> {
    let id = parse_batch_id(&id)?;
    let snapshot = state.registry.cancel(id).await?;

    tracing::info!(batch_id = %id, state = snapshot.state.as_str(), "Cancel requested via API");
    Ok(Json(DataResponse { data: snapshot }))
}
