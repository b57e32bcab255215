//! Tests for `AppError` → HTTP response mapping.
//!
//! These tests call `IntoResponse` directly on `AppError` values; no server
//! is involved.

use axum::http::StatusCode;
use axum::response::IntoResponse;
use chemaudit_api::error::AppError;
use chemaudit_core::error::{AdmissionError, CoreError, SessionError};
use chemaudit_core::types::BatchId;
use http_body_util::BodyExt;

/// Helper: convert an `AppError` into its status code and parsed JSON body.
async fn error_to_response(err: AppError) -> (StatusCode, serde_json::Value) {
    let response = err.into_response();
    let status = response.status();
    let bytes = response.into_body().collect().await.unwrap().to_bytes();
    let json: serde_json::Value = serde_json::from_slice(&bytes).unwrap();
    (status, json)
}

// ---------------------------------------------------------------------------
// Test: admission errors
// ---------------------------------------------------------------------------

#[tokio::test]
async fn empty_batch_returns_400() {
    let (status, json) = error_to_response(AdmissionError::Empty.into()).await;

    assert_eq!(status, StatusCode::BAD_REQUEST);
    assert_eq!(json["code"], "EMPTY_BATCH");
    assert_eq!(json["error"], "Batch contains no structures");
}

#[tokio::test]
async fn too_large_returns_413_with_limit() {
    let err = AdmissionError::TooLarge {
        requested: 12,
        limit: 10,
    };

    let (status, json) = error_to_response(err.into()).await;

    assert_eq!(status, StatusCode::PAYLOAD_TOO_LARGE);
    assert_eq!(json["code"], "BATCH_TOO_LARGE");
    assert_eq!(
        json["error"],
        "Batch of 12 structures exceeds the admission limit of 10"
    );
}

#[tokio::test]
async fn invalid_payload_returns_400() {
    let err = AdmissionError::InvalidPayload {
        index: 3,
        reason: "structure descriptor is empty".into(),
    };

    let (status, json) = error_to_response(err.into()).await;

    assert_eq!(status, StatusCode::BAD_REQUEST);
    assert_eq!(json["code"], "INVALID_PAYLOAD");
    assert_eq!(
        json["error"],
        "Structure at index 3 is invalid: structure descriptor is empty"
    );
}

// ---------------------------------------------------------------------------
// Test: SessionError::NotFound maps to 404 with NOT_FOUND code
// ---------------------------------------------------------------------------

#[tokio::test]
async fn not_found_error_returns_404() {
    let id = BatchId::new();

    let (status, json) = error_to_response(SessionError::NotFound(id).into()).await;

    assert_eq!(status, StatusCode::NOT_FOUND);
    assert_eq!(json["code"], "NOT_FOUND");
    assert_eq!(json["error"], format!("Batch {id} not found"));
}

// ---------------------------------------------------------------------------
// Test: AppError::BadRequest maps to 400 with BAD_REQUEST code
// ---------------------------------------------------------------------------

#[tokio::test]
async fn bad_request_error_returns_400() {
    let err = AppError::BadRequest("invalid field value".into());

    let (status, json) = error_to_response(err).await;

    assert_eq!(status, StatusCode::BAD_REQUEST);
    assert_eq!(json["code"], "BAD_REQUEST");
    assert_eq!(json["error"], "invalid field value");
}

#[tokio::test]
async fn payload_too_large_returns_413() {
    let err = AppError::PayloadTooLarge("length limit exceeded".into());

    let (status, json) = error_to_response(err).await;

    assert_eq!(status, StatusCode::PAYLOAD_TOO_LARGE);
    assert_eq!(json["code"], "BATCH_TOO_LARGE");
    assert_eq!(json["error"], "length limit exceeded");
}

// ---------------------------------------------------------------------------
// Test: CoreError::Validation maps to 400 with VALIDATION_ERROR code
// ---------------------------------------------------------------------------

#[tokio::test]
async fn validation_error_returns_400() {
    let err = AppError::Core(CoreError::Validation("page_size: range".into()));

    let (status, json) = error_to_response(err).await;

    assert_eq!(status, StatusCode::BAD_REQUEST);
    assert_eq!(json["code"], "VALIDATION_ERROR");
    assert_eq!(json["error"], "page_size: range");
}

// ---------------------------------------------------------------------------
// Test: internal errors are sanitized
// ---------------------------------------------------------------------------

#[tokio::test]
async fn internal_errors_hide_details() {
    for err in [
        AppError::Core(CoreError::Internal("lock poisoned".into())),
        AppError::InternalError("worker pool closed".into()),
    ] {
        let (status, json) = error_to_response(err).await;

        assert_eq!(status, StatusCode::INTERNAL_SERVER_ERROR);
        assert_eq!(json["code"], "INTERNAL_ERROR");
        assert_eq!(json["error"], "An internal error occurred");
    }
}
