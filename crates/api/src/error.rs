use axum::http::StatusCode;
use axum::response::{IntoResponse, Response};
use chemaudit_core::error::{AdmissionError, CoreError, SessionError};
use chemaudit_core::upload::UploadError;
use serde_json::json;

/// Application-level error type for HTTP handlers.
///
/// Wraps [`CoreError`] for domain errors and adds HTTP-specific variants.
/// Implements [`IntoResponse`] to produce consistent JSON error responses.
#[derive(Debug, thiserror::Error)]
pub enum AppError {
    /// A domain-level error from `chemaudit_core`.
    #[error(transparent)]
    Core(#[from] CoreError),

    /// A bad request with a human-readable message.
    #[error("Bad request: {0}")]
    BadRequest(String),

    /// The request body exceeded the configured size limit.
    #[error("Payload too large: {0}")]
    PayloadTooLarge(String),

    /// An internal error with a human-readable message.
    #[error("Internal error: {0}")]
    InternalError(String),
}

/// Convenience type alias for handler return values.
pub type AppResult<T> = Result<T, AppError>;

impl From<AdmissionError> for AppError {
    fn from(err: AdmissionError) -> Self {
        Self::Core(CoreError::Admission(err))
    }
}

impl From<SessionError> for AppError {
    fn from(err: SessionError) -> Self {
        Self::Core(CoreError::Session(err))
    }
}

impl From<UploadError> for AppError {
    fn from(err: UploadError) -> Self {
        Self::Core(CoreError::Upload(err))
    }
}

impl IntoResponse for AppError {
    fn into_response(self) -> Response {
        let (status, code, message) = match &self {
            // --- Admission ---
            AppError::Core(CoreError::Admission(err)) => {
                let (status, code) = match err {
                    AdmissionError::Empty => (StatusCode::BAD_REQUEST, "EMPTY_BATCH"),
                    AdmissionError::TooLarge { .. } => {
                        (StatusCode::PAYLOAD_TOO_LARGE, "BATCH_TOO_LARGE")
                    }
                    AdmissionError::InvalidPayload { .. } => {
                        (StatusCode::BAD_REQUEST, "INVALID_PAYLOAD")
                    }
                    AdmissionError::InvalidOptions(_) => {
                        (StatusCode::BAD_REQUEST, "VALIDATION_ERROR")
                    }
                };
                (status, code, err.to_string())
            }

            // --- Lookup ---
            AppError::Core(CoreError::Session(err @ SessionError::NotFound(_))) => {
                (StatusCode::NOT_FOUND, "NOT_FOUND", err.to_string())
            }

            // --- Uploads ---
            AppError::Core(CoreError::Upload(err)) => {
                let code = match err {
                    UploadError::UnsupportedFormat(_) => "UNSUPPORTED_FILE_TYPE",
                    UploadError::MissingColumn(_) => "COLUMN_NOT_FOUND",
                    _ => "INVALID_FILE",
                };
                (StatusCode::BAD_REQUEST, code, err.to_string())
            }

            AppError::Core(CoreError::Validation(msg)) => {
                (StatusCode::BAD_REQUEST, "VALIDATION_ERROR", msg.clone())
            }
            AppError::Core(CoreError::Internal(msg)) => {
                tracing::error!(error = %msg, "Internal core error");
                (
                    StatusCode::INTERNAL_SERVER_ERROR,
                    "INTERNAL_ERROR",
                    "An internal error occurred".to_string(),
                )
            }

            // --- HTTP-specific errors ---
            AppError::BadRequest(msg) => (StatusCode::BAD_REQUEST, "BAD_REQUEST", msg.clone()),
            AppError::PayloadTooLarge(msg) => {
                (StatusCode::PAYLOAD_TOO_LARGE, "BATCH_TOO_LARGE", msg.clone())
            }
            AppError::InternalError(msg) => {
                tracing::error!(error = %msg, "Internal error");
                (
                    StatusCode::INTERNAL_SERVER_ERROR,
                    "INTERNAL_ERROR",
                    "An internal error occurred".to_string(),
                )
            }
        };

        let body = json!({
            "error": message,
            "code": code,
        });

        (status, axum::Json(body)).into_response()
    }
}
