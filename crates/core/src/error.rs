use serde::Serialize;

use crate::types::BatchId;
use crate::upload::UploadError;

/// A batch was rejected before any work started.
///
/// Fully recoverable: the caller can resubmit a corrected batch.
#[derive(Debug, Clone, PartialEq, Eq, thiserror::Error)]
pub enum AdmissionError {
    #[error("Batch contains no structures")]
    Empty,

    #[error("Batch of {requested} structures exceeds the admission limit of {limit}")]
    TooLarge { requested: usize, limit: usize },

    #[error("Structure at index {index} is invalid: {reason}")]
    InvalidPayload { index: usize, reason: String },

    #[error("Invalid validation options: {0}")]
    InvalidOptions(String),
}

/// A lookup against the batch registry failed.
#[derive(Debug, Clone, PartialEq, Eq, thiserror::Error)]
pub enum SessionError {
    #[error("Batch {0} not found")]
    NotFound(BatchId),
}

/// A broken engine invariant, fatal to the affected session only.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, thiserror::Error)]
#[serde(tag = "violation", rename_all = "snake_case")]
pub enum InvariantViolation {
    #[error("Duplicate result reported for item {index}")]
    DuplicateResult { index: usize },

    #[error("Item index {index} is out of range for a batch of {total}")]
    IndexOutOfRange { index: usize, total: usize },

    #[error("Result reported for item {index} after it was cancelled")]
    ReportAfterCancel { index: usize },

    #[error("Batch counters out of range: completed {completed}, cancelled {cancelled}, total {total}")]
    CounterOverflow {
        completed: usize,
        cancelled: usize,
        total: usize,
    },
}

/// Umbrella error for domain operations, consumed by the HTTP layer.
#[derive(Debug, thiserror::Error)]
pub enum CoreError {
    #[error(transparent)]
    Admission(#[from] AdmissionError),

    #[error(transparent)]
    Session(#[from] SessionError),

    #[error(transparent)]
    Upload(#[from] UploadError),

    #[error("Validation failed: {0}")]
    Validation(String),

    #[error("Internal error: {0}")]
    Internal(String),
}
