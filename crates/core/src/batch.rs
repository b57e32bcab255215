//! Batch item and session model types.
//!
//! Statuses, outcomes, progress deltas, and snapshots shared by the engine,
//! the progress channel, and the HTTP layer. This module holds data only;
//! every mutation happens in the pipeline crate's progress aggregator.

use serde::{Deserialize, Serialize};

use crate::payload::StructurePayload;
use crate::types::{BatchId, Timestamp};
use crate::validation::ValidationRecord;

// ---------------------------------------------------------------------------
// Constants
// ---------------------------------------------------------------------------

/// Default maximum number of structures per batch.
pub const MAX_BATCH_SIZE: usize = 10_000;

/// Message type tag for WebSocket progress frames.
pub const MSG_TYPE_BATCH_PROGRESS: &str = "batch_progress";

// ---------------------------------------------------------------------------
// Statuses
// ---------------------------------------------------------------------------

/// Per-item processing status.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum ItemStatus {
    Pending,
    Running,
    Succeeded,
    Failed,
    Cancelled,
}

impl ItemStatus {
    pub fn is_terminal(self) -> bool {
        matches!(self, Self::Succeeded | Self::Failed | Self::Cancelled)
    }

    pub fn as_str(self) -> &'static str {
        match self {
            Self::Pending => "pending",
            Self::Running => "running",
            Self::Succeeded => "succeeded",
            Self::Failed => "failed",
            Self::Cancelled => "cancelled",
        }
    }
}

/// Batch lifecycle state.
///
/// `Failed` is reserved for sessions aborted by an invariant violation; a
/// batch whose items fail individually still ends `Completed`.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum BatchState {
    Queued,
    Running,
    Completed,
    Cancelled,
    Failed,
}

impl BatchState {
    pub fn is_terminal(self) -> bool {
        matches!(self, Self::Completed | Self::Cancelled | Self::Failed)
    }

    pub fn as_str(self) -> &'static str {
        match self {
            Self::Queued => "queued",
            Self::Running => "running",
            Self::Completed => "completed",
            Self::Cancelled => "cancelled",
            Self::Failed => "failed",
        }
    }
}

// ---------------------------------------------------------------------------
// Outcomes
// ---------------------------------------------------------------------------

/// Why a single item failed. Scoped to that item only.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum FailureKind {
    ValidatorError,
    Timeout,
}

/// A recorded item-level failure.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct ItemFailure {
    pub kind: FailureKind,
    pub message: String,
}

impl ItemFailure {
    pub fn validator_error(message: impl Into<String>) -> Self {
        Self {
            kind: FailureKind::ValidatorError,
            message: message.into(),
        }
    }

    pub fn timeout(after_ms: u64) -> Self {
        Self {
            kind: FailureKind::Timeout,
            message: format!("Validation timed out after {after_ms}ms"),
        }
    }
}

/// Terminal outcome of one item.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(tag = "status", rename_all = "snake_case")]
pub enum ItemOutcome {
    Succeeded { record: ValidationRecord },
    Failed { failure: ItemFailure },
    Cancelled,
}

impl ItemOutcome {
    pub fn status(&self) -> ItemStatus {
        match self {
            Self::Succeeded { .. } => ItemStatus::Succeeded,
            Self::Failed { .. } => ItemStatus::Failed,
            Self::Cancelled => ItemStatus::Cancelled,
        }
    }

    pub fn score(&self) -> Option<u8> {
        match self {
            Self::Succeeded { record } => Some(record.overall_score),
            _ => None,
        }
    }
}

/// Result a worker reports for one processed item.
#[derive(Debug, Clone, PartialEq)]
pub struct ItemResult {
    pub index: usize,
    pub outcome: Result<ValidationRecord, ItemFailure>,
}

impl ItemResult {
    pub fn ok(index: usize, record: ValidationRecord) -> Self {
        Self {
            index,
            outcome: Ok(record),
        }
    }

    pub fn err(index: usize, failure: ItemFailure) -> Self {
        Self {
            index,
            outcome: Err(failure),
        }
    }

    pub fn into_outcome(self) -> ItemOutcome {
        match self.outcome {
            Ok(record) => ItemOutcome::Succeeded { record },
            Err(failure) => ItemOutcome::Failed { failure },
        }
    }
}

// ---------------------------------------------------------------------------
// Items
// ---------------------------------------------------------------------------

/// One admitted structure within a batch.
#[derive(Debug, Clone, PartialEq)]
pub struct BatchItem {
    /// Zero-based position in the submitted list.
    pub index: usize,
    pub payload: StructurePayload,
    pub name: Option<String>,
}

/// Externally visible view of one item.
#[derive(Debug, Clone, PartialEq, Serialize)]
pub struct ItemView {
    pub index: usize,
    pub payload: String,
    #[serde(skip_serializing_if = "Option::is_none")]
    pub name: Option<String>,
    pub status: ItemStatus,
    #[serde(skip_serializing_if = "Option::is_none")]
    pub outcome: Option<ItemOutcome>,
}

// ---------------------------------------------------------------------------
// Counters, deltas, snapshots
// ---------------------------------------------------------------------------

/// Cumulative batch counters.
#[derive(Debug, Clone, Copy, Default, PartialEq, Eq, Serialize, Deserialize)]
pub struct BatchCounters {
    pub total: usize,
    /// Terminal items that were processed (`succeeded + failed`).
    pub completed: usize,
    pub succeeded: usize,
    pub failed: usize,
    /// Items that never reached the validator.
    pub cancelled: usize,
}

impl BatchCounters {
    pub fn new(total: usize) -> Self {
        Self {
            total,
            ..Default::default()
        }
    }

    /// Items that have reached any terminal status.
    pub fn settled(&self) -> usize {
        self.completed + self.cancelled
    }

    pub fn is_consistent(&self) -> bool {
        self.completed == self.succeeded + self.failed && self.settled() <= self.total
    }
}

/// What produced a delta.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum DeltaKind {
    /// Synthetic summary sent first to a new subscriber.
    Snapshot,
    /// One item reached a terminal status.
    Item,
    /// Batch-level change: started, cancellation requested, terminal.
    State,
}

/// Self-contained progress update pushed to subscribers.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct ProgressDelta {
    pub batch_id: BatchId,
    /// Per-session version; strictly increasing across published deltas.
    pub seq: u64,
    pub kind: DeltaKind,
    #[serde(skip_serializing_if = "Option::is_none")]
    pub item_index: Option<usize>,
    #[serde(skip_serializing_if = "Option::is_none")]
    pub outcome: Option<ItemOutcome>,
    #[serde(flatten)]
    pub counters: BatchCounters,
    pub state: BatchState,
    pub cancel_requested: bool,
}

impl ProgressDelta {
    pub fn is_terminal(&self) -> bool {
        self.state.is_terminal()
    }
}

/// Point-in-time view of a batch, returned by status queries.
#[derive(Debug, Clone, PartialEq, Serialize)]
pub struct BatchSnapshot {
    pub id: BatchId,
    pub state: BatchState,
    pub cancel_requested: bool,
    #[serde(flatten)]
    pub counters: BatchCounters,
    pub seq: u64,
    pub created_at: Timestamp,
    pub started_at: Option<Timestamp>,
    pub completed_at: Option<Timestamp>,
    /// Terminal per-item results collected so far, in index order.
    pub results: Vec<ItemView>,
    #[serde(skip_serializing_if = "Option::is_none")]
    pub failure_reason: Option<String>,
}
