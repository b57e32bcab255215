//! The single-molecule validator boundary.
//!
//! Defines [`Validator`], the capability the batch engine calls once per
//! item, along with [`ValidationOptions`], [`ValidationRecord`], and
//! [`ValidatorError`]. Implementations are pure with respect to the engine
//! and may be CPU-bound; the engine runs them on the blocking pool under a
//! per-item timeout.

use serde::{Deserialize, Serialize};
use validator::Validate;

use crate::payload::StructurePayload;

/// Upper bound accepted for a per-batch `timeout_ms` override.
pub const MAX_TIMEOUT_MS: u64 = 300_000;

/// Maximum number of named checks a submission may request.
pub const MAX_CHECKS: usize = 32;

// ---------------------------------------------------------------------------
// Options
// ---------------------------------------------------------------------------

/// Per-item validator configuration supplied with a batch submission.
///
/// The same options apply to every item in the batch.
#[derive(Debug, Clone, Default, PartialEq, Eq, Serialize, Deserialize, Validate)]
#[serde(default)]
pub struct ValidationOptions {
    /// Restrict validation to these named checks (`None` runs all).
    #[validate(length(max = 32))]
    pub checks: Option<Vec<String>>,
    /// Screen against the extended alert catalogues.
    pub include_extended: bool,
    /// Screen against the ChEMBL alert catalogues.
    pub include_chembl: bool,
    /// Run standardization before validation.
    pub include_standardization: bool,
    /// Per-item timeout override in milliseconds.
    #[validate(range(min = 1, max = 300_000))]
    pub timeout_ms: Option<u64>,
}

impl ValidationOptions {
    /// Whether a named check should run under these options.
    pub fn wants_check(&self, name: &str) -> bool {
        match &self.checks {
            Some(checks) => checks.iter().any(|c| c == name),
            None => true,
        }
    }
}

// ---------------------------------------------------------------------------
// Record
// ---------------------------------------------------------------------------

/// Severity of a single validation finding.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum Severity {
    Info,
    Warning,
    Error,
    Critical,
}

/// One failed check reported by a validator.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct ValidationIssue {
    pub check_name: String,
    pub severity: Severity,
    pub message: String,
}

/// Successful validator output for one structure.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct ValidationRecord {
    /// Overall quality score in `0..=100`.
    pub overall_score: u8,
    /// Failed checks only; an empty list means every check passed.
    pub issues: Vec<ValidationIssue>,
    /// Validator-specific detail (alerts, scoring breakdowns).
    #[serde(default)]
    pub details: serde_json::Value,
}

impl ValidationRecord {
    pub fn new(overall_score: u8) -> Self {
        Self {
            overall_score: overall_score.min(100),
            issues: Vec::new(),
            details: serde_json::Value::Null,
        }
    }

    pub fn with_issue(mut self, issue: ValidationIssue) -> Self {
        self.issues.push(issue);
        self
    }

    pub fn with_details(mut self, details: serde_json::Value) -> Self {
        self.details = details;
        self
    }
}

// ---------------------------------------------------------------------------
// Error
// ---------------------------------------------------------------------------

/// A validator could not produce a record for a structure.
#[derive(Debug, Clone, PartialEq, Eq, thiserror::Error)]
pub enum ValidatorError {
    /// The descriptor could not be interpreted as a structure.
    #[error("Failed to parse structure: {0}")]
    Unparseable(String),

    /// The validator itself failed.
    #[error("Validator failure: {0}")]
    Internal(String),
}

// ---------------------------------------------------------------------------
// Trait
// ---------------------------------------------------------------------------

/// Single-molecule validation capability.
///
/// Implementations must be thread-safe; one instance is shared by every
/// worker in the pool.
pub trait Validator: Send + Sync {
    /// Short identifier used in logs.
    fn name(&self) -> &str;

    /// Validate one structure.
    fn validate(
        &self,
        payload: &StructurePayload,
        options: &ValidationOptions,
    ) -> Result<ValidationRecord, ValidatorError>;
}
