//! ChemAudit batch domain types.
//!
//! Pure data and logic shared by the engine and the HTTP layer: batch and
//! item model, progress deltas, admission errors, the [`Validator`]
//! boundary, statistics, result queries, and batch file parsing. No I/O
//! and no async runtime.
//!
//! [`Validator`]: validation::Validator

pub mod batch;
pub mod error;
pub mod line_notation;
pub mod payload;
pub mod query;
pub mod statistics;
pub mod types;
pub mod upload;
pub mod validation;
