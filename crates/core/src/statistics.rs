//! Aggregate statistics over a batch's item outcomes.

use serde::Serialize;

use crate::batch::{FailureKind, ItemOutcome, ItemStatus};
use crate::types::Timestamp;

/// Lower score bound (inclusive) for the `excellent` bucket.
pub const SCORE_EXCELLENT: u8 = 90;
/// Lower score bound (inclusive) for the `good` bucket.
pub const SCORE_GOOD: u8 = 70;
/// Lower score bound (inclusive) for the `moderate` bucket.
pub const SCORE_MODERATE: u8 = 50;

/// Count of successful items per score band.
#[derive(Debug, Clone, Copy, Default, PartialEq, Eq, Serialize)]
pub struct ScoreDistribution {
    pub excellent: usize,
    pub good: usize,
    pub moderate: usize,
    pub poor: usize,
}

impl ScoreDistribution {
    fn record(&mut self, score: u8) {
        match score {
            s if s >= SCORE_EXCELLENT => self.excellent += 1,
            s if s >= SCORE_GOOD => self.good += 1,
            s if s >= SCORE_MODERATE => self.moderate += 1,
            _ => self.poor += 1,
        }
    }
}

/// Summary statistics for one batch.
#[derive(Debug, Clone, Default, PartialEq, Serialize)]
pub struct BatchStatistics {
    pub total: usize,
    pub succeeded: usize,
    pub failed: usize,
    pub cancelled: usize,
    /// Items not yet terminal (pending or running).
    pub pending: usize,
    pub timeouts: usize,
    pub validator_errors: usize,
    pub average_score: Option<f64>,
    pub min_score: Option<u8>,
    pub max_score: Option<u8>,
    pub score_distribution: ScoreDistribution,
    pub processing_time_ms: Option<i64>,
}

impl BatchStatistics {
    /// Fold item statuses and outcomes into statistics.
    pub fn compute<'a, I>(items: I) -> Self
    where
        I: IntoIterator<Item = (ItemStatus, Option<&'a ItemOutcome>)>,
    {
        let mut stats = Self::default();
        let mut score_sum: u64 = 0;

        for (status, outcome) in items {
            stats.total += 1;
            match status {
                ItemStatus::Pending | ItemStatus::Running => stats.pending += 1,
                ItemStatus::Succeeded => stats.succeeded += 1,
                ItemStatus::Failed => stats.failed += 1,
                ItemStatus::Cancelled => stats.cancelled += 1,
            }

            match outcome {
                Some(ItemOutcome::Succeeded { record }) => {
                    let score = record.overall_score;
                    score_sum += u64::from(score);
                    stats.min_score = Some(stats.min_score.map_or(score, |m| m.min(score)));
                    stats.max_score = Some(stats.max_score.map_or(score, |m| m.max(score)));
                    stats.score_distribution.record(score);
                }
                Some(ItemOutcome::Failed { failure }) => match failure.kind {
                    FailureKind::Timeout => stats.timeouts += 1,
                    FailureKind::ValidatorError => stats.validator_errors += 1,
                },
                Some(ItemOutcome::Cancelled) | None => {}
            }
        }

        if stats.succeeded > 0 {
            let avg = score_sum as f64 / stats.succeeded as f64;
            stats.average_score = Some((avg * 100.0).round() / 100.0);
        }
        stats
    }

    /// Attach wall-clock processing time.
    ///
    /// Measured from `started_at` to `completed_at`, or to `now` while the
    /// batch is still running. Left unset for batches that never started.
    pub fn with_processing_time(
        mut self,
        started_at: Option<Timestamp>,
        completed_at: Option<Timestamp>,
        now: Timestamp,
    ) -> Self {
        self.processing_time_ms =
            started_at.map(|start| (completed_at.unwrap_or(now) - start).num_milliseconds());
        self
    }
}
