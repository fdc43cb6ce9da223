//! Run summary

use chrono::{DateTime, Utc};
use newslabel_core::ClassificationOutcome;
use serde::{Deserialize, Serialize};
use std::time::Duration;

/// How a run ended
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(tag = "state", rename_all = "snake_case")]
pub enum RunStatus {
    /// Every eligible record was committed
    Completed,
    /// Stopped by a fatal, configuration, or persistence error
    Aborted { reason: String },
    /// Interrupted by the operator
    Cancelled,
}

impl RunStatus {
    pub fn is_completed(&self) -> bool {
        matches!(self, Self::Completed)
    }
}

/// End-of-run totals over the committed outcomes in the run's range
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct RunSummary {
    pub status: RunStatus,
    /// Records in the selected range
    pub total_records: usize,
    /// Records in the range with a committed outcome
    pub processed: usize,
    pub success_count: usize,
    pub failure_count: usize,
    /// Already complete when the run started
    pub skipped: usize,
    pub newly_processed: usize,
    /// Percentage of processed records that succeeded
    pub success_rate: f64,
    pub total_cost: f64,
    pub average_cost_per_success: f64,
    pub input_tokens: u64,
    pub output_tokens: u64,
    pub duration_secs: f64,
    pub started_at: DateTime<Utc>,
    pub finished_at: DateTime<Utc>,
    pub concurrency: usize,
}

impl RunSummary {
    /// Derive the summary from the outcome collection
    #[allow(clippy::too_many_arguments)]
    pub fn from_outcomes(
        outcomes: &[ClassificationOutcome],
        status: RunStatus,
        total_records: usize,
        skipped: usize,
        newly_processed: usize,
        started_at: DateTime<Utc>,
        duration: Duration,
        concurrency: usize,
    ) -> Self {
        let success_count = outcomes.iter().filter(|o| o.success).count();
        let processed = outcomes.len();
        let total_cost: f64 = outcomes.iter().map(|o| o.cost).sum();

        Self {
            status,
            total_records,
            processed,
            success_count,
            failure_count: processed - success_count,
            skipped,
            newly_processed,
            success_rate: if processed > 0 {
                success_count as f64 / processed as f64 * 100.0
            } else {
                0.0
            },
            total_cost,
            average_cost_per_success: if success_count > 0 {
                total_cost / success_count as f64
            } else {
                0.0
            },
            input_tokens: outcomes.iter().map(|o| o.usage.input_tokens as u64).sum(),
            output_tokens: outcomes.iter().map(|o| o.usage.output_tokens as u64).sum(),
            duration_secs: duration.as_secs_f64(),
            started_at,
            finished_at: Utc::now(),
            concurrency,
        }
    }
}
