//! Batch orchestration
//!
//! [`BatchOrchestrator::run`] sweeps a range of records in ascending index
//! order. Up to `batch_size` records are classified concurrently; every
//! finished record is validated, priced, and committed to the checkpoint
//! store from the driving loop, so commits never interleave.
//!
//! Per-record failures end up in that record's outcome. Configuration
//! errors and fatal service errors under [`FailurePolicy::Abort`] stop new
//! launches; records already in flight are drained and committed before the
//! run reports itself aborted. After a failed commit nothing more is
//! committed, and in-flight records are dropped. Cancellation abandons
//! in-flight records without committing them.

use crate::config::{FailurePolicy, RunConfig};
use crate::summary::{RunStatus, RunSummary};
use chrono::Utc;
use futures::stream::{FuturesUnordered, StreamExt};
use newslabel_classifiers::{CallOutcome, ClassificationClient, ResponseValidator, SupersededReply};
use newslabel_core::{ClassificationOutcome, CostModel, Error, Record, Result, TokenUsage};
use newslabel_telemetry::{CheckpointStore, RunMetrics};
use std::sync::Arc;
use std::time::Duration;
use tokio::time::Instant;
use tokio_util::sync::CancellationToken;
use tracing::{debug, error, info, warn};

/// Outcomes and summary of one run
#[derive(Debug, Clone)]
pub struct RunReport {
    /// Committed outcomes in the run's range, index-ordered
    pub outcomes: Vec<ClassificationOutcome>,
    pub summary: RunSummary,
}

impl RunReport {
    pub fn status(&self) -> &RunStatus {
        &self.summary.status
    }
}

/// Drives classification of a dataset against a checkpoint store
pub struct BatchOrchestrator {
    client: Arc<ClassificationClient>,
    validator: ResponseValidator,
    cost_model: CostModel,
    store: Arc<dyn CheckpointStore>,
}

impl BatchOrchestrator {
    pub fn new(
        client: Arc<ClassificationClient>,
        validator: ResponseValidator,
        cost_model: CostModel,
        store: Arc<dyn CheckpointStore>,
    ) -> Self {
        Self {
            client,
            validator,
            cost_model,
            store,
        }
    }

    /// Every model the client may bill must have pricing
    pub fn check_pricing(&self) -> Result<()> {
        for model in self.client.settings().models() {
            if !self.cost_model.contains(model) {
                return Err(Error::config(format!("no pricing configured for model '{}'", model)));
            }
        }
        Ok(())
    }

    /// Classify every record in the configured range that is not already
    /// committed.
    ///
    /// Returns `Err` only when the run cannot start; a run that stops early
    /// still returns a report whose status says why.
    pub async fn run(
        &self,
        records: &[Record],
        config: &RunConfig,
        cancel: CancellationToken,
    ) -> Result<RunReport> {
        config.validate()?;
        self.check_pricing()?;

        let started_at = Utc::now();
        let started = Instant::now();
        let range = config.range(records.len());
        let selected = &records[range.clone()];

        let pending: Vec<&Record> = selected
            .iter()
            .filter(|record| !self.store.is_complete(record.index))
            .collect();
        let skipped = selected.len() - pending.len();
        info!(
            start = range.start,
            end = range.end,
            pending = pending.len(),
            skipped,
            concurrency = config.batch_size,
            "Starting batch run"
        );

        let metrics = RunMetrics::new(selected.len() as u64, skipped as u64, config.batch_size);
        let mut queue = pending.into_iter();
        let mut in_flight = FuturesUnordered::new();
        let mut status = RunStatus::Completed;
        let mut newly_processed = 0usize;
        let mut store_failed = false;

        loop {
            while status.is_completed() && in_flight.len() < config.batch_size {
                match queue.next() {
                    Some(record) => {
                        in_flight.push(self.process_timed(record, config.failure_policy))
                    }
                    None => break,
                }
            }
            if in_flight.is_empty() {
                break;
            }

            let (index, latency, result) = tokio::select! {
                biased;
                _ = cancel.cancelled() => {
                    warn!(in_flight = in_flight.len(), "Run cancelled, abandoning in-flight records");
                    status = RunStatus::Cancelled;
                    break;
                }
                Some(done) = in_flight.next() => done,
            };

            let outcome = match result {
                Ok(outcome) => outcome,
                Err(e) => {
                    error!(index, error = %e, "Aborting run");
                    abort(&mut status, &e);
                    continue;
                }
            };
            if store_failed {
                warn!(index, "Checkpoint store failed earlier, dropping outcome");
                continue;
            }

            match self.store.commit(&outcome) {
                Ok(totals) => {
                    newly_processed += 1;
                    metrics.record_outcome(&outcome, latency);
                    metrics.record_total_cost(totals.total_cost);
                    let snapshot = metrics.snapshot();
                    info!(
                        index,
                        processed = snapshot.done(),
                        total = snapshot.total_records,
                        percent = %format!("{:.1}", snapshot.percent()),
                        cost = totals.total_cost,
                        elapsed_secs = snapshot.elapsed.as_secs(),
                        eta_secs = ?snapshot.eta().map(|eta| eta.as_secs()),
                        "Progress"
                    );
                }
                Err(e) => {
                    error!(index, error = %e, "Checkpoint commit failed, aborting run");
                    store_failed = true;
                    abort(&mut status, &e);
                }
            }
        }
        drop(in_flight);

        let outcomes: Vec<ClassificationOutcome> = self
            .store
            .outcomes()
            .into_iter()
            .filter(|outcome| range.contains(&outcome.index))
            .collect();
        let summary = RunSummary::from_outcomes(
            &outcomes,
            status,
            selected.len(),
            skipped,
            newly_processed,
            started_at,
            started.elapsed(),
            config.batch_size,
        );
        info!(
            status = ?summary.status,
            total = summary.total_records,
            success = summary.success_count,
            failure = summary.failure_count,
            cost = summary.total_cost,
            duration_secs = summary.duration_secs,
            "Batch run finished"
        );

        Ok(RunReport { outcomes, summary })
    }

    async fn process_timed(
        &self,
        record: &Record,
        policy: FailurePolicy,
    ) -> (usize, Duration, Result<ClassificationOutcome>) {
        let started = Instant::now();
        let result = self.process(record, policy).await;
        (record.index, started.elapsed(), result)
    }

    /// Classify, validate, and price one record
    async fn process(&self, record: &Record, policy: FailurePolicy) -> Result<ClassificationOutcome> {
        debug!(index = record.index, "Classifying record");
        match self.client.classify(record).await? {
            CallOutcome::Completed(reply) => {
                let validation = self.validator.validate(&reply.content);
                let (earlier_cost, earlier_usage) = self.price_superseded(reply.superseded.as_ref())?;
                let cost = earlier_cost
                    + self.cost_model.price(
                        &reply.model,
                        reply.usage.input_tokens,
                        reply.usage.output_tokens,
                    )?;
                let usage = earlier_usage + reply.usage;
                info!(
                    index = record.index,
                    model = %reply.model,
                    input_tokens = usage.input_tokens,
                    output_tokens = usage.output_tokens,
                    cost,
                    "Record classified"
                );

                let error = if validation.success {
                    None
                } else {
                    validation.warnings.first().cloned()
                };
                let mut warnings = reply.warnings;
                warnings.extend(validation.warnings);

                Ok(ClassificationOutcome {
                    index: record.index,
                    success: validation.success,
                    labels: validation.labels,
                    model_used: reply.model,
                    cost,
                    usage,
                    attempts: reply.attempts,
                    used_fallback: reply.used_fallback,
                    warnings,
                    error,
                })
            }
            CallOutcome::Exhausted {
                model,
                attempts,
                used_fallback,
                last_error,
                mut warnings,
                superseded,
            } => {
                let message = format!(
                    "retries exhausted after {} attempts: {}",
                    attempts, last_error
                );
                warnings.push(message.clone());
                let (cost, usage) = self.price_superseded(superseded.as_ref())?;
                let mut outcome = ClassificationOutcome::failed(record.index, model, message);
                outcome.attempts = attempts;
                outcome.used_fallback = used_fallback;
                outcome.warnings = warnings;
                outcome.cost = cost;
                outcome.usage = usage;
                Ok(outcome)
            }
            CallOutcome::Rejected {
                model,
                attempts,
                used_fallback,
                error,
                mut warnings,
                superseded,
            } => {
                let message = format!("{} rejected the request: {}", model, error);
                if policy == FailurePolicy::Abort {
                    return Err(Error::fatal(message));
                }
                warn!(
                    index = record.index,
                    model = %model,
                    error = %error,
                    "Fatal service error, marking record failed"
                );
                warnings.push(message.clone());
                let (cost, usage) = self.price_superseded(superseded.as_ref())?;
                let mut outcome = ClassificationOutcome::failed(record.index, model, message);
                outcome.attempts = attempts;
                outcome.used_fallback = used_fallback;
                outcome.warnings = warnings;
                outcome.cost = cost;
                outcome.usage = usage;
                Ok(outcome)
            }
        }
    }

    /// Cost and usage of a primary reply that the fallback model replaced
    fn price_superseded(&self, superseded: Option<&SupersededReply>) -> Result<(f64, TokenUsage)> {
        let Some(reply) = superseded else {
            return Ok((0.0, TokenUsage::default()));
        };
        let cost = self.cost_model.price(
            &reply.model,
            reply.usage.input_tokens,
            reply.usage.output_tokens,
        )?;
        Ok((cost, reply.usage))
    }
}

fn abort(status: &mut RunStatus, error: &Error) {
    if status.is_completed() {
        *status = RunStatus::Aborted {
            reason: error.to_string(),
        };
    }
}
