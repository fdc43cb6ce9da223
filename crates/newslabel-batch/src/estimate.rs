//! Pre-run cost estimation

use newslabel_classifiers::PromptBuilder;
use newslabel_core::cost::estimate_response_tokens;
use newslabel_core::{CostModel, Error, Record, Result};
use serde::{Deserialize, Serialize};

/// Records sampled from the head of the dataset
pub const SAMPLE_SIZE: usize = 10;

/// Labels assumed per response
pub const ASSUMED_LABELS: u32 = 2;

/// Projected cost of classifying a dataset
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct CostEstimate {
    pub dataset_size: usize,
    pub model: String,
    pub sample_size: usize,
    pub avg_input_tokens: u32,
    pub avg_output_tokens: u32,
    pub cost_per_record: f64,
    pub total_cost: f64,
}

/// Estimate the cost of classifying `dataset_size` records with `model`.
///
/// Input tokens are averaged over the rendered prompts of the first
/// [`SAMPLE_SIZE`] records.
pub fn estimate_cost(
    records: &[Record],
    dataset_size: usize,
    prompts: &PromptBuilder,
    model: &str,
    cost_model: &CostModel,
) -> Result<CostEstimate> {
    let sample = &records[..records.len().min(SAMPLE_SIZE)];
    if sample.is_empty() {
        return Err(Error::validation("cannot estimate cost of an empty dataset"));
    }

    let input_total: u64 = sample
        .iter()
        .map(|record| prompts.build(record).estimated_tokens as u64)
        .sum();
    let avg_input_tokens = (input_total / sample.len() as u64) as u32;
    let avg_output_tokens = estimate_response_tokens(ASSUMED_LABELS);

    let cost_per_record = cost_model.price(model, avg_input_tokens, avg_output_tokens)?;

    Ok(CostEstimate {
        dataset_size,
        model: model.to_string(),
        sample_size: sample.len(),
        avg_input_tokens,
        avg_output_tokens,
        cost_per_record,
        total_cost: cost_per_record * dataset_size as f64,
    })
}
