//! Cost accounting
//!
//! Pricing is a static table from model identifier to per-1K-token prices.
//! [`CostModel::price`] is a pure lookup; running totals are accumulated by
//! the checkpoint store, never here.

use crate::{Error, Result};
use serde::{Deserialize, Serialize};
use std::collections::HashMap;

/// Output tokens assumed per predicted label when estimating
pub const TOKENS_PER_LABEL: u32 = 50;

/// Fixed output overhead (brackets, keys) when estimating
pub const RESPONSE_OVERHEAD_TOKENS: u32 = 20;

/// Per-1K-token prices for a single model, in USD
#[derive(Debug, Clone, Copy, PartialEq, Serialize, Deserialize)]
pub struct ModelPricing {
    /// Price per 1000 input (prompt) tokens
    pub input_per_1k: f64,

    /// Price per 1000 output (completion) tokens
    pub output_per_1k: f64,
}

impl ModelPricing {
    pub fn new(input_per_1k: f64, output_per_1k: f64) -> Self {
        Self {
            input_per_1k,
            output_per_1k,
        }
    }
}

/// Static pricing table keyed by model identifier
#[derive(Debug, Clone, Default, PartialEq, Serialize, Deserialize)]
#[serde(transparent)]
pub struct CostModel {
    prices: HashMap<String, ModelPricing>,
}

impl CostModel {
    /// Create an empty cost model
    pub fn new() -> Self {
        Self::default()
    }

    /// Builder-style registration of a model price
    pub fn with_model(mut self, model: impl Into<String>, pricing: ModelPricing) -> Self {
        self.prices.insert(model.into(), pricing);
        self
    }

    /// Register or replace a model price
    pub fn insert(&mut self, model: impl Into<String>, pricing: ModelPricing) {
        self.prices.insert(model.into(), pricing);
    }

    /// Pricing for a model, if known
    pub fn pricing(&self, model: &str) -> Option<&ModelPricing> {
        self.prices.get(model)
    }

    /// Whether the table has an entry for `model`
    pub fn contains(&self, model: &str) -> bool {
        self.prices.contains_key(model)
    }

    /// Compute the cost of one call.
    ///
    /// Unknown models are a configuration error: cost tracking must never
    /// silently record zero.
    pub fn price(&self, model: &str, input_tokens: u32, output_tokens: u32) -> Result<f64> {
        let pricing = self
            .pricing(model)
            .ok_or_else(|| Error::config(format!("no pricing configured for model '{}'", model)))?;

        Ok(input_tokens as f64 / 1000.0 * pricing.input_per_1k
            + output_tokens as f64 / 1000.0 * pricing.output_per_1k)
    }
}

/// Expected completion size for a response carrying `num_labels` labels
pub fn estimate_response_tokens(num_labels: u32) -> u32 {
    num_labels * TOKENS_PER_LABEL + RESPONSE_OVERHEAD_TOKENS
}
