//! newslabel Core
//!
//! Core types and utilities shared across newslabel components.
//!
//! This crate provides:
//! - Records and classification outcomes
//! - The closed 12-category label taxonomy
//! - Error types and result handling
//! - Cost accounting over a static pricing table
//! - Text normalization and token estimation

pub mod cost;
pub mod error;
pub mod taxonomy;
pub mod text;
pub mod types;

pub use cost::{CostModel, ModelPricing};
pub use error::{Error, Result};
pub use taxonomy::Label;
pub use types::{ChatMessage, ClassificationOutcome, LabelScore, Record, TokenUsage};

/// Prelude module for convenient imports
pub mod prelude {
    pub use crate::cost::{CostModel, ModelPricing};
    pub use crate::error::{Error, Result};
    pub use crate::taxonomy::Label;
    pub use crate::types::{ChatMessage, ClassificationOutcome, LabelScore, Record, TokenUsage};
}
