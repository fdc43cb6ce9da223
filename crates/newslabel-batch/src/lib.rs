//! Newslabel Batch
//!
//! One ordered, resumable sweep over a news dataset:
//! - [`Dataset`] loads and validates the CSV input
//! - [`BatchOrchestrator`] classifies each pending record and commits it
//!   to a [`CheckpointStore`](newslabel_telemetry::CheckpointStore)
//! - [`estimate_cost`] projects the bill before a run

pub mod config;
pub mod dataset;
pub mod estimate;
pub mod orchestrator;
pub mod summary;

pub use config::{FailurePolicy, RunConfig};
pub use dataset::Dataset;
pub use estimate::{estimate_cost, CostEstimate};
pub use orchestrator::{BatchOrchestrator, RunReport};
pub use summary::{RunStatus, RunSummary};

/// Prelude for convenient imports
pub mod prelude {
    pub use crate::config::{FailurePolicy, RunConfig};
    pub use crate::dataset::Dataset;
    pub use crate::orchestrator::{BatchOrchestrator, RunReport};
    pub use crate::summary::{RunStatus, RunSummary};
}
