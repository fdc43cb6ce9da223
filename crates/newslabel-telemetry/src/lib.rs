//! Newslabel Telemetry
//!
//! Durable run state and reporting for newslabel batch runs.
//!
//! Provides:
//! - The checkpoint store that makes runs resumable
//! - Result, summary, and CSV export
//! - Run metrics and progress/ETA reporting

pub mod checkpoint;
pub mod metrics;
pub mod results;

pub use checkpoint::{
    CheckpointConfig, CheckpointStore, FileCheckpointStore, RunCheckpoint, RunTotals,
};
pub use metrics::{MetricsSnapshot, RunMetrics};
pub use results::ResultWriter;

/// Prelude for convenient imports
pub mod prelude {
    pub use crate::checkpoint::{CheckpointConfig, CheckpointStore, FileCheckpointStore, RunTotals};
    pub use crate::metrics::RunMetrics;
    pub use crate::results::ResultWriter;
}
