//! Run configuration

use newslabel_core::{Error, Result};
use serde::{Deserialize, Serialize};
use std::ops::Range;

/// What to do when the service rejects a record with a fatal error
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize, Default)]
#[serde(rename_all = "snake_case")]
pub enum FailurePolicy {
    /// Stop launching records and end the run as aborted
    #[default]
    Abort,
    /// Record a failed outcome and keep going
    MarkFailed,
}

/// Settings for one sweep over a dataset
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct RunConfig {
    /// First record index to consider
    #[serde(default)]
    pub start_offset: usize,

    /// Cap on records considered from `start_offset`
    #[serde(default)]
    pub max_records: Option<usize>,

    /// Records classified concurrently
    #[serde(default = "default_batch_size")]
    pub batch_size: usize,

    #[serde(default)]
    pub failure_policy: FailurePolicy,
}

impl RunConfig {
    pub fn validate(&self) -> Result<()> {
        if self.batch_size == 0 {
            return Err(Error::config("batch_size must be at least 1"));
        }
        if self.max_records == Some(0) {
            return Err(Error::config("max_records must be at least 1 when set"));
        }
        Ok(())
    }

    /// Record indices this run covers in a dataset of `total` records
    pub fn range(&self, total: usize) -> Range<usize> {
        let start = self.start_offset.min(total);
        let end = match self.max_records {
            Some(max) => start.saturating_add(max).min(total),
            None => total,
        };
        start..end
    }
}

impl Default for RunConfig {
    fn default() -> Self {
        Self {
            start_offset: 0,
            max_records: None,
            batch_size: default_batch_size(),
            failure_policy: FailurePolicy::default(),
        }
    }
}

fn default_batch_size() -> usize {
    10
}
