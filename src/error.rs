//! Error kinds shared by the bootstrap core.

use serde::{Deserialize, Serialize};
use thiserror::Error;

/// Errors that abort a single two-sample test.
///
/// Every variant is unrecoverable for the enclosing test. The comparator
/// isolates them per (metric, model pair) unit.
#[derive(Error, Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(tag = "kind", content = "detail", rename_all = "snake_case")]
pub enum StamboError {
    /// Inputs of unequal length, or paired samples that do not share targets and groups
    #[error("Shape mismatch: {0}")]
    ShapeMismatch(String),

    /// Empty sample, or no group to resample from
    #[error("Insufficient groups: {0}")]
    InsufficientGroups(String),

    /// The metric failed on every redraw for some replicate
    #[error("Metric '{metric}' undefined on resampled data after {attempts} consecutive attempts: {reason}")]
    MetricUndefined {
        metric: String,
        attempts: usize,
        reason: String,
    },

    /// Too few replicates for the requested confidence coverage
    #[error("Insufficient replicates for requested coverage: {n_bootstrap} replicates cannot resolve the {confidence} interval (need at least {required})")]
    InsufficientReplicates {
        n_bootstrap: usize,
        confidence: f64,
        required: usize,
    },

    /// Unknown option or out-of-range setting
    #[error("Invalid configuration: {0}")]
    InvalidConfiguration(String),
}

/// Convenience alias for core results.
pub type Result<T> = std::result::Result<T, StamboError>;
