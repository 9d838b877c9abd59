//! # stambo
//!
//! Statistical comparison of machine-learning models with a cluster-aware
//! bootstrap.
//!
//! Evaluation sets often hold several correlated measurements of one subject
//! (multiple scans of one patient, several crops of one image). Resampling
//! observations independently then overstates precision. `stambo` resamples
//! whole groups instead, so p-values and confidence intervals stay valid
//! under intra-group correlation.
//!
//! ## Architecture
//!
//! ```text
//! GroupedSample (predictions, targets, group ids)
//!        ↓
//! Resampler (M groups drawn with replacement, seeded sub-streams)
//!        ↓
//! StatisticEvaluator (metric on A and B, bounded redraws)
//!        ↓
//! EmpiricalDistribution (p-value, percentile CI)
//!        ↓
//! two_sample_test → compare_models (metrics × pairs, Holm correction)
//!        ↓
//! ComparisonReport (LaTeX, Markdown, text, JSON)
//! ```
//!
//! ## Example
//!
//! ```no_run
//! use stambo::{compare_models, ComparisonConfig, GroupedSample, MetricRegistry, NamedSample, PairSelection};
//!
//! let targets = vec![0.0, 1.0, 1.0, 0.0, 1.0, 0.0];
//! let groups = vec![1, 1, 2, 2, 3, 3];
//! let a = GroupedSample::with_groups(vec![0.0, 1.0, 1.0, 0.0, 1.0, 1.0], targets.clone(), groups.clone())?;
//! let b = GroupedSample::with_groups(vec![1.0, 1.0, 0.0, 0.0, 1.0, 1.0], targets, groups)?;
//! let models = vec![NamedSample::new("a", a), NamedSample::new("b", b)];
//!
//! let result = compare_models(
//!     &models,
//!     &MetricRegistry::classification(),
//!     &PairSelection::AllPairs,
//!     &ComparisonConfig::default(),
//! )?;
//! for entry in result.completed() {
//!     println!("{}: p = {:?}", entry.metric, entry.corrected_p_value());
//! }
//! # Ok::<(), stambo::StamboError>(())
//! ```

pub mod compare;
pub mod config;
pub mod correction;
pub mod distribution;
pub mod engine;
pub mod error;
pub mod evaluator;
pub mod input;
pub mod metrics;
pub mod report;
pub mod resample;
pub mod sample;
pub mod synthetic;

pub use compare::{
    compare_models, ComparisonEntry, ComparisonResult, NamedSample, PairSelection, UnitOutcome,
};
pub use config::{Alternative, ComparisonConfig, ConfigError, CorrectionMethod, Pairing};
pub use correction::{adjust_p_values, bonferroni, holm};
pub use distribution::{required_replicates, ConfidenceInterval, EmpiricalDistribution};
pub use engine::{two_sample_test, two_sample_test_seeded, Direction, MetricEstimate, TestResult};
pub use error::{Result, StamboError};
pub use input::{ComparisonInput, InputError, ModelInput};
pub use metrics::{
    Accuracy, AveragePrecision, BalancedAccuracy, CohenKappa, F1Score, FnMetric, Mae, Metric,
    MetricError, MetricRegistry, Mse, PearsonR, RegistryError, RocAuc,
};
pub use report::{ComparisonReport, ConfigSummary, ReportMetadata, ReportSummary};
pub use resample::{derive_seed, replicate_rng, Replicate, Resampler};
pub use sample::{GroupId, GroupIndex, GroupedSample};
pub use synthetic::{
    demo_dataset, generate_n_measurements, generate_subject_measurements, SyntheticData,
    SyntheticError,
};
