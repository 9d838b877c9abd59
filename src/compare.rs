//! Comparator: two-sample tests over every (metric, model pair) unit.
//!
//! Units are ordered metric-major, then by pair, following the caller's
//! metric and model order. A failing unit is reported in place and never
//! aborts its siblings. Raw and corrected p-values are both kept.
//!
//! All metrics of one model pair share a unit seed derived from the root
//! seed and the pair index, so they are scored on the same replicates.

use crate::config::{ComparisonConfig, CorrectionMethod};
use crate::correction::adjust_p_values;
use crate::engine::{two_sample_test_seeded, MetricEstimate, TestResult};
use crate::error::{Result, StamboError};
use crate::metrics::MetricRegistry;
use crate::resample::derive_seed;
use crate::sample::GroupedSample;
use rayon::prelude::*;
use serde::{Deserialize, Serialize};
use std::collections::HashSet;

/// A model's sample under its display name
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct NamedSample {
    pub name: String,
    pub sample: GroupedSample,
}

impl NamedSample {
    pub fn new(name: impl Into<String>, sample: GroupedSample) -> Self {
        Self {
            name: name.into(),
            sample,
        }
    }
}

/// Which model pairs to test
#[derive(Debug, Clone, Default, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "kebab-case")]
pub enum PairSelection {
    /// Every unordered pair `(i, j)` with `i < j` in input order
    #[default]
    AllPairs,
    /// Explicit `(A, B)` pairs by model name, tested in the given order
    Pairs(Vec<(String, String)>),
}

impl PairSelection {
    /// Explicit pairs from anything string-like
    pub fn pairs<A: Into<String>, B: Into<String>>(pairs: impl IntoIterator<Item = (A, B)>) -> Self {
        Self::Pairs(pairs.into_iter().map(|(a, b)| (a.into(), b.into())).collect())
    }

    /// Resolve to model index pairs
    ///
    /// # Errors
    ///
    /// Returns `InvalidConfiguration` for unknown names, self-pairs and
    /// repeated pairs.
    pub fn resolve(&self, names: &[&str]) -> Result<Vec<(usize, usize)>> {
        match self {
            Self::AllPairs => Ok((0..names.len())
                .flat_map(|i| (i + 1..names.len()).map(move |j| (i, j)))
                .collect()),
            Self::Pairs(pairs) => {
                let position = |name: &str| {
                    names.iter().position(|n| *n == name).ok_or_else(|| {
                        StamboError::InvalidConfiguration(format!("unknown model '{name}' in pair"))
                    })
                };
                let mut seen = HashSet::new();
                let mut resolved = Vec::with_capacity(pairs.len());
                for (a, b) in pairs {
                    let pair = (position(a)?, position(b)?);
                    if pair.0 == pair.1 {
                        return Err(StamboError::InvalidConfiguration(format!(
                            "model '{a}' paired with itself"
                        )));
                    }
                    if !seen.insert(pair) {
                        return Err(StamboError::InvalidConfiguration(format!(
                            "pair '{a}' vs '{b}' requested twice"
                        )));
                    }
                    resolved.push(pair);
                }
                Ok(resolved)
            }
        }
    }
}

/// Result of one (metric, pair) unit
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(tag = "status", rename_all = "snake_case")]
pub enum UnitOutcome {
    Completed {
        result: TestResult,
        /// p-value after the family-wise correction
        corrected_p_value: f64,
        /// `corrected_p_value < alpha`
        significant: bool,
    },
    Failed {
        error: StamboError,
    },
}

/// One row of a comparison
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct ComparisonEntry {
    pub metric: String,
    pub model_a: String,
    pub model_b: String,
    pub outcome: UnitOutcome,
}

impl ComparisonEntry {
    #[must_use]
    pub const fn result(&self) -> Option<&TestResult> {
        match &self.outcome {
            UnitOutcome::Completed { result, .. } => Some(result),
            UnitOutcome::Failed { .. } => None,
        }
    }

    #[must_use]
    pub const fn corrected_p_value(&self) -> Option<f64> {
        match &self.outcome {
            UnitOutcome::Completed {
                corrected_p_value, ..
            } => Some(*corrected_p_value),
            UnitOutcome::Failed { .. } => None,
        }
    }

    #[must_use]
    pub const fn is_significant(&self) -> bool {
        matches!(
            self.outcome,
            UnitOutcome::Completed {
                significant: true,
                ..
            }
        )
    }

    #[must_use]
    pub const fn error(&self) -> Option<&StamboError> {
        match &self.outcome {
            UnitOutcome::Completed { .. } => None,
            UnitOutcome::Failed { error } => Some(error),
        }
    }

    #[must_use]
    pub const fn is_completed(&self) -> bool {
        matches!(self.outcome, UnitOutcome::Completed { .. })
    }
}

/// Every unit of a [`compare_models`] call
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct ComparisonResult {
    /// Model names in input order
    pub models: Vec<String>,
    /// Metric names in registry order
    pub metrics: Vec<String>,
    /// Tested pairs `(A, B)` in order
    pub pairs: Vec<(String, String)>,
    /// Units, metric-major
    pub entries: Vec<ComparisonEntry>,
    /// Correction applied across the completed units
    pub correction: CorrectionMethod,
    /// Configuration the comparison ran with
    pub config: ComparisonConfig,
}

impl ComparisonResult {
    /// Look up the unit of `metric` for the pair `(model_a, model_b)`
    #[must_use]
    pub fn get(&self, metric: &str, model_a: &str, model_b: &str) -> Option<&ComparisonEntry> {
        self.entries
            .iter()
            .find(|e| e.metric == metric && e.model_a == model_a && e.model_b == model_b)
    }

    pub fn completed(&self) -> impl Iterator<Item = &ComparisonEntry> {
        self.entries.iter().filter(|e| e.is_completed())
    }

    pub fn failures(&self) -> impl Iterator<Item = &ComparisonEntry> {
        self.entries.iter().filter(|e| !e.is_completed())
    }

    /// Whether every unit completed
    #[must_use]
    pub fn is_complete(&self) -> bool {
        self.entries.iter().all(ComparisonEntry::is_completed)
    }

    /// A model's own metric value and interval
    ///
    /// Taken from the first completed unit of `metric` involving `model`.
    #[must_use]
    pub fn model_estimate(&self, metric: &str, model: &str) -> Option<MetricEstimate> {
        self.entries
            .iter()
            .filter(|e| e.metric == metric)
            .find_map(|e| match e.result() {
                Some(r) if e.model_a == model => Some(r.model_a),
                Some(r) if e.model_b == model => Some(r.model_b),
                _ => None,
            })
    }
}

/// Compare models on every requested metric and pair
///
/// Per-unit errors are recorded as [`UnitOutcome::Failed`]; only problems
/// with the call itself are returned as `Err`.
///
/// # Errors
///
/// Returns `InvalidConfiguration` for an invalid config, fewer than two
/// models, duplicate model names, an empty metric registry or an invalid
/// pair selection.
pub fn compare_models(
    models: &[NamedSample],
    metrics: &MetricRegistry,
    pairs: &PairSelection,
    config: &ComparisonConfig,
) -> Result<ComparisonResult> {
    config.validate()?;
    if models.len() < 2 {
        return Err(StamboError::InvalidConfiguration(format!(
            "need at least two models to compare, got {}",
            models.len()
        )));
    }
    if metrics.is_empty() {
        return Err(StamboError::InvalidConfiguration(
            "no metrics requested".to_string(),
        ));
    }
    let names: Vec<&str> = models.iter().map(|m| m.name.as_str()).collect();
    let mut unique = HashSet::new();
    if let Some(dup) = names.iter().find(|n| !unique.insert(**n)) {
        return Err(StamboError::InvalidConfiguration(format!(
            "duplicate model name '{dup}'"
        )));
    }
    let pair_indices = pairs.resolve(&names)?;
    let metric_list: Vec<_> = metrics.iter().collect();

    let units: Vec<(usize, usize)> = (0..metric_list.len())
        .flat_map(|m| (0..pair_indices.len()).map(move |p| (m, p)))
        .collect();

    tracing::info!(
        n_models = models.len(),
        n_metrics = metric_list.len(),
        n_pairs = pair_indices.len(),
        n_bootstrap = config.n_bootstrap,
        pairing = %config.pairing,
        "comparing models"
    );

    let run_unit = |&(m, p): &(usize, usize)| {
        let (i, j) = pair_indices[p];
        let (name, metric) = metric_list[m];
        // Results carry the registry name, which may differ from `Metric::name`
        two_sample_test_seeded(
            &models[i].sample,
            &models[j].sample,
            metric.as_ref(),
            config,
            derive_seed(config.seed, p as u64),
        )
        .map(|result| TestResult {
            metric: name.to_string(),
            ..result
        })
    };
    let outcomes: Vec<Result<TestResult>> = if config.parallel {
        units.par_iter().map(run_unit).collect()
    } else {
        units.iter().map(run_unit).collect()
    };

    let raw: Vec<f64> = outcomes
        .iter()
        .filter_map(|o| o.as_ref().ok().map(|r| r.p_value))
        .collect();
    let mut corrected = adjust_p_values(&raw, config.correction).into_iter();

    let mut entries = Vec::with_capacity(units.len());
    for (&(m, p), outcome) in units.iter().zip(outcomes) {
        let (i, j) = pair_indices[p];
        let metric = metric_list[m].0.to_string();
        let outcome = match outcome {
            Ok(result) => {
                let corrected_p_value = corrected.next().unwrap_or(result.p_value);
                UnitOutcome::Completed {
                    significant: corrected_p_value < config.alpha,
                    corrected_p_value,
                    result,
                }
            }
            Err(error) => {
                tracing::error!(
                    metric = %metric,
                    model_a = %names[i],
                    model_b = %names[j],
                    error = %error,
                    "comparison unit failed"
                );
                UnitOutcome::Failed { error }
            }
        };
        entries.push(ComparisonEntry {
            metric,
            model_a: names[i].to_string(),
            model_b: names[j].to_string(),
            outcome,
        });
    }

    let result = ComparisonResult {
        models: names.iter().map(ToString::to_string).collect(),
        metrics: metric_list.iter().map(|(n, _)| (*n).to_string()).collect(),
        pairs: pair_indices
            .iter()
            .map(|&(i, j)| (names[i].to_string(), names[j].to_string()))
            .collect(),
        entries,
        correction: config.correction,
        config: config.clone(),
    };

    tracing::info!(
        completed = result.completed().count(),
        failed = result.failures().count(),
        significant = result.entries.iter().filter(|e| e.is_significant()).count(),
        correction = %config.correction,
        "comparison complete"
    );

    Ok(result)
}
