//! Two-sample bootstrap test for one metric and one pair of models.
//!
//! The test runs linearly through validation, resampling and scoring, and
//! aggregation. Any error aborts the whole test: no partial distribution is
//! ever returned.

use crate::config::{Alternative, ComparisonConfig, Pairing};
use crate::distribution::{required_replicates, ConfidenceInterval, EmpiricalDistribution};
use crate::error::{Result, StamboError};
use crate::evaluator::{Design, ScoredReplicate, Scratch, StatisticEvaluator};
use crate::metrics::Metric;
use crate::resample::Resampler;
use crate::sample::GroupedSample;
use rayon::prelude::*;
use serde::{Deserialize, Serialize};

/// Which model the observed difference favours
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "kebab-case")]
pub enum Direction {
    /// Model A scores better on the metric
    FavorsA,
    /// Model B scores better on the metric
    FavorsB,
    /// Identical observed scores
    Tie,
}

impl Direction {
    /// Label a difference `A - B` for a metric orientation
    #[must_use]
    pub fn from_difference(difference: f64, higher_is_better: bool) -> Self {
        if difference == 0.0 {
            Self::Tie
        } else if (difference > 0.0) == higher_is_better {
            Self::FavorsA
        } else {
            Self::FavorsB
        }
    }
}

impl std::fmt::Display for Direction {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.write_str(match self {
            Self::FavorsA => "favors A",
            Self::FavorsB => "favors B",
            Self::Tie => "tie",
        })
    }
}

/// Metric value of one model with its bootstrap interval
#[derive(Debug, Clone, Copy, PartialEq, Serialize, Deserialize)]
pub struct MetricEstimate {
    /// Value on the full sample
    pub observed: f64,
    /// Percentile interval over the replicates
    pub ci: ConfidenceInterval,
}

/// Outcome of a two-sample test
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct TestResult {
    /// Metric name
    pub metric: String,
    /// Observed difference `A - B` on the full samples
    pub observed: f64,
    /// Bootstrap p-value
    pub p_value: f64,
    /// Percentile interval of the difference
    pub ci: ConfidenceInterval,
    /// Bootstrap standard error of the difference
    pub std_error: f64,
    /// Model A's metric value and interval
    pub model_a: MetricEstimate,
    /// Model B's metric value and interval
    pub model_b: MetricEstimate,
    /// Which model the observed difference favours
    pub direction: Direction,
    /// Sidedness the p-value was computed for
    pub alternative: Alternative,
    /// Number of replicates
    pub n_bootstrap: usize,
    /// Draws discarded because the metric was undefined on them
    pub redraws: usize,
    /// Whether the single-group observation-level fallback was used
    pub observation_fallback: bool,
}

/// Run a two-sample test with the seed from `config`
///
/// In the paired design both samples must share targets and groups and are
/// scored on identical replicates. In the unpaired design each sample is
/// resampled independently from the same seeded stream.
///
/// # Errors
///
/// Returns the first error of any stage: `ShapeMismatch`,
/// `InsufficientGroups`, `MetricUndefined`, `InsufficientReplicates` or
/// `InvalidConfiguration`.
pub fn two_sample_test(
    sample_a: &GroupedSample,
    sample_b: &GroupedSample,
    metric: &dyn Metric,
    config: &ComparisonConfig,
) -> Result<TestResult> {
    two_sample_test_seeded(sample_a, sample_b, metric, config, config.seed)
}

/// Run a two-sample test on the random stream of `unit_seed`
///
/// # Errors
///
/// Same as [`two_sample_test`].
#[allow(clippy::too_many_lines)]
pub fn two_sample_test_seeded(
    sample_a: &GroupedSample,
    sample_b: &GroupedSample,
    metric: &dyn Metric,
    config: &ComparisonConfig,
    unit_seed: u64,
) -> Result<TestResult> {
    config.validate()?;
    let required = required_replicates(config.confidence);
    if config.n_bootstrap < required {
        return Err(StamboError::InsufficientReplicates {
            n_bootstrap: config.n_bootstrap,
            confidence: config.confidence,
            required,
        });
    }

    let resampler_a = Resampler::new(sample_a.group_index())?;
    let resampler_b;
    let design = match config.pairing {
        Pairing::Paired => {
            sample_a.check_paired_with(sample_b)?;
            Design::Paired {
                a: sample_a,
                b: sample_b,
                resampler: &resampler_a,
            }
        }
        Pairing::Unpaired => {
            resampler_b = Resampler::new(sample_b.group_index())?;
            Design::Unpaired {
                a: sample_a,
                b: sample_b,
                resampler_a: &resampler_a,
                resampler_b: &resampler_b,
            }
        }
    };
    let observation_fallback = match design {
        Design::Paired { resampler, .. } => resampler.uses_fallback(),
        Design::Unpaired {
            resampler_a,
            resampler_b,
            ..
        } => resampler_a.uses_fallback() || resampler_b.uses_fallback(),
    };

    tracing::debug!(
        metric = %metric.name(),
        n_observations = sample_a.len(),
        n_groups = resampler_a.group_index().n_groups(),
        pairing = %config.pairing,
        "two-sample test initialized"
    );

    let evaluator = StatisticEvaluator::new(metric, design, config.max_retries);
    let observed = evaluator.observed()?;

    tracing::debug!(
        metric = %metric.name(),
        n_bootstrap = config.n_bootstrap,
        parallel = config.parallel,
        "resampling and scoring"
    );

    let scored: Vec<ScoredReplicate> = if config.parallel {
        (0..config.n_bootstrap)
            .into_par_iter()
            .map_init(Scratch::default, |scratch, b| {
                evaluator.score_replicate(unit_seed, b, scratch)
            })
            .collect::<Result<_>>()?
    } else {
        let mut scratch = Scratch::default();
        (0..config.n_bootstrap)
            .map(|b| evaluator.score_replicate(unit_seed, b, &mut scratch))
            .collect::<Result<_>>()?
    };

    let redraws: usize = scored.iter().map(|s| s.redraws).sum();
    if redraws > 0 {
        tracing::warn!(
            metric = %metric.name(),
            redraws,
            n_bootstrap = config.n_bootstrap,
            "metric undefined on some replicates, redrawn"
        );
    }

    tracing::debug!(metric = %metric.name(), "aggregating bootstrap distribution");

    let differences = EmpiricalDistribution::new(
        scored.iter().map(|s| s.score.difference()).collect(),
        observed.difference(),
    )?;
    let dist_a =
        EmpiricalDistribution::new(scored.iter().map(|s| s.score.a).collect(), observed.a)?;
    let dist_b =
        EmpiricalDistribution::new(scored.iter().map(|s| s.score.b).collect(), observed.b)?;

    let result = TestResult {
        metric: metric.name().to_string(),
        observed: observed.difference(),
        p_value: differences.p_value(config.alternative, config.null_value),
        ci: differences.confidence_interval(config.confidence)?,
        std_error: differences.std_error(),
        model_a: MetricEstimate {
            observed: observed.a,
            ci: dist_a.confidence_interval(config.confidence)?,
        },
        model_b: MetricEstimate {
            observed: observed.b,
            ci: dist_b.confidence_interval(config.confidence)?,
        },
        direction: Direction::from_difference(observed.difference(), metric.higher_is_better()),
        alternative: config.alternative,
        n_bootstrap: config.n_bootstrap,
        redraws,
        observation_fallback,
    };

    tracing::debug!(
        metric = %result.metric,
        observed = result.observed,
        p_value = result.p_value,
        "two-sample test complete"
    );

    Ok(result)
}

#[cfg(test)]
#[allow(
    clippy::unwrap_used,
    clippy::float_cmp,
    clippy::cast_precision_loss,
    clippy::cast_possible_truncation,
    clippy::cast_sign_loss
)]
mod tests {
    use super::*;
    use crate::config::CorrectionMethod;
    use crate::metrics::{Accuracy, FnMetric, Mae, RocAuc};
    use crate::resample::replicate_rng;
    use rand::Rng;

    fn config(n_bootstrap: usize) -> ComparisonConfig {
        ComparisonConfig::default()
            .with_n_bootstrap(n_bootstrap)
            .with_correction(CorrectionMethod::None)
    }

    fn noisy_pair(n: usize, seed: u64) -> (GroupedSample, GroupedSample) {
        let mut rng = replicate_rng(seed, 0);
        let targets: Vec<f64> = (0..n).map(|i| (i % 2) as f64).collect();
        let flip = |rng: &mut rand_chacha::ChaCha8Rng, t: f64, p_correct: f64| {
            if rng.gen::<f64>() < p_correct {
                t
            } else {
                1.0 - t
            }
        };
        let a: Vec<f64> = targets.iter().map(|&t| flip(&mut rng, t, 0.8)).collect();
        let b: Vec<f64> = targets.iter().map(|&t| flip(&mut rng, t, 0.7)).collect();
        (
            GroupedSample::new(a, targets.clone()).unwrap(),
            GroupedSample::new(b, targets).unwrap(),
        )
    }

    #[test]
    fn test_direction_labels() {
        assert_eq!(Direction::from_difference(0.1, true), Direction::FavorsA);
        assert_eq!(Direction::from_difference(-0.1, true), Direction::FavorsB);
        assert_eq!(Direction::from_difference(0.1, false), Direction::FavorsB);
        assert_eq!(Direction::from_difference(-0.1, false), Direction::FavorsA);
        assert_eq!(Direction::from_difference(0.0, true), Direction::Tie);
    }

    #[test]
    fn test_observed_equals_exact_accuracy_difference() {
        let (a, b) = noisy_pair(100, 1);
        let acc_a = Accuracy.evaluate(a.targets(), a.predictions()).unwrap();
        let acc_b = Accuracy.evaluate(b.targets(), b.predictions()).unwrap();

        let result = two_sample_test(&a, &b, &Accuracy, &config(2000)).unwrap();
        assert_eq!(result.observed, acc_a - acc_b);
        assert_eq!(result.model_a.observed, acc_a);
        assert_eq!(result.model_b.observed, acc_b);
        assert!(result.p_value > 0.0 && result.p_value <= 1.0);
        assert!(result.ci.lower <= result.ci.upper);
        assert_eq!(result.n_bootstrap, 2000);
    }

    #[test]
    fn test_always_right_vs_always_wrong_hits_minimum_p_value() {
        let targets: Vec<f64> = (0..100).map(|i| (i % 2) as f64).collect();
        let wrong: Vec<f64> = targets.iter().map(|t| 1.0 - t).collect();
        let a = GroupedSample::new(targets.clone(), targets.clone()).unwrap();
        let b = GroupedSample::new(wrong, targets).unwrap();

        let result = two_sample_test(&a, &b, &Accuracy, &config(2000)).unwrap();
        assert_eq!(result.observed, 1.0);
        assert!(result.p_value <= 1.0 / 2001.0 + 1e-15);
        assert_eq!(result.direction, Direction::FavorsA);
        assert_eq!(result.ci.lower, 1.0);
        assert_eq!(result.ci.upper, 1.0);
    }

    #[test]
    fn test_identical_models_give_p_value_one() {
        let (a, _) = noisy_pair(50, 2);
        let result = two_sample_test(&a, &a, &Accuracy, &config(500)).unwrap();
        assert_eq!(result.observed, 0.0);
        assert_eq!(result.p_value, 1.0);
        assert_eq!(result.direction, Direction::Tie);
    }

    #[test]
    fn test_same_seed_bit_identical() {
        let (a, b) = noisy_pair(80, 3);
        let first = two_sample_test(&a, &b, &Accuracy, &config(400)).unwrap();
        let sequential = config(400).with_parallel(false);
        let second = two_sample_test(&a, &b, &Accuracy, &sequential).unwrap();
        assert_eq!(first, second);
    }

    #[test]
    fn test_different_seed_close_but_not_identical() {
        let (a, b) = noisy_pair(200, 4);
        let first = two_sample_test(&a, &b, &Accuracy, &config(1000)).unwrap();
        let second = two_sample_test(&a, &b, &Accuracy, &config(1000).with_seed(7)).unwrap();
        assert_eq!(first.observed, second.observed);
        assert_ne!(first.std_error, second.std_error);
        assert!((first.std_error - second.std_error).abs() < 0.2 * first.std_error);
    }

    #[test]
    fn test_paired_requires_shared_targets() {
        let a = GroupedSample::new(vec![1.0, 0.0], vec![1.0, 0.0]).unwrap();
        let b = GroupedSample::new(vec![1.0, 0.0, 1.0], vec![1.0, 0.0, 1.0]).unwrap();
        assert!(matches!(
            two_sample_test(&a, &b, &Accuracy, &config(100)),
            Err(StamboError::ShapeMismatch(_))
        ));
    }

    #[test]
    fn test_unpaired_accepts_different_sizes() {
        let (a, _) = noisy_pair(60, 5);
        let (_, b) = noisy_pair(90, 6);
        let cfg = config(500).with_pairing(Pairing::Unpaired);
        let result = two_sample_test(&a, &b, &Accuracy, &cfg).unwrap();
        assert!(result.p_value > 0.0 && result.p_value <= 1.0);
    }

    #[test]
    fn test_unpaired_wider_than_paired_for_correlated_models() {
        // B is A with a few flipped predictions: pairing removes shared noise
        let (a, _) = noisy_pair(200, 8);
        let mut preds_b = a.predictions().to_vec();
        for p in preds_b.iter_mut().step_by(10) {
            *p = 1.0 - *p;
        }
        let b = GroupedSample::new(preds_b, a.targets().to_vec()).unwrap();

        let paired = two_sample_test(&a, &b, &Accuracy, &config(1000)).unwrap();
        let unpaired = two_sample_test(
            &a,
            &b,
            &Accuracy,
            &config(1000).with_pairing(Pairing::Unpaired),
        )
        .unwrap();
        assert!(unpaired.ci.width() > paired.ci.width());
    }

    #[test]
    fn test_insufficient_replicates() {
        let (a, b) = noisy_pair(20, 9);
        let err = two_sample_test(&a, &b, &Accuracy, &config(30)).unwrap_err();
        assert!(matches!(
            err,
            StamboError::InsufficientReplicates {
                n_bootstrap: 30,
                required: 40,
                ..
            }
        ));
    }

    #[test]
    fn test_invalid_configuration() {
        let (a, b) = noisy_pair(20, 10);
        let cfg = config(100).with_confidence(1.5);
        assert!(matches!(
            two_sample_test(&a, &b, &Accuracy, &cfg),
            Err(StamboError::InvalidConfiguration(_))
        ));
    }

    #[test]
    fn test_metric_undefined_on_full_sample() {
        let a = GroupedSample::new(vec![0.2, 0.9], vec![1.0, 1.0]).unwrap();
        let b = GroupedSample::new(vec![0.4, 0.3], vec![1.0, 1.0]).unwrap();
        assert!(matches!(
            two_sample_test(&a, &b, &RocAuc, &config(100)),
            Err(StamboError::MetricUndefined { .. })
        ));
    }

    #[test]
    fn test_metric_failing_on_replicates_fails_whole_test() {
        // Defined on the full sample only: every proper replicate fails
        let metric = FnMetric::new("full_only", |t: &[f64], _p: &[f64]| {
            let distinct: std::collections::HashSet<u64> =
                t.iter().map(|v| v.to_bits()).collect();
            if distinct.len() == t.len() {
                0.0
            } else {
                f64::NAN
            }
        });
        let targets: Vec<f64> = (0..30).map(f64::from).collect();
        let a = GroupedSample::new(targets.clone(), targets.clone()).unwrap();
        let cfg = ComparisonConfig {
            max_retries: 5,
            ..config(100)
        };
        let err = two_sample_test(&a, &a, &metric, &cfg).unwrap_err();
        assert!(matches!(err, StamboError::MetricUndefined { attempts: 5, .. }));
    }

    #[test]
    fn test_lower_is_better_direction() {
        let targets: Vec<f64> = (0..60).map(f64::from).collect();
        let close: Vec<f64> = targets.iter().map(|t| t + 0.1).collect();
        let far: Vec<f64> = targets.iter().map(|t| t + 2.0).collect();
        let a = GroupedSample::new(close, targets.clone()).unwrap();
        let b = GroupedSample::new(far, targets).unwrap();
        let result = two_sample_test(&a, &b, &Mae, &config(200)).unwrap();
        assert!(result.observed < 0.0);
        assert_eq!(result.direction, Direction::FavorsA);
    }

    #[test]
    fn test_single_group_fallback_flagged() {
        let (a, b) = noisy_pair(40, 11);
        let groups = vec![3; 40];
        let a = GroupedSample::with_groups(
            a.predictions().to_vec(),
            a.targets().to_vec(),
            groups.clone(),
        )
        .unwrap();
        let b =
            GroupedSample::with_groups(b.predictions().to_vec(), b.targets().to_vec(), groups)
                .unwrap();
        let result = two_sample_test(&a, &b, &Accuracy, &config(200)).unwrap();
        assert!(result.observation_fallback);
        assert!(result.std_error > 0.0);
    }
}
