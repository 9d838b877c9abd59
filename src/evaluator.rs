//! Statistic evaluation on bootstrap replicates.
//!
//! For each replicate the evaluator gathers the resampled targets and
//! predictions into contiguous buffers, applies the metric to model A and
//! model B, and returns both values. The test statistic is the signed
//! difference `A - B`; which sign means "better" is decided later from the
//! metric's direction.
//!
//! A replicate on which the metric errors or returns a non-finite value is
//! discarded and redrawn from the same random stream. After `max_retries`
//! consecutive failures evaluation fails with `MetricUndefined`.

use crate::error::{Result, StamboError};
use crate::metrics::Metric;
use crate::resample::{replicate_rng, Resampler};
use crate::sample::GroupedSample;

/// Metric values of both models on one replicate
#[derive(Debug, Clone, Copy, PartialEq)]
pub struct PairScore {
    pub a: f64,
    pub b: f64,
}

impl PairScore {
    /// Test statistic `A - B`
    #[must_use]
    pub fn difference(&self) -> f64 {
        self.a - self.b
    }
}

/// A scored replicate plus the number of discarded draws before it
#[derive(Debug, Clone, Copy, PartialEq)]
pub struct ScoredReplicate {
    pub score: PairScore,
    pub redraws: usize,
}

/// Sampling design of a two-model comparison
#[derive(Debug, Clone, Copy)]
pub enum Design<'a> {
    /// Both models share targets and groups and are scored on the same replicate
    Paired {
        a: &'a GroupedSample,
        b: &'a GroupedSample,
        resampler: &'a Resampler,
    },
    /// Each model's sample is resampled on its own
    Unpaired {
        a: &'a GroupedSample,
        b: &'a GroupedSample,
        resampler_a: &'a Resampler,
        resampler_b: &'a Resampler,
    },
}

/// Reusable gather buffers, one set per worker
#[derive(Debug, Default)]
pub struct Scratch {
    indices_a: Vec<usize>,
    indices_b: Vec<usize>,
    groups: Vec<usize>,
    targets: Vec<f64>,
    predictions: Vec<f64>,
}

/// Applies a metric to replicates of a two-model design
pub struct StatisticEvaluator<'a> {
    metric: &'a dyn Metric,
    design: Design<'a>,
    max_retries: usize,
}

/// Evaluate a metric, mapping errors and non-finite values to a reason
fn evaluate_finite(
    metric: &dyn Metric,
    targets: &[f64],
    predictions: &[f64],
) -> std::result::Result<f64, String> {
    match metric.evaluate(targets, predictions) {
        Ok(value) if value.is_finite() => Ok(value),
        Ok(value) => Err(format!("non-finite value {value}")),
        Err(err) => Err(err.to_string()),
    }
}

/// Gather `sample` at `indices` and evaluate
fn evaluate_at(
    metric: &dyn Metric,
    sample: &GroupedSample,
    indices: &[usize],
    targets: &mut Vec<f64>,
    predictions: &mut Vec<f64>,
) -> std::result::Result<f64, String> {
    targets.clear();
    predictions.clear();
    let (all_targets, all_predictions) = (sample.targets(), sample.predictions());
    targets.extend(indices.iter().map(|&i| all_targets[i]));
    predictions.extend(indices.iter().map(|&i| all_predictions[i]));
    evaluate_finite(metric, targets, predictions)
}

impl<'a> StatisticEvaluator<'a> {
    #[must_use]
    pub fn new(metric: &'a dyn Metric, design: Design<'a>, max_retries: usize) -> Self {
        Self {
            metric,
            design,
            max_retries: max_retries.max(1),
        }
    }

    #[must_use]
    pub fn metric_name(&self) -> &str {
        self.metric.name()
    }

    fn samples(&self) -> (&'a GroupedSample, &'a GroupedSample) {
        match self.design {
            Design::Paired { a, b, .. } | Design::Unpaired { a, b, .. } => (a, b),
        }
    }

    /// Metric values on the full, non-resampled samples
    ///
    /// # Errors
    ///
    /// Returns `MetricUndefined` if the metric fails on either full sample.
    pub fn observed(&self) -> Result<PairScore> {
        let (a, b) = self.samples();
        let undefined = |reason: String| StamboError::MetricUndefined {
            metric: self.metric.name().to_string(),
            attempts: 1,
            reason: format!("on the full sample: {reason}"),
        };
        let score_a =
            evaluate_finite(self.metric, a.targets(), a.predictions()).map_err(undefined)?;
        let score_b =
            evaluate_finite(self.metric, b.targets(), b.predictions()).map_err(undefined)?;
        Ok(PairScore {
            a: score_a,
            b: score_b,
        })
    }

    /// Score replicate `replicate` of the stream seeded by `unit_seed`
    ///
    /// # Errors
    ///
    /// Returns `MetricUndefined` after `max_retries` consecutive failed draws.
    pub fn score_replicate(
        &self,
        unit_seed: u64,
        replicate: usize,
        scratch: &mut Scratch,
    ) -> Result<ScoredReplicate> {
        let mut rng = replicate_rng(unit_seed, replicate);
        let mut last_reason = String::new();

        for attempt in 0..self.max_retries {
            let outcome = match self.design {
                Design::Paired { a, b, resampler } => {
                    resampler.draw_into(&mut rng, &mut scratch.indices_a, &mut scratch.groups);
                    self.score_indices(
                        (a, scratch.indices_a.as_slice()),
                        (b, scratch.indices_a.as_slice()),
                        &mut scratch.targets,
                        &mut scratch.predictions,
                    )
                }
                Design::Unpaired {
                    a,
                    b,
                    resampler_a,
                    resampler_b,
                } => {
                    resampler_a.draw_into(&mut rng, &mut scratch.indices_a, &mut scratch.groups);
                    resampler_b.draw_into(&mut rng, &mut scratch.indices_b, &mut scratch.groups);
                    self.score_indices(
                        (a, scratch.indices_a.as_slice()),
                        (b, scratch.indices_b.as_slice()),
                        &mut scratch.targets,
                        &mut scratch.predictions,
                    )
                }
            };

            match outcome {
                Ok(score) => {
                    return Ok(ScoredReplicate {
                        score,
                        redraws: attempt,
                    })
                }
                Err(reason) => {
                    tracing::trace!(
                        metric = %self.metric.name(),
                        replicate,
                        attempt,
                        reason = %reason,
                        "discarding replicate"
                    );
                    last_reason = reason;
                }
            }
        }

        Err(StamboError::MetricUndefined {
            metric: self.metric.name().to_string(),
            attempts: self.max_retries,
            reason: last_reason,
        })
    }

    fn score_indices(
        &self,
        (a, indices_a): (&GroupedSample, &[usize]),
        (b, indices_b): (&GroupedSample, &[usize]),
        targets: &mut Vec<f64>,
        predictions: &mut Vec<f64>,
    ) -> std::result::Result<PairScore, String> {
        let score_a = evaluate_at(self.metric, a, indices_a, targets, predictions)?;
        let score_b = evaluate_at(self.metric, b, indices_b, targets, predictions)?;
        Ok(PairScore {
            a: score_a,
            b: score_b,
        })
    }
}

#[cfg(test)]
#[allow(clippy::unwrap_used, clippy::float_cmp)]
mod tests {
    use super::*;
    use crate::metrics::{Accuracy, FnMetric, MetricError, RocAuc};

    struct AlwaysNan;

    impl Metric for AlwaysNan {
        fn name(&self) -> &str {
            "always_nan"
        }

        fn evaluate(
            &self,
            _targets: &[f64],
            _predictions: &[f64],
        ) -> std::result::Result<f64, MetricError> {
            Ok(f64::NAN)
        }
    }

    fn pair() -> (GroupedSample, GroupedSample) {
        let targets = vec![1.0, 0.0, 1.0, 0.0, 1.0, 0.0];
        let a = GroupedSample::new(vec![1.0, 0.0, 1.0, 0.0, 1.0, 1.0], targets.clone()).unwrap();
        let b = GroupedSample::new(vec![0.0, 0.0, 1.0, 1.0, 0.0, 1.0], targets).unwrap();
        (a, b)
    }

    #[test]
    fn test_observed_difference() {
        let (a, b) = pair();
        let resampler = Resampler::new(a.group_index()).unwrap();
        let design = Design::Paired {
            a: &a,
            b: &b,
            resampler: &resampler,
        };
        let evaluator = StatisticEvaluator::new(&Accuracy, design, 10);
        let observed = evaluator.observed().unwrap();
        assert!((observed.a - 5.0 / 6.0).abs() < 1e-12);
        assert!((observed.b - 2.0 / 6.0).abs() < 1e-12);
        assert!((observed.difference() - 0.5).abs() < 1e-12);
    }

    #[test]
    fn test_replicate_is_deterministic() {
        let (a, b) = pair();
        let resampler = Resampler::new(a.group_index()).unwrap();
        let design = Design::Paired {
            a: &a,
            b: &b,
            resampler: &resampler,
        };
        let evaluator = StatisticEvaluator::new(&Accuracy, design, 10);
        let mut scratch = Scratch::default();
        let first = evaluator.score_replicate(7, 3, &mut scratch).unwrap();
        let second = evaluator.score_replicate(7, 3, &mut scratch).unwrap();
        assert_eq!(first, second);
    }

    #[test]
    fn test_paired_design_uses_same_indices() {
        // Identical predictions on a shared replicate always give a zero difference
        let (a, _) = pair();
        let resampler = Resampler::new(a.group_index()).unwrap();
        let design = Design::Paired {
            a: &a,
            b: &a,
            resampler: &resampler,
        };
        let evaluator = StatisticEvaluator::new(&Accuracy, design, 10);
        let mut scratch = Scratch::default();
        for b in 0..50 {
            let scored = evaluator.score_replicate(1, b, &mut scratch).unwrap();
            assert_eq!(scored.score.difference(), 0.0);
        }
    }

    #[test]
    fn test_unpaired_design_resamples_independently() {
        let (a, _) = pair();
        let resampler = Resampler::new(a.group_index()).unwrap();
        let design = Design::Unpaired {
            a: &a,
            b: &a,
            resampler_a: &resampler,
            resampler_b: &resampler,
        };
        let evaluator = StatisticEvaluator::new(&Accuracy, design, 10);
        let mut scratch = Scratch::default();
        let nonzero = (0..50)
            .map(|b| evaluator.score_replicate(1, b, &mut scratch).unwrap())
            .filter(|s| s.score.difference() != 0.0)
            .count();
        assert!(nonzero > 0);
    }

    #[test]
    fn test_degenerate_replicates_are_redrawn() {
        // Two observations of different classes: a replicate holds a single
        // class with probability 1/2, which breaks ROC AUC
        let targets = vec![0.0, 1.0];
        let a = GroupedSample::new(vec![0.2, 0.8], targets.clone()).unwrap();
        let b = GroupedSample::new(vec![0.8, 0.2], targets).unwrap();
        let resampler = Resampler::new(a.group_index()).unwrap();
        let design = Design::Paired {
            a: &a,
            b: &b,
            resampler: &resampler,
        };
        let evaluator = StatisticEvaluator::new(&RocAuc, design, 100);
        let mut scratch = Scratch::default();

        let mut total_redraws = 0;
        for replicate in 0..100 {
            let scored = evaluator.score_replicate(5, replicate, &mut scratch).unwrap();
            assert_eq!(scored.score.a, 1.0);
            assert_eq!(scored.score.b, 0.0);
            total_redraws += scored.redraws;
        }
        assert!(total_redraws > 0);
    }

    #[test]
    fn test_metric_undefined_after_max_retries() {
        let (a, b) = pair();
        let resampler = Resampler::new(a.group_index()).unwrap();
        let design = Design::Paired {
            a: &a,
            b: &b,
            resampler: &resampler,
        };
        let evaluator = StatisticEvaluator::new(&AlwaysNan, design, 5);
        let mut scratch = Scratch::default();
        let err = evaluator.score_replicate(1, 0, &mut scratch).unwrap_err();
        assert!(matches!(
            err,
            StamboError::MetricUndefined { attempts: 5, .. }
        ));
        assert!(matches!(
            evaluator.observed(),
            Err(StamboError::MetricUndefined { attempts: 1, .. })
        ));
    }

    #[test]
    fn test_fn_metric_infinite_value_rejected() {
        let (a, b) = pair();
        let resampler = Resampler::new(a.group_index()).unwrap();
        let design = Design::Paired {
            a: &a,
            b: &b,
            resampler: &resampler,
        };
        let metric = FnMetric::new("inf", |_t: &[f64], _p: &[f64]| f64::INFINITY);
        let evaluator = StatisticEvaluator::new(&metric, design, 3);
        assert!(evaluator.observed().is_err());
    }
}
