//! Metric plug-ins and the built-in metric collection.
//!
//! A metric is a pure function of `(targets, predictions)` returning one
//! scalar. The core treats metrics as black boxes: a metric that reports an
//! error or a non-finite value on a replicate only causes that replicate to
//! be redrawn.
//!
//! Classification metrics read values as class labels rounded to the
//! nearest integer, so binary probability scores are thresholded at 0.5.
//! Ranking metrics (`RocAuc`, `AveragePrecision`) use the raw scores.

use std::collections::BTreeMap;
use std::sync::Arc;
use thiserror::Error;

/// Reasons a metric cannot be evaluated on a given input
#[derive(Error, Debug, Clone, PartialEq, Eq)]
pub enum MetricError {
    #[error("metric undefined: {0}")]
    Undefined(String),

    #[error("empty input")]
    Empty,
}

/// Errors raised while building or querying a [`MetricRegistry`]
#[derive(Error, Debug, Clone, PartialEq, Eq)]
pub enum RegistryError {
    #[error("metric name must not be empty")]
    EmptyName,

    #[error("unknown metric: {0}")]
    UnknownMetric(String),
}

/// A model-quality metric
pub trait Metric: Send + Sync {
    /// Registry name
    fn name(&self) -> &str;

    /// Evaluate on aligned targets and predictions
    ///
    /// # Errors
    ///
    /// Returns `MetricError` when the metric is undefined on this input.
    fn evaluate(&self, targets: &[f64], predictions: &[f64]) -> Result<f64, MetricError>;

    /// Direction used to label which model is better
    fn higher_is_better(&self) -> bool {
        true
    }
}

/// Adapter turning a closure into a [`Metric`]
pub struct FnMetric<F> {
    name: String,
    func: F,
    higher_is_better: bool,
}

impl<F> FnMetric<F>
where
    F: Fn(&[f64], &[f64]) -> f64 + Send + Sync,
{
    /// Wrap `func` as a higher-is-better metric
    pub fn new(name: impl Into<String>, func: F) -> Self {
        Self {
            name: name.into(),
            func,
            higher_is_better: true,
        }
    }

    /// Mark the metric as lower-is-better (errors, losses)
    #[must_use]
    pub fn lower_is_better(mut self) -> Self {
        self.higher_is_better = false;
        self
    }
}

impl<F> Metric for FnMetric<F>
where
    F: Fn(&[f64], &[f64]) -> f64 + Send + Sync,
{
    fn name(&self) -> &str {
        &self.name
    }

    fn evaluate(&self, targets: &[f64], predictions: &[f64]) -> Result<f64, MetricError> {
        Ok((self.func)(targets, predictions))
    }

    fn higher_is_better(&self) -> bool {
        self.higher_is_better
    }
}

impl std::fmt::Debug for dyn Metric {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        write!(f, "Metric({})", self.name())
    }
}

/// Ordered name → metric table
///
/// Iteration follows insertion order. Registering a name twice replaces the
/// earlier metric in place.
#[derive(Clone, Default)]
pub struct MetricRegistry {
    entries: Vec<(String, Arc<dyn Metric>)>,
}

impl MetricRegistry {
    #[must_use]
    pub fn new() -> Self {
        Self::default()
    }

    /// Every built-in metric
    #[must_use]
    pub fn builtin() -> Self {
        let mut registry = Self::classification();
        registry.entries.extend(Self::regression().entries);
        registry
    }

    /// Built-in classification metrics
    #[must_use]
    pub fn classification() -> Self {
        Self {
            entries: vec![
                named(Accuracy),
                named(BalancedAccuracy),
                named(CohenKappa),
                named(F1Score),
                named(RocAuc),
                named(AveragePrecision),
            ],
        }
    }

    /// Built-in regression metrics
    #[must_use]
    pub fn regression() -> Self {
        Self {
            entries: vec![named(Mse), named(Mae), named(PearsonR)],
        }
    }

    /// Builder-style [`MetricRegistry::register`]
    ///
    /// # Errors
    ///
    /// Returns `RegistryError::EmptyName` when the metric has no name.
    pub fn with<M: Metric + 'static>(mut self, metric: M) -> Result<Self, RegistryError> {
        self.register(metric)?;
        Ok(self)
    }

    /// Register a metric under its own name
    ///
    /// # Errors
    ///
    /// Returns `RegistryError::EmptyName` when the metric has no name.
    pub fn register<M: Metric + 'static>(&mut self, metric: M) -> Result<(), RegistryError> {
        let name = metric.name().to_string();
        self.insert(name, Arc::new(metric))
    }

    /// Register a shared metric under an explicit name
    ///
    /// # Errors
    ///
    /// Returns `RegistryError::EmptyName` for an empty or blank name.
    pub fn insert(
        &mut self,
        name: impl Into<String>,
        metric: Arc<dyn Metric>,
    ) -> Result<(), RegistryError> {
        let name = name.into();
        if name.trim().is_empty() {
            return Err(RegistryError::EmptyName);
        }
        if let Some(slot) = self.entries.iter_mut().find(|(n, _)| *n == name) {
            slot.1 = metric;
        } else {
            self.entries.push((name, metric));
        }
        Ok(())
    }

    #[must_use]
    pub fn get(&self, name: &str) -> Option<Arc<dyn Metric>> {
        self.entries
            .iter()
            .find(|(n, _)| n == name)
            .map(|(_, m)| Arc::clone(m))
    }

    /// Sub-registry with the named metrics, in the requested order
    ///
    /// # Errors
    ///
    /// Returns `RegistryError::UnknownMetric` for the first unknown name.
    pub fn select<S: AsRef<str>>(&self, names: &[S]) -> Result<Self, RegistryError> {
        let mut selected = Self::new();
        for name in names {
            let name = name.as_ref();
            let metric = self
                .get(name)
                .ok_or_else(|| RegistryError::UnknownMetric(name.to_string()))?;
            selected.insert(name, metric)?;
        }
        Ok(selected)
    }

    #[must_use]
    pub fn names(&self) -> Vec<&str> {
        self.entries.iter().map(|(n, _)| n.as_str()).collect()
    }

    pub fn iter(&self) -> impl Iterator<Item = (&str, &Arc<dyn Metric>)> {
        self.entries.iter().map(|(n, m)| (n.as_str(), m))
    }

    #[must_use]
    pub fn len(&self) -> usize {
        self.entries.len()
    }

    #[must_use]
    pub fn is_empty(&self) -> bool {
        self.entries.is_empty()
    }
}

impl std::fmt::Debug for MetricRegistry {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.debug_list().entries(self.names()).finish()
    }
}

fn named<M: Metric + 'static>(metric: M) -> (String, Arc<dyn Metric>) {
    (metric.name().to_string(), Arc::new(metric))
}

// ============================================================================
// Built-in metrics
// ============================================================================

#[allow(clippy::cast_possible_truncation)]
fn label(value: f64) -> i64 {
    value.round() as i64
}

fn check_input(targets: &[f64], predictions: &[f64]) -> Result<(), MetricError> {
    if targets.is_empty() {
        return Err(MetricError::Empty);
    }
    if targets.len() != predictions.len() {
        return Err(MetricError::Undefined(format!(
            "{} targets vs {} predictions",
            targets.len(),
            predictions.len()
        )));
    }
    Ok(())
}

/// Confusion counts keyed by (true label, predicted label)
fn confusion(targets: &[f64], predictions: &[f64]) -> BTreeMap<(i64, i64), usize> {
    let mut counts = BTreeMap::new();
    for (&t, &p) in targets.iter().zip(predictions) {
        *counts.entry((label(t), label(p))).or_insert(0) += 1;
    }
    counts
}

/// Fraction of correctly labelled observations
#[derive(Debug, Clone, Copy, Default)]
pub struct Accuracy;

impl Metric for Accuracy {
    fn name(&self) -> &str {
        "accuracy"
    }

    #[allow(clippy::cast_precision_loss)]
    fn evaluate(&self, targets: &[f64], predictions: &[f64]) -> Result<f64, MetricError> {
        check_input(targets, predictions)?;
        let correct = targets
            .iter()
            .zip(predictions)
            .filter(|&(&t, &p)| label(t) == label(p))
            .count();
        Ok(correct as f64 / targets.len() as f64)
    }
}

/// Mean per-class recall over the classes present in the targets
#[derive(Debug, Clone, Copy, Default)]
pub struct BalancedAccuracy;

impl Metric for BalancedAccuracy {
    fn name(&self) -> &str {
        "balanced_accuracy"
    }

    #[allow(clippy::cast_precision_loss)]
    fn evaluate(&self, targets: &[f64], predictions: &[f64]) -> Result<f64, MetricError> {
        check_input(targets, predictions)?;
        let mut per_class: BTreeMap<i64, (usize, usize)> = BTreeMap::new();
        for (&t, &p) in targets.iter().zip(predictions) {
            let entry = per_class.entry(label(t)).or_insert((0, 0));
            entry.1 += 1;
            if label(t) == label(p) {
                entry.0 += 1;
            }
        }
        let recall_sum: f64 = per_class
            .values()
            .map(|&(hit, total)| hit as f64 / total as f64)
            .sum();
        Ok(recall_sum / per_class.len() as f64)
    }
}

/// Cohen's kappa between targets and predicted labels
#[derive(Debug, Clone, Copy, Default)]
pub struct CohenKappa;

impl Metric for CohenKappa {
    fn name(&self) -> &str {
        "cohen_kappa"
    }

    #[allow(clippy::cast_precision_loss)]
    fn evaluate(&self, targets: &[f64], predictions: &[f64]) -> Result<f64, MetricError> {
        check_input(targets, predictions)?;
        let n = targets.len() as f64;
        let counts = confusion(targets, predictions);

        let mut true_marginal: BTreeMap<i64, usize> = BTreeMap::new();
        let mut pred_marginal: BTreeMap<i64, usize> = BTreeMap::new();
        let mut agree = 0usize;
        for (&(t, p), &c) in &counts {
            *true_marginal.entry(t).or_insert(0) += c;
            *pred_marginal.entry(p).or_insert(0) += c;
            if t == p {
                agree += c;
            }
        }

        let observed = agree as f64 / n;
        let expected: f64 = true_marginal
            .iter()
            .map(|(class, &c)| {
                let p = pred_marginal.get(class).copied().unwrap_or(0);
                (c as f64 / n) * (p as f64 / n)
            })
            .sum();

        if (1.0 - expected).abs() < f64::EPSILON {
            return Err(MetricError::Undefined(
                "chance agreement is 1 (single label)".to_string(),
            ));
        }
        Ok((observed - expected) / (1.0 - expected))
    }
}

/// Binary F1 score for the positive class `1`
#[derive(Debug, Clone, Copy, Default)]
pub struct F1Score;

impl Metric for F1Score {
    fn name(&self) -> &str {
        "f1"
    }

    #[allow(clippy::cast_precision_loss)]
    fn evaluate(&self, targets: &[f64], predictions: &[f64]) -> Result<f64, MetricError> {
        check_input(targets, predictions)?;
        let (mut tp, mut fp, mut fn_) = (0usize, 0usize, 0usize);
        for (&t, &p) in targets.iter().zip(predictions) {
            match (label(t) == 1, label(p) == 1) {
                (true, true) => tp += 1,
                (false, true) => fp += 1,
                (true, false) => fn_ += 1,
                (false, false) => {}
            }
        }
        let denom = 2 * tp + fp + fn_;
        if denom == 0 {
            return Err(MetricError::Undefined(
                "no positive targets or predictions".to_string(),
            ));
        }
        Ok((2 * tp) as f64 / denom as f64)
    }
}

/// Area under the ROC curve for binary targets and real-valued scores
///
/// Computed as the Mann-Whitney statistic with average ranks for ties.
#[derive(Debug, Clone, Copy, Default)]
pub struct RocAuc;

impl Metric for RocAuc {
    fn name(&self) -> &str {
        "roc_auc"
    }

    #[allow(clippy::cast_precision_loss)]
    fn evaluate(&self, targets: &[f64], predictions: &[f64]) -> Result<f64, MetricError> {
        check_input(targets, predictions)?;
        let mut order: Vec<usize> = (0..predictions.len()).collect();
        order.sort_by(|&a, &b| predictions[a].total_cmp(&predictions[b]));

        let mut positive_rank_sum = 0.0;
        let mut n_pos = 0usize;
        let mut start = 0;
        while start < order.len() {
            let mut end = start;
            while end + 1 < order.len()
                && predictions[order[end + 1]] == predictions[order[start]]
            {
                end += 1;
            }
            // 1-based average rank of the tie block
            let avg_rank = (start + end) as f64 / 2.0 + 1.0;
            for &idx in &order[start..=end] {
                if label(targets[idx]) == 1 {
                    positive_rank_sum += avg_rank;
                    n_pos += 1;
                }
            }
            start = end + 1;
        }

        let n_neg = targets.len() - n_pos;
        if n_pos == 0 || n_neg == 0 {
            return Err(MetricError::Undefined(
                "ROC AUC needs both classes in the targets".to_string(),
            ));
        }
        let n_pos_f = n_pos as f64;
        let u = positive_rank_sum - n_pos_f * (n_pos_f + 1.0) / 2.0;
        Ok(u / (n_pos_f * n_neg as f64))
    }
}

/// Average precision (area under the step precision-recall curve)
#[derive(Debug, Clone, Copy, Default)]
pub struct AveragePrecision;

impl Metric for AveragePrecision {
    fn name(&self) -> &str {
        "average_precision"
    }

    #[allow(clippy::cast_precision_loss)]
    fn evaluate(&self, targets: &[f64], predictions: &[f64]) -> Result<f64, MetricError> {
        check_input(targets, predictions)?;
        let n_pos = targets.iter().filter(|&&t| label(t) == 1).count();
        if n_pos == 0 {
            return Err(MetricError::Undefined(
                "average precision needs at least one positive".to_string(),
            ));
        }

        let mut order: Vec<usize> = (0..predictions.len()).collect();
        order.sort_by(|&a, &b| predictions[b].total_cmp(&predictions[a]));

        // Thresholds at distinct scores; ties enter together
        let mut ap = 0.0;
        let mut tp = 0usize;
        let mut seen = 0usize;
        let mut prev_recall = 0.0;
        let mut start = 0;
        while start < order.len() {
            let mut end = start;
            while end + 1 < order.len()
                && predictions[order[end + 1]] == predictions[order[start]]
            {
                end += 1;
            }
            for &idx in &order[start..=end] {
                seen += 1;
                if label(targets[idx]) == 1 {
                    tp += 1;
                }
            }
            let recall = tp as f64 / n_pos as f64;
            let precision = tp as f64 / seen as f64;
            ap += (recall - prev_recall) * precision;
            prev_recall = recall;
            start = end + 1;
        }
        Ok(ap)
    }
}

/// Mean squared error
#[derive(Debug, Clone, Copy, Default)]
pub struct Mse;

impl Metric for Mse {
    fn name(&self) -> &str {
        "mse"
    }

    #[allow(clippy::cast_precision_loss)]
    fn evaluate(&self, targets: &[f64], predictions: &[f64]) -> Result<f64, MetricError> {
        check_input(targets, predictions)?;
        let ss: f64 = targets
            .iter()
            .zip(predictions)
            .map(|(t, p)| (t - p).powi(2))
            .sum();
        Ok(ss / targets.len() as f64)
    }

    fn higher_is_better(&self) -> bool {
        false
    }
}

/// Mean absolute error
#[derive(Debug, Clone, Copy, Default)]
pub struct Mae;

impl Metric for Mae {
    fn name(&self) -> &str {
        "mae"
    }

    #[allow(clippy::cast_precision_loss)]
    fn evaluate(&self, targets: &[f64], predictions: &[f64]) -> Result<f64, MetricError> {
        check_input(targets, predictions)?;
        let sum: f64 = targets
            .iter()
            .zip(predictions)
            .map(|(t, p)| (t - p).abs())
            .sum();
        Ok(sum / targets.len() as f64)
    }

    fn higher_is_better(&self) -> bool {
        false
    }
}

/// Pearson correlation between targets and predictions
#[derive(Debug, Clone, Copy, Default)]
pub struct PearsonR;

impl Metric for PearsonR {
    fn name(&self) -> &str {
        "pearson_r"
    }

    #[allow(clippy::cast_precision_loss)]
    fn evaluate(&self, targets: &[f64], predictions: &[f64]) -> Result<f64, MetricError> {
        check_input(targets, predictions)?;
        let n = targets.len() as f64;
        let mean_t = targets.iter().sum::<f64>() / n;
        let mean_p = predictions.iter().sum::<f64>() / n;

        let (mut cov, mut var_t, mut var_p) = (0.0, 0.0, 0.0);
        for (t, p) in targets.iter().zip(predictions) {
            let dt = t - mean_t;
            let dp = p - mean_p;
            cov += dt * dp;
            var_t += dt * dt;
            var_p += dp * dp;
        }
        if var_t <= f64::EPSILON || var_p <= f64::EPSILON {
            return Err(MetricError::Undefined(
                "correlation with a constant sequence".to_string(),
            ));
        }
        Ok(cov / (var_t.sqrt() * var_p.sqrt()))
    }
}
